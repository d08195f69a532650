//! Loaded ONNX sessions, one per thread per asset pair.
//!
//! `onnxruntime` sessions are neither `Send` nor `Sync`, so they are cached in
//! thread-local storage keyed by the resolved asset paths. Concurrent first
//! use on different threads loads independently; every later call on the same
//! thread reuses the handle.
//!
//! Each thread therefore holds a full copy of the session and tokenizer, and
//! memory scales with the number of threads that run inference.

use once_cell::sync::OnceCell;
use onnxruntime::{environment::Environment, session::Session};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokenizers::Tokenizer;

use crate::assets::ModelAssets;
use crate::SemanticError;

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

thread_local! {
    static SESSIONS: RefCell<HashMap<ModelAssets, Rc<LoadedModel>>> = RefCell::new(HashMap::new());
}

pub(crate) struct LoadedModel {
    pub(crate) tokenizer: Tokenizer,
    pub(crate) session: RefCell<Session<'static>>,
}

impl LoadedModel {
    fn load(assets: &ModelAssets) -> Result<Self, SemanticError> {
        let tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| SemanticError::Inference(e.to_string()))?;

        let session = ort_environment()?
            .new_session_builder()
            .map_err(|e| SemanticError::Inference(e.to_string()))?
            .with_model_from_file(assets.model_path.clone())
            .map_err(|e| SemanticError::Inference(e.to_string()))?;

        tracing::info!(
            model = %assets.model_path.display(),
            thread_sessions = cached_sessions() + 1,
            "local_model_loaded"
        );
        Ok(Self {
            tokenizer,
            session: RefCell::new(session),
        })
    }
}

/// Cached handle for `assets` on the current thread, loading it on first use.
pub(crate) fn loaded_model(assets: &ModelAssets) -> Result<Rc<LoadedModel>, SemanticError> {
    SESSIONS.with(|sessions| {
        if let Some(handle) = sessions.borrow().get(assets) {
            return Ok(Rc::clone(handle));
        }
        let handle = Rc::new(LoadedModel::load(assets)?);
        sessions
            .borrow_mut()
            .insert(assets.clone(), Rc::clone(&handle));
        Ok(handle)
    })
}

/// Sessions loaded on the current thread.
pub(crate) fn cached_sessions() -> usize {
    SESSIONS.with(|sessions| sessions.borrow().len())
}

fn ort_environment() -> Result<&'static Environment, SemanticError> {
    ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("ragctx-semantic")
            .build()
            .map_err(|e| SemanticError::Inference(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn failed_load_caches_nothing_and_threads_are_isolated() {
        let dir = TempDir::new().unwrap();
        let assets = ModelAssets {
            model_path: dir.path().join("model.onnx"),
            tokenizer_path: dir.path().join("tokenizer.json"),
        };
        assert!(loaded_model(&assets).is_err());
        assert_eq!(cached_sessions(), 0);

        let other = std::thread::spawn(cached_sessions).join().unwrap();
        assert_eq!(other, 0);
    }
}
