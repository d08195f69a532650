//! In-process embedding tier.

use async_trait::async_trait;

use crate::SemanticError;

/// An embedding model running inside this process.
///
/// `embed_batch` is called with every pending text at once; implementations
/// should run a single forward pass where they can.
#[async_trait]
pub trait LocalModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One raw vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;
}

#[cfg(feature = "onnx")]
pub use self::onnx_model::OnnxModel;

#[cfg(feature = "onnx")]
mod onnx_model {
    use async_trait::async_trait;
    use tokio::sync::OnceCell;

    use super::LocalModel;
    use crate::assets::{resolve_model_assets, ModelAssets};
    use crate::cache::loaded_model;
    use crate::onnx::run_onnx_embeddings;
    use crate::{LocalModelConfig, SemanticError};

    /// ONNX Runtime model with a Hugging Face tokenizer.
    ///
    /// Assets are resolved (and downloaded if configured) once, on the first
    /// call. Sessions are cached per thread; see the `cache` module.
    ///
    /// Memory: every thread that runs inference loads its own session and
    /// tokenizer. On a multi-threaded Tokio runtime that is up to one copy of
    /// the model per worker thread (roughly 90 MB each for all-MiniLM-L6-v2),
    /// so resident memory grows with `worker_threads`. Pin inference to fewer
    /// threads, or size the runtime accordingly, when the model is large.
    #[derive(Debug)]
    pub struct OnnxModel {
        cfg: LocalModelConfig,
        assets: OnceCell<ModelAssets>,
    }

    impl OnnxModel {
        pub fn new(cfg: LocalModelConfig) -> Result<Self, SemanticError> {
            cfg.validate()?;
            Ok(Self {
                cfg,
                assets: OnceCell::new(),
            })
        }

        fn infer(&self, assets: &ModelAssets, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
            let model = loaded_model(assets)?;
            run_onnx_embeddings(&model, texts, self.cfg.max_sequence_length)
        }
    }

    #[async_trait]
    impl LocalModel for OnnxModel {
        fn model_name(&self) -> &str {
            &self.cfg.model_name
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
            let assets = self
                .assets
                .get_or_try_init(|| resolve_model_assets(&self.cfg))
                .await?;
            self.infer(assets, texts)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::TempDir;

        #[tokio::test]
        async fn missing_model_is_reported_as_unavailable() {
            let dir = TempDir::new().unwrap();
            let model = OnnxModel::new(
                LocalModelConfig::default()
                    .with_model_path(dir.path().join("model.onnx"))
                    .with_tokenizer_path(dir.path().join("tokenizer.json")),
            )
            .unwrap();
            assert_eq!(model.model_name(), "all-MiniLM-L6-v2");
            let err = model.embed_batch(&["hi".to_string()]).await.unwrap_err();
            assert!(err.is_unavailable());
        }
    }
}
