use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{LocalModelConfig, SemanticError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ModelAssets {
    pub(crate) model_path: PathBuf,
    pub(crate) tokenizer_path: PathBuf,
}

/// Locate the model and tokenizer, downloading them when URLs are configured.
pub(crate) async fn resolve_model_assets(
    cfg: &LocalModelConfig,
) -> Result<ModelAssets, SemanticError> {
    let model_target = storage_path(cfg, Some(&cfg.model_path), cfg.model_url.as_deref(), "model.onnx");
    let model_path = ensure_local_file(&model_target, cfg.model_url.as_deref(), || {
        SemanticError::ModelNotFound(cfg.model_path.display().to_string())
    })
    .await?;

    let tokenizer_target = storage_path(
        cfg,
        cfg.tokenizer_path.as_deref(),
        cfg.tokenizer_url.as_deref(),
        "tokenizer.json",
    );
    let tokenizer_path = ensure_local_file(&tokenizer_target, cfg.tokenizer_url.as_deref(), || {
        SemanticError::TokenizerMissing(cfg.model_name.clone())
    })
    .await?;

    Ok(ModelAssets {
        model_path,
        tokenizer_path,
    })
}

/// Explicit paths win when they exist. Otherwise downloads land in
/// `cache_dir/<model_name>/` (or next to the model file) under a name taken
/// from the URL.
fn storage_path(
    cfg: &LocalModelConfig,
    explicit: Option<&Path>,
    url: Option<&str>,
    fallback_name: &str,
) -> PathBuf {
    if let Some(path) = explicit {
        if path.exists() || url.is_none() {
            return path.to_path_buf();
        }
    }

    let file_name = url
        .and_then(infer_filename_from_url)
        .unwrap_or_else(|| fallback_name.to_string());
    let base_dir = match &cfg.cache_dir {
        Some(dir) => dir.join(&cfg.model_name),
        None => cfg
            .model_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    base_dir.join(file_name)
}

async fn ensure_local_file<F>(
    target: &Path,
    remote_url: Option<&str>,
    on_missing: F,
) -> Result<PathBuf, SemanticError>
where
    F: FnOnce() -> SemanticError,
{
    if target.exists() {
        return Ok(target.to_path_buf());
    }

    if let Some(url) = remote_url {
        download_to_path(target, url).await?;
        return Ok(target.to_path_buf());
    }

    Err(on_missing())
}

/// Download into a sibling temp file and rename, so an interrupted download
/// never leaves a truncated model behind.
async fn download_to_path(target: &Path, url: &str) -> Result<(), SemanticError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SemanticError::Download(format!(
            "unexpected status {status} while fetching {url}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    let partial = target.with_extension("part");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, target)?;
    Ok(())
}

/// Last non-empty path segment of `url`, without query or fragment.
fn infer_filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_from_url() {
        assert_eq!(
            infer_filename_from_url("https://host/models/minilm/model.onnx?download=1").as_deref(),
            Some("model.onnx")
        );
        assert_eq!(
            infer_filename_from_url("https://host/tok/tokenizer.json/").as_deref(),
            Some("tokenizer.json")
        );
        assert_eq!(infer_filename_from_url("https://"), None);
    }

    #[test]
    fn downloads_go_to_cache_dir() {
        let dir = TempDir::new().unwrap();
        let cfg = LocalModelConfig {
            model_path: dir.path().join("absent/model.onnx"),
            model_url: Some("https://host/files/minilm.onnx".into()),
            cache_dir: Some(dir.path().join("cache")),
            ..LocalModelConfig::default()
        };
        let target = storage_path(&cfg, Some(&cfg.model_path), cfg.model_url.as_deref(), "model.onnx");
        assert_eq!(
            target,
            dir.path().join("cache").join("all-MiniLM-L6-v2").join("minilm.onnx")
        );
    }

    #[test]
    fn existing_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.onnx");
        fs::write(&model, b"onnx").unwrap();
        let cfg = LocalModelConfig {
            model_path: model.clone(),
            model_url: Some("https://host/other.onnx".into()),
            cache_dir: Some(dir.path().join("cache")),
            ..LocalModelConfig::default()
        };
        assert_eq!(
            storage_path(&cfg, Some(&cfg.model_path), cfg.model_url.as_deref(), "model.onnx"),
            model
        );
    }

    #[tokio::test]
    async fn missing_assets_without_urls() {
        let dir = TempDir::new().unwrap();
        let cfg = LocalModelConfig::default()
            .with_model_path(dir.path().join("missing.onnx"))
            .with_tokenizer_path(dir.path().join("missing.json"));
        let err = resolve_model_assets(&cfg).await.unwrap_err();
        assert!(matches!(err, SemanticError::ModelNotFound(_)));
        assert!(err.is_unavailable());
    }
}
