use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragctx::{EmbeddingProvider, IndexCacheConfig, IndexSource, Pipeline, RagConfig};
use tempfile::TempDir;

fn write_corpus(root: &Path) {
    fs::create_dir_all(root.join("messages_examples")).unwrap();
    fs::write(
        root.join("messages_examples/carol_messages.json"),
        r#"{"messages":[{"content":"dinner at eight"},{"content":"bring the map"}]}"#,
    )
    .unwrap();
    fs::write(root.join("notes.txt"), "harbour opens at six").unwrap();
}

fn pipeline(cache_dir: PathBuf, corpus: &Path, dimension: usize) -> Pipeline {
    let cfg = RagConfig::default()
        .with_corpus_path(corpus)
        .with_index(IndexCacheConfig::default().with_cache_dir(cache_dir));
    Pipeline::with_provider(cfg, Arc::new(EmbeddingProvider::hash_only(dimension))).unwrap()
}

#[tokio::test]
async fn untouched_corpus_reuses_snapshot_across_instances() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);
    let cache_dir = dir.path().join("cache");

    let first = pipeline(cache_dir.clone(), &corpus, 32);
    let built = first.ensure_index().await.unwrap();
    assert_eq!(built.source, IndexSource::Rebuilt);
    assert_eq!(built.handle.len(), 3);
    assert!(first.cache_info().unwrap().snapshot_valid);

    let second = pipeline(cache_dir, &corpus, 32);
    let loaded = second.ensure_index().await.unwrap();
    assert_eq!(loaded.source, IndexSource::Snapshot);
    assert_eq!(loaded.fingerprint, built.fingerprint);
    assert_eq!(loaded.handle.documents(), built.handle.documents());
}

#[tokio::test]
async fn modified_file_forces_rebuild() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);
    let pipeline = pipeline(dir.path().join("cache"), &corpus, 32);

    let before = pipeline.ensure_index().await.unwrap();
    fs::write(
        corpus.join("notes.txt"),
        "harbour opens at six, closes at ten on weekdays",
    )
    .unwrap();

    let after = pipeline.ensure_index().await.unwrap();
    assert_eq!(after.source, IndexSource::Rebuilt);
    assert_ne!(after.fingerprint, before.fingerprint);
    assert!(after
        .handle
        .documents()
        .iter()
        .any(|d| d.content.contains("closes at ten")));

    // Only the current fingerprint's snapshot survives.
    let info = pipeline.cache_info().unwrap();
    assert!(info.snapshot_valid);
    assert!(info
        .files
        .iter()
        .all(|f| f.path.to_string_lossy().contains(&after.fingerprint)));
}

#[tokio::test]
async fn model_change_invalidates_snapshot() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);
    let cache_dir = dir.path().join("cache");

    pipeline(cache_dir.clone(), &corpus, 32)
        .ensure_index()
        .await
        .unwrap();
    let other_model = pipeline(cache_dir, &corpus, 16);
    let ensured = other_model.ensure_index().await.unwrap();
    assert_eq!(ensured.source, IndexSource::Rebuilt);
    assert_eq!(ensured.handle.dimension(), 16);
}

#[tokio::test]
async fn invalidate_then_query_rebuilds() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);
    let pipeline = pipeline(dir.path().join("cache"), &corpus, 32);

    pipeline.ensure_index().await.unwrap();
    pipeline.invalidate().unwrap();
    let info = pipeline.cache_info().unwrap();
    assert!(!info.snapshot_valid);
    assert!(info.files.is_empty());
    assert_eq!(pipeline.cache().document_count(), 0);

    let ensured = pipeline.ensure_index().await.unwrap();
    assert_eq!(ensured.source, IndexSource::Rebuilt);
}
