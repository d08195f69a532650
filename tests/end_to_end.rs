use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ragctx::{
    EmbeddingProvider, EmbeddingTier, IndexCacheConfig, LocalModel, Pipeline, RagConfig,
    SearchScope, SemanticError,
};
use tempfile::TempDir;

/// Maps texts to unit vectors by keyword so similarities to the query
/// direction `[1, 0]` are known up front. Unknown text embeds as the query.
struct KeywordModel {
    table: Vec<(&'static str, f32)>,
}

impl KeywordModel {
    fn vector(&self, text: &str) -> Vec<f32> {
        let sim = self
            .table
            .iter()
            .find(|(key, _)| text.contains(key))
            .map(|(_, sim)| *sim)
            .unwrap_or(1.0);
        vec![sim, (1.0 - sim * sim).max(0.0).sqrt()]
    }
}

#[async_trait]
impl LocalModel for KeywordModel {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

fn write_corpus(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(
        root.join("alice.json"),
        r#"{"messages":[{"id":"a1","content":"alice sailing plan"}]}"#,
    )
    .unwrap();
    fs::write(
        root.join("bob.json"),
        r#"{"messages":[
            {"id":"b1","content":"bob regatta results"},
            {"id":"b2","content":"bob snacks list"},
            {"id":"b3","content":"bob weather rant"}
        ]}"#,
    )
    .unwrap();
}

fn pipeline(dir: &TempDir) -> Pipeline {
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);

    let model = KeywordModel {
        table: vec![
            ("alice sailing", 0.9),
            ("bob regatta", 0.95),
            ("bob snacks", 0.4),
            ("bob weather", 0.2),
        ],
    };
    let provider = EmbeddingProvider::hash_only(2).with_local(Arc::new(model));
    let cfg = RagConfig::default()
        .with_corpus_path(corpus)
        .with_index(IndexCacheConfig::default().with_cache_dir(dir.path().join("cache")));
    Pipeline::with_provider(cfg, Arc::new(provider)).unwrap()
}

fn contents(ctx: &ragctx::ContextSet) -> Vec<&str> {
    ctx.documents
        .iter()
        .map(|d| d.document.content.as_str())
        .collect()
}

#[tokio::test]
async fn sparse_owner_results_are_backfilled_and_ranked() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let ctx = pipeline
        .build_context("what is the plan", &SearchScope::owner("alice"), 5, 0.3)
        .await;

    assert!(ctx.len() <= 5);
    assert!(ctx.used_fallback);
    assert_eq!(ctx.query_tier, Some(EmbeddingTier::Local));
    // Relaxed threshold is 0.24: the weather message stays out and the
    // backfill draws only on other owners.
    assert_eq!(
        contents(&ctx),
        ["bob regatta results", "alice sailing plan", "bob snacks list"]
    );
    let scores: Vec<f32> = ctx.documents.iter().map(|d| d.similarity_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    // 0.7 * mean(0.95, 0.9, 0.4) + 0.3 * 0.3
    assert!((ctx.confidence_score - 0.615).abs() < 1e-3);
    assert_eq!(ctx.quality_level(), "good");
}

#[tokio::test]
async fn sparse_owner_is_filled_to_limit_from_other_owners() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(
        corpus.join("alice.json"),
        r#"[{"content":"alice harbour"},{"content":"alice mooring"}]"#,
    )
    .unwrap();
    let bob: Vec<String> = (0..8)
        .map(|i| format!(r#"{{"content":"bob chatter {i}"}}"#))
        .collect();
    fs::write(corpus.join("bob.json"), format!("[{}]", bob.join(","))).unwrap();

    let model = KeywordModel {
        table: vec![("alice harbour", 0.9), ("alice mooring", 0.85), ("bob chatter", 0.6)],
    };
    let provider = EmbeddingProvider::hash_only(2).with_local(Arc::new(model));
    let cfg = RagConfig::default()
        .with_corpus_path(corpus)
        .with_index(IndexCacheConfig::default().with_cache_dir(dir.path().join("cache")));
    let pipeline = Pipeline::with_provider(cfg, Arc::new(provider)).unwrap();

    let ctx = pipeline
        .build_context("what is the plan", &SearchScope::owner("alice"), 10, 0.7)
        .await;
    assert!(ctx.used_fallback);
    assert_eq!(ctx.len(), 10);
    assert_eq!(&contents(&ctx)[..2], ["alice harbour", "alice mooring"]);
    assert!(ctx.documents[2..]
        .iter()
        .all(|d| d.document.owner.as_deref() == Some("bob")));
}

#[tokio::test]
async fn owner_only_scope_never_backfills() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let ctx = pipeline
        .build_context("what is the plan", &SearchScope::owner_only("alice"), 5, 0.3)
        .await;
    assert!(!ctx.used_fallback);
    assert_eq!(contents(&ctx), ["alice sailing plan"]);
    assert_eq!(ctx.documents[0].document.owner.as_deref(), Some("alice"));
}

#[tokio::test]
async fn unscoped_query_respects_threshold_and_limit() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let ctx = pipeline
        .build_context("what is the plan", &SearchScope::general(), 2, 0.3)
        .await;
    assert_eq!(contents(&ctx), ["bob regatta results", "alice sailing plan"]);

    let strict = pipeline
        .build_context("what is the plan", &SearchScope::general(), 5, 0.99)
        .await;
    assert!(strict.is_empty());
    assert_eq!(strict.confidence_score, 0.0);
}

#[tokio::test]
async fn blank_query_is_empty_not_an_error() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let ctx = pipeline
        .build_context("  \n", &SearchScope::owner("alice"), 5, 0.3)
        .await;
    assert!(ctx.is_empty());
    assert_eq!(ctx.query_tier, Some(EmbeddingTier::Empty));
}

#[tokio::test]
async fn context_set_serializes_for_prompt_construction() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let ctx = pipeline
        .build_context("what is the plan", &SearchScope::owner("alice"), 5, 0.3)
        .await;
    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["documents"].as_array().unwrap().len(), ctx.len());
    assert!(json["confidence_score"].as_f64().unwrap() > 0.0);
}
