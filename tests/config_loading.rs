use std::io::Write;
use std::path::PathBuf;

use ragctx::{ConfigLoadError, Pipeline, RagConfig, SearchScope};
use tempfile::{NamedTempFile, TempDir};

#[test]
fn full_yaml_round_trips_through_sections() {
    let yaml = r#"
version: "1.0"
name: "companion"
corpus_path: "./people"
semantic:
  dimension: 384
  pad_strategy: zero_fill
  remote:
    base_urls: ["http://embed.internal:8080"]
    preferred_models: ["nomic-embed-text"]
    embed_timeout: 10000
index:
  cache_dir: "/var/cache/ragctx"
  corpus:
    chunking:
      chunk_size: 800
      chunk_overlap: 80
search:
  threshold: 0.6
assembler:
  max_context_documents: 8
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let cfg = RagConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.name.as_deref(), Some("companion"));
    assert_eq!(cfg.semantic.dimension, 384);
    assert_eq!(cfg.semantic.remote.base_urls, ["http://embed.internal:8080"]);
    assert_eq!(cfg.semantic.remote.embed_timeout.as_millis(), 10_000);
    assert_eq!(cfg.index.cache_dir, PathBuf::from("/var/cache/ragctx"));
    assert_eq!(cfg.index.corpus.chunking.chunk_size, 800);
    assert_eq!(cfg.search.threshold, 0.6);
    assert_eq!(cfg.search.relaxed_factor, 0.8);
    assert_eq!(cfg.assembler.max_context_documents, 8);
}

#[test]
fn missing_file_and_bad_yaml_are_reported() {
    let err = RagConfig::from_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigLoadError::FileRead(_)));

    let err = RagConfig::from_yaml("version: [unterminated").unwrap_err();
    assert!(matches!(err, ConfigLoadError::YamlParse(_)));

    let err = RagConfig::from_yaml("version: \"1.0\"\nsearch:\n  relaxed_factor: 2.0\n")
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Validation(msg) if msg.contains("relaxed_factor")));
}

#[tokio::test]
async fn pipeline_from_yaml_answers_queries() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("dave.json"), r#"[{"content":"lighthouse keys are under the mat"}]"#)
        .unwrap();

    let yaml = format!(
        r#"
version: "1"
corpus_path: "{}"
semantic:
  dimension: 64
  remote:
    enabled: false
index:
  cache_dir: "{}"
"#,
        corpus.display(),
        dir.path().join("cache").display()
    );
    let cfg = RagConfig::from_yaml(&yaml).unwrap();
    let pipeline = Pipeline::new(cfg).unwrap();
    assert_eq!(pipeline.provider().model_id(), "hash-sha256@64");

    let ctx = pipeline
        .build_context(
            "lighthouse keys are under the mat",
            &SearchScope::owner("dave"),
            3,
            0.9,
        )
        .await;
    assert_eq!(ctx.len(), 1);
    assert_eq!(ctx.documents[0].document.owner.as_deref(), Some("dave"));
}
