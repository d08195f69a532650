use std::path::Path;
use std::time::UNIX_EPOCH;

use ingest::{discover, CorpusConfig};
use sha2::{Digest, Sha256};

use crate::IndexError;

/// Hex SHA-256 over `(relative path, mtime, size)` of every eligible file under
/// `root`, in path order.
///
/// Only metadata is read, so this is cheap enough to run on every
/// `ensure_index`. A missing root hashes like an empty corpus.
pub fn corpus_fingerprint(root: &Path, cfg: &CorpusConfig) -> Result<String, IndexError> {
    let mut files = discover(root, cfg)?;
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut hasher = Sha256::new();
    for file in &files {
        let meta = std::fs::metadata(&file.path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(file.relative.as_bytes());
        hasher.update(b"\0");
        hasher.update(mtime.to_le_bytes());
        hasher.update(meta.len().to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn stable_until_a_file_changes() {
        let dir = TempDir::new().unwrap();
        let cfg = CorpusConfig::default();
        fs::write(dir.path().join("alice.json"), r#"[{"content":"hi"}]"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "plain").unwrap();

        let first = corpus_fingerprint(dir.path(), &cfg).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, corpus_fingerprint(dir.path(), &cfg).unwrap());

        fs::write(dir.path().join("notes.txt"), "plain, but longer").unwrap();
        assert_ne!(first, corpus_fingerprint(dir.path(), &cfg).unwrap());
    }

    #[test]
    fn ignores_unsupported_extensions() {
        let dir = TempDir::new().unwrap();
        let cfg = CorpusConfig::default();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let before = corpus_fingerprint(dir.path(), &cfg).unwrap();
        fs::write(dir.path().join("image.png"), [0u8; 8]).unwrap();
        assert_eq!(before, corpus_fingerprint(dir.path(), &cfg).unwrap());
    }

    #[test]
    fn missing_root_is_an_empty_corpus() {
        let dir = TempDir::new().unwrap();
        let cfg = CorpusConfig::default();
        let missing = corpus_fingerprint(&dir.path().join("nope"), &cfg).unwrap();
        let empty = corpus_fingerprint(dir.path(), &cfg).unwrap();
        assert_eq!(missing, empty);
    }
}
