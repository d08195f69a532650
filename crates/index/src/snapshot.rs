//! Content-addressed snapshot files.
//!
//! A snapshot is two files in the cache directory, both named after the
//! corpus fingerprint:
//!
//! - `index-<fingerprint>.bin` - the bincode-encoded, optionally zstd
//!   compressed index together with the key it was built under;
//! - `index-<fingerprint>.meta.json` - a human-readable [`SnapshotMeta`].
//!
//! Both are written to a temp file in the same directory and renamed into
//! place. The metadata file is renamed last, so a crash in between leaves a
//! blob without metadata, which [`SnapshotStore::load`] treats as a miss.
//! Snapshots for other fingerprints are left alone until a newer one has been
//! fully written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zstd::{decode_all, encode_all};

use crate::{IndexError, VectorIndex};

/// Bump whenever the encoded snapshot layout changes.
pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;

const PREFIX: &str = "index-";
const BLOB_SUFFIX: &str = ".bin";
const META_SUFFIX: &str = ".meta.json";

/// Compression codec for snapshot blobs.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level, 1-22.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => {
                encode_all(data, self.level).map_err(|e| IndexError::Zstd(e.to_string()))
            }
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => decode_all(data).map_err(|e| IndexError::Zstd(e.to_string())),
        }
    }
}

/// Metadata written next to every snapshot blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMeta {
    pub schema_version: u16,
    /// Corpus fingerprint the snapshot was built from.
    pub documents_hash: String,
    /// Embedding model id the vectors came from.
    pub embedding_model: String,
    pub documents_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One snapshot file on disk, for [`CacheInfo`](crate::CacheInfo).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotBlob {
    schema_version: u16,
    fingerprint: String,
    embedding_model: String,
    index: VectorIndex,
}

/// Reads and writes snapshots in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    compression: CompressionConfig,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, compression: CompressionConfig) -> Self {
        Self {
            dir: dir.into(),
            compression,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn blob_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{PREFIX}{fingerprint}{BLOB_SUFFIX}"))
    }

    pub fn meta_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{PREFIX}{fingerprint}{META_SUFFIX}"))
    }

    /// Metadata for `fingerprint`, if a readable metadata file exists.
    pub fn read_meta(&self, fingerprint: &str) -> Result<Option<SnapshotMeta>, IndexError> {
        let path = self.meta_path(fingerprint);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Whether a snapshot for `fingerprint` exists and was built with
    /// `model_id`. Does not decode the blob.
    pub fn is_valid(&self, fingerprint: &str, model_id: &str) -> bool {
        matches!(
            self.read_meta(fingerprint),
            Ok(Some(meta)) if meta_matches(&meta, fingerprint, model_id)
        ) && self.blob_path(fingerprint).exists()
    }

    /// Load the snapshot for `fingerprint` built with `model_id`.
    ///
    /// Any mismatch, missing file or undecodable blob is reported as `None`
    /// so the caller rebuilds; nothing is reused partially.
    pub fn load(
        &self,
        fingerprint: &str,
        model_id: &str,
    ) -> Result<Option<VectorIndex>, IndexError> {
        let meta = match self.read_meta(fingerprint) {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(error = %err, "snapshot_meta_unreadable");
                return Ok(None);
            }
        };
        if !meta_matches(&meta, fingerprint, model_id) {
            debug!(
                snapshot_model = %meta.embedding_model,
                active_model = %model_id,
                schema_version = meta.schema_version,
                "snapshot_key_mismatch"
            );
            return Ok(None);
        }

        let blob_path = self.blob_path(fingerprint);
        if !blob_path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&blob_path)?;
        let blob = match self.decode(&raw) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(path = %blob_path.display(), error = %err, "snapshot_decode_failed");
                return Ok(None);
            }
        };

        let consistent = blob.schema_version == SNAPSHOT_SCHEMA_VERSION
            && blob.fingerprint == meta.documents_hash
            && blob.embedding_model == meta.embedding_model
            && blob.index.len() == meta.documents_count;
        if !consistent {
            warn!(path = %blob_path.display(), "snapshot_inconsistent");
            return Ok(None);
        }
        Ok(Some(blob.index))
    }

    /// Write the snapshot for `fingerprint`, then drop snapshots for every
    /// other fingerprint.
    pub fn persist(
        &self,
        fingerprint: &str,
        model_id: &str,
        index: &VectorIndex,
    ) -> Result<SnapshotMeta, IndexError> {
        fs::create_dir_all(&self.dir)?;

        let blob = SnapshotBlob {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            fingerprint: fingerprint.to_string(),
            embedding_model: model_id.to_string(),
            index: index.clone(),
        };
        let encoded = encode_to_vec(&blob, standard())?;
        let compressed = self.compression.compress(&encoded)?;

        let meta = SnapshotMeta {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            documents_hash: fingerprint.to_string(),
            embedding_model: model_id.to_string(),
            documents_count: index.len(),
            created_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        self.write_atomic(&self.blob_path(fingerprint), &compressed)?;
        self.write_atomic(&self.meta_path(fingerprint), &meta_json)?;

        let removed = self.remove_except(Some(fingerprint))?;
        if removed > 0 {
            debug!(removed, "snapshot_gc");
        }
        Ok(meta)
    }

    /// Delete every snapshot file. Returns how many files were removed.
    pub fn remove_all(&self) -> Result<usize, IndexError> {
        self.remove_except(None)
    }

    /// Snapshot files currently on disk, sorted by path.
    pub fn files(&self) -> Result<Vec<SnapshotFile>, IndexError> {
        let mut out = Vec::new();
        for path in self.snapshot_paths()? {
            let meta = fs::metadata(&path)?;
            out.push(SnapshotFile {
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }
        Ok(out)
    }

    fn decode(&self, raw: &[u8]) -> Result<SnapshotBlob, IndexError> {
        let decompressed = self.compression.decompress(raw)?;
        let (blob, _) = decode_from_slice(&decompressed, standard())?;
        Ok(blob)
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<(), IndexError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| IndexError::Io(e.error.to_string()))?;
        Ok(())
    }

    fn remove_except(&self, keep: Option<&str>) -> Result<usize, IndexError> {
        let keep = keep.map(|fp| (self.blob_path(fp), self.meta_path(fp)));
        let mut removed = 0;
        for path in self.snapshot_paths()? {
            if keep
                .as_ref()
                .is_some_and(|(blob, meta)| &path == blob || &path == meta)
            {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }

    fn snapshot_paths(&self) -> Result<Vec<PathBuf>, IndexError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(PREFIX)
                && (name.ends_with(BLOB_SUFFIX) || name.ends_with(META_SUFFIX))
            {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn meta_matches(meta: &SnapshotMeta, fingerprint: &str, model_id: &str) -> bool {
    meta.schema_version == SNAPSHOT_SCHEMA_VERSION
        && meta.documents_hash == fingerprint
        && meta.embedding_model == model_id
}
