//! Result persistence keyed by batch name and run fingerprint.
//!
//! Record locations are a pure function of `(batch_name, fingerprint)`; no
//! store ever lists a directory. A store assumes a single writing process per
//! batch name; concurrent writers on one batch name may lose records.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use memo_core::errors::{ErrorInfo, MemoError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::codec::{Codec, RunRecord};

/// Directory appended to the base path for file stores.
pub const RESULT_DIR: &str = "_res";

/// Load/store contract for run records.
pub trait ResultStore: Send + Sync {
    /// Returns whether a record for the fingerprint exists.
    fn exists(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError>;

    /// Writes a record, replacing any previous one for the same fingerprint.
    fn write(&self, batch: &str, record: &RunRecord) -> Result<(), MemoError>;

    /// Reads a record. Missing or undecodable records yield `Ok(None)`.
    fn read(&self, batch: &str, fingerprint: &str) -> Result<Option<RunRecord>, MemoError>;

    /// Removes a record, returning whether one existed.
    fn delete(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError>;

    /// Persists the ordered fingerprint list of a batch.
    fn write_ids(&self, batch: &str, ids: &[String]) -> Result<(), MemoError>;

    /// Reads the ordered fingerprint list of a batch.
    fn read_ids(&self, batch: &str) -> Result<Option<Vec<String>>, MemoError>;

    /// Location of the record on disk, for stores that have one.
    fn record_path(&self, _batch: &str, _fingerprint: &str) -> Option<PathBuf> {
        None
    }
}

/// On-disk arrangement of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLayout {
    /// One file per run: `<batch>_<fingerprint>.<ext>`.
    #[default]
    PerRun,
    /// One file per batch holding every record: `<batch>.<ext>`.
    Aggregate,
}

/// Filesystem backed store.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStore {
    dir: PathBuf,
    layout: StoreLayout,
    codec: Codec,
}

impl FileStore {
    /// Store writing directly into `dir`.
    pub fn new(dir: impl Into<PathBuf>, layout: StoreLayout, codec: Codec) -> Self {
        Self {
            dir: dir.into(),
            layout,
            codec,
        }
    }

    /// Store writing into `<base_path>/_res/`.
    pub fn under(base_path: impl AsRef<Path>, layout: StoreLayout, codec: Codec) -> Self {
        Self::new(base_path.as_ref().join(RESULT_DIR), layout, codec)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Per-run record file name.
    pub fn run_file(&self, batch: &str, fingerprint: &str) -> PathBuf {
        self.dir
            .join(format!("{batch}_{fingerprint}.{}", self.codec.extension()))
    }

    /// Whole-batch record file name.
    pub fn aggregate_file(&self, batch: &str) -> PathBuf {
        self.dir.join(format!("{batch}.{}", self.codec.extension()))
    }

    /// Fingerprint list file name.
    pub fn ids_file(&self, batch: &str) -> PathBuf {
        self.dir
            .join(format!("{batch}_ids.{}", self.codec.extension()))
    }

    fn read_run_file(&self, batch: &str, fingerprint: &str) -> Option<RunRecord> {
        let path = self.run_file(batch, fingerprint);
        let bytes = read_optional(&path)?;
        match self.codec.decode_record(&bytes, fingerprint) {
            Ok(decoded) => {
                if decoded.upgraded {
                    debug!(path = %path.display(), "rewriting record in current schema");
                    if let Err(err) = self.write_run_file(batch, &decoded.record) {
                        warn!(path = %path.display(), error = %err, "record upgrade failed");
                    }
                }
                Some(decoded.record)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring undecodable record");
                None
            }
        }
    }

    fn write_run_file(&self, batch: &str, record: &RunRecord) -> Result<(), MemoError> {
        let bytes = self.codec.encode(record)?;
        write_atomic(&self.run_file(batch, &record.id), &bytes)
    }

    /// Decodes the batch file. `None` when it does not exist; an unreadable or
    /// undecodable file is an error.
    fn load_aggregate(
        &self,
        batch: &str,
    ) -> Result<Option<(BTreeMap<String, RunRecord>, bool)>, MemoError> {
        let path = self.aggregate_file(batch);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error("store-read", &path, err)),
        };
        self.codec
            .decode_aggregate(&bytes)
            .map(Some)
            .map_err(|err| err.with_context("path", path.display().to_string()))
    }

    /// Lenient read: an unusable batch file counts as empty.
    fn read_aggregate(&self, batch: &str) -> BTreeMap<String, RunRecord> {
        match self.load_aggregate(batch) {
            Ok(Some((records, upgraded))) => {
                if upgraded {
                    let path = self.aggregate_file(batch);
                    debug!(path = %path.display(), "rewriting batch file in current schema");
                    if let Err(err) = self.write_aggregate(batch, &records) {
                        warn!(path = %path.display(), error = %err, "batch file upgrade failed");
                    }
                }
                records
            }
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(error = %err, "ignoring unusable batch file");
                BTreeMap::new()
            }
        }
    }

    /// Strict read before a rewrite, so a damaged file is never replaced by a
    /// partial one.
    fn aggregate_for_update(&self, batch: &str) -> Result<BTreeMap<String, RunRecord>, MemoError> {
        Ok(self
            .load_aggregate(batch)?
            .map(|(records, _)| records)
            .unwrap_or_default())
    }

    fn write_aggregate(
        &self,
        batch: &str,
        records: &BTreeMap<String, RunRecord>,
    ) -> Result<(), MemoError> {
        let bytes = self.codec.encode_aggregate(records)?;
        write_atomic(&self.aggregate_file(batch), &bytes)
    }
}

impl ResultStore for FileStore {
    fn exists(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError> {
        match self.layout {
            StoreLayout::PerRun => Ok(self.run_file(batch, fingerprint).is_file()),
            StoreLayout::Aggregate => Ok(self.read_aggregate(batch).contains_key(fingerprint)),
        }
    }

    fn write(&self, batch: &str, record: &RunRecord) -> Result<(), MemoError> {
        match self.layout {
            StoreLayout::PerRun => self.write_run_file(batch, record),
            StoreLayout::Aggregate => {
                let mut records = self.aggregate_for_update(batch)?;
                records.insert(record.id.clone(), record.clone());
                self.write_aggregate(batch, &records)
            }
        }
    }

    fn read(&self, batch: &str, fingerprint: &str) -> Result<Option<RunRecord>, MemoError> {
        match self.layout {
            StoreLayout::PerRun => Ok(self.read_run_file(batch, fingerprint)),
            StoreLayout::Aggregate => Ok(self.read_aggregate(batch).remove(fingerprint)),
        }
    }

    fn delete(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError> {
        match self.layout {
            StoreLayout::PerRun => {
                let path = self.run_file(batch, fingerprint);
                match fs::remove_file(&path) {
                    Ok(()) => Ok(true),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
                    Err(err) => Err(io_error("store-delete", &path, err)),
                }
            }
            StoreLayout::Aggregate => {
                let mut records = self.aggregate_for_update(batch)?;
                if records.remove(fingerprint).is_none() {
                    return Ok(false);
                }
                self.write_aggregate(batch, &records)?;
                Ok(true)
            }
        }
    }

    fn write_ids(&self, batch: &str, ids: &[String]) -> Result<(), MemoError> {
        let bytes = self.codec.encode(&ids)?;
        write_atomic(&self.ids_file(batch), &bytes)
    }

    fn read_ids(&self, batch: &str) -> Result<Option<Vec<String>>, MemoError> {
        let path = self.ids_file(batch);
        match read_optional(&path) {
            Some(bytes) => self.codec.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn record_path(&self, batch: &str, fingerprint: &str) -> Option<PathBuf> {
        Some(match self.layout {
            StoreLayout::PerRun => self.run_file(batch, fingerprint),
            StoreLayout::Aggregate => self.aggregate_file(batch),
        })
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(String, String), RunRecord>>,
    ids: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held across all batches.
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(batch: &str, fingerprint: &str) -> (String, String) {
    (batch.to_string(), fingerprint.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResultStore for MemoryStore {
    fn exists(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError> {
        Ok(lock(&self.records).contains_key(&key(batch, fingerprint)))
    }

    fn write(&self, batch: &str, record: &RunRecord) -> Result<(), MemoError> {
        lock(&self.records).insert(key(batch, &record.id), record.clone());
        Ok(())
    }

    fn read(&self, batch: &str, fingerprint: &str) -> Result<Option<RunRecord>, MemoError> {
        Ok(lock(&self.records).get(&key(batch, fingerprint)).cloned())
    }

    fn delete(&self, batch: &str, fingerprint: &str) -> Result<bool, MemoError> {
        Ok(lock(&self.records)
            .remove(&key(batch, fingerprint))
            .is_some())
    }

    fn write_ids(&self, batch: &str, ids: &[String]) -> Result<(), MemoError> {
        lock(&self.ids).insert(batch.to_string(), ids.to_vec());
        Ok(())
    }

    fn read_ids(&self, batch: &str) -> Result<Option<Vec<String>>, MemoError> {
        Ok(lock(&self.ids).get(batch).cloned())
    }
}

fn read_optional(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "record unreadable");
            None
        }
    }
}

/// Writes through a temporary file in the target directory, then renames it
/// over the destination so readers never observe a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MemoError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|err| io_error("store-mkdir", dir, err))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| io_error("store-tempfile", dir, err))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| io_error("store-write", path, err))?;
    tmp.persist(path)
        .map_err(|err| io_error("store-rename", path, err.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "record written");
    Ok(())
}

fn io_error(code: &str, path: &Path, err: io::Error) -> MemoError {
    MemoError::Store(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}
