//! Result persistence keyed by scenario id.
//!
//! The merge contract does not depend on the backing: a JSON file and an
//! in-memory map behave the same way.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::BatchResult;

/// Load/save a whole batch.
pub trait ResultStore: Send + Sync {
    /// Load the batch. A store that has never been written yields an empty batch.
    fn load(&self) -> Result<BatchResult, StoreError>;

    fn save(&self, batch: &BatchResult) -> Result<(), StoreError>;
}

/// Pretty JSON file written atomically, with an optional JSONL sidecar
/// holding one record per line.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    jsonl_path: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            jsonl_path: None,
        }
    }

    pub fn with_jsonl(mut self, path: impl Into<PathBuf>) -> Self {
        self.jsonl_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_jsonl(&self, path: &Path, batch: &BatchResult) -> Result<(), StoreError> {
        let write_err = |e: std::io::Error| StoreError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut buf = Vec::new();
        for record in batch.records.values() {
            serde_json::to_writer(&mut buf, record).map_err(|e| StoreError::Write {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            buf.write_all(b"\n").map_err(write_err)?;
        }
        atomic_write(path, &buf).map_err(write_err)
    }
}

impl ResultStore for JsonFileStore {
    fn load(&self) -> Result<BatchResult, StoreError> {
        if !self.path.exists() {
            return Ok(BatchResult::new());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| StoreError::Read {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if data.trim().is_empty() {
            return Ok(BatchResult::new());
        }
        serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn save(&self, batch: &BatchResult) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(batch).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        atomic_write(&self.path, json.as_bytes()).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if let Some(jsonl) = &self.jsonl_path {
            self.write_jsonl(jsonl, batch)?;
        }
        tracing::debug!(
            path = %self.path.display(),
            records = batch.len(),
            "Saved batch results"
        );
        Ok(())
    }
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    batch: Mutex<BatchResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn load(&self) -> Result<BatchResult, StoreError> {
        self.batch
            .lock()
            .map(|b| b.clone())
            .map_err(|e| StoreError::Read {
                path: PathBuf::from(":memory:"),
                message: e.to_string(),
            })
    }

    fn save(&self, batch: &BatchResult) -> Result<(), StoreError> {
        let mut guard = self.batch.lock().map_err(|e| StoreError::Write {
            path: PathBuf::from(":memory:"),
            message: e.to_string(),
        })?;
        *guard = batch.clone();
        Ok(())
    }
}
