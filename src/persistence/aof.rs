//! Append-only command log.
//!
//! Each accepted mutation is written as one RESP request frame. The file is
//! never rewritten; on restart it is replayed front to back (see `replay`).

use crate::persistence::PersistenceError;
use crate::protocol::RespValue;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle to the append-only log file.
///
/// Appends from concurrent connections are serialized by an internal mutex,
/// and each record is written with a single `write_all`, so records never
/// interleave.
#[derive(Debug)]
pub struct AppendOnlyLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AppendOnlyLog {
    /// Opens `path` for appending, creating it and its parent directory if
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::Open {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "append-only log opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one command, e.g. `["SET", key, value]`.
    pub fn append(&self, parts: &[&[u8]]) -> Result<(), PersistenceError> {
        let record = RespValue::command(parts).serialize();

        let mut file = self.file.lock();
        file.write_all(&record).map_err(PersistenceError::Append)?;

        debug!(bytes = record.len(), "appended record");
        Ok(())
    }

    /// Flushes the log to stable storage.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        let file = self.file.lock();
        file.sync_all().map_err(PersistenceError::Append)
    }
}
