//! Durability: the append-only log and its startup replay.
//!
//! ```text
//!   live:    CommandExecutor ──mutation ok──> AppendOnlyLog::append ──> file
//!   startup: file ──RespParser──> CommandHandler (replay mode) ──> Store
//! ```
//!
//! Appends are best effort. A failed append is logged and the in-memory
//! mutation stands.

pub mod aof;
pub mod replay;

pub use aof::AppendOnlyLog;
pub use replay::{replay, ReplayStats};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the append-only log.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to open append-only log {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read append-only log {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append to log: {0}")]
    Append(#[source] std::io::Error),
}
