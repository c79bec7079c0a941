//! Startup replay of the append-only log.
//!
//! Records are decoded with the same RESP parser used for live connections and
//! dispatched through a `CommandHandler` whose executor is in replay mode, so
//! nothing replayed is appended again.
//!
//! Replay is best effort:
//!
//! - a record that fails to decode is skipped and the reader resynchronises at
//!   the next frame boundary (`\r\n*`)
//! - a record that decodes but is rejected by the dispatcher is counted and
//!   skipped
//! - a record whose declared lengths run past the end of the file is skipped
//!   if a complete record can still be decoded after it; otherwise it is a
//!   truncated tail (a crash mid-append) and ends replay
//!
//! Nothing already applied is rolled back.

use crate::commands::{CommandExecutor, CommandHandler};
use crate::persistence::PersistenceError;
use crate::protocol::RespParser;
use crate::storage::Store;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Counters describing one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records executed successfully
    pub applied: u64,
    /// Records that decoded but produced an error reply
    pub rejected: u64,
    /// Records that could not be decoded
    pub skipped: u64,
}

/// Replays the log at `path` into `store`.
///
/// A missing file is treated as an empty log.
pub fn replay(path: &Path, store: Arc<Store>) -> Result<ReplayStats, PersistenceError> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no append-only log found, starting empty");
            return Ok(ReplayStats::default());
        }
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let handler = CommandHandler::new(CommandExecutor::replaying(store));
    let stats = replay_bytes(&contents, &handler);

    info!(
        path = %path.display(),
        applied = stats.applied,
        rejected = stats.rejected,
        skipped = stats.skipped,
        "append-only log replayed"
    );
    Ok(stats)
}

fn replay_bytes(contents: &[u8], handler: &CommandHandler) -> ReplayStats {
    let mut stats = ReplayStats::default();
    let mut parser = RespParser::new();
    let mut offset = 0;

    while offset < contents.len() {
        match parser.parse(&contents[offset..]) {
            Ok(Some((command, consumed))) => {
                offset += consumed;
                let reply = handler.execute(command);
                if reply.is_error() {
                    warn!(offset, reply = %reply, "replayed record rejected");
                    stats.rejected += 1;
                } else {
                    stats.applied += 1;
                }
            }
            Ok(None) => match resync_after_incomplete(&contents[offset..]) {
                Some(next) => {
                    // A later record decodes, so this one lied about its length.
                    warn!(offset, "skipping record with an overlong length");
                    stats.skipped += 1;
                    offset += next;
                }
                None => {
                    warn!(
                        offset,
                        remaining = contents.len() - offset,
                        "truncated record at end of append-only log"
                    );
                    break;
                }
            },
            Err(e) => {
                warn!(offset, error = %e, "skipping undecodable record");
                stats.skipped += 1;
                match next_frame(&contents[offset..]) {
                    Some(next) => offset += next,
                    None => break,
                }
            }
        }
    }

    stats
}

/// For a record the parser reports as incomplete: the offset of the first
/// later frame boundary at which a whole record decodes, or `None` if the
/// record really is the unfinished tail of the log.
fn resync_after_incomplete(buf: &[u8]) -> Option<usize> {
    let mut parser = RespParser::new();
    let mut offset = 0;
    while let Some(next) = next_frame(&buf[offset..]) {
        offset += next;
        if let Ok(Some(_)) = parser.parse(&buf[offset..]) {
            return Some(offset);
        }
    }
    None
}

/// Offset of the next array header after the current position.
fn next_frame(buf: &[u8]) -> Option<usize> {
    buf.windows(3)
        .skip(1)
        .position(|w| w == b"\r\n*")
        .map(|pos| pos + 1 + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AppendOnlyLog;
    use crate::storage::{EvictionPolicy, Lookup, Value};
    use bytes::Bytes;
    use tempfile::tempdir;

    fn new_store() -> Arc<Store> {
        Arc::new(Store::new(EvictionPolicy::NoEviction, 100))
    }

    fn get(store: &Store, key: &str) -> Lookup<Value> {
        store.get(&Bytes::from(key.to_string()))
    }

    fn found(value: &str) -> Lookup<Value> {
        Lookup::Found(Value::String(Bytes::from(value.to_string())))
    }

    #[test]
    fn test_missing_file_is_empty_log() {
        let dir = tempdir().unwrap();
        let store = new_store();

        let stats = replay(&dir.path().join("absent.aof"), Arc::clone(&store)).unwrap();
        assert_eq!(stats, ReplayStats::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_replay_set_del_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tidekv.aof");
        std::fs::write(
            &path,
            b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
              *2\r\n$3\r\nDEL\r\n$1\r\na\r\n\
              *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n2\r\n",
        )
        .unwrap();
        let before = std::fs::metadata(&path).unwrap().len();

        // Keep the log open for appending during replay, as the server does.
        let _log = AppendOnlyLog::open(&path).unwrap();
        let store = new_store();
        let stats = replay(&path, Arc::clone(&store)).unwrap();

        assert_eq!(stats.applied, 3);
        assert_eq!(get(&store, "a"), found("2"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn test_replay_restores_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tidekv.aof");
        std::fs::write(
            &path,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n\
              *3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$3\r\n100\r\n",
        )
        .unwrap();

        let store = new_store();
        replay(&path, Arc::clone(&store)).unwrap();

        assert!(matches!(
            store.ttl(&Bytes::from("k")),
            Lookup::Found(crate::storage::Ttl::Remaining(secs)) if secs >= 99
        ));
    }

    #[test]
    fn test_corrupted_record_is_skipped() {
        let store = new_store();
        let handler = CommandHandler::new(CommandExecutor::replaying(Arc::clone(&store)));

        let log = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
                    *3\r\n$3\r\nSET\r\n$x\r\nb\r\n$1\r\n2\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nc\r\n$1\r\n3\r\n";
        let stats = replay_bytes(log, &handler);

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.applied, 2);
        assert_eq!(get(&store, "a"), found("1"));
        assert_eq!(get(&store, "b"), Lookup::Missing);
        assert_eq!(get(&store, "c"), found("3"));
    }

    #[test]
    fn test_rejected_record_counts() {
        let store = new_store();
        let handler = CommandHandler::new(CommandExecutor::replaying(Arc::clone(&store)));

        let log = b"*2\r\n$3\r\nSET\r\n$1\r\na\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n";
        let stats = replay_bytes(log, &handler);

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(get(&store, "b"), found("2"));
    }

    #[test]
    fn test_truncated_tail_stops_replay() {
        let store = new_store();
        let handler = CommandHandler::new(CommandExecutor::replaying(Arc::clone(&store)));

        let log = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*3\r\n$3\r\nSET\r\n$1\r\nb";
        let stats = replay_bytes(log, &handler);

        assert_eq!(stats.applied, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(get(&store, "a"), found("1"));
        assert_eq!(get(&store, "b"), Lookup::Missing);
    }

    #[test]
    fn test_overlong_length_mid_file_is_skipped() {
        let store = new_store();
        let handler = CommandHandler::new(CommandExecutor::replaying(Arc::clone(&store)));

        let log = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$900\r\n2\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nc\r\n$1\r\n3\r\n";
        let stats = replay_bytes(log, &handler);

        assert_eq!(
            stats,
            ReplayStats {
                applied: 2,
                rejected: 0,
                skipped: 1
            }
        );
        assert_eq!(get(&store, "a"), found("1"));
        assert_eq!(get(&store, "b"), Lookup::Missing);
        assert_eq!(get(&store, "c"), found("3"));
    }

    #[test]
    fn test_overlong_length_at_tail_stops_replay() {
        let store = new_store();
        let handler = CommandHandler::new(CommandExecutor::replaying(Arc::clone(&store)));

        let log = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$900\r\n2\r\n\
                    *3\r\n$3\r\nSET\r\n$1\r\nc";
        let stats = replay_bytes(log, &handler);

        assert_eq!(stats.applied, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(get(&store, "c"), Lookup::Missing);
    }

    #[test]
    fn test_next_frame() {
        assert_eq!(next_frame(b"$x\r\nb\r\n*1\r\n"), Some(7));
        assert_eq!(next_frame(b"*garbage"), None);
    }
}
