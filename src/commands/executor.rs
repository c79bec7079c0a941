//! The command executor: the only code path that mutates the store.
//!
//! Each operation applies its change to the `Store` and records it in the
//! append-only log before the store releases the lock that serialized the
//! change, so the log order matches the order mutations were applied. What
//! gets recorded:
//!
//! | Operation | Record |
//! |---|---|
//! | SET | `SET key value`, preceded by `DEL victim` if the insert evicted a key |
//! | DEL | `DEL key` when a key was removed |
//! | EXPIRE | `EXPIRE key seconds` when the expiry was set |
//! | any read that reaps an expired key | `DEL key` |
//!
//! Recording eviction victims explicitly keeps replay deterministic even under
//! `allkeys-random`: by the time the replayed SET runs, the victim is already
//! gone and the store is below capacity again.
//!
//! In replay mode nothing is recorded.

use crate::persistence::AppendOnlyLog;
use crate::storage::{EvictionPolicy, ExpireOutcome, Lookup, SetOutcome, Store, Ttl, Value};
use bytes::Bytes;
use std::sync::Arc;
use tracing::error;

/// Applies commands to the store and records them for durability.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    store: Arc<Store>,
    log: Option<Arc<AppendOnlyLog>>,
    replaying: bool,
}

impl CommandExecutor {
    /// Creates a live executor. With `log = None` mutations are not persisted.
    pub fn new(store: Arc<Store>, log: Option<Arc<AppendOnlyLog>>) -> Self {
        Self {
            store,
            log,
            replaying: false,
        }
    }

    /// Creates an executor for log replay: mutations are applied but never
    /// recorded.
    pub fn replaying(store: Arc<Store>) -> Self {
        Self {
            store,
            log: None,
            replaying: true,
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// SET key value
    pub fn set(&self, key: Bytes, value: Bytes) -> SetOutcome {
        self.store
            .set_with(key.clone(), Value::String(value.clone()), |outcome| {
                if let SetOutcome::Inserted {
                    evicted: Some(victim),
                } = outcome
                {
                    self.record(&[b"DEL", victim]);
                }
                self.record(&[b"SET", &key, &value]);
            })
    }

    /// GET key. `None` covers both missing and expired keys.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        match self.store.get_with(key, || self.record_reap(key)) {
            Lookup::Found(Value::String(bytes)) => Some(bytes),
            Lookup::Missing | Lookup::Expired { .. } => None,
        }
    }

    /// DEL key. Returns whether a key was removed.
    pub fn del(&self, key: &Bytes) -> bool {
        self.store.remove_with(key, || self.record(&[b"DEL", key]))
    }

    /// EXPIRE key seconds
    pub fn expire(&self, key: &Bytes, seconds: i64) -> ExpireOutcome {
        self.store.expire_with(key, seconds, |outcome| match outcome {
            ExpireOutcome::Set => {
                let seconds = seconds.to_string();
                self.record(&[b"EXPIRE", key, seconds.as_bytes()]);
            }
            ExpireOutcome::Expired { .. } => self.record_reap(key),
            ExpireOutcome::Missing => {}
        })
    }

    /// TTL key
    pub fn ttl(&self, key: &Bytes) -> Lookup<Ttl> {
        self.store.ttl_with(key, || self.record_reap(key))
    }

    /// CONFIG SET eviction-policy. Not recorded in the log.
    pub fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.store.set_eviction_policy(policy);
    }

    fn record_reap(&self, key: &Bytes) {
        self.record(&[b"DEL", key]);
    }

    fn record(&self, parts: &[&[u8]]) {
        if self.replaying {
            return;
        }
        if let Some(log) = &self.log {
            if let Err(e) = log.append(parts) {
                // The mutation already happened; durability is best effort.
                error!(
                    error = %e,
                    command = %String::from_utf8_lossy(parts[0]),
                    "failed to append to append-only log"
                );
            }
        }
    }
}
