//! Concurrent entry map with lazy expiry and capacity-bounded insertion.
//!
//! ## Locking protocol
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Store                                                        │
//! │   entries: RwLock<HashMap<Bytes, Slot>>   ◄── structure lock │
//! │                 │                                            │
//! │                 ▼                                            │
//! │   Slot = Arc<RwLock<Entry>>               ◄── entry lock     │
//! │          value / expires_at / last_accessed                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The structure lock guards insertion and removal of keys; an entry lock
//! guards the fields of one entry. Locks are always taken in that order and
//! neither is held across an `.await`.
//!
//! - Updating an existing key needs only the structure *read* lock plus the
//!   entry write lock, so writers to different keys do not block each other.
//! - Inserting a new key upgrades to the structure write lock and checks for
//!   the key again before inserting, since another writer may have inserted
//!   it in the gap.
//! - Expiry is lazy. A read that finds an expired entry reports it as gone,
//!   then removes it under the write lock, but only if the map still holds
//!   that same slot and it is still expired.

use crate::storage::eviction::{EvictionPolicy, PolicyCell};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A stored value.
///
/// Only strings exist today; new kinds become new variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
}

impl Value {
    pub fn as_bytes(&self) -> &Bytes {
        match self {
            Value::String(bytes) => bytes,
        }
    }
}

/// One stored value plus its expiry and access metadata.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Refreshed on every write and every successful GET; drives volatile-lru.
    pub last_accessed: Instant,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
            last_accessed: Instant::now(),
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    fn overwrite(&mut self, value: Value, now: Instant) {
        self.value = value;
        self.expires_at = None;
        self.last_accessed = now;
    }
}

/// The map slot that owns an entry.
pub(crate) type Slot = Arc<RwLock<Entry>>;

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key existed and was overwritten in place.
    Updated,
    /// The key was new. `evicted` names the key removed to make room, if any.
    Inserted { evicted: Option<Bytes> },
}

/// Result of a read that may observe expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    /// The key existed but its expiry had passed. `reaped` tells whether this
    /// call removed it from the map.
    Expired { reaped: bool },
}

/// Result of setting an expiry on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    Set,
    Missing,
    Expired { reaped: bool },
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Persistent,
    /// Whole seconds left, rounded down.
    Remaining(u64),
}

/// The in-memory key space.
///
/// Shared across connection tasks behind an `Arc`; all methods take `&self`.
///
/// # Example
///
/// ```
/// use tidekv::storage::{EvictionPolicy, Lookup, Store, Value};
/// use bytes::Bytes;
///
/// let store = Store::new(EvictionPolicy::NoEviction, 100);
/// store.set(Bytes::from("name"), Value::String(Bytes::from("tide")));
///
/// assert_eq!(
///     store.get(&Bytes::from("name")),
///     Lookup::Found(Value::String(Bytes::from("tide")))
/// );
/// ```
#[derive(Debug)]
pub struct Store {
    entries: RwLock<HashMap<Bytes, Slot>>,
    max_entries: u64,
    policy: PolicyCell,
}

impl Store {
    pub fn new(policy: EvictionPolicy, max_entries: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            policy: PolicyCell::new(policy),
        }
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy.load()
    }

    /// Swaps the eviction policy. Existing keys are not re-checked against
    /// the capacity bound.
    pub fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.policy.store(policy);
    }

    /// Number of keys in the map, including expired keys not yet reaped.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or overwrites `key`, clearing any expiry.
    ///
    /// A new key is admitted even when eviction finds no victim, so the store
    /// can end up holding more than `max_entries` keys.
    pub fn set(&self, key: Bytes, value: Value) -> SetOutcome {
        self.set_with(key, value, |_| {})
    }

    /// Like [`Store::set`], but calls `on_applied` with the outcome while the
    /// lock that serialized the write is still held.
    ///
    /// Two writers to the same key run their callbacks in the order their
    /// writes were applied, and an eviction and the insert that caused it are
    /// seen together.
    pub fn set_with(
        &self,
        key: Bytes,
        value: Value,
        on_applied: impl FnOnce(&SetOutcome),
    ) -> SetOutcome {
        let now = Instant::now();

        {
            let entries = self.entries.read();
            if let Some(slot) = entries.get(&key) {
                let mut entry = slot.write();
                entry.overwrite(value, now);
                on_applied(&SetOutcome::Updated);
                return SetOutcome::Updated;
            }
        }

        let mut entries = self.entries.write();

        // Double-check: another writer may have inserted the key while we
        // were waiting for the write lock.
        if let Some(slot) = entries.get(&key) {
            let mut entry = slot.write();
            entry.overwrite(value, now);
            trace!(key = ?key, "key appeared during lock upgrade, updated in place");
            on_applied(&SetOutcome::Updated);
            return SetOutcome::Updated;
        }

        let mut evicted = None;
        if entries.len() as u64 >= self.max_entries {
            let policy = self.policy.load();
            match policy.select_victim(&entries) {
                Some(victim) => {
                    if detach(&mut entries, &victim, None) {
                        debug!(victim = ?victim, policy = %policy, "evicted key");
                        evicted = Some(victim);
                    }
                }
                None => {
                    debug!(
                        policy = %policy,
                        len = entries.len(),
                        max_entries = self.max_entries,
                        "no eviction candidate, inserting over capacity"
                    );
                }
            }
        }

        let mut entry = Entry::new(value);
        entry.last_accessed = now;
        entries.insert(key, Arc::new(RwLock::new(entry)));

        let outcome = SetOutcome::Inserted { evicted };
        on_applied(&outcome);
        outcome
    }

    /// Returns the value of `key` and refreshes its access time.
    pub fn get(&self, key: &Bytes) -> Lookup<Value> {
        self.get_with(key, || {})
    }

    /// Like [`Store::get`]. `on_reaped` runs under the structure write lock
    /// if this call removed an expired key.
    pub fn get_with(&self, key: &Bytes, on_reaped: impl FnOnce()) -> Lookup<Value> {
        let now = Instant::now();

        let expired_slot = {
            let entries = self.entries.read();
            let slot = match entries.get(key) {
                Some(slot) => slot,
                None => return Lookup::Missing,
            };

            let mut entry = slot.write();
            if !entry.is_expired_at(now) {
                entry.last_accessed = now;
                return Lookup::Found(entry.value.clone());
            }
            Arc::clone(slot)
        };

        Lookup::Expired {
            reaped: self.reap(key, &expired_slot, on_reaped),
        }
    }

    /// Returns the remaining time to live of `key`. Does not count as an access.
    pub fn ttl(&self, key: &Bytes) -> Lookup<Ttl> {
        self.ttl_with(key, || {})
    }

    /// Like [`Store::ttl`], with the same `on_reaped` contract as
    /// [`Store::get_with`].
    pub fn ttl_with(&self, key: &Bytes, on_reaped: impl FnOnce()) -> Lookup<Ttl> {
        let now = Instant::now();

        let expired_slot = {
            let entries = self.entries.read();
            let slot = match entries.get(key) {
                Some(slot) => slot,
                None => return Lookup::Missing,
            };

            let expires_at = slot.read().expires_at;
            match expires_at {
                None => return Lookup::Found(Ttl::Persistent),
                Some(exp) if now < exp => {
                    return Lookup::Found(Ttl::Remaining((exp - now).as_secs()));
                }
                Some(_) => Arc::clone(slot),
            }
        };

        Lookup::Expired {
            reaped: self.reap(key, &expired_slot, on_reaped),
        }
    }

    /// Sets `key` to expire `seconds` from now.
    ///
    /// A zero or negative `seconds` puts the expiry in the past; the key is
    /// then reaped by the next read.
    pub fn expire(&self, key: &Bytes, seconds: i64) -> ExpireOutcome {
        self.expire_with(key, seconds, |_| {})
    }

    /// Like [`Store::expire`]. `on_changed` runs while the lock that
    /// serialized the change is held: the entry lock for
    /// [`ExpireOutcome::Set`], the structure write lock for a reap. It is not
    /// called when nothing changed.
    pub fn expire_with(
        &self,
        key: &Bytes,
        seconds: i64,
        on_changed: impl FnOnce(&ExpireOutcome),
    ) -> ExpireOutcome {
        let now = Instant::now();

        let expired_slot = {
            let entries = self.entries.read();
            let slot = match entries.get(key) {
                Some(slot) => slot,
                None => return ExpireOutcome::Missing,
            };

            let mut entry = slot.write();
            if !entry.is_expired_at(now) {
                entry.expires_at = Some(deadline(now, seconds));
                on_changed(&ExpireOutcome::Set);
                return ExpireOutcome::Set;
            }
            Arc::clone(slot)
        };

        let reaped = self.reap(key, &expired_slot, || {
            on_changed(&ExpireOutcome::Expired { reaped: true })
        });
        ExpireOutcome::Expired { reaped }
    }

    /// Removes `key`. Expiry is not consulted: an expired key that has not
    /// been reaped yet still counts as removed.
    pub fn remove(&self, key: &Bytes) -> bool {
        self.remove_with(key, || {})
    }

    /// Like [`Store::remove`]. `on_removed` runs under the structure write
    /// lock if a key was removed.
    pub fn remove_with(&self, key: &Bytes, on_removed: impl FnOnce()) -> bool {
        let mut entries = self.entries.write();
        let removed = detach(&mut entries, key, None);
        if removed {
            on_removed();
        }
        removed
    }

    /// Lazy-expiry removal of a slot observed as expired.
    fn reap(&self, key: &Bytes, observed: &Slot, on_reaped: impl FnOnce()) -> bool {
        let mut entries = self.entries.write();
        let still_expired = observed.read().is_expired_at(Instant::now());
        let reaped = still_expired && detach(&mut entries, key, Some(observed));
        if reaped {
            debug!(key = ?key, "reaped expired key");
            on_reaped();
        }
        reaped
    }
}

/// Removes `key` from a write-locked map.
///
/// The entry lock is taken before the mapping is dropped so no reader is
/// mid-update on the entry. With `expected`, the key is only removed if the
/// map still points at that exact slot.
fn detach(entries: &mut HashMap<Bytes, Slot>, key: &Bytes, expected: Option<&Slot>) -> bool {
    let slot = match entries.get(key) {
        Some(slot) => Arc::clone(slot),
        None => return false,
    };

    let _guard = slot.write();
    let same = match (entries.get(key), expected) {
        (Some(current), Some(expected)) => Arc::ptr_eq(current, expected),
        (Some(current), None) => Arc::ptr_eq(current, &slot),
        (None, _) => false,
    };
    if same {
        entries.remove(key);
    }
    same
}

/// `now + seconds`, clamped so that very large or very negative values do not
/// overflow `Instant`.
fn deadline(now: Instant, seconds: i64) -> Instant {
    let span = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        now.checked_add(span)
            .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
    } else {
        // Anything at or before `now` is already expired.
        now.checked_sub(span).unwrap_or(now)
    }
}
