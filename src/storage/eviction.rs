//! Eviction policies and victim selection.
//!
//! Eviction runs inline on the SET insert path, under the store write lock,
//! only when a *new* key is about to be inserted into a full store. There is
//! no background eviction.
//!
//! | Policy | Candidates | Victim |
//! |---|---|---|
//! | `none` | none | no eviction, the insert goes over capacity |
//! | `allkeys-random` | every key | uniformly random |
//! | `volatile-lru` | keys with an expiry | oldest `last_accessed` |

use crate::storage::engine::Slot;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use thiserror::Error;

/// The rule used to free a slot when the store is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Never evict; `max_entries` becomes advisory.
    #[default]
    NoEviction,
    /// Evict any key, chosen uniformly at random.
    AllKeysRandom,
    /// Evict the least recently used key among keys that carry a TTL.
    VolatileLru,
}

/// Returned when a policy name is not one of the supported policies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown eviction policy '{0}'")]
pub struct UnknownPolicy(pub String);

impl EvictionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "none",
            EvictionPolicy::AllKeysRandom => "allkeys-random",
            EvictionPolicy::VolatileLru => "volatile-lru",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            EvictionPolicy::NoEviction => 0,
            EvictionPolicy::AllKeysRandom => 1,
            EvictionPolicy::VolatileLru => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EvictionPolicy::AllKeysRandom,
            2 => EvictionPolicy::VolatileLru,
            _ => EvictionPolicy::NoEviction,
        }
    }

    /// Picks the key to evict from `entries`, or `None` if the policy has no
    /// candidate.
    ///
    /// Callers hold the store write lock, so the map cannot change underneath.
    /// Entry locks are taken for reading one at a time.
    pub(crate) fn select_victim(self, entries: &HashMap<Bytes, Slot>) -> Option<Bytes> {
        match self {
            EvictionPolicy::NoEviction => None,
            EvictionPolicy::AllKeysRandom => entries.keys().choose(&mut rand::thread_rng()).cloned(),
            EvictionPolicy::VolatileLru => {
                let mut oldest: Option<(&Bytes, Instant)> = None;
                for (key, slot) in entries {
                    let entry = slot.read();
                    if entry.expires_at.is_none() {
                        continue;
                    }
                    // Strict comparison keeps the first key seen on ties.
                    match oldest {
                        Some((_, at)) if entry.last_accessed >= at => {}
                        _ => oldest = Some((key, entry.last_accessed)),
                    }
                }
                oldest.map(|(key, _)| key.clone())
            }
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = UnknownPolicy;

    /// Case-insensitive. `noeviction` is accepted as an alias of `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// An eviction policy that can be swapped while traffic is flowing.
#[derive(Debug, Default)]
pub struct PolicyCell(AtomicU8);

impl PolicyCell {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self(AtomicU8::new(policy.to_u8()))
    }

    pub fn load(&self) -> EvictionPolicy {
        EvictionPolicy::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, policy: EvictionPolicy) {
        self.0.store(policy.to_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::{Entry, Value};
    use parking_lot::RwLock;
    use std::sync::Arc;
    use std::time::Duration;

    fn slot(last_accessed: Instant, ttl: Option<Duration>) -> Slot {
        let mut entry = Entry::new(Value::String(Bytes::from("v")));
        entry.last_accessed = last_accessed;
        entry.expires_at = ttl.map(|ttl| last_accessed + ttl);
        Arc::new(RwLock::new(entry))
    }

    #[test]
    fn test_parse_policy_names() {
        assert_eq!("none".parse(), Ok(EvictionPolicy::NoEviction));
        assert_eq!("noeviction".parse(), Ok(EvictionPolicy::NoEviction));
        assert_eq!("ALLKEYS-RANDOM".parse(), Ok(EvictionPolicy::AllKeysRandom));
        assert_eq!("volatile-lru".parse(), Ok(EvictionPolicy::VolatileLru));
        assert_eq!(
            "allkeys-lru".parse::<EvictionPolicy>(),
            Err(UnknownPolicy("allkeys-lru".to_string()))
        );
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for policy in [
            EvictionPolicy::NoEviction,
            EvictionPolicy::AllKeysRandom,
            EvictionPolicy::VolatileLru,
        ] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }

    #[test]
    fn test_policy_cell_swap() {
        let cell = PolicyCell::new(EvictionPolicy::VolatileLru);
        assert_eq!(cell.load(), EvictionPolicy::VolatileLru);
        cell.store(EvictionPolicy::AllKeysRandom);
        assert_eq!(cell.load(), EvictionPolicy::AllKeysRandom);
    }

    #[test]
    fn test_no_eviction_never_selects() {
        let mut entries = HashMap::new();
        entries.insert(Bytes::from("a"), slot(Instant::now(), None));
        assert_eq!(EvictionPolicy::NoEviction.select_victim(&entries), None);
    }

    #[test]
    fn test_random_selects_existing_key() {
        let mut entries = HashMap::new();
        for key in ["a", "b", "c"] {
            entries.insert(Bytes::from(key), slot(Instant::now(), None));
        }
        let victim = EvictionPolicy::AllKeysRandom.select_victim(&entries).unwrap();
        assert!(entries.contains_key(&victim));

        assert_eq!(EvictionPolicy::AllKeysRandom.select_victim(&HashMap::new()), None);
    }

    #[test]
    fn test_volatile_lru_picks_oldest_volatile() {
        let base = Instant::now();
        let ttl = Some(Duration::from_secs(60));
        let mut entries = HashMap::new();
        // The oldest key overall has no TTL and must never be chosen.
        entries.insert(Bytes::from("persistent"), slot(base, None));
        entries.insert(Bytes::from("old"), slot(base + Duration::from_millis(1), ttl));
        entries.insert(Bytes::from("new"), slot(base + Duration::from_millis(2), ttl));

        assert_eq!(
            EvictionPolicy::VolatileLru.select_victim(&entries),
            Some(Bytes::from("old"))
        );
    }

    #[test]
    fn test_volatile_lru_without_candidates() {
        let mut entries = HashMap::new();
        entries.insert(Bytes::from("a"), slot(Instant::now(), None));
        assert_eq!(EvictionPolicy::VolatileLru.select_victim(&entries), None);
    }
}
