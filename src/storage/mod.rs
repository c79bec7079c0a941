//! Storage engine.
//!
//! - `engine`: the `Store`, its two-level locking protocol and lazy expiry
//! - `eviction`: eviction policies and victim selection
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   RwLock<HashMap<key, Arc<RwLock<Entry>>>>                  │
//! │        │                         │                          │
//! │        │ insert (full store)     │ read / write one entry   │
//! │        ▼                         ▼                          │
//! │   EvictionPolicy            value, expires_at,              │
//! │   (none | allkeys-random    last_accessed                   │
//! │    | volatile-lru)                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store is only mutated through `commands::CommandExecutor`, which is
//! also where mutations are recorded in the append-only log.

pub mod engine;
pub mod eviction;

pub use engine::{Entry, ExpireOutcome, Lookup, SetOutcome, Store, Ttl, Value};
pub use eviction::{EvictionPolicy, PolicyCell, UnknownPolicy};
