//! # TideKV - An In-Memory Key-Value Server
//!
//! TideKV is a Redis-compatible, in-memory key-value server written in Rust.
//! Clients talk RESP over TCP; keys can carry a time to live, a full store
//! evicts according to a runtime-switchable policy, and every mutation is
//! appended to a log that is replayed on restart.
//!
//! ## Features
//!
//! - **Redis-Compatible**: RESP framing, works with `redis-cli`
//! - **Two-Level Locking**: a structure lock over the key map and one lock
//!   per entry, so traffic on different keys proceeds concurrently
//! - **Lazy TTL**: expired keys disappear the first time they are observed
//! - **Eviction**: `none`, `allkeys-random` or `volatile-lru`, switchable
//!   with `CONFIG SET eviction-policy`
//! - **Append-Only Log**: mutations are written as RESP request frames and
//!   replayed at startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TideKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                     ┌──────▼──────┐    ┌──────▼──────┐    ┌───────────┐ │
//! │                     │ RESP Parser │    │  Command    │───>│ Append-   │ │
//! │                     └─────────────┘    │  Executor   │    │ Only Log  │ │
//! │                                        └──────┬──────┘    └─────┬─────┘ │
//! │                                               ▼                 │       │
//! │                                        ┌─────────────┐          │       │
//! │                                        │    Store    │<─────────┘       │
//! │                                        └─────────────┘   replay at boot │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use tidekv::commands::{CommandExecutor, CommandHandler};
//! use tidekv::connection::{handle_connection, ConnectionStats, DEFAULT_IDLE_TIMEOUT};
//! use tidekv::persistence::{replay, AppendOnlyLog};
//! use tidekv::storage::{EvictionPolicy, Store};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::new(EvictionPolicy::AllKeysRandom, 1000));
//!     let path = Path::new("aof/tidekv.aof");
//!
//!     replay(path, Arc::clone(&store))?;
//!     let log = Arc::new(AppendOnlyLog::open(path)?);
//!
//!     let handler = CommandHandler::new(CommandExecutor::new(store, Some(log)));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler.clone(),
//!             DEFAULT_IDLE_TIMEOUT,
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `SET key value`
//! - `GET key`
//! - `DEL key`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `CONFIG SET eviction-policy <policy>`
//! - `CONFIG GET eviction-policy | max-entries`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP protocol parser and types
//! - [`storage`]: the key space, lazy expiry and eviction
//! - [`commands`]: dispatch, reply shaping and the mutation path
//! - [`persistence`]: the append-only log and its replay
//! - [`connection`]: client connection management
//! - [`config`]: command line and config file

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandExecutor, CommandHandler};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{EvictionPolicy, Store};

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
