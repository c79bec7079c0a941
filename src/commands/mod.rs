//! Command Module
//!
//! This module implements the command processing layer for TideKV.
//! It receives parsed RESP commands, executes them against the store,
//! records mutations in the append-only log, and returns the replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request / AOF record
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  dispatch, arity, reply shaping
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌────────────────┐
//! │ CommandExecutor │ ───> │ AppendOnlyLog  │  (skipped in replay mode)
//! └────────┬────────┘      └────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Store           │  (storage module)
//! └─────────────────┘
//! ```

pub mod executor;
pub mod handler;

pub use executor::CommandExecutor;
pub use handler::CommandHandler;
