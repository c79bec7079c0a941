//! Command Handler Module
//!
//! Turns parsed RESP requests into calls on the `CommandExecutor` and shapes
//! the results into RESP replies.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `SET key value` - Set a key (clears any expiry)
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `EXPIRE key seconds` - Set expiry (`1`); `-1` if absent, `-2` if already
//!   expired. `seconds <= 0` expires the key immediately
//! - `TTL key` - Remaining TTL in seconds
//! - `CONFIG SET eviction-policy <policy>` - Swap the eviction policy
//! - `CONFIG GET eviction-policy | max-entries` - Read a setting
//!
//! Arity is strict. Argument errors become error replies; the connection is
//! never closed because of them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                          CommandExecutor ──> Store, AOF     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::CommandExecutor;
use crate::protocol::RespValue;
use crate::storage::{EvictionPolicy, ExpireOutcome, Lookup, Ttl};
use bytes::Bytes;
use std::time::Instant;
use tracing::debug;

const CONFIG_USAGE: &str = "ERR usage: CONFIG SET eviction-policy <policy>";

/// Handles Redis commands by dispatching them to the executor.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    executor: CommandExecutor,
}

impl CommandHandler {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Executes a command and returns the response.
    ///
    /// # Arguments
    ///
    /// * `command` - The parsed RESP value (should be a non-empty array)
    ///
    /// # Returns
    ///
    /// The RESP response to send back to the client.
    pub fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) => args,
            _ => return RespValue::error("ERR invalid command format"),
        };

        if args.is_empty() {
            return RespValue::error("ERR empty command");
        }

        let cmd_name = match args[0].as_bytes() {
            Some(name) => String::from_utf8_lossy(name).to_ascii_uppercase(),
            None => return RespValue::error("ERR invalid command name"),
        };

        let started = Instant::now();
        let response = self.dispatch(&cmd_name, &args[1..]);

        if !self.executor.is_replaying() {
            debug!(
                command = %cmd_name,
                outcome = outcome(&response),
                latency_us = started.elapsed().as_micros() as u64,
                "command executed"
            );
        }

        response
    }

    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            "PING" => self.cmd_ping(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),
            "CONFIG" => self.cmd_config(args),
            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    fn get_bytes(&self, value: &RespValue) -> Option<Bytes> {
        match value {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        }
    }

    fn get_integer(&self, value: &RespValue) -> Option<i64> {
        match value {
            RespValue::Integer(n) => Some(*n),
            other => other
                .as_bytes()
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse().ok()),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [message] => match self.get_bytes(message) {
                Some(msg) => RespValue::bulk_string(msg),
                None => RespValue::error("ERR invalid message"),
            },
            _ => wrong_arity("PING"),
        }
    }

    /// SET key value
    fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("SET");
        }

        let key = match self.get_bytes(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let value = match self.get_bytes(&args[1]) {
            Some(v) => v,
            None => return RespValue::error("ERR invalid value"),
        };

        self.executor.set(key, value);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_arity("GET");
        }

        let key = match self.get_bytes(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        match self.executor.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// DEL key
    fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_arity("DEL");
        }

        let key = match self.get_bytes(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        RespValue::integer(self.executor.del(&key) as i64)
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("EXPIRE");
        }

        let key = match self.get_bytes(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let seconds = match self.get_integer(&args[1]) {
            Some(s) => s,
            None => return RespValue::error("ERR value is not an integer or out of range"),
        };

        match self.executor.expire(&key, seconds) {
            ExpireOutcome::Set => RespValue::integer(1),
            ExpireOutcome::Missing => RespValue::integer(-1),
            ExpireOutcome::Expired { .. } => RespValue::integer(-2),
        }
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return wrong_arity("TTL");
        }

        let key = match self.get_bytes(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        match self.executor.ttl(&key) {
            Lookup::Found(Ttl::Remaining(secs)) => RespValue::integer(secs as i64),
            Lookup::Found(Ttl::Persistent) => RespValue::integer(-1),
            Lookup::Missing | Lookup::Expired { .. } => RespValue::integer(-2),
        }
    }

    /// CONFIG SET eviction-policy <policy> | CONFIG GET <parameter>
    fn cmd_config(&self, args: &[RespValue]) -> RespValue {
        let words: Vec<String> = match args
            .iter()
            .map(|a| a.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()))
            .collect::<Option<Vec<_>>>()
        {
            Some(words) => words,
            None => return RespValue::error(CONFIG_USAGE),
        };

        match words.as_slice() {
            [sub, param, policy]
                if sub.eq_ignore_ascii_case("SET")
                    && param.eq_ignore_ascii_case("eviction-policy") =>
            {
                match policy.parse::<EvictionPolicy>() {
                    Ok(policy) => {
                        self.executor.set_eviction_policy(policy);
                        RespValue::ok()
                    }
                    Err(_) => RespValue::error("ERR invalid eviction policy"),
                }
            }
            [sub, param] if sub.eq_ignore_ascii_case("GET") => {
                let param = param.to_ascii_lowercase();
                let store = self.executor.store();
                let value = match param.as_str() {
                    "eviction-policy" => store.eviction_policy().to_string(),
                    "max-entries" => store.max_entries().to_string(),
                    _ => return RespValue::array(vec![]),
                };
                RespValue::array(vec![
                    RespValue::bulk_string(Bytes::from(param)),
                    RespValue::bulk_string(Bytes::from(value)),
                ])
            }
            _ => RespValue::error(CONFIG_USAGE),
        }
    }
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

fn outcome(response: &RespValue) -> &'static str {
    match response {
        RespValue::Error(_) => "error",
        RespValue::Null => "nil",
        _ => "ok",
    }
}
