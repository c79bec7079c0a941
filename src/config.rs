//! Server configuration.
//!
//! Settings come from two places:
//!
//! - the command line (`Cli`): bind address, config file location and
//!   overrides for the log path and idle timeout
//! - a TOML file (`FileConfig`), `config.toml` by default:
//!
//! ```toml
//! eviction_policy = "allkeys-random"   # none | allkeys-random | volatile-lru
//! max_entries = 1000
//! aof_path = "aof/tidekv.aof"           # optional
//! idle_timeout_secs = 600               # optional
//! ```
//!
//! A missing or unreadable file is not fatal: the server logs a warning and
//! starts with defaults. Command line values win over file values.

use crate::storage::EvictionPolicy;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_ENTRIES: u64 = 100;
pub const DEFAULT_AOF_PATH: &str = "aof/tidekv.aof";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Command line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tidekv",
    version,
    about = "An in-memory key-value server speaking RESP, with TTLs, eviction and an append-only log"
)]
pub struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 6379)]
    pub port: u16,

    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Append-only log path (overrides `aof_path` from the config file)
    #[arg(long)]
    pub aof: Option<PathBuf>,

    /// Seconds a connection may stay idle before it is closed
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,
}

/// Contents of the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub eviction_policy: Option<String>,
    pub max_entries: Option<u64>,
    pub aof_path: Option<PathBuf>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings the server runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub eviction_policy: EvictionPolicy,
    pub max_entries: u64,
    pub aof_path: PathBuf,
    pub idle_timeout: Duration,
}

impl ServerConfig {
    /// Reads the config file named by `cli` and merges it with the command
    /// line. Never fails; problems with the file are logged and defaults used.
    pub fn load(cli: &Cli) -> Self {
        let file = match FileConfig::from_path(&cli.config) {
            Ok(file) => {
                info!(path = %cli.config.display(), "loaded config file");
                file
            }
            Err(e) => {
                warn!(error = %e, "using default configuration");
                FileConfig::default()
            }
        };
        Self::resolve(cli, file)
    }

    /// Merges command line arguments over file settings over defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Self {
        let eviction_policy = match file.eviction_policy.as_deref() {
            None => EvictionPolicy::default(),
            Some(name) => name.parse::<EvictionPolicy>().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to eviction policy none");
                EvictionPolicy::default()
            }),
        };

        let idle_secs = cli
            .idle_timeout
            .or(file.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);

        Self {
            host: cli.host.clone(),
            port: cli.port,
            eviction_policy,
            max_entries: file.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
            aof_path: cli
                .aof
                .clone()
                .or(file.aof_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AOF_PATH)),
            idle_timeout: Duration::from_secs(idle_secs),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
