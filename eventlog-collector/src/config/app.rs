//! Process bootstrap configuration.
//!
//! Read once at startup from the environment (and an optional `.env` file).
//! Everything that can change at runtime lives in `CollectorSettings` instead.

use std::path::PathBuf;

use crate::context::DEFAULT_AGENT;
use crate::domain::attr_bool;

const DEFAULT_AUTHORITY_FILE: &str = "collector.json";
const DEFAULT_SPOOL_DIR: &str = "spool";
const DEFAULT_MONITOR: &str = "localhost";
const DEFAULT_LOG_DIR: &str = "logs";

/// Startup configuration for the collector process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// JSON document standing in for the remote authority.
    pub authority_file: PathBuf,
    /// Directory holding one `<target>.jsonl` spool file per target.
    pub spool_dir: PathBuf,
    /// Selector passed to the authority when asking for targets.
    pub monitor: String,
    pub log_dir: PathBuf,
    pub agent: String,
    /// Run a single scan cycle and exit.
    pub single_pass: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            authority_file: PathBuf::from(DEFAULT_AUTHORITY_FILE),
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            monitor: DEFAULT_MONITOR.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            agent: DEFAULT_AGENT.to_string(),
            single_pass: false,
        }
    }
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let single_pass = lookup("COLLECTOR_SINGLE_PASS")
            .and_then(|v| attr_bool(&serde_json::Value::String(v)))
            .unwrap_or(false);

        Self {
            authority_file: PathBuf::from(var("COLLECTOR_AUTHORITY_FILE", DEFAULT_AUTHORITY_FILE)),
            spool_dir: PathBuf::from(var("COLLECTOR_SPOOL_DIR", DEFAULT_SPOOL_DIR)),
            monitor: var("COLLECTOR_MONITOR", DEFAULT_MONITOR),
            log_dir: PathBuf::from(var("COLLECTOR_LOG_DIR", DEFAULT_LOG_DIR)),
            agent: var("COLLECTOR_AGENT", DEFAULT_AGENT),
            single_pass,
        }
    }
}
