use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::blockchain::{DEFAULT_CHAIN_KEY, DEFAULT_DIFFICULTY};

/// Process settings, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub difficulty: u32,
    /// Directory for the file-backed store; `None` keeps the chain in memory.
    pub storage_dir: Option<PathBuf>,
    pub chain_key: String,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub mining_max_jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            difficulty: DEFAULT_DIFFICULTY,
            storage_dir: None,
            chain_key: DEFAULT_CHAIN_KEY.to_string(),
            rate_limit_max: 5,
            rate_limit_window_secs: 60,
            mining_max_jobs: 4,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset or unparsable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port),
            difficulty: parsed(&lookup, "DIFFICULTY", defaults.difficulty),
            storage_dir: non_empty("STORAGE_DIR").map(PathBuf::from),
            chain_key: non_empty("CHAIN_KEY").unwrap_or(defaults.chain_key),
            rate_limit_max: parsed(&lookup, "RATE_LIMIT_MAX", defaults.rate_limit_max),
            rate_limit_window_secs: parsed(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            mining_max_jobs: parsed(&lookup, "MINING_MAX_JOBS", defaults.mining_max_jobs),
        }
    }
}

fn parsed<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("CONFIG - ignoring {name}={raw:?}: not a valid value");
            default
        }),
    }
}
