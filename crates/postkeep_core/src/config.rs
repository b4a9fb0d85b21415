//! Environment-driven configuration for core callers.
//!
//! # Responsibility
//! - Resolve database location and logging settings from the environment.
//! - Keep parsing testable by accepting any key lookup function.
//!
//! # Invariants
//! - Missing `POSTKEEP_DB_PATH` means an in-memory database.
//! - Missing `POSTKEEP_LOG_DIR` means logging stays disabled.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "POSTKEEP_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "POSTKEEP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "POSTKEEP_LOG_DIR";

/// Where the backing SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

/// Resolved core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub database: DatabaseLocation,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but holds only whitespace.
    EmptyValue(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyValue(key) => write!(f, "environment variable `{key}` is set but empty"),
        }
    }
}

impl Error for ConfigError {}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match non_empty(&lookup, ENV_DB_PATH)? {
            Some(path) if path == ":memory:" => DatabaseLocation::Memory,
            Some(path) => DatabaseLocation::File(PathBuf::from(path)),
            None => DatabaseLocation::Memory,
        };
        let log_level = non_empty(&lookup, ENV_LOG_LEVEL)?
            .unwrap_or_else(|| default_log_level().to_string());
        let log_dir = non_empty(&lookup, ENV_LOG_DIR)?.map(PathBuf::from);

        Ok(Self {
            database,
            log_level,
            log_dir,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key)),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}
