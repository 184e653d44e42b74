//! Connection settings consumed by `TransactionContext`.
//!
//! # Responsibility
//! - Describe where and how a SQLite connection is opened.
//! - Parse ADO-style connection strings (`key=value;...`).
//!
//! # Invariants
//! - `path` is never empty after parsing.
//! - Unknown connection string keys are rejected, not ignored.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Special path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingDataSource,
    MalformedPair(String),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDataSource => write!(f, "connection string has no `Data Source`"),
            Self::MalformedPair(pair) => {
                write!(f, "connection string segment `{pair}` is not key=value")
            }
            Self::UnknownKey(key) => write!(f, "unknown connection string key `{key}`"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for connection string key `{key}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Options used every time the context (re)opens its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionOptions {
    /// Database file path, or `:memory:`.
    pub path: String,
    /// How long a statement waits on a locked database.
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl ConnectionOptions {
    /// Options for a database file with default timeouts and pragmas.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    /// Parses `Data Source=app.db;Busy Timeout=2000;Foreign Keys=false`.
    ///
    /// Keys are case-insensitive and surrounding whitespace is ignored.
    /// `Data Source` (alias `Filename`) is required.
    ///
    /// # Errors
    /// - `MalformedPair` for a segment without `=`.
    /// - `UnknownKey` for keys other than the ones listed above.
    /// - `InvalidValue` for non-numeric timeouts or non-boolean flags.
    pub fn from_connection_string(value: &str) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        let mut has_source = false;

        for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, raw) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedPair(segment.to_string()))?;
            let key = key.trim().to_ascii_lowercase();
            let raw = raw.trim();

            match key.as_str() {
                "data source" | "datasource" | "filename" => {
                    if raw.is_empty() {
                        return Err(ConfigError::MissingDataSource);
                    }
                    options.path = raw.to_string();
                    has_source = true;
                }
                "busy timeout" | "busytimeout" => {
                    options.busy_timeout_ms =
                        raw.parse().map_err(|_| invalid_value(&key, raw))?;
                }
                "foreign keys" | "foreignkeys" => {
                    options.foreign_keys = parse_flag(raw).ok_or_else(|| invalid_value(&key, raw))?;
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        if !has_source {
            return Err(ConfigError::MissingDataSource);
        }
        Ok(options)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn invalid_value(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
