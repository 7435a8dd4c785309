use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keys owned by [`LogEntry`] itself; metadata never overrides them.
pub const RESERVED_KEYS: [&str; 3] = ["dt", "level", "message"];

/// Severity of a [`LogEntry`], in ascending order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Normalize a free-form severity label.
    ///
    /// The four known labels match case-insensitively; anything else
    /// (`"trace"`, `"silly"`, `"verbose"`, ...) falls back to [`LogLevel::Info`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.eq_ignore_ascii_case("debug") {
            LogLevel::Debug
        } else if label.eq_ignore_ascii_case("warn") {
            LogLevel::Warn
        } else if label.eq_ignore_ascii_case("error") {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }

    /// Classify a final HTTP status code.
    ///
    /// - `200..=399` → `Info`
    /// - `400..=499` → `Warn`
    /// - `500..` → `Error`
    /// - anything below 200 → `Warn`
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=399 => LogLevel::Info,
            500.. => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        LogLevel::from_label(level.as_str())
    }
}

/// Normalized unit of log data handed to the sink.
///
/// Metadata is serialized flattened next to `dt`, `level` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub dt: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            dt: Utc::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a single metadata field, replacing any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert_field(key, value);
        self
    }

    pub fn insert_field(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return;
        }
        self.fields.insert(key, value.into());
    }

    /// Merge a metadata source into the entry; later sources win on collision.
    pub fn merge_fields<I, K>(&mut self, source: I)
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        for (key, value) in source {
            self.insert_field(key, value);
        }
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}
