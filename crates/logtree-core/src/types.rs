//! Core types for logtree-core.
//!
//! This module defines the fundamental data structures shared across all
//! layers: the normalised [`LogEvent`], its [`LogLevel`], and the ordered
//! [`Properties`] map carried by every event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalised log event produced by a receiver and placed in the logger tree.
///
/// Events are immutable once they leave the ingestion buffer. Only
/// `sequence_nr` is filled in later, and only by the buffer when the source did
/// not supply one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Ordering key. `None` until the ingestion buffer assigns one.
    pub sequence_nr: Option<u64>,
    /// Source-provided timestamp; ingestion time if the source value was unusable.
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Dotted logger namespace, e.g. `App.Module.Class`. Empty means the root.
    pub logger_name: String,
    pub thread_name: String,
    pub message: String,
    pub exception_text: Option<String>,
    pub call_site_class: Option<String>,
    pub call_site_method: Option<String>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
    /// Free-form key/value pairs in insertion order.
    pub properties: Properties,
}

impl LogEvent {
    /// An `Info` event stamped with the current time and nothing else set.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sequence_nr: None,
            timestamp: Utc::now(),
            level: LogLevel::Info,
            logger_name: String::new(),
            thread_name: String::new(),
            message: message.into(),
            exception_text: None,
            call_site_class: None,
            call_site_method: None,
            source_file: None,
            source_line: None,
            properties: Properties::default(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_logger(mut self, logger_name: impl Into<String>) -> Self {
        self.logger_name = logger_name.into();
        self
    }

    pub fn with_sequence(mut self, sequence_nr: u64) -> Self {
        self.sequence_nr = Some(sequence_nr);
        self
    }

    pub fn with_exception(mut self, exception_text: impl Into<String>) -> Self {
        self.exception_text = Some(exception_text.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// True when `needle` (already lowercased) occurs in the message, the
    /// logger name, or any property key or value.
    pub(crate) fn contains_text(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&self.message)
            || hit(&self.logger_name)
            || self.properties.iter().any(|(k, v)| hit(k) || hit(v))
    }
}

/// Log severity level. The derived ordering is the filtering order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// Upper-case display name.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct UnknownLevel(pub String);

impl std::str::FromStr for LogLevel {
    type Err = UnknownLevel;

    /// Case-insensitive; accepts the common aliases emitted by NLog/log4net.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" | "information" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "err" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// String-to-string map that keeps insertion order for display.
///
/// Re-inserting an existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(into = "Vec<(String, String)>")]
pub struct Properties(Vec<(String, String)>);

impl Properties {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Properties> for Vec<(String, String)> {
    fn from(p: Properties) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
