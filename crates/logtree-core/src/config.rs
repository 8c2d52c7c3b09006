//! Configuration types for logtree.
//!
//! [`Config::load`] reads `~/.config/logtree/config.toml` (or an explicit
//! path), creating the default file if it does not yet exist, and layers
//! `LOGTREE_`-prefixed environment variables on top. [`Config::defaults`]
//! returns the built-in defaults without touching the filesystem (useful in
//! tests).

use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use crate::types::LogLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[ingest]
drain_interval_ms = 100
min_level         = "trace"

[output]
format           = "text"
timestamp_format = "%Y-%m-%d %H:%M:%S%.3f"
"#;

/// Appended to the defaults when the user's config file is first created.
const DEFAULT_RECEIVERS: &str = r#"
# One table per receiver. `logtree receivers` prints every type with a
# sample client configuration.
[[receivers]]
type = "csv-tcp"
port = 4505

# [[receivers]]
# type = "csv-file"
# path = "/var/log/app/app.csv"
# show_from_beginning = true
#
# [[receivers]]
# type = "csv-udp"
# port = 7071
#
# [[receivers]]
# type = "search"
# node_uri = "http://localhost:9200"
# index = "logstash-*"
# run_continuously = true
"#;

const ENV_PREFIX: &str = "LOGTREE";

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub receivers: Vec<ReceiverSpec>,
}

/// `[ingest]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    #[serde(default)]
    pub min_level: LogLevel,
}

fn default_drain_interval_ms() -> u64 { 100 }

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval_ms(),
            min_level: LogLevel::default(),
        }
    }
}

/// How visible events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Jsonl,
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_timestamp_format() -> String { "%Y-%m-%d %H:%M:%S%.3f".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

/// One `[[receivers]]` entry: the type identifier plus the receiver's own
/// settings, which are interpreted by the receiver factory.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ReceiverSpec {
    pub fn settings_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.settings.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load `path` (or the default location) layered on top of the built-in
    /// defaults. The default file is created if it does not exist; an
    /// explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !required && !path.exists() {
            write_default(&path)?;
        }

        let cfg = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path.as_path()).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?;
        cfg.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(cfg)
    }

    /// Parse a TOML document layered on top of the built-in defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Self = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that deserialization alone cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        let format = &self.output.timestamp_format;
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::TimestampFormat(format.clone()));
        }
        Ok(())
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.ingest.drain_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("logtree")
        .join("config.toml")
}

fn write_default(path: &Path) -> Result<(), ConfigError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}{}", DEFAULT_CONFIG.trim_start(), DEFAULT_RECEIVERS))
    };
    write().map_err(|source| ConfigError::WriteDefault {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
