//! Error types for the core pipeline.
//!
//! None of these ever reach the registry: the parser turns a [`FieldError`]
//! into a diagnostic event before anything leaves the producer.

use crate::types::UnknownLevel;

/// Why a delimited record could not be mapped onto a [`crate::LogEvent`].
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("expected {expected} fields but found {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("invalid sequence number {value:?}: {source}")]
    SequenceNr {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid source line number {value:?}: {source}")]
    SourceLine {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error(transparent)]
    Level(#[from] UnknownLevel),
}

/// Failure to load the layered configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid [output] timestamp_format {0:?}")]
    TimestampFormat(String),

    #[error("failed to write default configuration to {}: {source}", path.display())]
    WriteDefault {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The registry service task is gone; the command could not be delivered or
/// its reply never arrived.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("registry service is not running")]
pub struct ServiceClosed;
