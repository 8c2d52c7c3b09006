//! logtree-core: parsing, buffering and the logger tree.
//!
//! # Architecture
//!
//! ```text
//! Receivers ──(CsvParser)──► IngestBuffer ──(tick)──► RegistryService ──► LoggerRegistry
//!                                                           │
//!                                                           └──► subscribers (visible batches)
//! ```
//!
//! Receivers parse on their own tasks and push events into the shared
//! [`IngestBuffer`]. The [`service::RegistryService`] task is the only writer
//! of the [`LoggerRegistry`].

pub mod buffer;
pub mod config;
pub mod csv;
pub mod error;
pub mod registry;
pub mod service;
pub mod sink;
pub mod types;

pub use buffer::IngestBuffer;
pub use csv::{CsvConfig, CsvParser, FieldKind, FieldType, ParseOutcome};
pub use registry::{LoggerNode, LoggerRegistry, LoggerSnapshot, RegistrySnapshot};
pub use service::{RegistryHandle, RegistryService};
pub use sink::{EventSink, SinkSlot};
pub use types::{LogEvent, LogLevel, Properties};
