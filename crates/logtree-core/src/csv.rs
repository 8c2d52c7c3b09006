//! CSV stream parser: turns an arbitrarily chunked byte stream into
//! [`LogEvent`]s.
//!
//! The parser is push-based: receivers hand it whatever bytes their transport
//! produced ([`CsvParser::feed`]) and it keeps every piece of per-stream state
//! itself (the partial trailing line, an open quoted field, whether the header
//! is still expected). Nothing blocks and nothing is lost at chunk boundaries.
//!
//! # Record assembly
//!
//! ```text
//! Idle ──line──► ReadingFields ──quote opened──► InQuote ──quote closed──┐
//!   ▲                 │                            │  ▲                  │
//!   │                 │ no quote open              └──┘ more lines       │
//!   └── emit ◄────────┴────────────────────────────────────────────────◄─┘
//! ```
//!
//! A record is emitted as soon as a line leaves no quote open, whether or not
//! the field count matches the schema. Mismatched records are not merged with
//! the following line; they surface as diagnostic events instead. Unquoted
//! wrapped lines therefore produce diagnostics rather than being joined.

use crate::error::FieldError;
use crate::types::{LogEvent, LogLevel};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logger name carried by diagnostic events the parser synthesises.
pub const DIAGNOSTIC_LOGGER: &str = "logtree";

/// Timestamp layouts tried after the configured one.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Semantic meaning of one CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    SequenceNr,
    TimeStamp,
    Level,
    ThreadName,
    LoggerName,
    /// Also seeds the logger name.
    CallSiteClass,
    CallSiteMethod,
    Message,
    Exception,
    /// `file` or `file:line`, optionally wrapped in parentheses.
    SourceFile,
    SourceLine,
    /// Stored in [`LogEvent::properties`] under the column label.
    Property,
}

/// One schema column: its meaning and the header label it is known by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub field: FieldKind,
    pub label: String,
}

impl FieldType {
    pub fn new(field: FieldKind, label: impl Into<String>) -> Self {
        Self {
            field,
            label: label.into(),
        }
    }
}

/// Header labels recognised during auto-detection when the configuration does
/// not say otherwise. Keys are lowercase.
static KNOWN_HEADERS: phf::Map<&'static str, FieldKind> = phf::phf_map! {
    "sequence" => FieldKind::SequenceNr,
    "seq" => FieldKind::SequenceNr,
    "time" => FieldKind::TimeStamp,
    "timestamp" => FieldKind::TimeStamp,
    "date" => FieldKind::TimeStamp,
    "level" => FieldKind::Level,
    "severity" => FieldKind::Level,
    "thread" => FieldKind::ThreadName,
    "logger" => FieldKind::LoggerName,
    "class" => FieldKind::CallSiteClass,
    "method" => FieldKind::CallSiteMethod,
    "message" => FieldKind::Message,
    "msg" => FieldKind::Message,
    "exception" => FieldKind::Exception,
    "file" => FieldKind::SourceFile,
    "line" => FieldKind::SourceLine,
};

/// Parser configuration, usually embedded as the `csv` table of a receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvConfig {
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldType>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_quote_char")]
    pub quote_char: char,
    /// chrono `strftime` layout; the default matches `yyyy/MM/dd HH:mm:ss.fff`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Treat the first line of each stream as a candidate header.
    #[serde(default)]
    pub read_header_from_stream: bool,
    /// Extra header labels, consulted before the built-in dictionary.
    #[serde(default)]
    pub known_headers: HashMap<String, FieldKind>,
}

fn default_fields() -> Vec<FieldType> {
    vec![
        FieldType::new(FieldKind::SequenceNr, "sequence"),
        FieldType::new(FieldKind::TimeStamp, "time"),
        FieldType::new(FieldKind::Level, "level"),
        FieldType::new(FieldKind::ThreadName, "thread"),
        FieldType::new(FieldKind::CallSiteClass, "class"),
        FieldType::new(FieldKind::CallSiteMethod, "method"),
        FieldType::new(FieldKind::Message, "message"),
        FieldType::new(FieldKind::Exception, "exception"),
        FieldType::new(FieldKind::SourceFile, "file"),
    ]
}
fn default_delimiter() -> char { ',' }
fn default_quote_char() -> char { '"' }
fn default_date_format() -> String { "%Y/%m/%d %H:%M:%S%.3f".to_string() }

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            delimiter: default_delimiter(),
            quote_char: default_quote_char(),
            date_format: default_date_format(),
            read_header_from_stream: false,
            known_headers: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of parsing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The record mapped cleanly.
    Event(LogEvent),
    /// The record was malformed; this `Error`-level event describes it.
    Diagnostic(LogEvent),
}

impl ParseOutcome {
    pub fn event(&self) -> &LogEvent {
        match self {
            ParseOutcome::Event(e) | ParseOutcome::Diagnostic(e) => e,
        }
    }

    pub fn into_event(self) -> LogEvent {
        match self {
            ParseOutcome::Event(e) | ParseOutcome::Diagnostic(e) => e,
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, ParseOutcome::Diagnostic(_))
    }
}

/// Flatten outcomes into the events a receiver forwards to its sink.
pub fn into_events(outcomes: Vec<ParseOutcome>) -> Vec<LogEvent> {
    outcomes.into_iter().map(ParseOutcome::into_event).collect()
}

/// Where the parser is inside the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    /// Fields are collected but the line has not ended yet.
    ReadingFields,
    /// A quoted field is open and spans into the next line.
    InQuote,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecordState {
    fields: Vec<String>,
    /// `Some` while a quoted field is open.
    quoted: Option<String>,
    /// Raw text of every line consumed for this record.
    raw: String,
}

impl RecordState {
    fn is_idle(&self) -> bool {
        self.fields.is_empty() && self.quoted.is_none() && self.raw.is_empty()
    }
}

/// Stateful CSV reader. One instance per stream (file, connection, session).
#[derive(Debug)]
pub struct CsvParser {
    config: CsvConfig,
    /// Bytes after the last newline seen by [`CsvParser::feed`].
    partial: Vec<u8>,
    record: RecordState,
    awaiting_header: bool,
}

impl CsvParser {
    pub fn new(config: CsvConfig) -> Self {
        let awaiting_header = config.read_header_from_stream;
        Self {
            config,
            partial: Vec::new(),
            record: RecordState::default(),
            awaiting_header,
        }
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// The runtime schema, which header auto-detection may have replaced.
    pub fn schema(&self) -> &[FieldType] {
        &self.config.fields
    }

    pub fn state(&self) -> ParserState {
        if self.record.quoted.is_some() {
            ParserState::InQuote
        } else if self.record.is_idle() {
            ParserState::Idle
        } else {
            ParserState::ReadingFields
        }
    }

    /// True until the first line has been offered to header detection.
    pub fn header_pending(&self) -> bool {
        self.awaiting_header
    }

    /// Feed a chunk of bytes. Complete lines are parsed; a trailing partial
    /// line is kept until the next chunk or [`CsvParser::finish`].
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ParseOutcome> {
        self.partial.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.partial[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let line = String::from_utf8_lossy(&self.partial[start..end]).into_owned();
            start = end + 1;
            if let Some(outcome) = self.push_line(&line) {
                out.push(outcome);
            }
        }
        self.partial.drain(..start);
        out
    }

    /// End of stream: parse any partial line and close an open record.
    pub fn finish(&mut self) -> Vec<ParseOutcome> {
        let mut out = Vec::new();
        if !self.partial.is_empty() {
            let line = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            if let Some(outcome) = self.push_line(&line) {
                out.push(outcome);
            }
        }
        if let Some(open) = self.record.quoted.take() {
            self.record.fields.push(open);
        }
        if let Some(outcome) = self.take_record() {
            out.push(outcome);
        }
        out
    }

    /// Parse a complete, self-contained text.
    pub fn parse_str(&mut self, text: &str) -> Vec<ParseOutcome> {
        let mut out = self.feed(text.as_bytes());
        out.extend(self.finish());
        out
    }

    /// Forget any partially read record. The schema is kept.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.record = RecordState::default();
    }

    /// Push one line (without its terminator) through the record state machine.
    pub fn push_line(&mut self, line: &str) -> Option<ParseOutcome> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let in_quote = self.record.quoted.is_some();

        if !in_quote {
            if line.is_empty() {
                return self.take_record();
            }
            if self.awaiting_header && self.auto_configure_header(line) {
                return None;
            }
        }

        let delimiter = self.config.delimiter;
        let quote = self.config.quote_char;
        let tokens: Vec<&str> = line.split(delimiter).collect();

        if !in_quote && self.is_header(&tokens) {
            tracing::trace!("skipping repeated header line");
            return None;
        }

        let rec = &mut self.record;
        if in_quote {
            // The line break itself belongs to the quoted field.
            if let Some(buf) = rec.quoted.as_mut() {
                buf.push('\n');
            }
            rec.raw.push('\n');
            if line.is_empty() {
                return None;
            }
        }
        rec.raw.push_str(line);

        for (i, token) in tokens.iter().enumerate() {
            let closed = match rec.quoted.as_mut() {
                None => {
                    match token.strip_prefix(quote) {
                        Some(rest) => match rest.strip_suffix(quote) {
                            Some(inner) => rec.fields.push(inner.to_string()),
                            None => rec.quoted = Some(rest.to_string()),
                        },
                        None => rec.fields.push((*token).to_string()),
                    }
                    false
                }
                Some(buf) => {
                    if i > 0 {
                        buf.push(delimiter);
                    }
                    match token.strip_suffix(quote) {
                        Some(inner) => {
                            buf.push_str(inner);
                            true
                        }
                        None => {
                            buf.push_str(token);
                            false
                        }
                    }
                }
            };
            if closed {
                if let Some(done) = rec.quoted.take() {
                    rec.fields.push(done);
                }
            }
        }

        if rec.quoted.is_some() {
            return None;
        }
        self.take_record()
    }

    /// Inspect `line` as a header. When at least one label is recognised the
    /// whole line becomes the runtime schema and `true` is returned.
    pub fn auto_configure_header(&mut self, line: &str) -> bool {
        self.awaiting_header = false;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return false;
        }

        let mut recognised = false;
        let fields: Vec<FieldType> = line
            .split(self.config.delimiter)
            .map(|label| match self.lookup_header(label) {
                Some(kind) => {
                    recognised = true;
                    FieldType::new(kind, label)
                }
                None => FieldType::new(FieldKind::Property, label),
            })
            .collect();

        if recognised {
            tracing::debug!(columns = fields.len(), "CSV schema taken from stream header");
            self.config.fields = fields;
        } else {
            tracing::debug!(line, "first line is not a recognised header; keeping schema");
        }
        recognised
    }

    fn lookup_header(&self, label: &str) -> Option<FieldKind> {
        if let Some(kind) = self.config.known_headers.get(label) {
            return Some(*kind);
        }
        let lower = label.trim().to_ascii_lowercase();
        KNOWN_HEADERS.get(lower.as_str()).copied()
    }

    fn is_header(&self, tokens: &[&str]) -> bool {
        let schema = &self.config.fields;
        tokens.len() == schema.len()
            && tokens.iter().zip(schema).all(|(token, f)| *token == f.label)
    }

    fn take_record(&mut self) -> Option<ParseOutcome> {
        if self.record.is_idle() {
            return None;
        }
        let record = std::mem::take(&mut self.record);
        Some(match self.map_fields(&record.fields) {
            Ok(event) => ParseOutcome::Event(event),
            Err(err) => {
                tracing::debug!(error = %err, "malformed CSV record");
                ParseOutcome::Diagnostic(self.diagnostic(&record.raw, &err))
            }
        })
    }

    fn map_fields(&self, fields: &[String]) -> Result<LogEvent, FieldError> {
        let schema = &self.config.fields;
        if fields.len() != schema.len() {
            return Err(FieldError::FieldCount {
                expected: schema.len(),
                actual: fields.len(),
            });
        }

        let mut event = LogEvent::new(String::new());
        for (column, value) in schema.iter().zip(fields) {
            match column.field {
                FieldKind::SequenceNr => {
                    let seq = value.trim().parse().map_err(|source| FieldError::SequenceNr {
                        value: value.clone(),
                        source,
                    })?;
                    event.sequence_nr = Some(seq);
                }
                FieldKind::TimeStamp => {
                    if let Some(ts) = parse_timestamp(value, &self.config.date_format) {
                        event.timestamp = ts;
                    }
                }
                FieldKind::Level => event.level = value.parse()?,
                FieldKind::ThreadName => event.thread_name = value.clone(),
                FieldKind::LoggerName => event.logger_name = value.clone(),
                FieldKind::CallSiteClass => {
                    event.call_site_class = non_empty(value);
                    event.logger_name = value.clone();
                }
                FieldKind::CallSiteMethod => event.call_site_method = non_empty(value),
                FieldKind::Message => event.message = value.clone(),
                FieldKind::Exception => event.exception_text = non_empty(value),
                FieldKind::SourceFile => {
                    let (file, line) = split_source_file(value);
                    event.source_file = file;
                    if line.is_some() {
                        event.source_line = line;
                    }
                }
                FieldKind::SourceLine => {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        let line = trimmed.parse().map_err(|source| FieldError::SourceLine {
                            value: value.clone(),
                            source,
                        })?;
                        event.source_line = Some(line);
                    }
                }
                FieldKind::Property => event.properties.insert(column.label.clone(), value.clone()),
            }
        }
        Ok(event)
    }

    fn diagnostic(&self, raw: &str, err: &FieldError) -> LogEvent {
        LogEvent::new(format!(
            "Error parsing log entry line (delimiter '{}'): {} ({})",
            self.config.delimiter, raw, err
        ))
        .with_level(LogLevel::Error)
        .with_logger(DIAGNOSTIC_LOGGER)
        .with_exception(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Split `(file:line)` into its parts.
///
/// Exactly three colon-separated parts means a drive-letter path plus a line
/// number (`C:\src\app.cs:42`). Anything else is taken as a bare file name.
pub fn split_source_file(value: &str) -> (Option<String>, Option<u32>) {
    let trimmed = value.trim_matches(|c| c == '(' || c == ')');
    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() == 3 {
        let line_text = parts[2];
        let file = &trimmed[..trimmed.len() - line_text.len() - 1];
        (non_empty(file), line_text.trim().parse().ok())
    } else {
        (non_empty(trimmed), None)
    }
}

/// Parse with the configured layout first, then the common fallbacks.
fn parse_timestamp(value: &str, format: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_str(value, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
