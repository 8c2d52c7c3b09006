//! Test builders: CSV record text, events and sink polling.
//!
//! These are for readability in harnesses, not production use. They panic on
//! invalid input rather than returning `Result`.

use logtree_core::sink::VecSink;
use logtree_core::{LogEvent, LogLevel};
use std::time::Duration;

// ---------------------------------------------------------------------------
// CsvLine
// ---------------------------------------------------------------------------

/// One record in the default nine-column layout
/// (`sequence,time,level,thread,class,method,message,exception,file`).
///
/// ```rust
/// let line = CsvLine::new(7, "App.Db", "connection lost")
///     .level("Error")
///     .exception("IOException: reset")
///     .render();
/// ```
#[derive(Debug, Clone)]
pub struct CsvLine {
    sequence: u64,
    time: String,
    level: String,
    thread: String,
    class: String,
    method: String,
    message: String,
    exception: String,
    file: String,
}

impl CsvLine {
    pub fn new(sequence: u64, class: &str, message: &str) -> Self {
        Self {
            sequence,
            time: "2024/01/15 10:00:00.000".to_string(),
            level: "Info".to_string(),
            thread: "main".to_string(),
            class: class.to_string(),
            method: "Run".to_string(),
            message: message.to_string(),
            exception: String::new(),
            file: String::new(),
        }
    }

    pub fn level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn time(mut self, time: &str) -> Self {
        self.time = time.to_string();
        self
    }

    pub fn exception(mut self, exception: &str) -> Self {
        self.exception = exception.to_string();
        self
    }

    pub fn file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }

    /// The record followed by `\n`. Fields containing the delimiter or a
    /// newline are wrapped in quotes.
    pub fn render(&self) -> String {
        let fields = [
            self.sequence.to_string(),
            self.time.clone(),
            self.level.clone(),
            self.thread.clone(),
            self.class.clone(),
            self.method.clone(),
            self.message.clone(),
            self.exception.clone(),
            self.file.clone(),
        ];
        let mut line = fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(",");
        line.push('\n');
        line
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '\n']) {
        format!("\"{field}\"")
    } else {
        field.to_string()
    }
}

/// Render `count` simple records with sequence numbers `first..first+count`
/// spread over a handful of loggers.
pub fn csv_lines(first: u64, count: u64) -> String {
    const LOGGERS: &[&str] = &["App", "App.Db", "App.Http", "Worker.Queue"];
    (first..first + count)
        .map(|seq| {
            let logger = LOGGERS[(seq as usize) % LOGGERS.len()];
            CsvLine::new(seq, logger, &format!("message {seq}")).render()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub fn event(sequence: u64, logger: &str, level: LogLevel, message: &str) -> LogEvent {
    LogEvent::new(message)
        .with_sequence(sequence)
        .with_logger(logger)
        .with_level(level)
}

// ---------------------------------------------------------------------------
// Waiting on asynchronous receivers
// ---------------------------------------------------------------------------

/// Poll `sink` until it holds at least `count` events or `timeout` elapses,
/// then return everything collected.
pub async fn collect_events(sink: &VecSink, count: usize, timeout: Duration) -> Vec<LogEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    while sink.len() < count && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.take()
}

/// Wait `period` and assert nothing further arrived.
pub async fn assert_quiet(sink: &VecSink, period: Duration) {
    tokio::time::sleep(period).await;
    let late = sink.take();
    assert!(late.is_empty(), "unexpected events arrived: {late:#?}");
}
