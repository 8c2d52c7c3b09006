//! Rendering events and the logger tree for the terminal.

use logtree_core::config::{OutputConfig, OutputFormat};
use logtree_core::{LogEvent, RegistrySnapshot};
use std::fmt::Write as _;
use std::io::Write;

/// Writes visible events to `W` in the configured format.
pub struct EventPrinter<W: Write> {
    out: W,
    config: OutputConfig,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W, config: OutputConfig) -> Self {
        Self { out, config }
    }

    pub fn print(&mut self, event: &LogEvent) -> anyhow::Result<()> {
        match self.config.format {
            OutputFormat::Text => writeln!(self.out, "{}", format_text(event, &self.config.timestamp_format))?,
            OutputFormat::Jsonl => {
                serde_json::to_writer(&mut self.out, event)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    pub fn print_batch(&mut self, events: &[LogEvent]) -> anyhow::Result<()> {
        for event in events {
            self.print(event)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `time LEVEL [logger] message`, followed by the exception text (if any)
/// indented on the next lines. A timestamp format chrono rejects falls back
/// to RFC 3339.
pub fn format_text(event: &LogEvent, timestamp_format: &str) -> String {
    let mut stamp = String::new();
    if write!(stamp, "{}", event.timestamp.format(timestamp_format)).is_err() {
        stamp = event.timestamp.to_rfc3339();
    }
    let logger = if event.logger_name.is_empty() {
        "<root>"
    } else {
        event.logger_name.as_str()
    };
    let mut line = format!(
        "{} {:<5} [{}] {}",
        stamp,
        event.level,
        logger,
        event.message
    );
    if let Some(exception) = &event.exception_text {
        for exception_line in exception.lines() {
            line.push_str("\n    ");
            line.push_str(exception_line);
        }
    }
    line
}

/// Indented tree of loggers with `direct/total` event counts.
pub fn render_tree(snapshot: &RegistrySnapshot) -> String {
    let mut out = format!(
        "{} events ({} visible, min level {})\n",
        snapshot.total_events, snapshot.visible_events, snapshot.min_level
    );
    for (depth, node) in snapshot.root.walk() {
        let name = if depth == 0 { "<root>" } else { node.name.as_str() };
        let disabled = if node.enabled { "" } else { " (disabled)" };
        out.push_str(&format!(
            "{}{} {}/{}{}\n",
            "  ".repeat(depth),
            name,
            node.message_count,
            node.aggregate_count,
            disabled
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logtree_core::{LogLevel, LoggerRegistry};
    use pretty_assertions::assert_eq;

    fn event() -> LogEvent {
        let mut e = LogEvent::new("disk full")
            .with_logger("App.Io")
            .with_level(LogLevel::Error)
            .with_exception("IOException\n  at Write()");
        e.timestamp = chrono::Utc
            .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
            .single()
            .expect("valid time");
        e
    }

    #[test]
    fn text_format_includes_exception_lines() {
        let text = format_text(&event(), "%H:%M:%S");
        assert_eq!(text, "10:00:00 ERROR [App.Io] disk full\n    IOException\n      at Write()");
    }

    #[test]
    fn invalid_timestamp_format_falls_back_to_rfc3339() {
        let text = format_text(&event(), "%Q");
        assert!(text.starts_with("2024-01-01T10:00:00+00:00 ERROR [App.Io] disk full"), "{text}");
    }

    #[test]
    fn jsonl_is_one_object_per_line() {
        let mut printer = EventPrinter::new(
            Vec::new(),
            OutputConfig {
                format: OutputFormat::Jsonl,
                ..OutputConfig::default()
            },
        );
        printer.print_batch(&[event(), event()]).expect("print");
        let out = String::from_utf8(printer.into_inner()).expect("utf8");
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["level"], "error");
        assert_eq!(parsed["logger_name"], "App.Io");
    }

    #[test]
    fn tree_lists_direct_and_total_counts() {
        let mut registry = LoggerRegistry::new();
        registry.apply(LogEvent::new("a").with_logger("App"));
        registry.apply(LogEvent::new("b").with_logger("App.Io"));
        registry.set_enabled("App.Io", false);

        let tree = render_tree(&registry.snapshot());
        assert_eq!(
            tree,
            "2 events (1 visible, min level TRACE)\n<root> 0/2\n  App 1/2\n    Io 1/1 (disabled)\n"
        );
    }
}
