//! Turning search hits into log events.

use super::backend::SearchHit;
use chrono::{DateTime, Utc};
use logtree_core::{LogEvent, LogLevel};
use serde_json::Value;

/// Logger name for events the search receiver produces itself.
pub const SEARCH_LOGGER: &str = "SearchReceiver";

#[derive(Debug, thiserror::Error)]
enum HitError {
    #[error("field {0:?} is not a string")]
    NotAString(String),
    #[error("field {field:?} is not a timestamp: {value:?}")]
    Timestamp { field: String, value: String },
    #[error("exception object has no {0:?}")]
    ExceptionField(&'static str),
}

fn text<'a>(key: &str, value: &'a Value) -> Result<&'a str, HitError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(""),
        _ => Err(HitError::NotAString(key.to_string())),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Map a hit, falling back to an error event describing why it could not be
/// mapped.
pub fn map_hit(hit: &SearchHit, timestamp_field: &str) -> LogEvent {
    try_map_hit(hit, timestamp_field).unwrap_or_else(|cause| {
        LogEvent::new("Error in search receiver")
            .with_level(LogLevel::Error)
            .with_logger(SEARCH_LOGGER)
            .with_exception(format!("document {:?}: {cause}", hit.id))
    })
}

/// The hit's own timestamp, if it carries a valid one. Events for hits without
/// it are stamped with the ingestion time, which must not move query bounds.
pub fn hit_timestamp(hit: &SearchHit, timestamp_field: &str) -> Option<DateTime<Utc>> {
    let raw = hit.source.get(timestamp_field)?.as_str()?;
    parse_timestamp(raw)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn try_map_hit(hit: &SearchHit, timestamp_field: &str) -> Result<LogEvent, HitError> {
    let mut event = LogEvent::new(String::new())
        .with_property("ID", hit.id.as_str())
        .with_property("Index", hit.index.as_str())
        .with_property("Document Type", hit.doc_type.as_str());

    for (key, value) in &hit.source {
        match key.as_str() {
            k if k == timestamp_field => {
                let raw = text(key, value)?;
                event.timestamp = parse_timestamp(raw).ok_or_else(|| HitError::Timestamp {
                    field: key.clone(),
                    value: raw.to_string(),
                })?;
            }
            "Message" | "message" => event.message = text(key, value)?.to_string(),
            "Class" => {
                let class = text(key, value)?;
                event.logger_name = class.to_string();
                event.call_site_class = non_empty(class);
            }
            "Logger" | "logger" => event.logger_name = text(key, value)?.to_string(),
            "Method" => event.call_site_method = non_empty(text(key, value)?),
            "File" => event.source_file = non_empty(text(key, value)?),
            "Thread" => event.thread_name = text(key, value)?.to_string(),
            "level" | "Level" => {
                let raw = text(key, value)?;
                match raw.parse() {
                    Ok(level) => event.level = level,
                    Err(_) => event.properties.insert(key.clone(), raw),
                }
            }
            "Exceptions" => event.exception_text = non_empty(text(key, value)?),
            "exception" => {
                let part = |name: &'static str| -> Result<String, HitError> {
                    let v = value.get(name).ok_or(HitError::ExceptionField(name))?;
                    Ok(text(name, v)?.to_string())
                };
                let class_name = part("ClassName")?;
                let message = part("Message")?;
                let stack = part("StackTraceString")?;
                event.exception_text = Some(format!("{class_name} {message}\n{stack}"));
            }
            _ => {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                event.properties.insert(key.clone(), rendered);
            }
        }
    }

    Ok(event)
}
