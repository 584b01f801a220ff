use crate::entry::Entry;
use crate::level::Level;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Finished entry handed to the network sinks.
///
/// `line` is the exact text written by the logger's formatter; sinks that
/// forward formatted output (syslog) use it verbatim, structured sinks
/// (error tracking) read the other fields.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: Map<String, Value>,
    pub line: String,
}

impl LogRecord {
    pub fn from_entry(entry: &Entry, line: String) -> Self {
        let fields = entry
            .fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect();
        LogRecord {
            timestamp: entry.time,
            level: entry.level,
            message: entry.message.clone(),
            fields,
            line,
        }
    }
}
