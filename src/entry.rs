use crate::caller::CallerFrame;
use crate::field::{FieldValue, Fields};
use crate::level::Level;
use chrono::{DateTime, Utc};

/// A single log event on its way through the hook pipeline.
///
/// Entries are built per call, mutated in place by hooks and consumed once
/// by the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub level: Level,
    pub message: String,
    pub time: DateTime<Utc>,
    pub fields: Fields,
    /// Explicit call site, set when the origin of the call is known without
    /// walking the stack (a `#[track_caller]` location or `tracing`
    /// metadata).
    pub caller: Option<CallerFrame>,
}

impl Entry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Entry {
            level,
            message: message.into(),
            time: Utc::now(),
            fields: Fields::new(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_caller(mut self, caller: CallerFrame) -> Self {
        self.caller = Some(caller);
        self
    }
}
