use crate::entry::Entry;
use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Keys written by the formatters themselves. Entry fields with the same name
/// are emitted as `fields.<key>`.
pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "msg";
pub const TIME_KEY: &str = "time";

/// Error returned when an entry cannot be rendered.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to serialize entry: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns an [`Entry`] into one output line (without the trailing newline).
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &Entry) -> Result<String, FormatError>;
}

/// One JSON object per entry: `level`, `msg`, `time`, then every field in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    /// Leave `<`, `>` and `&` unescaped in string values.
    pub disable_html_escape: bool,
    pub pretty_print: bool,
    /// `chrono` format string for `time`; RFC 3339 when `None`.
    pub timestamp_format: Option<String>,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_html_escape(mut self) -> Self {
        self.disable_html_escape = true;
        self
    }
}

struct JsonLine<'a> {
    entry: &'a Entry,
    time: String,
}

impl Serialize for JsonLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entry.fields.len() + 3))?;
        map.serialize_entry(LEVEL_KEY, self.entry.level.as_str())?;
        map.serialize_entry(MESSAGE_KEY, &self.entry.message)?;
        map.serialize_entry(TIME_KEY, &self.time)?;
        for (key, value) in self.entry.fields.iter() {
            let key = clash_safe_key(key);
            map.serialize_entry(key.as_ref(), &value.to_json())?;
        }
        map.end()
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &Entry) -> Result<String, FormatError> {
        let line = JsonLine {
            entry,
            time: format_time(entry, self.timestamp_format.as_deref()),
        };
        let out = if self.pretty_print {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        if self.disable_html_escape {
            Ok(out)
        } else {
            // These characters can only appear inside JSON strings.
            Ok(out
                .replace('&', "\\u0026")
                .replace('<', "\\u003c")
                .replace('>', "\\u003e"))
        }
    }
}

/// `key=value` pairs on one line, in the same order as [`JsonFormatter`].
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    pub timestamp_format: Option<String>,
    pub disable_timestamp: bool,
}

impl Formatter for TextFormatter {
    fn format(&self, entry: &Entry) -> Result<String, FormatError> {
        let mut parts = Vec::with_capacity(entry.fields.len() + 3);
        if !self.disable_timestamp {
            let time = format_time(entry, self.timestamp_format.as_deref());
            parts.push(format!("{}={}", TIME_KEY, quote_if_needed(&time)));
        }
        parts.push(format!("{}={}", LEVEL_KEY, entry.level.as_str()));
        parts.push(format!("{}={}", MESSAGE_KEY, quote_if_needed(&entry.message)));
        for (key, value) in entry.fields.iter() {
            let text = match value.to_json() {
                Value::String(s) => s,
                other => other.to_string(),
            };
            parts.push(format!("{}={}", clash_safe_key(key), quote_if_needed(&text)));
        }
        Ok(parts.join(" "))
    }
}

fn clash_safe_key(key: &str) -> std::borrow::Cow<'_, str> {
    match key {
        LEVEL_KEY | MESSAGE_KEY | TIME_KEY => format!("fields.{}", key).into(),
        _ => key.into(),
    }
}

fn format_time(entry: &Entry, format: Option<&str>) -> String {
    match format {
        Some(fmt) => entry.time.format(fmt).to_string(),
        None => entry.time.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

fn quote_if_needed(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+' | ':'));
    if plain {
        text.to_string()
    } else {
        format!("{:?}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use chrono::{TimeZone, Utc};

    fn entry() -> Entry {
        let mut entry = Entry::new(Level::Info, "hello <world>")
            .with_field("requestId", "abc")
            .with_field("level", "shadow")
            .with_field("count", 3);
        entry.time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        entry
    }

    #[test]
    fn json_line_has_fixed_keys_first_and_renames_clashes() {
        let line = JsonFormatter::new().without_html_escape().format(&entry()).unwrap();
        assert_eq!(
            line,
            r#"{"level":"info","msg":"hello <world>","time":"2024-05-01T12:00:00Z","requestId":"abc","fields.level":"shadow","count":3}"#
        );
    }

    #[test]
    fn json_escapes_html_unless_disabled() {
        let line = JsonFormatter::new().format(&entry()).unwrap();
        assert!(line.contains(r#""msg":"hello \u003cworld\u003e""#), "{}", line);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["msg"], "hello <world>");
    }

    #[test]
    fn text_line_quotes_values_with_spaces() {
        let formatter = TextFormatter {
            disable_timestamp: true,
            ..TextFormatter::default()
        };
        let line = formatter.format(&entry()).unwrap();
        assert_eq!(
            line,
            r#"level=info msg="hello <world>" requestId=abc fields.level=shadow count=3"#
        );
    }
}
