use crate::entry::Entry;
use crate::field::FieldValue;
use crate::hook::{Hook, HookError};
use crate::level::Level;

/// Field inspected by [`ErrorHook`].
pub const ERROR_FIELD: &str = "error";

/// Normalizes the `error` field of an entry.
///
/// - On `Debug`/`Info` entries an empty-string `error` is removed.
/// - On `Error` and above a structured error is replaced by its JSON form
///   (see [`ErrorValue::to_json`](crate::field::ErrorValue::to_json)).
///
/// Any other value is left alone and the hook never fails.
#[derive(Debug, Clone)]
pub struct ErrorHook {
    levels: Vec<Level>,
    with_trace: bool,
}

impl Default for ErrorHook {
    fn default() -> Self {
        ErrorHook {
            levels: vec![Level::Panic, Level::Fatal, Level::Error, Level::Info, Level::Debug],
            with_trace: true,
        }
    }
}

impl ErrorHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include the captured backtrace (if any) as `root.stack`.
    pub fn with_trace(mut self, with_trace: bool) -> Self {
        self.with_trace = with_trace;
        self
    }
}

impl Hook for ErrorHook {
    fn levels(&self) -> &[Level] {
        &self.levels
    }

    fn fire(&self, entry: &mut Entry) -> Result<(), HookError> {
        if matches!(entry.level, Level::Debug | Level::Info) {
            if let Some(FieldValue::Str(s)) = entry.fields.get(ERROR_FIELD) {
                if s.is_empty() {
                    entry.fields.remove(ERROR_FIELD);
                }
            }
            return Ok(());
        }

        if entry.level >= Level::Error {
            if let Some(FieldValue::Error(err)) = entry.fields.get(ERROR_FIELD) {
                let normalized = err.to_json(self.with_trace);
                entry.fields.insert(ERROR_FIELD, FieldValue::Json(normalized));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ErrorValue;
    use crate::hook::Hooks;
    use std::sync::Arc;

    fn fire(entry: &mut Entry) {
        let mut hooks = Hooks::new();
        hooks.add(Arc::new(ErrorHook::default()));
        hooks.fire(entry);
    }

    #[test]
    fn empty_error_is_scrubbed_on_debug_and_info() {
        for level in [Level::Debug, Level::Info] {
            let mut entry = Entry::new(level, "m").with_field("error", "");
            fire(&mut entry);
            assert!(!entry.fields.contains_key("error"), "{:?}", level);
        }
    }

    #[test]
    fn non_empty_string_error_is_kept_on_info() {
        let mut entry = Entry::new(Level::Info, "m").with_field("error", "timeout");
        fire(&mut entry);
        assert_eq!(entry.fields.get("error"), Some(&FieldValue::from("timeout")));
    }

    #[test]
    fn structured_error_is_normalized_at_error_level() {
        let err = ErrorValue::from_chain(["A", "B", "C"]);
        let mut entry = Entry::new(Level::Error, "m").with_field("error", err);
        fire(&mut entry);

        match entry.fields.get("error") {
            Some(FieldValue::Json(v)) => {
                assert_eq!(v["root"]["message"], "C");
                assert_eq!(v["wrap"].as_array().map(Vec::len), Some(2));
            }
            other => panic!("unexpected error field: {:?}", other),
        }
    }

    #[test]
    fn normalized_error_is_byte_stable() {
        let err = ErrorValue::from_chain(["A", "B", "C"]);
        let render = || {
            let mut entry = Entry::new(Level::Error, "m").with_field("error", err.clone());
            fire(&mut entry);
            serde_json::to_string(&entry.fields.get("error").map(FieldValue::to_json)).unwrap()
        };
        assert_eq!(render(), render());
        assert_eq!(
            render(),
            r#"{"root":{"message":"C"},"wrap":[{"message":"A"},{"message":"B"}]}"#
        );
    }

    #[test]
    fn other_shapes_and_missing_field_are_untouched() {
        let mut entry = Entry::new(Level::Error, "m").with_field("error", 42);
        fire(&mut entry);
        assert_eq!(entry.fields.get("error"), Some(&FieldValue::Int(42)));

        let mut entry = Entry::new(Level::Error, "m");
        fire(&mut entry);
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn warn_entries_are_not_touched() {
        let mut entry = Entry::new(Level::Warn, "m").with_field("error", "");
        fire(&mut entry);
        assert!(entry.fields.contains_key("error"));
    }
}
