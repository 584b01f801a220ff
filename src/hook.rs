use crate::entry::Entry;
use crate::level::Level;
use std::error::Error;
use std::sync::Arc;

/// Error reported by a [`Hook`]. It never stops the entry from being
/// emitted.
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn Error + Send + Sync>),
}

/// Mutator applied to every entry at one of its levels before formatting.
pub trait Hook: Send + Sync {
    /// Levels this hook fires on.
    fn levels(&self) -> &[Level];

    /// Enrich or sanitize `entry` in place.
    fn fire(&self, entry: &mut Entry) -> Result<(), HookError>;
}

/// Hooks in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook registered for `entry.level`, in order. Failures are
    /// reported on stderr and the remaining hooks still run.
    pub fn fire(&self, entry: &mut Entry) {
        for hook in &self.hooks {
            if !hook.levels().contains(&entry.level) {
                continue;
            }
            if let Err(e) = hook.fire(entry) {
                eprintln!("Failed to fire hook: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    struct Tag(&'static str, Vec<Level>);

    impl Hook for Tag {
        fn levels(&self) -> &[Level] {
            &self.1
        }

        fn fire(&self, entry: &mut Entry) -> Result<(), HookError> {
            let seen = match entry.fields.get("order") {
                Some(FieldValue::Str(s)) => format!("{},{}", s, self.0),
                _ => self.0.to_string(),
            };
            entry.fields.insert("order", seen);
            Ok(())
        }
    }

    struct Failing;

    impl Hook for Failing {
        fn levels(&self) -> &[Level] {
            &Level::ALL
        }

        fn fire(&self, _entry: &mut Entry) -> Result<(), HookError> {
            Err(HookError::Message("boom".into()))
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut hooks = Hooks::new();
        hooks.add(Arc::new(Tag("first", Level::ALL.to_vec())));
        hooks.add(Arc::new(Failing));
        hooks.add(Arc::new(Tag("second", Level::ALL.to_vec())));

        let mut entry = Entry::new(Level::Info, "m");
        hooks.fire(&mut entry);
        assert_eq!(entry.fields.get("order"), Some(&FieldValue::from("first,second")));
    }

    #[test]
    fn hooks_only_fire_on_their_levels() {
        let mut hooks = Hooks::new();
        hooks.add(Arc::new(Tag("errors", vec![Level::Error])));

        let mut entry = Entry::new(Level::Warn, "m");
        hooks.fire(&mut entry);
        assert!(entry.fields.get("order").is_none());
    }
}
