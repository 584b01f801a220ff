use crate::caller::{CallerResolver, StackResolver};
use crate::entry::Entry;
use crate::hook::{Hook, HookError};
use crate::level::Level;
use std::fmt;
use std::sync::Arc;

/// Field written by [`CallerHook`] unless configured otherwise.
pub const DEFAULT_FIELD: &str = "source";

/// Starting depth handed to the resolver: its own frame and
/// [`CallerHook::fire`]. Every frame above that belongs to this crate and is
/// stepped over by the resolver.
pub const DEFAULT_SKIP: usize = 2;

/// Renders `(file, function, line)` into the attribution field.
pub type SourceFormatter = Arc<dyn Fn(&str, &str, u32) -> String + Send + Sync>;

/// Writes the originating call site of an entry into a single field.
///
/// The entry's explicit call site wins; the resolver is only consulted for
/// entries emitted without one.
#[derive(Clone)]
pub struct CallerHook {
    field: String,
    skip: usize,
    levels: Vec<Level>,
    formatter: SourceFormatter,
    resolver: Arc<dyn CallerResolver>,
}

impl CallerHook {
    /// Hook firing on `levels`, or on every level when `levels` is empty.
    pub fn new(levels: &[Level]) -> Self {
        let levels = if levels.is_empty() {
            Level::ALL.to_vec()
        } else {
            levels.to_vec()
        };
        CallerHook {
            field: DEFAULT_FIELD.to_string(),
            skip: DEFAULT_SKIP,
            levels,
            formatter: Arc::new(|file, _function, line| format!("{}:{}", file, line)),
            resolver: Arc::new(StackResolver::default()),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str, &str, u32) -> String + Send + Sync + 'static,
    {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn CallerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Default for CallerHook {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl fmt::Debug for CallerHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerHook")
            .field("field", &self.field)
            .field("skip", &self.skip)
            .field("levels", &self.levels)
            .finish()
    }
}

impl Hook for CallerHook {
    fn levels(&self) -> &[Level] {
        &self.levels
    }

    fn fire(&self, entry: &mut Entry) -> Result<(), HookError> {
        let frame = match &entry.caller {
            Some(frame) => frame.clone(),
            None => self.resolver.resolve(self.skip),
        };
        let value = (self.formatter)(&frame.file, &frame.function, frame.line);
        entry.fields.insert(self.field.clone(), value);
        Ok(())
    }
}
