use std::backtrace::Backtrace;
use std::panic::Location;

/// How many frames past the starting depth are inspected before giving up
/// on finding a frame outside the logging backend.
pub const MAX_BACKEND_FRAMES: usize = 10;

/// Source location a log call is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    /// Last two `/`-separated segments of the source path.
    pub file: String,
    /// Fully qualified function name, or `?()` when unknown.
    pub function: String,
    pub line: u32,
}

impl CallerFrame {
    /// Placeholder used whenever attribution fails.
    pub fn unknown() -> Self {
        CallerFrame {
            file: "?".to_string(),
            function: "?()".to_string(),
            line: 0,
        }
    }

    /// Frame for an explicit call-site marker. The function name is not
    /// part of a [`Location`] and starts out unknown.
    pub fn from_location(location: &Location<'_>) -> Self {
        CallerFrame {
            file: trim_path(location.file()),
            function: "?()".to_string(),
            line: location.line(),
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.file == "?"
    }

    /// `basename:line`, the value of the facade's `file` field.
    pub fn file_line(&self) -> String {
        let base = self.file.rsplit('/').next().unwrap_or(&self.file);
        format!("{}:{}", base, self.line)
    }

    /// Bare function name with `()` appended, the value of the facade's
    /// `func` field.
    pub fn short_function(&self) -> String {
        short_function(&self.function)
    }
}

/// Resolves the code location a log call originated from.
///
/// Implementations must never fail: an unresolvable frame is reported as
/// [`CallerFrame::unknown`].
pub trait CallerResolver: Send + Sync {
    /// `skip` counts frames starting at the resolver's own frame, which is
    /// depth 0.
    fn resolve(&self, skip: usize) -> CallerFrame;
}

/// Resolver that walks the current thread's stack.
///
/// Frames whose function path starts with one of the backend prefixes are
/// treated as logging-library frames and stepped over; the first frame
/// outside them is the caller.
#[derive(Debug, Clone)]
pub struct StackResolver {
    backend_prefixes: Vec<String>,
}

impl Default for StackResolver {
    fn default() -> Self {
        let backend_prefixes = [own_crate(), "std", "core", "alloc", "tracing", "tracing_core", "tracing_subscriber"]
            .iter()
            .map(|p| format!("{}::", p))
            .collect();
        StackResolver { backend_prefixes }
    }
}

impl StackResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat frames under `module_prefix` (e.g. `"my_app::log"`) as part of
    /// the logging backend. Needed whenever the facade is wrapped again.
    pub fn skip_module(mut self, module_prefix: &str) -> Self {
        let prefix = format!("{}::", module_prefix.trim_end_matches("::"));
        self.backend_prefixes.push(prefix);
        self
    }

    fn is_backend(&self, function: &str) -> bool {
        let name = function.trim_start_matches('<');
        self.backend_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Pick the caller out of an already captured frame list.
    ///
    /// Everything before the first frame of this crate belongs to the stack
    /// capture machinery and is dropped before `skip` is applied.
    pub(crate) fn select(&self, frames: &[RawFrame], skip: usize) -> CallerFrame {
        let own = format!("{}::", own_crate());
        let start = match frames
            .iter()
            .position(|f| f.function.trim_start_matches('<').starts_with(own.as_str()))
        {
            Some(idx) => idx,
            None => return CallerFrame::unknown(),
        };

        let mut idx = start + skip;
        for _ in 0..MAX_BACKEND_FRAMES {
            let frame = match frames.get(idx) {
                Some(frame) => frame,
                None => return CallerFrame::unknown(),
            };
            if !self.is_backend(&frame.function) {
                return frame.to_caller();
            }
            idx += 1;
        }
        CallerFrame::unknown()
    }
}

impl CallerResolver for StackResolver {
    fn resolve(&self, skip: usize) -> CallerFrame {
        let backtrace = Backtrace::force_capture();
        let frames = parse_frames(&backtrace.to_string());
        self.select(&frames, skip)
    }
}

/// Resolver for setups where stack capture is too costly; every call
/// resolves to [`CallerFrame::unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledResolver;

impl CallerResolver for DisabledResolver {
    fn resolve(&self, _skip: usize) -> CallerFrame {
        CallerFrame::unknown()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawFrame {
    pub function: String,
    pub file: Option<String>,
    pub line: u32,
}

impl RawFrame {
    fn to_caller(&self) -> CallerFrame {
        match &self.file {
            Some(file) => CallerFrame {
                file: trim_path(file),
                function: self.function.clone(),
                line: self.line,
            },
            None => CallerFrame {
                function: self.function.clone(),
                ..CallerFrame::unknown()
            },
        }
    }
}

/// Parse the textual form of a [`Backtrace`].
///
/// Symbol lines look like `  12: some::path` (inlined symbols omit the
/// index) and may be followed by `at path/to/file.rs:LINE:COL`.
pub(crate) fn parse_frames(text: &str) -> Vec<RawFrame> {
    let mut frames: Vec<RawFrame> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_none() {
                    let (file, lineno) = split_location(location);
                    frame.file = Some(file);
                    frame.line = lineno;
                }
            }
            continue;
        }
        let function = match line.split_once(": ") {
            Some((idx, name)) if idx.chars().all(|c| c.is_ascii_digit()) => name,
            _ => line,
        };
        frames.push(RawFrame {
            function: function.to_string(),
            file: None,
            line: 0,
        });
    }
    frames
}

fn split_location(location: &str) -> (String, u32) {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next().unwrap_or("");
    let middle = parts.next();
    let rest = parts.next();
    match (middle, rest) {
        // path:line:col
        (Some(line), Some(path)) if line.parse::<u32>().is_ok() => {
            (path.to_string(), line.parse().unwrap_or(0))
        }
        // path:line
        (Some(path), _) if last.parse::<u32>().is_ok() => {
            let path = match rest {
                Some(r) => format!("{}:{}", r, path),
                None => path.to_string(),
            };
            (path, last.parse().unwrap_or(0))
        }
        _ => (location.to_string(), 0),
    }
}

/// Keep the last two `/`-separated segments of `path`.
pub fn trim_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut seen = 0;
    for (idx, ch) in normalized.char_indices().rev() {
        if ch == '/' && idx > 0 {
            seen += 1;
            if seen >= 2 {
                return normalized[idx + 1..].to_string();
            }
        }
    }
    normalized
}

/// `a::b::Type::method::{{closure}}` becomes `method()`.
pub fn short_function(function: &str) -> String {
    let name = function
        .trim_start_matches('<')
        .rsplit("::")
        .find(|seg| !seg.is_empty() && !seg.starts_with("{{"));
    match name {
        Some(n) if n != "?()" && n != "<unknown>" => format!("{}()", n.trim_end_matches("()")),
        _ => "?()".to_string(),
    }
}

fn own_crate() -> &'static str {
    module_path!().split("::").next().unwrap_or(module_path!())
}
