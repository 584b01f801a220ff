use serde_json::{json, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Snapshot of a structured error and its cause chain.
///
/// The chain is captured eagerly (outermost error first) so the value is
/// `Clone + Send + Sync` and serializes identically every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    chain: Vec<String>,
    backtrace: Option<String>,
}

impl ErrorValue {
    /// Capture the `Display` of `err` and of every `source()` below it.
    pub fn new(err: &(dyn Error + 'static)) -> Self {
        let mut chain = vec![err.to_string()];
        let mut cause = err.source();
        while let Some(inner) = cause {
            chain.push(inner.to_string());
            cause = inner.source();
        }
        ErrorValue { chain, backtrace: None }
    }

    /// Like [`ErrorValue::new`], additionally capturing a backtrace of the
    /// current thread when `RUST_BACKTRACE` enables it.
    pub fn with_backtrace(err: &(dyn Error + 'static)) -> Self {
        let mut value = Self::new(err);
        let bt = Backtrace::capture();
        if bt.status() == BacktraceStatus::Captured {
            value.backtrace = Some(bt.to_string());
        }
        value
    }

    /// Build a value from an explicit chain, outermost message first.
    pub fn from_chain<I, S>(chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain: Vec<String> = chain.into_iter().map(Into::into).collect();
        if chain.is_empty() {
            chain.push(String::new());
        }
        ErrorValue { chain, backtrace: None }
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Innermost cause.
    pub fn root(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or("")
    }

    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    /// Stable JSON shape of the chain.
    ///
    /// `root` holds the innermost cause; `wrap` lists the wrapping layers
    /// outermost first. `stack` is only present on `root` when requested and
    /// a backtrace was captured.
    pub fn to_json(&self, with_trace: bool) -> Value {
        let mut root = json!({ "message": self.root() });
        if with_trace {
            if let Some(bt) = &self.backtrace {
                let stack: Vec<Value> = bt
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|l| Value::String(l.to_string()))
                    .collect();
                root["stack"] = Value::Array(stack);
            }
        }

        let wrap: Vec<Value> = self.chain[..self.chain.len() - 1]
            .iter()
            .map(|m| json!({ "message": m }))
            .collect();

        json!({ "root": root, "wrap": wrap })
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chain[0])
    }
}

/// Value attached to a log entry field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    /// Structured error, turned into [`FieldValue::Json`] by the error hook.
    Error(ErrorValue),
    Json(Value),
}

impl FieldValue {
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        FieldValue::Error(ErrorValue::new(err))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form used by the formatters.
    ///
    /// Durations are written as integer nanoseconds. Errors that did not go
    /// through the error hook are written as their outermost message.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::UInt(v) => Value::from(*v),
            FieldValue::Float(v) => Value::from(*v),
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::Duration(d) => Value::from(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
            FieldValue::Error(e) => Value::String(e.to_string()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Duration(d) => write!(f, "{:?}", d),
            FieldValue::Error(e) => write!(f, "{}", e),
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Str(v.clone())
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::UInt(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

impl From<ErrorValue> for FieldValue {
    fn from(v: ErrorValue) -> Self {
        FieldValue::Error(v)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Json(v)
    }
}

/// Insertion-ordered field map. Keys are unique; inserting an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`; values from `other` win.
    pub fn extend(&mut self, other: Fields) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
