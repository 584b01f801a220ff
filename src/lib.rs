//! Structured logging facade.
//!
//! A [`Logger`] gates entries by [`Level`], runs them through an ordered
//! pipeline of [`Hook`]s (caller attribution, error normalization, or your
//! own), formats them as JSON and hands them to its output and to any
//! asynchronous [`LogSink`]s (UDP syslog, error tracking).
//!
//! ```no_run
//! use std::sync::Arc;
//! use siprtc_log::{log_fields, Logger, LoggerConfig};
//!
//! let logger = Arc::new(Logger::init(&LoggerConfig::new("info", "local0", "sip-gw")).unwrap());
//! logger.info("call established", log_fields! { "requestId" => "c-42" });
//! logger.uuid_log("Info", "c-42", "in", r#""INVITE sip:bob@example.com""#);
//! ```

pub mod caller;
pub mod caller_hook;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod env;
pub mod error_hook;
pub mod field;
pub mod formatter;
pub mod helpers;
pub mod hook;
pub mod init;
pub mod layer;
pub mod level;
pub mod logger;
pub mod noop_sink;
pub mod record;
pub mod sink;
pub mod syslog;

#[cfg(feature = "sentry")]
pub mod sentry;

pub use caller::{CallerFrame, CallerResolver, StackResolver};
pub use config::LoggerConfig;
pub use entry::Entry;
pub use field::{ErrorValue, FieldValue, Fields};
pub use hook::{Hook, HookError};
pub use level::Level;
pub use logger::{guard_critical, EntryBuilder, LogFields, Logger, LoggerError};
pub use sink::{LogSink, SinkError};

/// Build [`Fields`] from `key => value` pairs, in order.
///
/// ```
/// let fields = siprtc_log::log_fields! { "requestId" => "r-1", "attempt" => 2 };
/// assert_eq!(fields.len(), 2);
/// ```
#[macro_export]
macro_rules! log_fields {
    () => {
        $crate::field::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::field::Fields::new();
        $( fields.insert($key, $value); )+
        fields
    }};
}
