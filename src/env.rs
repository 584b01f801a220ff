//! Environment variable names used by [`LoggerConfig::from_env`].
//!
//! These are purely helpers; the logger itself only ever sees a
//! [`LoggerConfig`] value.
//!
//! [`LoggerConfig`]: crate::config::LoggerConfig
//! [`LoggerConfig::from_env`]: crate::config::LoggerConfig::from_env

/// Minimum level name, e.g. `info`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Syslog facility name, `local0`..`local3`.
pub const LOG_FACILITY_ENV: &str = "LOG_FACILITY";

/// Free-text tag sent with syslog and error-tracking events.
pub const LOG_TAG_ENV: &str = "LOG_TAG";

/// Error-tracking DSN; empty disables the sink.
pub const LOG_SENTRY_DSN_ENV: &str = "LOG_SENTRY_DSN";

/// Syslog `host:port` reached over UDP; empty disables the sink.
pub const LOG_SYSLOG_ADDR_ENV: &str = "LOG_SYSLOG_ADDR";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
