use crate::dispatch::DispatchConfig;
use crate::env::{
    env_or, LOG_FACILITY_ENV, LOG_LEVEL_ENV, LOG_SENTRY_DSN_ENV, LOG_SYSLOG_ADDR_ENV, LOG_TAG_ENV,
};
use serde::{Deserialize, Serialize};

/// Values the embedding program supplies to build a [`Logger`].
///
/// Unknown `level` names fall back to `debug` and unknown `facility` names to
/// `local0`; neither is an error.
///
/// [`Logger`]: crate::logger::Logger
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    pub facility: String,
    pub tag: String,
    /// Error-tracking DSN; empty disables the sink.
    pub sentry_dsn: String,
    /// Syslog `host:port`; empty disables the sink.
    pub syslog_addr: String,
    /// Resolve function names for the `func` field by walking the stack.
    /// Turning this off makes `func` read `?()`.
    pub resolve_functions: bool,
    pub dispatch: DispatchConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            facility: "local0".to_string(),
            tag: String::new(),
            sentry_dsn: String::new(),
            syslog_addr: String::new(),
            resolve_functions: true,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl LoggerConfig {
    pub fn new(level: impl Into<String>, facility: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            facility: facility.into(),
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from the `LOG_*` environment variables in
    /// [`crate::env`], using defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_or(LOG_LEVEL_ENV, &defaults.level),
            facility: env_or(LOG_FACILITY_ENV, &defaults.facility),
            tag: env_or(LOG_TAG_ENV, &defaults.tag),
            sentry_dsn: env_or(LOG_SENTRY_DSN_ENV, ""),
            syslog_addr: env_or(LOG_SYSLOG_ADDR_ENV, ""),
            ..defaults
        }
    }

    pub fn with_sentry_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.sentry_dsn = dsn.into();
        self
    }

    pub fn with_syslog_addr(mut self, addr: impl Into<String>) -> Self {
        self.syslog_addr = addr.into();
        self
    }

    pub(crate) fn sentry_dsn(&self) -> Option<&str> {
        Some(self.sentry_dsn.trim()).filter(|s| !s.is_empty())
    }

    pub(crate) fn syslog_addr(&self) -> Option<&str> {
        Some(self.syslog_addr.trim()).filter(|s| !s.is_empty())
    }
}
