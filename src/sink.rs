use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogRecord`]s produced by the logger.
///
/// Implementations transport records to a concrete backend (syslog,
/// error tracking, ...). The logger calls `send` from a background task and
/// never awaits it on the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str {
        "sink"
    }

    /// Send a single log record to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The dispatcher retries with backoff up to
    ///   its configured limit and then drops the batch.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Error returned when a sink cannot be constructed or registered.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("failed to dial syslog at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("network sinks require a running Tokio runtime")]
    NoRuntime,

    #[error("sentry feature is not enabled")]
    SentryFeatureDisabled,

    #[error("failed to build sink client: {0}")]
    Client(String),
}
