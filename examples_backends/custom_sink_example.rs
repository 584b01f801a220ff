use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use siprtc_log::{
    log_fields, record::LogRecord, sink::LogSink, Level, LogFields, Logger, LoggerConfig,
};

/// Example of shipping entries to a backend this crate has no built-in sink
/// for, by implementing the `LogSink` trait directly.
struct AlertingSink;

#[async_trait]
impl LogSink for AlertingSink {
    fn name(&self) -> &str {
        "alerting"
    }

    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // A real sink would page someone here.
        println!("[alerting] {} {:?}", record.message, record.fields.get("requestId"));
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let mut logger = Logger::init(&LoggerConfig::new("info", "local0", "custom")).unwrap();
    logger
        .add_sink(Arc::new(AlertingSink), &[Level::Error, Level::Fatal, Level::Panic])
        .unwrap();

    logger.info("custom sink example started", LogFields::new());
    logger.error("media server unreachable", log_fields! { "requestId" => "c-9" });

    logger.shutdown(Duration::from_secs(1)).await;
}
