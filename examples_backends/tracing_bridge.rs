use std::sync::Arc;

use tracing::{info, warn};
use siprtc_log::{init::init_tracing, Logger, LoggerConfig};

/// Routes plain `tracing` macros through the logger, so libraries that
/// only know `tracing` get the same JSON lines, hooks and sinks.
#[tokio::main]
async fn main() {
    let logger = Arc::new(Logger::init(&LoggerConfig::from_env()).unwrap());
    init_tracing(Arc::clone(&logger)).unwrap();

    info!(peer = "10.0.0.5:5060", "registration accepted");
    warn!(attempt = 2, "retransmitting INVITE");

    logger.xml_log("Info", "c-1", "<cmd><op>hangup</op></cmd>");
}
