mod support;

use siprtc_log::layer::EnrichLayer;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[test]
fn tracing_events_go_through_the_pipeline() {
    let (logger, buffer) = support::logger("info");
    let subscriber = Registry::default().with(EnrichLayer::new(Arc::new(logger)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("filtered out");
        tracing::warn!(attempt = 3, peer = "10.0.0.1", "retrying");
    });

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["level"], "warning");
    assert_eq!(line["msg"], "retrying");
    assert_eq!(line["attempt"], 3);
    assert_eq!(line["peer"], "10.0.0.1");
    assert_eq!(line["target"], "tracing_bridge");
    assert!(line["source"].as_str().unwrap().starts_with("tests/tracing_bridge.rs:"));
}

#[test]
fn tracing_errors_are_normalized() {
    let (logger, buffer) = support::logger("info");
    let subscriber = Registry::default().with(EnrichLayer::new(Arc::new(logger)));
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(error = &err as &(dyn std::error::Error + 'static), "request failed");
    });

    let line = &buffer.lines()[0];
    assert_eq!(line["error"]["root"]["message"], "upstream timed out");
}
