use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use siprtc_log::noop_sink::NoopSink;
use siprtc_log::{log_fields, Level, Logger, LoggerConfig};

#[tokio::main]
async fn main() {
    let mut logger = Logger::init(&LoggerConfig::new("error", "local0", "load")).unwrap();
    logger.set_output(std::io::sink());
    logger.add_sink(Arc::new(NoopSink), &Level::ALL).unwrap();

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.error("default load test error", log_fields! { "iteration" => i });
    }

    let elapsed = start.elapsed();
    println!("default config: logged {} entries in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
    for sink in logger.sinks() {
        println!("{}: dropped {}", sink.name(), sink.dropped_events.load(std::sync::atomic::Ordering::Relaxed));
    }

    // Let the background task drain the channel
    logger.shutdown(Duration::from_secs(2)).await;
}
