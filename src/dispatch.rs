use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{block_in_place, JoinHandle};
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};

/// Buffering and delivery settings for network sinks.
///
/// **Fields**
/// - `channel_buffer`: records queued per sink before new ones are dropped.
/// - `batch_size`: records delivered per batch.
/// - `flush_interval_ms`: longest time a partial batch waits.
/// - `send_timeout_ms`: bound on a single `LogSink::send` call.
/// - `max_retries`: retries of a failed batch before it is dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub send_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval_ms: 1000,
            send_timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

impl DispatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(10))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

struct RetryPolicy {
    send_timeout: Duration,
    max_retries: u32,
    backoff: Duration,
    max_backoff: Duration,
}

/// Feeds one [`LogSink`] from a bounded channel drained by a background
/// task, so callers never wait on network I/O.
///
/// Dropping the dispatcher closes the channel; the task then delivers what is
/// left, flushes the sink and exits.
pub struct SinkDispatcher {
    name: String,
    levels: Vec<Level>,
    sender: mpsc::Sender<LogRecord>,
    flush_requests: mpsc::Sender<std_mpsc::SyncSender<()>>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full or closed.
    pub dropped_events: Arc<AtomicU64>,
    /// Dropped after exhausting retries.
    pub failed_events: Arc<AtomicU64>,
}

impl SinkDispatcher {
    /// Spawn the delivery task for `sink` on the current Tokio runtime.
    ///
    /// Minimal thresholds are enforced for the buffer, batch size and flush
    /// interval to avoid degenerate configurations.
    pub fn spawn(
        sink: Arc<dyn LogSink>,
        levels: &[Level],
        config: &DispatchConfig,
    ) -> Result<(Self, JoinHandle<()>), SinkError> {
        let runtime = Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval();
        let policy = RetryPolicy {
            send_timeout: config.send_timeout(),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        };

        let (tx, mut rx) = mpsc::channel::<LogRecord>(buffer);
        let (flush_tx, mut flush_rx) = mpsc::channel::<std_mpsc::SyncSender<()>>(4);

        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let failed_events = Arc::new(AtomicU64::new(0));

        let failed_events_bg = Arc::clone(&failed_events);
        let name = sink.name().to_string();
        let name_bg = name.clone();

        let handle = runtime.spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(record) => {
                            batch.push(record);
                            if batch.len() >= batch_size {
                                deliver(&*sink, &name_bg, &mut batch, &policy, &failed_events_bg).await;
                            }
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            deliver(&*sink, &name_bg, &mut batch, &policy, &failed_events_bg).await;
                        }
                    }
                    Some(ack) = flush_rx.recv() => {
                        while let Ok(record) = rx.try_recv() {
                            batch.push(record);
                        }
                        if !batch.is_empty() {
                            deliver(&*sink, &name_bg, &mut batch, &policy, &failed_events_bg).await;
                        }
                        if let Err(e) = sink.flush().await {
                            eprintln!("error flushing log sink {}: {}", name_bg, e);
                        }
                        let _ = ack.send(());
                    }
                }
            }

            if !batch.is_empty() {
                deliver(&*sink, &name_bg, &mut batch, &policy, &failed_events_bg).await;
            }
            if let Err(e) = sink.flush().await {
                eprintln!("error flushing log sink {}: {}", name_bg, e);
            }
        });

        Ok((
            Self {
                name,
                levels: levels.to_vec(),
                sender: tx,
                flush_requests: flush_tx,
                enqueued_events,
                dropped_events,
                failed_events,
            },
            handle,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether records at `level` are routed to this sink.
    pub fn accepts(&self, level: Level) -> bool {
        self.levels.contains(&level)
    }

    /// Queue `record` without waiting. A full channel drops the record.
    pub fn dispatch(&self, record: LogRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("log channel for {} full, dropping log record", self.name);
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Deliver everything queued so far and wait up to `wait` for the sink
    /// to confirm. Returns `false` when the wait timed out.
    ///
    /// Blocks the calling thread. On a multi-threaded runtime the worker is
    /// handed off first so the delivery task can make progress; on a
    /// current-thread runtime it cannot, and the wait runs into `wait`.
    pub fn flush_blocking(&self, wait: Duration) -> bool {
        let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
        if self.flush_requests.try_send(ack_tx).is_err() {
            return false;
        }
        let wait_for_ack = || ack_rx.recv_timeout(wait).is_ok();
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(wait_for_ack),
            _ => wait_for_ack(),
        }
    }
}

async fn deliver(
    sink: &dyn LogSink,
    name: &str,
    batch: &mut Vec<LogRecord>,
    policy: &RetryPolicy,
    failed: &AtomicU64,
) {
    let pending = batch.len() as u64;
    if let Err(e) = send_batch(sink, batch, policy).await {
        failed.fetch_add(pending, Ordering::Relaxed);
        eprintln!("error sending log batch to {}: {}", name, e);
    }
}

/// Deliver `batch` in order. Records already accepted are not resent on
/// retry; the batch is always empty when this returns.
async fn send_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<LogRecord>,
    policy: &RetryPolicy,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut backoff = policy.backoff;
    let mut attempt = 0;
    loop {
        let mut sent = 0;
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for record in batch.iter() {
            match timeout(policy.send_timeout, sink.send(record)).await {
                Ok(Ok(())) => sent += 1,
                Ok(Err(e)) => {
                    last_err = Some(e);
                    break;
                }
                Err(_) => {
                    last_err = Some(format!("send timed out after {:?}", policy.send_timeout).into());
                    break;
                }
            }
        }
        batch.drain(..sent);

        let err = match last_err {
            None => return Ok(()),
            Some(e) => e,
        };
        if attempt >= policy.max_retries {
            batch.clear();
            return Err(err);
        }

        attempt += 1;
        eprintln!("log sink send failed, retrying in {:?}", backoff);
        sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, policy.max_backoff);
    }
}
