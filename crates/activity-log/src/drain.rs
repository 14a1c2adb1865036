use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::queue::{EventQueue, LogQueue, QueuedRecord, SubmissionError};
use crate::sink::Sink;

/// How often the loop flushes the sink and rechecks an idle queue.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Queue length at which a backlog warning is logged.
pub const DEFAULT_HIGH_WATER_MARK: usize = 10_000;

#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub period: Duration,
    /// Write attempts per record before it is discarded. `1` means a failed
    /// write is reported and the loop moves on. Only transient failures are
    /// retried.
    pub max_attempts: u32,
    pub high_water_mark: usize,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            max_attempts: 1,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub written: u64,
    pub failed: u64,
    pub retried: u64,
    pub dropped: u64,
}

/// Owns the running loop. Dropping it without calling
/// [`shutdown`](Self::shutdown) also stops the loop.
pub struct DrainHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<DrainStats>,
}

impl DrainHandle {
    /// Stop the loop, close the sink, and return the final counters.
    ///
    /// A write already in flight runs to completion. Records still queued
    /// are dropped and their receipts resolve to
    /// [`SubmissionError::Dropped`].
    pub async fn shutdown(self) -> DrainStats {
        let _ = self.shutdown_tx.send(true);
        Self::join(self.join).await
    }

    /// Wait for the loop to exit on its own, which it does once every
    /// [`LogQueue`] has been dropped and the queue has drained.
    pub async fn finished(self) -> DrainStats {
        let Self { shutdown_tx, join } = self;
        let stats = Self::join(join).await;
        drop(shutdown_tx);
        stats
    }

    async fn join(join: JoinHandle<DrainStats>) -> DrainStats {
        match join.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!(%err, "drain loop task failed");
                DrainStats::default()
            }
        }
    }
}

/// Serial writer that moves records from the queue into a [`Sink`].
///
/// Exactly one write is in flight at any time and records are written in
/// submission order. A new submission wakes the loop at once, and after each
/// completed write the next record is dispatched immediately; the period only
/// paces the flush of the sink and the recheck of an idle queue.
pub struct DrainLoop {
    sink: Box<dyn Sink>,
    queue: EventQueue,
    rx: mpsc::UnboundedReceiver<QueuedRecord>,
    shutdown_rx: watch::Receiver<bool>,
    config: DrainConfig,
    stats: DrainStats,
    retry_at: Option<Instant>,
    producers_gone: bool,
}

enum Wake {
    Shutdown,
    Tick,
    Retry,
    Received(Option<QueuedRecord>),
}

impl DrainLoop {
    /// Spawn the loop on the current runtime.
    ///
    /// A zero `period` is raised to one millisecond and a zero
    /// `max_attempts` to one.
    pub fn start(sink: Box<dyn Sink>, mut config: DrainConfig) -> (LogQueue, DrainHandle) {
        config.period = config.period.max(MIN_PERIOD);
        config.max_attempts = config.max_attempts.max(1);

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let drain = DrainLoop {
            sink,
            queue: EventQueue::new(config.high_water_mark),
            rx,
            shutdown_rx,
            config,
            stats: DrainStats::default(),
            retry_at: None,
            producers_gone: false,
        };
        let join = tokio::spawn(drain.run());

        (LogQueue::new(tx), DrainHandle { shutdown_tx, join })
    }

    async fn run(mut self) -> DrainStats {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::debug!(
            sink = ?self.sink.kind(),
            period_ms = self.config.period.as_millis() as u64,
            "drain loop started"
        );

        loop {
            self.absorb_pending();

            if *self.shutdown_rx.borrow() {
                break;
            }

            // Keep flushing on schedule even while a burst keeps us busy.
            if ticker.tick().now_or_never().is_some() {
                self.flush().await;
            }

            if self.front_ready() {
                self.write_front().await;
                continue;
            }

            if self.producers_gone && self.queue.is_empty() {
                tracing::debug!("all queue handles dropped; drain loop exiting");
                break;
            }

            let accepting = !self.producers_gone;
            let retry_deadline = self.retry_at;
            let wake = tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        // Handle dropped without an explicit shutdown.
                        Wake::Shutdown
                    } else {
                        continue;
                    }
                }
                _ = ticker.tick() => Wake::Tick,
                _ = tokio::time::sleep_until(retry_deadline.unwrap_or_else(Instant::now)),
                    if retry_deadline.is_some() => Wake::Retry,
                received = self.rx.recv(), if accepting => Wake::Received(received),
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Tick => self.flush().await,
                Wake::Retry => self.retry_at = None,
                Wake::Received(Some(item)) => self.queue.enqueue(item),
                Wake::Received(None) => self.producers_gone = true,
            }
        }

        self.finish().await
    }

    fn absorb_pending(&mut self) {
        if self.producers_gone {
            return;
        }
        loop {
            match self.rx.try_recv() {
                Ok(item) => self.queue.enqueue(item),
                Err(mpsc::error::TryRecvError::Empty) => return,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.producers_gone = true;
                    return;
                }
            }
        }
    }

    fn front_ready(&self) -> bool {
        !self.queue.is_empty() && self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    /// Write the front record and settle it.
    async fn write_front(&mut self) {
        self.retry_at = None;
        let Some(front) = self.queue.front_mut() else {
            return;
        };
        front.attempts += 1;
        let attempt = front.attempts;

        let result = self.sink.write(&front.submission).await;
        let event_type = front.submission.record.event_type().to_string();

        match result {
            Ok(ack) => {
                self.stats.written += 1;
                tracing::debug!(%event_type, status = ?ack.status, "record written");
                if let Some(item) = self.queue.dequeue_front() {
                    item.resolve(Ok(ack));
                }
            }
            Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                self.stats.retried += 1;
                tracing::warn!(
                    %event_type,
                    attempt,
                    max_attempts = self.config.max_attempts,
                    error_kind = err.kind(),
                    %err,
                    "record write failed; retrying"
                );
                self.retry_at = Some(Instant::now() + self.config.period);
            }
            Err(err) => {
                self.stats.failed += 1;
                tracing::warn!(
                    %event_type,
                    attempt,
                    error_kind = err.kind(),
                    %err,
                    "record write failed; record discarded"
                );
                if let Some(item) = self.queue.dequeue_front() {
                    item.resolve(Err(SubmissionError::Write(err)));
                }
            }
        }
    }

    async fn flush(&mut self) {
        if let Err(err) = self.sink.flush().await {
            tracing::error!(%err, "periodic activity log flush failed");
        }
    }

    async fn finish(mut self) -> DrainStats {
        self.absorb_pending();
        self.rx.close();

        let unwritten = self.queue.len();
        if unwritten > 0 {
            tracing::warn!(
                dropped = unwritten,
                "shutting down with unwritten records; they are lost"
            );
        }
        for item in self.queue.drain() {
            item.resolve(Err(SubmissionError::Dropped));
        }
        self.stats.dropped += unwritten as u64;

        if let Err(err) = self.sink.close().await {
            tracing::error!(%err, "failed to close activity sink on shutdown");
        }

        tracing::info!(
            written = self.stats.written,
            failed = self.stats.failed,
            retried = self.stats.retried,
            dropped = self.stats.dropped,
            "drain loop stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use credential_vault::Credential;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::entry::{EventKind, EventRecord, TabSnapshot};
    use crate::sink::{Ack, SinkKind, Submission, WriteError};
    use crate::writer::FileSink;

    // -- test sinks -------------------------------------------------------

    /// Records every write and panics if two writes ever overlap.
    #[derive(Clone, Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<AtomicBool>,
        flushes: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        /// Fail the first N attempts.
        failures_left: Arc<AtomicUsize>,
        /// Answer every write with this HTTP status instead of succeeding.
        reject_with: Option<u16>,
        attempts: Arc<AtomicUsize>,
        delay: Duration,
        gate: Option<Arc<Semaphore>>,
    }

    impl RecordingSink {
        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn kind(&self) -> SinkKind {
            SinkKind::File
        }

        async fn write(&mut self, submission: &Submission) -> Result<Ack, WriteError> {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "two writes in flight at once"
            );
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            self.in_flight.store(false, Ordering::SeqCst);

            if failed {
                return Err(WriteError::Unreachable("simulated outage".into()));
            }
            if let Some(status) = self.reject_with {
                return Err(WriteError::Rejected { status });
            }
            self.written
                .lock()
                .unwrap()
                .push(submission.record.event_type().to_string());
            Ok(Ack {
                sink: SinkKind::File,
                status: None,
            })
        }

        async fn flush(&mut self) -> Result<(), WriteError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), WriteError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // -- helpers ----------------------------------------------------------

    fn record(kind: EventKind) -> EventRecord {
        EventRecord::capture("alice", kind, &TabSnapshot::new("1", 0, "t", "u"))
    }

    fn credential() -> Credential {
        Credential::new("realm", "alice", "secret")
    }

    fn config(period: Duration) -> DrainConfig {
        DrainConfig {
            period,
            ..DrainConfig::default()
        }
    }

    const KINDS: [EventKind; 5] = [
        EventKind::TabOpened,
        EventKind::TabReady,
        EventKind::TabLoad,
        EventKind::TabActivated,
        EventKind::TabClosed,
    ];

    // -- ordering ---------------------------------------------------------

    #[tokio::test]
    async fn writes_in_fifo_order_one_at_a_time() {
        let sink = RecordingSink {
            delay: Duration::from_millis(2),
            ..RecordingSink::default()
        };
        let (queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_millis(50)));

        let mut receipts = Vec::new();
        let mut expected = Vec::new();
        for i in 0..40 {
            let kind = KINDS[i % KINDS.len()];
            expected.push(kind.to_string());
            receipts.push(queue.submit(record(kind), credential()));
        }
        for receipt in receipts {
            receipt.wait().await.unwrap();
        }

        assert_eq!(sink.written(), expected);
        let stats = handle.shutdown().await;
        assert_eq!(stats.written, 40);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn burst_drains_without_waiting_for_ticks() {
        let sink = RecordingSink::default();
        let (queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_secs(3600)));

        let receipts: Vec<_> = KINDS
            .iter()
            .map(|kind| queue.submit(record(*kind), credential()))
            .collect();

        tokio::time::timeout(Duration::from_secs(5), async {
            for receipt in receipts {
                receipt.wait().await.unwrap();
            }
        })
        .await
        .expect("burst should drain eagerly");

        assert_eq!(sink.written().len(), KINDS.len());
        handle.shutdown().await;
    }

    // -- failures ---------------------------------------------------------

    #[tokio::test]
    async fn failed_write_is_reported_and_loop_continues() {
        let sink = RecordingSink {
            failures_left: Arc::new(AtomicUsize::new(1)),
            ..RecordingSink::default()
        };
        let (queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_millis(20)));

        let first = queue.submit(record(EventKind::TabOpened), credential());
        let second = queue.submit(record(EventKind::TabClosed), credential());

        let err = first.wait().await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Write(WriteError::Unreachable(_))
        ));
        second.wait().await.unwrap();

        assert_eq!(sink.written(), ["Tab closed"]);
        let stats = handle.shutdown().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test]
    async fn retries_front_record_before_moving_on() {
        let sink = RecordingSink {
            failures_left: Arc::new(AtomicUsize::new(2)),
            ..RecordingSink::default()
        };
        let drain_config = DrainConfig {
            period: Duration::from_millis(10),
            max_attempts: 3,
            ..DrainConfig::default()
        };
        let (queue, handle) = DrainLoop::start(Box::new(sink.clone()), drain_config);

        let first = queue.submit(record(EventKind::TabOpened), credential());
        let second = queue.submit(record(EventKind::TabClosed), credential());
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert_eq!(sink.written(), ["Tab opened", "Tab closed"]);
        let stats = handle.shutdown().await;
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn rejected_record_is_not_retried() {
        let sink = RecordingSink {
            reject_with: Some(403),
            ..RecordingSink::default()
        };
        let drain_config = DrainConfig {
            period: Duration::from_millis(200),
            max_attempts: 3,
            ..DrainConfig::default()
        };
        let (queue, handle) = DrainLoop::start(Box::new(sink.clone()), drain_config);

        let started = Instant::now();
        let receipt = queue.submit(record(EventKind::CredentialTest), credential());
        let err = receipt.wait().await.unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::Write(WriteError::Rejected { status: 403 })
        ));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

        let stats = handle.shutdown().await;
        assert_eq!(stats.retried, 0);
        assert_eq!(stats.failed, 1);
    }

    // -- flushing and shutdown ---------------------------------------------

    #[tokio::test]
    async fn zero_period_and_attempts_are_raised() {
        let sink = RecordingSink::default();
        let drain_config = DrainConfig {
            period: Duration::ZERO,
            max_attempts: 0,
            high_water_mark: 0,
        };
        let (queue, handle) = DrainLoop::start(Box::new(sink.clone()), drain_config);

        queue
            .submit(record(EventKind::TabOpened), credential())
            .wait()
            .await
            .unwrap();

        let stats = handle.shutdown().await;
        assert_eq!(stats.written, 1);
        assert_eq!(sink.written(), ["Tab opened"]);
    }

    #[tokio::test]
    async fn flushes_on_every_tick_even_when_idle() {
        let sink = RecordingSink::default();
        let (_queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_millis(20)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;

        assert!(sink.flushes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn shutdown_finishes_in_flight_write_and_drops_the_rest() {
        let gate = Arc::new(Semaphore::new(0));
        let sink = RecordingSink {
            gate: Some(Arc::clone(&gate)),
            ..RecordingSink::default()
        };
        let (queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_millis(20)));

        let in_flight = queue.submit(record(EventKind::TabOpened), credential());
        // Let the loop pick up the first record and block inside the sink.
        while !sink.in_flight.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let queued: Vec<_> = KINDS[1..]
            .iter()
            .map(|kind| queue.submit(record(*kind), credential()))
            .collect();

        let stopping = tokio::spawn(handle.shutdown());
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.add_permits(1);

        let stats = stopping.await.unwrap();
        in_flight.wait().await.unwrap();
        for receipt in queued {
            assert!(matches!(receipt.wait().await, Err(SubmissionError::Dropped)));
        }
        assert_eq!(stats.written, 1);
        assert_eq!(stats.dropped, (KINDS.len() - 1) as u64);
        assert!(sink.closed.load(Ordering::SeqCst));

        // Submitting after shutdown is reported, not lost silently.
        let late = queue.submit(record(EventKind::TabClosed), credential());
        assert!(matches!(late.wait().await, Err(SubmissionError::Dropped)));
    }

    #[tokio::test]
    async fn loop_exits_after_last_queue_handle_is_dropped() {
        let sink = RecordingSink::default();
        let (queue, handle) =
            DrainLoop::start(Box::new(sink.clone()), config(Duration::from_millis(20)));

        queue.enqueue(record(EventKind::WindowActivated), credential());
        drop(queue);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("loop should exit");
        assert_eq!(stats.written, 1);
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    // -- end to end with a file ---------------------------------------------

    #[tokio::test]
    async fn file_sink_receives_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".firefox_history.log");
        let sink = FileSink::open(&path).await.unwrap();
        let (queue, handle) = DrainLoop::start(Box::new(sink), DrainConfig::default());

        queue.enqueue(record(EventKind::TabOpened), credential());
        let last = queue.submit(record(EventKind::WindowActivated), credential());
        last.wait().await.unwrap();
        handle.shutdown().await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let event_types: Vec<String> = contents
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event_type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(event_types, ["Tab opened", "Window activated"]);
    }
}
