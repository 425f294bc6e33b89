//! Asynchronous behavior analysis.
//!
//! Request handlers hand `(client, page)` observations to the [`Analyzer`] without
//! blocking. A single worker thread drains them, drops repeats with a Bloom filter,
//! counts distinct pages per client and promotes clients that cross the threshold
//! onto the blocklist. Every `window` the filter and the counter start over; the
//! blocklist does not.

use std::collections::HashSet;
use std::hash::BuildHasher;
use std::hash::RandomState;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::BotrateError;
use crate::Config;
use crate::ConfigError;
use crate::metrics::AnalyzerMetrics;

mod blocklist;
mod counter;
mod filter;

use blocklist::Blocklist;
use counter::VisitCounter;
use filter::DoubleBufferFilter;

#[derive(Debug)]
struct Observation {
    client_id: String,
    page_digest: u64,
}

#[derive(Debug)]
enum Event {
    Observe(Observation),
    Stop,
}

/// Turns a stream of page views into blocking decisions.
///
/// [`Analyzer::record`] and [`Analyzer::blocked`] may be called from any number of
/// threads. Dropping the analyzer stops its worker.
#[derive(Debug)]
pub struct Analyzer {
    blocklist: Arc<Blocklist>,
    queue: mpsc::SyncSender<Event>,
    hasher: RandomState,
    closed: Arc<AtomicBool>,
    metrics: AnalyzerMetrics,
}

impl Analyzer {
    /// Validates `config` and starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`BotrateError::Config`] for an invalid configuration and
    /// [`BotrateError::Spawn`] if the worker thread cannot be started.
    pub fn new(config: &Config) -> Result<Self, BotrateError> {
        config.validate()?;

        let (tx, rx) = mpsc::sync_channel(config.queue_capacity);
        let blocklist = Arc::new(Blocklist::new());
        let hasher = RandomState::new();
        let closed = Arc::new(AtomicBool::new(false));
        let metrics = AnalyzerMetrics::new();

        let counter_capacity =
            NonZeroUsize::new(config.counter_capacity).ok_or(ConfigError::ZeroCounterCapacity)?;

        let worker = Worker {
            queue: rx,
            filter: DoubleBufferFilter::new(
                config.filter_capacity,
                config.filter_false_positive_rate,
            )?,
            counter: VisitCounter::new(counter_capacity),
            blocklist: Arc::clone(&blocklist),
            hasher: hasher.clone(),
            page_threshold: config.page_threshold,
            window: config.window,
            closed: Arc::clone(&closed),
            metrics: metrics.clone(),
        };

        thread::Builder::new()
            .name("botrate-analyzer".to_string())
            .spawn(move || worker.run())
            .map_err(|e| BotrateError::Spawn(e.to_string()))?;

        Ok(Self {
            blocklist,
            queue: tx,
            hasher,
            closed,
            metrics,
        })
    }

    /// Queues a page view by `client_id` for analysis.
    ///
    /// Never blocks: if the queue is full, or the analyzer is closed, the
    /// observation is dropped.
    pub fn record(&self, client_id: &str, page: &str) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let observation = Observation {
            client_id: client_id.to_owned(),
            page_digest: self.hasher.hash_one(page),
        };
        match self.queue.try_send(Event::Observe(observation)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.dropped();
                trace!(client = client_id, "observation queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Whether `client_id` has been promoted to the blocklist.
    #[inline]
    pub fn blocked(&self, client_id: &str) -> bool {
        self.blocklist.contains(client_id)
    }

    /// A snapshot of every blocked client.
    pub fn blocked_clients(&self) -> Arc<HashSet<String>> {
        self.blocklist.snapshot()
    }

    /// Stops the worker. Safe to call any number of times, from any thread.
    ///
    /// Observations still queued may be discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wake an idle worker. A full queue means it is busy and will see the flag.
        let _ = self.queue.try_send(Event::Stop);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the worker thread. Nothing else touches the filter or counter.
struct Worker {
    queue: mpsc::Receiver<Event>,
    filter: DoubleBufferFilter,
    counter: VisitCounter,
    blocklist: Arc<Blocklist>,
    hasher: RandomState,
    page_threshold: u32,
    window: Duration,
    closed: Arc<AtomicBool>,
    metrics: AnalyzerMetrics,
}

impl Worker {
    fn run(mut self) {
        info!(
            window = ?self.window,
            page_threshold = self.page_threshold,
            "behavior analyzer started"
        );

        let mut next_rotation = Instant::now() + self.window;
        while !self.closed.load(Ordering::Acquire) {
            let wait = next_rotation.saturating_duration_since(Instant::now());
            match self.queue.recv_timeout(wait) {
                Ok(Event::Observe(observation)) => self.analyze(&observation),
                Ok(Event::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            // Checked after every event so a busy queue cannot starve rotation.
            let now = Instant::now();
            if now >= next_rotation {
                self.rotate();
                next_rotation = now + self.window;
            }
        }

        info!(blocked = self.blocklist.len(), "behavior analyzer stopped");
    }

    fn analyze(&mut self, observation: &Observation) {
        let key = self
            .hasher
            .hash_one((observation.client_id.as_str(), observation.page_digest));
        if self.filter.test_and_add(key) {
            trace!(
                client = %observation.client_id,
                pages = self.counter.count(&observation.client_id),
                "repeat page ignored"
            );
            return;
        }

        let count = self.counter.visit(&observation.client_id);
        if count >= self.page_threshold && self.blocklist.insert(&observation.client_id) {
            warn!(
                client = %observation.client_id,
                pages = count,
                "distinct page threshold reached, client blocked"
            );
            self.metrics.blocked();
        }
    }

    fn rotate(&mut self) {
        debug!(tracked = self.counter.len(), "rotating analysis window");
        self.filter.rotate();
        self.counter.clear();
        self.metrics.rotated();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(page_threshold: u32) -> (Worker, mpsc::SyncSender<Event>) {
        let (tx, rx) = mpsc::sync_channel(16);
        let worker = Worker {
            queue: rx,
            filter: DoubleBufferFilter::new(1_000, 0.01).unwrap(),
            counter: VisitCounter::new(NonZeroUsize::new(100).unwrap()),
            blocklist: Arc::new(Blocklist::new()),
            hasher: RandomState::new(),
            page_threshold,
            window: Duration::from_secs(3600),
            closed: Arc::new(AtomicBool::new(false)),
            metrics: AnalyzerMetrics::new(),
        };
        (worker, tx)
    }

    fn observe(worker: &mut Worker, client: &str, page: &str) {
        let observation = Observation {
            client_id: client.to_string(),
            page_digest: worker.hasher.hash_one(page),
        };
        worker.analyze(&observation);
    }

    fn config(window: Duration, page_threshold: u32) -> Config {
        Config::default()
            .with_window(window)
            .with_page_threshold(page_threshold)
    }

    #[test]
    fn repeated_pages_count_once() {
        let (mut w, _tx) = worker(3);
        for _ in 0..10 {
            observe(&mut w, "1.2.3.4", "/a");
        }
        assert_eq!(w.counter.count("1.2.3.4"), 1);
        assert!(!w.blocklist.contains("1.2.3.4"));
    }

    #[test]
    fn threshold_promotes_client() {
        let (mut w, _tx) = worker(3);
        observe(&mut w, "1.2.3.4", "/a");
        observe(&mut w, "1.2.3.4", "/b");
        assert!(!w.blocklist.contains("1.2.3.4"));
        observe(&mut w, "1.2.3.4", "/c");
        assert!(w.blocklist.contains("1.2.3.4"));

        // Further pages leave a single entry.
        observe(&mut w, "1.2.3.4", "/d");
        assert_eq!(w.blocklist.len(), 1);
    }

    #[test]
    fn same_page_from_different_clients_counts_for_each() {
        let (mut w, _tx) = worker(2);
        observe(&mut w, "10.0.0.1", "/a");
        observe(&mut w, "10.0.0.2", "/a");
        assert_eq!(w.counter.count("10.0.0.1"), 1);
        assert_eq!(w.counter.count("10.0.0.2"), 1);
    }

    #[test]
    fn rotation_resets_counts_but_not_blocks() {
        let (mut w, _tx) = worker(2);
        observe(&mut w, "10.0.0.1", "/a");
        observe(&mut w, "10.0.0.1", "/b");
        observe(&mut w, "10.0.0.2", "/a");
        assert!(w.blocklist.contains("10.0.0.1"));

        w.rotate();
        assert_eq!(w.counter.count("10.0.0.2"), 0);
        assert!(w.blocklist.contains("10.0.0.1"));

        // A page seen last window is new again.
        observe(&mut w, "10.0.0.2", "/a");
        assert_eq!(w.counter.count("10.0.0.2"), 1);
        assert!(!w.blocklist.contains("10.0.0.2"));
    }

    #[test]
    fn blocks_after_distinct_pages() {
        let analyzer = Analyzer::new(&config(Duration::from_secs(1), 3)).unwrap();
        for page in ["/a", "/b", "/c", "/d"] {
            analyzer.record("1.2.3.4", page);
        }
        thread::sleep(Duration::from_millis(200));

        assert!(analyzer.blocked("1.2.3.4"));
        assert!(analyzer.blocked_clients().contains("1.2.3.4"));
        analyzer.close();
    }

    #[test]
    fn duplicate_pages_do_not_block() {
        let analyzer = Analyzer::new(&config(Duration::from_secs(1), 3)).unwrap();
        for _ in 0..10 {
            analyzer.record("1.2.3.4", "/a");
        }
        thread::sleep(Duration::from_millis(200));

        assert!(!analyzer.blocked("1.2.3.4"));
        analyzer.close();
    }

    #[test]
    fn blocks_survive_rotation() {
        let analyzer = Analyzer::new(&config(Duration::from_millis(50), 2)).unwrap();
        analyzer.record("1.2.3.4", "/a");
        analyzer.record("1.2.3.4", "/b");
        thread::sleep(Duration::from_millis(250));

        assert!(analyzer.blocked("1.2.3.4"));
        analyzer.close();
    }

    #[test]
    fn close_is_idempotent_and_concurrent_safe() {
        let analyzer = Arc::new(Analyzer::new(&Config::default()).unwrap());
        analyzer.close();
        analyzer.close();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let a = Arc::clone(&analyzer);
                thread::spawn(move || a.close())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(analyzer.is_closed());
    }

    #[test]
    fn record_after_close_is_a_noop() {
        let analyzer = Analyzer::new(&config(Duration::from_secs(1), 1)).unwrap();
        analyzer.close();
        analyzer.record("1.2.3.4", "/a");
        thread::sleep(Duration::from_millis(100));
        assert!(!analyzer.blocked("1.2.3.4"));
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let config = config(Duration::from_secs(60), 1_000).with_queue_capacity(1);
        let analyzer = Analyzer::new(&config).unwrap();
        let start = Instant::now();
        for i in 0..10_000 {
            analyzer.record("1.2.3.4", &format!("/{i}"));
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        analyzer.close();
    }

    /// Four threads record overlapping slices of `/0`..`/49` for one client:
    /// 50 distinct pages, 80 observations.
    fn record_overlapping(analyzer: &Arc<Analyzer>, client: &'static str) {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let analyzer = Arc::clone(analyzer);
                thread::spawn(move || {
                    for page in t * 10..t * 10 + 20 {
                        analyzer.record(client, &format!("/{page}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn concurrent_records_reaching_threshold_exactly_block() {
        let config = config(Duration::from_secs(3600), 50).with_queue_capacity(1_000);
        let analyzer = Arc::new(Analyzer::new(&config).unwrap());

        record_overlapping(&analyzer, "10.0.0.1");

        assert!(wait_until(|| analyzer.blocked("10.0.0.1")));
        analyzer.close();
    }

    #[test]
    fn concurrent_records_one_short_of_threshold_do_not_block() {
        let config = config(Duration::from_secs(3600), 51).with_queue_capacity(1_000);
        let analyzer = Arc::new(Analyzer::new(&config).unwrap());

        record_overlapping(&analyzer, "10.0.0.1");
        // The queue is FIFO: once this client is blocked, every earlier
        // observation has been analyzed.
        for page in 0..51 {
            analyzer.record("10.0.0.2", &format!("/{page}"));
        }

        assert!(wait_until(|| analyzer.blocked("10.0.0.2")));
        assert!(!analyzer.blocked("10.0.0.1"));
        analyzer.close();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Analyzer::new(&Config::default().with_page_threshold(0)).unwrap_err();
        assert!(matches!(err, BotrateError::Config(_)));
    }
}
