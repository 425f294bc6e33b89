use std::sync::Arc;
use std::time::Duration;

use crate::ConfigError;
use crate::classifier::Classifier;

/// One token every ten minutes: very strict.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PAGE_THRESHOLD: u32 = 50;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_COUNTER_CAPACITY: usize = 100_000;
pub const DEFAULT_FILTER_CAPACITY: usize = 100_000;
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Limiter configuration.
///
/// Built with the consuming `with_*` methods and checked by [`Config::validate`]
/// when the limiter is constructed.
///
/// ```rust
/// use std::time::Duration;
/// use botrate::Config;
///
/// let config = Config::default()
///     .with_refill_interval(Duration::from_secs(60))
///     .with_window(Duration::from_secs(60))
///     .with_page_threshold(50)
///     .with_queue_capacity(10_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// A blocked client earns one token per interval.
    pub refill_interval: Duration,
    /// Rotation period of the behavior analyzer.
    pub window: Duration,
    /// Distinct pages within one window that get a client blocked.
    pub page_threshold: u32,
    /// Bound on queued, not yet analyzed observations.
    pub queue_capacity: usize,
    /// Maximum number of clients tracked by the visit counter.
    pub counter_capacity: usize,
    /// Number of distinct (client, page) pairs the dedup filter is sized for.
    pub filter_capacity: usize,
    /// Target false positive rate of the dedup filter at `filter_capacity`.
    pub filter_false_positive_rate: f64,
    /// Replaces the built-in [`crate::KnownBots`] classifier.
    pub classifier: Option<Arc<dyn Classifier>>,
    refill_rate: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refill_interval: DEFAULT_REFILL_INTERVAL,
            window: DEFAULT_WINDOW,
            page_threshold: DEFAULT_PAGE_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            counter_capacity: DEFAULT_COUNTER_CAPACITY,
            filter_capacity: DEFAULT_FILTER_CAPACITY,
            filter_false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            classifier: None,
            refill_rate: None,
        }
    }
}

impl Config {
    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self.refill_rate = None;
        self
    }

    /// Sets the refill rate in events per second, e.g. `0.5` for one token every two seconds.
    pub fn with_refill_rate(mut self, per_second: f64) -> Self {
        self.refill_rate = Some(per_second);
        if per_second.is_finite()
            && per_second > 0.0
            && let Ok(interval) = Duration::try_from_secs_f64(1.0 / per_second)
        {
            self.refill_interval = interval;
        }
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_page_threshold(mut self, threshold: u32) -> Self {
        self.page_threshold = threshold;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_counter_capacity(mut self, capacity: usize) -> Self {
        self.counter_capacity = capacity;
        self
    }

    pub fn with_filter_capacity(mut self, capacity: usize) -> Self {
        self.filter_capacity = capacity;
        self
    }

    pub fn with_filter_false_positive_rate(mut self, rate: f64) -> Self {
        self.filter_false_positive_rate = rate;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Checks every option.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.refill_rate
            && !(rate.is_finite()
                && rate > 0.0
                && Duration::try_from_secs_f64(1.0 / rate).is_ok())
        {
            return Err(ConfigError::InvalidRefillRate(rate));
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigError::ZeroRefillInterval);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.page_threshold == 0 {
            return Err(ConfigError::ZeroPageThreshold);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.counter_capacity == 0 {
            return Err(ConfigError::ZeroCounterCapacity);
        }
        if self.filter_capacity == 0 {
            return Err(ConfigError::ZeroFilterCapacity);
        }
        let fp = self.filter_false_positive_rate;
        if !(fp > 0.0 && fp < 1.0) {
            return Err(ConfigError::InvalidFalsePositiveRate(fp));
        }
        Ok(())
    }
}
