use std::sync::atomic::{AtomicU64, Ordering};

/// Receives counter increments from a [`DataLoader`](crate::DataLoader).
///
/// Collectors may be shared between loaders, so every method takes `&self`.
pub trait StatisticsCollector: Send + Sync {
    /// A `load` call was made.
    fn increment_load_count(&self);
    /// `delta` keys were handed to a batch function invocation.
    fn increment_batch_load_count_by(&self, delta: u64);
    /// A `load` (or `get_if_present`) call was answered from the in-process cache.
    fn increment_cache_hit_count(&self);
    /// A single key resolved with an error.
    fn increment_load_error_count(&self);
    /// A whole batch failed.
    fn increment_batch_load_exception_count(&self);

    fn statistics(&self) -> Statistics;
}

/// Discards every increment. This is the default collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpStatisticsCollector;

impl StatisticsCollector for NoOpStatisticsCollector {
    fn increment_load_count(&self) {}
    fn increment_batch_load_count_by(&self, _delta: u64) {}
    fn increment_cache_hit_count(&self) {}
    fn increment_load_error_count(&self) {}
    fn increment_batch_load_exception_count(&self) {}

    fn statistics(&self) -> Statistics {
        Statistics::default()
    }
}

/// Counts with relaxed atomics.
#[derive(Debug, Default)]
pub struct SimpleStatisticsCollector {
    load_count: AtomicU64,
    batch_invoke_count: AtomicU64,
    batch_load_count: AtomicU64,
    cache_hit_count: AtomicU64,
    batch_load_exception_count: AtomicU64,
    load_error_count: AtomicU64,
}

impl SimpleStatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatisticsCollector for SimpleStatisticsCollector {
    fn increment_load_count(&self) {
        self.load_count.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_batch_load_count_by(&self, delta: u64) {
        self.batch_invoke_count.fetch_add(1, Ordering::Relaxed);
        self.batch_load_count.fetch_add(delta, Ordering::Relaxed);
    }

    fn increment_cache_hit_count(&self) {
        self.cache_hit_count.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_load_error_count(&self) {
        self.load_error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_batch_load_exception_count(&self) {
        self.batch_load_exception_count.fetch_add(1, Ordering::Relaxed);
    }

    fn statistics(&self) -> Statistics {
        Statistics {
            load_count: self.load_count.load(Ordering::Relaxed),
            batch_invoke_count: self.batch_invoke_count.load(Ordering::Relaxed),
            batch_load_count: self.batch_load_count.load(Ordering::Relaxed),
            cache_hit_count: self.cache_hit_count.load(Ordering::Relaxed),
            batch_load_exception_count: self.batch_load_exception_count.load(Ordering::Relaxed),
            load_error_count: self.load_error_count.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of a collector's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Number of `load` calls.
    pub load_count: u64,
    /// Number of times a batch function was invoked.
    pub batch_invoke_count: u64,
    /// Total number of keys handed to batch functions (not necessarily unique).
    pub batch_load_count: u64,
    /// Number of loads answered from the in-process cache.
    pub cache_hit_count: u64,
    /// Number of whole-batch failures.
    pub batch_load_exception_count: u64,
    /// Number of keys that resolved with an error.
    pub load_error_count: u64,
}

impl Statistics {
    fn ratio(numerator: u64, denominator: u64) -> f64 {
        if denominator == 0 {
            0.0
        } else {
            numerator as f64 / denominator as f64
        }
    }

    pub fn batch_load_ratio(&self) -> f64 {
        Self::ratio(self.batch_load_count, self.load_count)
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        Self::ratio(self.cache_hit_count, self.load_count)
    }

    pub fn cache_miss_count(&self) -> u64 {
        self.load_count.saturating_sub(self.cache_hit_count)
    }

    pub fn batch_load_exception_ratio(&self) -> f64 {
        Self::ratio(self.batch_load_exception_count, self.load_count)
    }

    pub fn load_error_ratio(&self) -> f64 {
        Self::ratio(self.load_error_count, self.load_count)
    }

    /// Sums two snapshots, e.g. to report on every loader in a registry.
    pub fn combine(&self, other: &Statistics) -> Statistics {
        Statistics {
            load_count: self.load_count + other.load_count,
            batch_invoke_count: self.batch_invoke_count + other.batch_invoke_count,
            batch_load_count: self.batch_load_count + other.batch_load_count,
            cache_hit_count: self.cache_hit_count + other.cache_hit_count,
            batch_load_exception_count: self.batch_load_exception_count
                + other.batch_load_exception_count,
            load_error_count: self.load_error_count + other.load_error_count,
        }
    }
}
