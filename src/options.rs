use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    cache::CacheMap,
    environment::BatchContext,
    instrumentation::DataLoaderInstrumentation,
    scheduler::BatchLoaderScheduler,
    stats::{NoOpStatisticsCollector, StatisticsCollector},
    value_cache::ValueCache,
};

/// Derives the cache key used for coalescing from a requested key.
pub type CacheKeyFn<K> = Arc<dyn Fn(&K) -> K + Send + Sync>;

/// Produces the [`BatchContext`] for each batch function invocation.
pub type BatchContextProvider = Arc<dyn Fn() -> Option<BatchContext> + Send + Sync>;

/// Configuration for a [`DataLoader`](crate::DataLoader).
///
/// ```
/// use dataload_engine::DataLoaderOptions;
///
/// let options = DataLoaderOptions::<i64, String>::new()
///     .with_max_batch_size(50)
///     .with_caching_errors(false)
///     .with_name("users");
/// assert_eq!(options.max_batch_size(), Some(50));
/// ```
pub struct DataLoaderOptions<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) batching_enabled: bool,
    pub(crate) caching_enabled: bool,
    pub(crate) caching_errors_enabled: bool,
    pub(crate) max_batch_size: Option<usize>,
    pub(crate) cache_key_fn: Option<CacheKeyFn<K>>,
    pub(crate) cache_map: Option<Box<dyn CacheMap<K, V>>>,
    pub(crate) value_cache: Option<Arc<dyn ValueCache<K, V>>>,
    pub(crate) complete_value_after_cache_set: bool,
    pub(crate) batch_context: Option<BatchContextProvider>,
    pub(crate) scheduler: Option<Arc<dyn BatchLoaderScheduler>>,
    pub(crate) statistics: Arc<dyn StatisticsCollector>,
    pub(crate) instrumentation: Option<Arc<dyn DataLoaderInstrumentation>>,
    pub(crate) name: Option<String>,
    pub(crate) runtime: Option<Handle>,
}

impl<K, V> Default for DataLoaderOptions<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            batching_enabled: true,
            caching_enabled: true,
            caching_errors_enabled: true,
            max_batch_size: None,
            cache_key_fn: None,
            cache_map: None,
            value_cache: None,
            complete_value_after_cache_set: false,
            batch_context: None,
            scheduler: None,
            statistics: Arc::new(NoOpStatisticsCollector),
            instrumentation: None,
            name: None,
            runtime: None,
        }
    }
}

impl<K, V> DataLoaderOptions<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, every `load` invokes the batch function immediately with a single key.
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    /// When disabled, nothing is coalesced or remembered and the value cache is bypassed.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// When disabled, keys that fail individually are evicted so the next `load` retries them.
    pub fn with_caching_errors(mut self, enabled: bool) -> Self {
        self.caching_errors_enabled = enabled;
        self
    }

    /// Splits each dispatch into batch function calls of at most `size` keys. `0` means
    /// unbounded.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = if size == 0 { None } else { Some(size) };
        self
    }

    pub fn with_cache_key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> K + Send + Sync + 'static,
    {
        self.cache_key_fn = Some(Arc::new(f));
        self
    }

    pub fn with_cache_map<C>(mut self, cache_map: C) -> Self
    where
        C: CacheMap<K, V> + 'static,
    {
        self.cache_map = Some(Box::new(cache_map));
        self
    }

    pub fn with_value_cache(mut self, value_cache: Arc<dyn ValueCache<K, V>>) -> Self {
        self.value_cache = Some(value_cache);
        self
    }

    /// Holds back completion of freshly loaded values until the value cache write has settled.
    pub fn with_complete_value_after_cache_set(mut self, enabled: bool) -> Self {
        self.complete_value_after_cache_set = enabled;
        self
    }

    pub fn with_batch_context<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<BatchContext> + Send + Sync + 'static,
    {
        self.batch_context = Some(Arc::new(provider));
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn BatchLoaderScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsCollector>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_instrumentation(
        mut self,
        instrumentation: Arc<dyn DataLoaderInstrumentation>,
    ) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runtime that dispatch work is spawned onto. Defaults to the runtime current at the call
    /// site.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn batching_enabled(&self) -> bool {
        self.batching_enabled
    }

    pub fn caching_enabled(&self) -> bool {
        self.caching_enabled
    }

    pub fn caching_errors_enabled(&self) -> bool {
        self.caching_errors_enabled
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    pub fn complete_value_after_cache_set(&self) -> bool {
        self.complete_value_after_cache_set
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<K, V> fmt::Debug for DataLoaderOptions<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderOptions")
            .field("batching_enabled", &self.batching_enabled)
            .field("caching_enabled", &self.caching_enabled)
            .field("caching_errors_enabled", &self.caching_errors_enabled)
            .field("max_batch_size", &self.max_batch_size)
            .field("value_cache", &self.value_cache.is_some())
            .field("complete_value_after_cache_set", &self.complete_value_after_cache_set)
            .field("scheduler", &self.scheduler.is_some())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
