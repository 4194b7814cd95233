use std::any::Any;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use tokio::time::Instant;

use crate::{
    batch_function::{
        BatchFunction, BatchLoader, BatchPublisher, MappedBatchFunction, MappedBatchPublisher,
    },
    dispatchable::Dispatchable,
    environment::KeyContext,
    error::LoadError,
    future::{DispatchResult, LoadFuture, Loaded},
    loader_worker::LoaderWorker,
    options::DataLoaderOptions,
    stats::Statistics,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Callers use [`DataLoader::load`] and [`DataLoader::load_many`] to request values. Requests for
/// the same cache key share one handle, and distinct keys are queued until
/// [`DataLoader::dispatch`] hands them to the batch function in as few calls as possible. The
/// cache can be cleared with [`DataLoader::clear`] and [`DataLoader::clear_all`], and values can be
/// added out-of-band with [`DataLoader::prime`] and [`DataLoader::prime_many`].
///
/// A `DataLoader` is cheap to clone; clones share the queue and the cache. It is meant to live
/// for one logical unit of work, such as a single request.
///
/// ```
/// use async_trait::async_trait;
/// use dataload_engine::{
///     BatchEnvironment, BatchFunction, DataLoader, DataLoaderOptions, LoadError, Loaded,
/// };
///
/// struct Squares;
///
/// #[async_trait]
/// impl BatchFunction<u64, u64> for Squares {
///     async fn load(
///         &self,
///         keys: &[u64],
///         _env: &BatchEnvironment<u64>,
///     ) -> Result<Vec<Loaded<u64>>, LoadError> {
///         Ok(keys.iter().map(|k| Ok(Some(k * k))).collect())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let loader = DataLoader::new(Squares, DataLoaderOptions::new());
/// let three = loader.load(3);
/// let four = loader.load(4);
/// loader.dispatch().await;
/// assert_eq!(three.await.unwrap(), Some(9));
/// assert_eq!(four.await.unwrap(), Some(16));
/// # }
/// ```
pub struct DataLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<LoaderWorker<K, V>>,
}

impl<K, V> Clone for DataLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader around a list-shaped batch function.
    pub fn new<F>(batch_fn: F, options: DataLoaderOptions<K, V>) -> Self
    where
        F: BatchFunction<K, V> + 'static,
    {
        Self::with_batch_loader(BatchLoader::List(Arc::new(batch_fn)), options)
    }

    /// Creates a loader around a map-shaped batch function.
    pub fn mapped<F>(batch_fn: F, options: DataLoaderOptions<K, V>) -> Self
    where
        F: MappedBatchFunction<K, V> + 'static,
    {
        Self::with_batch_loader(BatchLoader::Mapped(Arc::new(batch_fn)), options)
    }

    /// Creates a loader around a publisher that streams values in key order.
    pub fn publisher<F>(publisher: F, options: DataLoaderOptions<K, V>) -> Self
    where
        F: BatchPublisher<K, V> + 'static,
    {
        Self::with_batch_loader(BatchLoader::Publisher(Arc::new(publisher)), options)
    }

    /// Creates a loader around a publisher that streams `(key, value)` entries.
    pub fn mapped_publisher<F>(publisher: F, options: DataLoaderOptions<K, V>) -> Self
    where
        F: MappedBatchPublisher<K, V> + 'static,
    {
        Self::with_batch_loader(BatchLoader::MappedPublisher(Arc::new(publisher)), options)
    }

    fn with_batch_loader(
        batch_loader: BatchLoader<K, V>,
        options: DataLoaderOptions<K, V>,
    ) -> Self {
        Self { inner: Arc::new(LoaderWorker::new(batch_loader, options)) }
    }

    pub(crate) fn from_worker(inner: Arc<LoaderWorker<K, V>>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Requests the value for `key`.
    ///
    /// If the cache already holds a handle for the key's cache key it is returned as is.
    /// Otherwise the key is queued and the handle resolves after the next dispatch. With batching
    /// disabled the batch function is invoked right away with just this key.
    pub fn load(&self, key: K) -> LoadFuture<V> {
        self.inner.load(key, None)
    }

    /// Like [`DataLoader::load`], passing `context` through to the batch function's
    /// [`BatchEnvironment`](crate::BatchEnvironment).
    pub fn load_with_context(&self, key: K, context: KeyContext) -> LoadFuture<V> {
        self.inner.load(key, Some(context))
    }

    /// Requests many keys at once. The keys are queued immediately; the returned future fails
    /// with the first error if any key fails.
    pub fn load_many<I>(
        &self,
        keys: I,
    ) -> impl Future<Output = Result<Vec<Option<V>>, LoadError>> + Send + 'static
    where
        I: IntoIterator<Item = K>,
    {
        let handles = keys.into_iter().map(|key| self.load(key)).collect::<Vec<_>>();
        future::try_join_all(handles)
    }

    /// Like [`DataLoader::load_many`], with a call context per key.
    pub fn load_many_with_contexts<I>(
        &self,
        keys: I,
    ) -> impl Future<Output = Result<Vec<Option<V>>, LoadError>> + Send + 'static
    where
        I: IntoIterator<Item = (K, Option<KeyContext>)>,
    {
        let handles = keys
            .into_iter()
            .map(|(key, context)| self.inner.load(key, context))
            .collect::<Vec<_>>();
        future::try_join_all(handles)
    }

    /// Requests many keys at once and reports every key's outcome, successful or not.
    pub fn load_many_settled<I>(
        &self,
        keys: I,
    ) -> impl Future<Output = Vec<Loaded<V>>> + Send + 'static
    where
        I: IntoIterator<Item = K>,
    {
        let handles = keys.into_iter().map(|key| self.load(key)).collect::<Vec<_>>();
        future::join_all(handles)
    }

    /// Caches `value` for `key` unless the key is already cached.
    pub fn prime(&self, key: K, value: V) -> &Self {
        self.inner.prime(&key, Ok(Some(value)));
        self
    }

    /// Caches a failure for `key` unless the key is already cached.
    pub fn prime_error(&self, key: K, error: LoadError) -> &Self {
        self.inner.prime(&key, Err(error));
        self
    }

    pub fn prime_many<I>(&self, key_vals: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in key_vals {
            self.inner.prime(&key, Ok(Some(value)));
        }
        self
    }

    /// Removes `key` from the cache (and from the value cache, if any) so it is reloaded when it
    /// is next requested. A request already queued for dispatch is unaffected.
    pub fn clear(&self, key: K) -> &Self {
        self.inner.clear_many(vec![key]);
        self
    }

    pub fn clear_many<I>(&self, keys: I) -> &Self
    where
        I: IntoIterator<Item = K>,
    {
        self.inner.clear_many(keys.into_iter().collect());
        self
    }

    /// Empties the cache (and the value cache, if any).
    pub fn clear_all(&self) -> &Self {
        self.inner.clear_all();
        self
    }

    /// Returns the cached handle for `key` without queueing anything.
    pub fn get_if_present(&self, key: &K) -> Option<LoadFuture<V>> {
        self.inner.get_if_present(key)
    }

    /// Returns the cached handle for `key` only if it has already resolved.
    pub fn get_if_completed(&self, key: &K) -> Option<LoadFuture<V>> {
        self.get_if_present(key).filter(LoadFuture::is_done)
    }

    /// The key used for coalescing and caching `key`.
    pub fn cache_key(&self, key: &K) -> K {
        self.inner.cache_key(key)
    }

    /// Dispatches every queued key to the batch function.
    ///
    /// The returned future yields each drained key's result, in queue order. The batch work
    /// itself is spawned onto the runtime, so dropping the future does not cancel it. When no
    /// runtime is reachable the work only runs while the future is polled.
    pub fn dispatch(&self) -> BoxFuture<'static, Vec<Loaded<V>>> {
        self.dispatch_with_counts().into_values()
    }

    /// Like [`DataLoader::dispatch`], additionally reporting how many queued entries were drained.
    pub fn dispatch_with_counts(&self) -> DispatchResult<V> {
        self.inner.dispatch()
    }

    /// Dispatches until the queue stays empty, including keys queued by callers reacting to
    /// earlier results, and returns every result.
    pub async fn dispatch_and_join(&self) -> Vec<Loaded<V>> {
        let mut results = self.dispatch().await;
        while self.dispatch_depth() > 0 {
            results.extend(self.dispatch().await);
        }
        results
    }

    /// Number of requests queued for the next dispatch.
    pub fn dispatch_depth(&self) -> usize {
        self.inner.dispatch_depth()
    }

    pub fn last_dispatch_time(&self) -> Instant {
        self.inner.last_dispatch_time()
    }

    pub fn time_since_dispatch(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_dispatch_time())
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.statistics()
    }
}

impl<K, V> Dispatchable for DataLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn dispatch_keys(&self) -> usize {
        self.inner.dispatch_detached()
    }

    fn dispatch_depth(&self) -> usize {
        self.inner.dispatch_depth()
    }

    fn time_since_dispatch(&self) -> Duration {
        DataLoader::time_since_dispatch(self)
    }

    fn statistics(&self) -> Statistics {
        self.inner.statistics()
    }

    fn is_same(&self, other: &dyn Dispatchable) -> bool {
        other
            .as_any()
            .downcast_ref::<DataLoader<K, V>>()
            .map_or(false, |other| Arc::ptr_eq(&self.inner, &other.inner))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K, V> fmt::Debug for DataLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("name", &self.inner.name())
            .field("dispatch_depth", &self.inner.dispatch_depth())
            .finish()
    }
}
