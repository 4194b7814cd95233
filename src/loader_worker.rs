use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchLoader,
    cache::CacheMap,
    environment::{BatchEnvironment, KeyContext},
    error::LoadError,
    future::{pending, Completer, DispatchResult, LoadFuture, Loaded},
    instrumentation::InstrumentationContext,
    load_request::{BatchParts, LoadRequest},
    loader::DataLoader,
    options::DataLoaderOptions,
    reconciler::{partition, reconcile_list, reconcile_map, BatchOutcomeSink},
    scheduler::ScheduledBatchLoaderCall,
    stats::Statistics,
    subscriber::{BatchSubscriber, MappedBatchSubscriber, SubscriberDone},
    value_cache::ValueCache,
};

/// A `LoaderWorker` holds everything the clones of one [`DataLoader`] share and does the actual
/// loading work.
///
/// Keys move through three stages:
///
/// 1. Queued. `load` either returns the handle already cached for the key, or creates a new one,
///    caches it and appends the request to the queue. Nothing runs yet.
/// 2. Drained. `dispatch` swaps the queue for an empty one under the same lock that `load` uses,
///    so every queued request is drained exactly once. The drained requests are sliced into
///    groups of at most `max_batch_size`.
/// 3. Executed. Each group first consults the value cache, if one is configured, then hands the
///    remaining keys to the batch function (through the scheduler, if one is configured). The
///    results are reconciled against the queued requests and their handles are completed.
///
/// Stage 3 runs as one task per dispatch on the configured runtime, or lazily inside the
/// returned future when no runtime is reachable.
pub(crate) struct LoaderWorker<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    batch_loader: BatchLoader<K, V>,
    options: DataLoaderOptions<K, V>,
    state: Mutex<LoaderState<K, V>>,
}

/// Work to spawn on a runtime once the state lock has been released.
type DeferredSpawn = (Handle, BoxFuture<'static, ()>);

struct LoaderState<K, V> {
    cache: Box<dyn CacheMap<K, V>>,
    queue: Vec<LoadRequest<K, V>>,
    last_dispatch: Instant,
}

impl<K, V> LoaderWorker<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        batch_loader: BatchLoader<K, V>,
        mut options: DataLoaderOptions<K, V>,
    ) -> Self {
        let cache = options
            .cache_map
            .take()
            .unwrap_or_else(|| Box::new(HashMap::<K, LoadFuture<V>>::new()));
        Self {
            batch_loader,
            options,
            state: Mutex::new(LoaderState {
                cache,
                queue: Vec::new(),
                last_dispatch: Instant::now(),
            }),
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    pub(crate) fn statistics(&self) -> Statistics {
        self.options.statistics.statistics()
    }

    pub(crate) fn cache_key(&self, key: &K) -> K {
        match &self.options.cache_key_fn {
            Some(f) => f(key),
            None => key.clone(),
        }
    }

    pub(crate) fn dispatch_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn last_dispatch_time(&self) -> Instant {
        self.state.lock().last_dispatch
    }

    fn runtime(&self) -> Option<Handle> {
        self.options.runtime.clone().or_else(|| Handle::try_current().ok())
    }

    fn loader(self: &Arc<Self>) -> DataLoader<K, V> {
        DataLoader::from_worker(Arc::clone(self))
    }

    fn sink(self: &Arc<Self>) -> Arc<dyn BatchOutcomeSink<K>> {
        Arc::clone(self) as Arc<dyn BatchOutcomeSink<K>>
    }

    pub(crate) fn load(self: &Arc<Self>, key: K, context: Option<KeyContext>) -> LoadFuture<V> {
        let mut instrumentation = self
            .options
            .instrumentation
            .as_ref()
            .and_then(|i| i.begin_load(&self.loader(), &key));
        if let Some(ctx) = &instrumentation {
            ctx.on_dispatched();
        }

        let mut state = self.state.lock();
        self.options.statistics.increment_load_count();
        let cache_key =
            if self.options.caching_enabled { Some(self.cache_key(&key)) } else { None };
        let cached = cache_key.as_ref().and_then(|k| state.cache.get(k));
        if let Some(cached) = cached {
            drop(state);
            self.options.statistics.increment_cache_hit_count();
            tracing::trace!(?key, "load served from cache");
            if let Some(ctx) = instrumentation {
                self.report_when_done(cached.clone(), ctx);
            }
            return cached;
        }

        let (completer, handle) = pending();
        let mut completer = completer.with_instrumentation(instrumentation.take());
        // A lazily executed unbatched load keeps its completer inside the cached handle, where
        // the hook would run while the state lock is held.
        let lazy = !self.options.batching_enabled && self.runtime().is_none();
        if let Some(cache_key) = cache_key.as_ref().filter(|_| !lazy) {
            let worker = Arc::downgrade(self);
            let cache_key = cache_key.clone();
            let abandoned = handle.clone();
            completer = completer.on_abandon(move || {
                if let Some(worker) = worker.upgrade() {
                    worker.evict_abandoned(&cache_key, &abandoned);
                }
            });
        }
        let request = LoadRequest { key, context, completer, handle: handle.clone() };
        let (handle, immediate) = if self.options.batching_enabled {
            state.queue.push(request);
            (handle, None)
        } else {
            self.execute_immediately(request)
        };
        if let Some(cache_key) = cache_key {
            state.cache.set(cache_key, handle.clone());
        }
        drop(state);
        if let Some((runtime, work)) = immediate {
            runtime.spawn(work);
        }
        handle
    }

    /// Drops the cache entry of a load whose completer went away unresolved, so the next load of
    /// the key retries instead of replaying `Abandoned`.
    fn evict_abandoned(&self, cache_key: &K, handle: &LoadFuture<V>) {
        let mut state = self.state.lock();
        if state.cache.get(cache_key).map_or(false, |cached| cached.same_handle(handle)) {
            state.cache.delete(cache_key);
            tracing::debug!(loader = ?self.name(), key = ?cache_key, "evicted abandoned load");
        }
    }

    fn report_when_done(&self, handle: LoadFuture<V>, ctx: Box<dyn InstrumentationContext>) {
        if let Some(result) = handle.peek() {
            ctx.on_completed(result.err().as_ref());
            return;
        }
        match self.runtime() {
            Some(runtime) => {
                runtime.spawn(async move {
                    let result = handle.await;
                    ctx.on_completed(result.err().as_ref());
                });
            }
            None => {
                tracing::trace!(
                    "no runtime to observe a cached load; completing instrumentation early"
                );
                ctx.on_completed(None);
            }
        }
    }

    /// With batching disabled every load is its own single-key batch. The returned work, if any,
    /// must be spawned once the state lock is released.
    fn execute_immediately(
        self: &Arc<Self>,
        request: LoadRequest<K, V>,
    ) -> (LoadFuture<V>, Option<DeferredSpawn>) {
        let handle = request.handle.clone();
        let work = Arc::clone(self).execute_load(vec![request]).boxed();
        match self.runtime() {
            Some(runtime) => (handle, Some((runtime, work))),
            None => {
                let lazy = LoadFuture::from_future(async move {
                    let ((), result) = futures::join!(work, handle);
                    result
                });
                (lazy, None)
            }
        }
    }

    pub(crate) fn prime(&self, key: &K, result: Loaded<V>) {
        let cache_key = self.cache_key(key);
        let mut state = self.state.lock();
        if !state.cache.contains_key(&cache_key) {
            state.cache.set(cache_key, LoadFuture::ready(result));
        }
    }

    pub(crate) fn get_if_present(&self, key: &K) -> Option<LoadFuture<V>> {
        if !self.options.caching_enabled {
            return None;
        }
        let cache_key = self.cache_key(key);
        let cached = self.state.lock().cache.get(&cache_key);
        if cached.is_some() {
            self.options.statistics.increment_cache_hit_count();
        }
        cached
    }

    pub(crate) fn clear_many(&self, keys: Vec<K>) {
        {
            let mut state = self.state.lock();
            for key in &keys {
                state.cache.delete(&self.cache_key(key));
            }
        }
        if let Some(value_cache) = &self.options.value_cache {
            let value_cache = Arc::clone(value_cache);
            self.spawn_detached(
                async move {
                    for key in &keys {
                        if let Err(e) = value_cache.delete(key).await {
                            if !e.is_miss() {
                                tracing::warn!(%e, ?key, "value cache delete failed");
                            }
                        }
                    }
                }
                .boxed(),
            );
        }
    }

    pub(crate) fn clear_all(&self) {
        self.state.lock().cache.clear();
        if let Some(value_cache) = &self.options.value_cache {
            let value_cache = Arc::clone(value_cache);
            self.spawn_detached(
                async move {
                    if let Err(e) = value_cache.clear().await {
                        if !e.is_miss() {
                            tracing::warn!(%e, "value cache clear failed");
                        }
                    }
                }
                .boxed(),
            );
        }
    }

    fn spawn_detached(&self, fut: BoxFuture<'static, ()>) {
        match self.runtime() {
            Some(runtime) => {
                runtime.spawn(fut);
            }
            None => tracing::debug!(
                loader = ?self.name(),
                "no runtime available; skipping value cache update"
            ),
        }
    }

    async fn run_detached(&self, fut: BoxFuture<'static, ()>) {
        match self.runtime() {
            Some(runtime) => {
                runtime.spawn(fut);
            }
            None => fut.await,
        }
    }

    pub(crate) fn dispatch(self: &Arc<Self>) -> DispatchResult<V> {
        let drained = {
            let mut state = self.state.lock();
            state.last_dispatch = Instant::now();
            std::mem::take(&mut state.queue)
        };
        if drained.is_empty() {
            return DispatchResult::empty();
        }

        let keys_count = drained.len();
        let handles = drained.iter().map(|r| r.handle.clone()).collect::<Vec<_>>();
        let groups = partition(drained, self.options.max_batch_size);
        tracing::debug!(
            loader = ?self.name(),
            keys_count,
            groups = groups.len(),
            "dispatching queued loads"
        );

        let instrumentation =
            self.options.instrumentation.as_ref().and_then(|i| i.begin_dispatch(&self.loader()));
        if let Some(ctx) = &instrumentation {
            ctx.on_dispatched();
        }

        let worker = Arc::clone(self);
        let work = async move {
            join_all(groups.into_iter().map(|group| Arc::clone(&worker).execute_load(group))).await;
            if let Some(ctx) = instrumentation {
                ctx.on_completed(None);
            }
        }
        .instrument(tracing::debug_span!("dispatch", loader = ?self.name(), keys = keys_count));

        let values = match self.runtime() {
            Some(runtime) => {
                runtime.spawn(work);
                join_all(handles).boxed()
            }
            None => async move {
                let ((), values) = futures::join!(work, join_all(handles));
                values
            }
            .boxed(),
        };
        DispatchResult::new(keys_count, values)
    }

    /// Dispatches on behalf of a registry, which never awaits the result. Without a runtime the
    /// work could only run inside the dropped result, so the queue is left alone.
    pub(crate) fn dispatch_detached(self: &Arc<Self>) -> usize {
        if self.runtime().is_none() {
            let depth = self.dispatch_depth();
            if depth > 0 {
                tracing::warn!(
                    loader = ?self.name(),
                    depth,
                    "no runtime available; leaving queued loads for an awaited dispatch"
                );
            }
            return 0;
        }
        self.dispatch().keys_count()
    }

    #[tracing::instrument(skip(self, group), fields(loader = ?self.name(), keys = group.len()))]
    async fn execute_load(self: Arc<Self>, group: Vec<LoadRequest<K, V>>) {
        let mut parts = group.into_iter().collect::<BatchParts<K, V>>();
        self.options.statistics.increment_batch_load_count_by(parts.len() as u64);

        if self.options.caching_enabled {
            if let Some(value_cache) = &self.options.value_cache {
                parts = self.resolve_from_value_cache(value_cache.as_ref(), parts).await;
                if parts.is_empty() {
                    tracing::debug!("every key was served by the value cache");
                    return;
                }
            }
        }
        self.invoke_batch_loader(parts).await;
    }

    /// Completes the keys the value cache knows and returns the rest. Any failure of the value
    /// cache as a whole is a miss for every key.
    async fn resolve_from_value_cache(
        &self,
        value_cache: &dyn ValueCache<K, V>,
        parts: BatchParts<K, V>,
    ) -> BatchParts<K, V> {
        let cached = match value_cache.get_values(&parts.keys).await {
            Ok(cached) if cached.len() == parts.len() => cached,
            Ok(cached) => {
                tracing::warn!(
                    keys = parts.len(),
                    values = cached.len(),
                    "value cache returned a different number of values than keys; ignoring it"
                );
                return parts;
            }
            Err(e) => {
                if !e.is_miss() {
                    tracing::warn!(
                        %e,
                        "value cache lookup failed; falling back to the batch function"
                    );
                }
                return parts;
            }
        };

        let BatchParts { keys, contexts, completers } = parts;
        let mut missed = BatchParts::with_capacity(keys.len());
        let mut hits = 0usize;
        for (((key, context), mut completer), cached) in
            keys.into_iter().zip(contexts).zip(completers).zip(cached)
        {
            match cached {
                Ok(value) => {
                    hits += 1;
                    completer.complete(Ok(Some(value)));
                }
                Err(e) => {
                    if !e.is_miss() {
                        tracing::debug!(%e, ?key, "value cache get failed");
                    }
                    missed.push(key, context, completer);
                }
            }
        }
        tracing::debug!(hits, misses = missed.len(), "consulted value cache");
        missed
    }

    async fn invoke_batch_loader(self: &Arc<Self>, parts: BatchParts<K, V>) {
        let BatchParts { keys, contexts, completers } = parts;
        let key_count = keys.len();
        let context = self.options.batch_context.as_ref().and_then(|provider| provider());
        let env = BatchEnvironment::new(context, &keys, contexts);

        let instrumentation = self
            .options
            .instrumentation
            .as_ref()
            .and_then(|i| i.begin_batch_loader(&self.loader(), key_count));
        if let Some(ctx) = &instrumentation {
            ctx.on_dispatched();
        }
        tracing::debug!(kind = self.batch_loader.kind(), ?keys, "invoking batch function");

        match &self.batch_loader {
            BatchLoader::List(batch_fn) => {
                let batch_fn = Arc::clone(batch_fn);
                let call_keys = keys.clone();
                let result = self
                    .run_scheduled(key_count, async move { batch_fn.load(&call_keys, &env).await })
                    .await
                    .unwrap_or(Err(LoadError::Abandoned))
                    .and_then(|values| reconcile_list(key_count, values));
                self.complete_batch(keys, completers, result, instrumentation).await;
            }
            BatchLoader::Mapped(batch_fn) => {
                let batch_fn = Arc::clone(batch_fn);
                let key_set = keys.iter().cloned().collect::<HashSet<_>>();
                let result = self
                    .run_scheduled(key_count, async move { batch_fn.load(&key_set, &env).await })
                    .await
                    .unwrap_or(Err(LoadError::Abandoned))
                    .map(|values| reconcile_map(&keys, values));
                self.complete_batch(keys, completers, result, instrumentation).await;
            }
            BatchLoader::Publisher(publisher) => {
                let (subscriber, done) =
                    BatchSubscriber::new(keys.clone(), completers, self.sink());
                let publisher = Arc::clone(publisher);
                let call_keys = keys.clone();
                self.run_scheduled(key_count, async move {
                    publisher.load(call_keys, subscriber, env)
                })
                .await;
                self.finish_streamed(keys, done, instrumentation).await;
            }
            BatchLoader::MappedPublisher(publisher) => {
                let (subscriber, done) =
                    MappedBatchSubscriber::new(keys.clone(), completers, self.sink());
                let publisher = Arc::clone(publisher);
                let call_keys = keys.clone();
                self.run_scheduled(key_count, async move {
                    publisher.load(call_keys, subscriber, env)
                })
                .await;
                self.finish_streamed(keys, done, instrumentation).await;
            }
        }
    }

    /// Runs `call` through the scheduler, if any. Returns `None` when the scheduler dropped the
    /// call without running it.
    async fn run_scheduled<T, F>(&self, key_count: usize, call: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let scheduler = match &self.options.scheduler {
            Some(scheduler) => scheduler,
            None => return Some(call.await),
        };
        let (tx, rx) = oneshot::channel();
        let call = ScheduledBatchLoaderCall::new(
            key_count,
            async move {
                let _ = tx.send(call.await);
            }
            .boxed(),
        );
        scheduler.schedule(call).await;
        let result = rx.await.ok();
        if result.is_none() {
            tracing::warn!(key_count, "scheduler dropped a batch call without running it");
        }
        result
    }

    async fn complete_batch(
        &self,
        keys: Vec<K>,
        mut completers: Vec<Completer<V>>,
        result: Result<Vec<Loaded<V>>, LoadError>,
        instrumentation: Option<Box<dyn InstrumentationContext>>,
    ) {
        let values = match result {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(%error, keys = keys.len(), "batch load failed");
                self.batch_failed();
                if let Some(ctx) = instrumentation {
                    ctx.on_completed(Some(&error));
                }
                self.evict(keys, true);
                for completer in completers.iter_mut() {
                    completer.complete(Err(error.clone()));
                }
                return;
            }
        };
        if let Some(ctx) = instrumentation {
            ctx.on_completed(None);
        }

        let mut write = self.value_cache_write(&keys, &values);
        if self.options.complete_value_after_cache_set {
            if let Some(write) = write.take() {
                write.await;
            }
        }

        let failed = keys
            .iter()
            .zip(values.iter())
            .filter(|(_, value)| value.is_err())
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        if !failed.is_empty() {
            tracing::debug!(?failed, "keys failed to load");
            for _ in &failed {
                self.key_failed();
            }
            self.evict(failed, false);
        }
        for (completer, value) in completers.iter_mut().zip(values) {
            completer.complete(value);
        }

        if let Some(write) = write {
            self.run_detached(write).await;
        }
    }

    /// Streaming batches complete their handles from the subscriber; all that is left is to
    /// store what was loaded.
    async fn finish_streamed(
        &self,
        keys: Vec<K>,
        done: SubscriberDone<V>,
        instrumentation: Option<Box<dyn InstrumentationContext>>,
    ) {
        let outcome = done.await.unwrap_or(Err(LoadError::Abandoned));
        if let Some(ctx) = instrumentation {
            ctx.on_completed(outcome.as_ref().err());
        }
        if let Ok(values) = outcome {
            if let Some(write) = self.value_cache_write(&keys, &values) {
                write.await;
            }
        }
    }

    /// Builds the write of freshly loaded values to the value cache. Only values the batch
    /// function actually produced are stored.
    fn value_cache_write(
        &self,
        keys: &[K],
        values: &[Loaded<V>],
    ) -> Option<BoxFuture<'static, ()>> {
        if !self.options.caching_enabled {
            return None;
        }
        let value_cache = Arc::clone(self.options.value_cache.as_ref()?);
        let entries = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| match value {
                Ok(Some(value)) => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return None;
        }
        Some(
            async move {
                match value_cache.set_values(&entries).await {
                    Ok(()) => {
                        tracing::trace!(entries = entries.len(), "stored values in value cache")
                    }
                    Err(e) if e.is_miss() => {}
                    Err(e) => tracing::warn!(%e, "value cache write failed"),
                }
            }
            .boxed(),
        )
    }
}

impl<K, V> BatchOutcomeSink<K> for LoaderWorker<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn key_failed(&self) {
        self.options.statistics.increment_load_error_count();
    }

    fn batch_failed(&self) {
        self.options.statistics.increment_batch_load_exception_count();
    }

    fn evict(&self, keys: Vec<K>, whole_batch: bool) {
        if whole_batch || !self.options.caching_errors_enabled {
            self.clear_many(keys);
        }
    }
}

impl<K, V> Drop for LoaderWorker<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        tracing::debug!(
            loader = ?self.name(),
            statistics = ?self.statistics(),
            "data loader dropped"
        );
    }
}
