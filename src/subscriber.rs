//! Reconciliation for batch functions that push their results incrementally.
//!
//! A subscriber moves from receiving to either completed or errored, and every signal after
//! that is rejected with a [`SubscriberError`]. Handles resolve as soon as their value arrives.
//! All signals on one subscriber are serialized by a mutex that is held only while local state
//! changes and handles are completed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    error::{LoadError, SubscriberError},
    future::{Completer, Loaded},
    reconciler::BatchOutcomeSink,
};

/// Reported to the loader once the subscriber has finished: every key's result in key order,
/// or the error that ended the batch.
pub(crate) type SubscriberDone<V> = oneshot::Receiver<Result<Vec<Loaded<V>>, LoadError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Receiving,
    Completed,
    Errored,
}

impl Phase {
    fn check(self, signal: &'static str) -> Result<(), SubscriberError> {
        let result = match self {
            Phase::Receiving => Ok(()),
            Phase::Completed => Err(SubscriberError::AlreadyCompleted { signal }),
            Phase::Errored => Err(SubscriberError::AlreadyErrored { signal }),
        };
        if let Err(ref e) = result {
            tracing::error!(%e, "batch subscriber signalled out of sequence");
        }
        result
    }
}

/// State shared by both addressing modes.
struct Core<K, V> {
    phase: Phase,
    keys: Vec<K>,
    completers: Vec<Completer<V>>,
    done: Option<oneshot::Sender<Result<Vec<Loaded<V>>, LoadError>>>,
    sink: Arc<dyn BatchOutcomeSink<K>>,
}

impl<K, V> Core<K, V>
where
    K: Clone,
    V: Clone,
{
    fn new(
        keys: Vec<K>,
        completers: Vec<Completer<V>>,
        sink: Arc<dyn BatchOutcomeSink<K>>,
    ) -> (Self, SubscriberDone<V>) {
        let (tx, rx) = oneshot::channel();
        (Self { phase: Phase::Receiving, keys, completers, done: Some(tx), sink }, rx)
    }

    /// Resolves one handle. Failed keys are evicted before the handle completes so a caller
    /// woken by the failure already sees the eviction.
    fn resolve(&mut self, idx: usize, value: Loaded<V>) {
        if value.is_err() {
            self.sink.key_failed();
            self.sink.evict(vec![self.keys[idx].clone()], false);
        }
        self.completers[idx].complete(value);
    }

    fn fail_unresolved(&mut self, error: &LoadError) {
        let unresolved = (0..self.completers.len())
            .filter(|&i| !self.completers[i].is_done())
            .collect::<Vec<_>>();
        if unresolved.is_empty() {
            return;
        }
        self.sink.evict(unresolved.iter().map(|&i| self.keys[i].clone()).collect(), true);
        for i in unresolved {
            self.completers[i].complete(Err(error.clone()));
        }
    }

    fn error(&mut self, error: LoadError) {
        self.phase = Phase::Errored;
        tracing::debug!(%error, keys = self.keys.len(), "batch publisher failed");
        self.sink.batch_failed();
        self.fail_unresolved(&error);
        self.finish(Err(error));
    }

    fn finish(&mut self, result: Result<Vec<Loaded<V>>, LoadError>) {
        if let Some(done) = self.done.take() {
            // The loader may have stopped waiting; the handles are already resolved.
            let _ = done.send(result);
        }
    }
}

impl<K, V> Drop for Core<K, V> {
    fn drop(&mut self) {
        if self.phase != Phase::Receiving {
            return;
        }
        tracing::warn!(keys = self.keys.len(), "batch subscriber dropped before completion");
        let mut evicted = Vec::new();
        let mut unresolved = Vec::new();
        let keys = std::mem::take(&mut self.keys);
        for (key, completer) in keys.into_iter().zip(self.completers.iter_mut()) {
            if !completer.is_done() {
                evicted.push(key);
                unresolved.push(completer);
            }
        }
        if !evicted.is_empty() {
            self.sink.evict(evicted, true);
        }
        for completer in unresolved {
            completer.complete(Err(LoadError::Abandoned));
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(Err(LoadError::Abandoned));
        }
    }
}

struct ListState<K, V> {
    core: Core<K, V>,
    received: Vec<Loaded<V>>,
}

/// Receives the values of a [`BatchPublisher`](crate::BatchPublisher) in key order.
///
/// Clones share state, so a publisher may signal from several tasks.
pub struct BatchSubscriber<K, V> {
    state: Arc<Mutex<ListState<K, V>>>,
}

impl<K, V> Clone for BatchSubscriber<K, V> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<K, V> BatchSubscriber<K, V>
where
    K: Clone,
    V: Clone,
{
    pub(crate) fn new(
        keys: Vec<K>,
        completers: Vec<Completer<V>>,
        sink: Arc<dyn BatchOutcomeSink<K>>,
    ) -> (Self, SubscriberDone<V>) {
        let (core, done) = Core::new(keys, completers, sink);
        let received = Vec::with_capacity(core.keys.len());
        (Self { state: Arc::new(Mutex::new(ListState { core, received })) }, done)
    }

    /// Delivers the value for the next key in order.
    pub fn on_next(&self, value: Loaded<V>) -> Result<(), SubscriberError> {
        let mut state = self.state.lock();
        state.core.phase.check("on_next")?;
        let idx = state.received.len();
        if idx >= state.core.keys.len() {
            tracing::warn!(
                keys = state.core.keys.len(),
                "ignoring value beyond the requested keys"
            );
            return Ok(());
        }
        state.core.resolve(idx, value.clone());
        state.received.push(value);
        Ok(())
    }

    /// Ends the batch. Keys that never received a value fail with
    /// [`LoadError::SizeMismatch`].
    pub fn on_complete(&self) -> Result<(), SubscriberError> {
        let mut state = self.state.lock();
        state.core.phase.check("on_complete")?;
        state.core.phase = Phase::Completed;

        let keys = state.core.keys.len();
        let values = state.received.len();
        if values < keys {
            let error = LoadError::SizeMismatch { keys, values };
            tracing::warn!(%error, "batch publisher completed early");
            state.core.sink.batch_failed();
            state.core.fail_unresolved(&error);
            state.core.finish(Err(error));
        } else {
            let received = std::mem::take(&mut state.received);
            state.core.finish(Ok(received));
        }
        Ok(())
    }

    /// Ends the batch with a failure. Keys that already have a value keep it; the rest fail
    /// with `error` and are evicted from the cache.
    pub fn on_error(&self, error: LoadError) -> Result<(), SubscriberError> {
        let mut state = self.state.lock();
        state.core.phase.check("on_error")?;
        state.core.error(error);
        Ok(())
    }

    /// Feeds every item of `stream` to [`BatchSubscriber::on_next`], then completes.
    pub async fn consume<S>(self, stream: S) -> Result<(), SubscriberError>
    where
        S: Stream<Item = Loaded<V>>,
    {
        futures::pin_mut!(stream);
        while let Some(value) = stream.next().await {
            self.on_next(value)?;
        }
        self.on_complete()
    }
}

struct MapState<K, V> {
    core: Core<K, V>,
    positions: HashMap<K, Vec<usize>>,
    completed: HashMap<K, Loaded<V>>,
}

/// Receives `(key, value)` entries from a [`MappedBatchPublisher`](crate::MappedBatchPublisher)
/// in any order.
pub struct MappedBatchSubscriber<K, V> {
    state: Arc<Mutex<MapState<K, V>>>,
}

impl<K, V> Clone for MappedBatchSubscriber<K, V> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<K, V> MappedBatchSubscriber<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(
        keys: Vec<K>,
        completers: Vec<Completer<V>>,
        sink: Arc<dyn BatchOutcomeSink<K>>,
    ) -> (Self, SubscriberDone<V>) {
        let mut positions: HashMap<K, Vec<usize>> = HashMap::with_capacity(keys.len());
        for (idx, key) in keys.iter().enumerate() {
            positions.entry(key.clone()).or_default().push(idx);
        }
        let (core, done) = Core::new(keys, completers, sink);
        let state = MapState { core, positions, completed: HashMap::new() };
        (Self { state: Arc::new(Mutex::new(state)) }, done)
    }

    /// Delivers the value for `key`, resolving every queued request for it.
    pub fn on_next(&self, key: K, value: Loaded<V>) -> Result<(), SubscriberError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.core.phase.check("on_next")?;
        let positions = match state.positions.get(&key) {
            Some(positions) => positions,
            None => {
                tracing::warn!("ignoring value for a key that was not requested");
                return Ok(());
            }
        };
        if value.is_err() && !state.completed.contains_key(&key) {
            state.core.sink.key_failed();
            state.core.sink.evict(vec![key.clone()], false);
        }
        for &idx in positions {
            state.core.completers[idx].complete(value.clone());
        }
        state.completed.entry(key).or_insert(value);
        Ok(())
    }

    /// Ends the batch. Keys that never received a value resolve to `Ok(None)`.
    pub fn on_complete(&self) -> Result<(), SubscriberError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.core.phase.check("on_complete")?;
        state.core.phase = Phase::Completed;

        let values = state
            .core
            .keys
            .iter()
            .map(|k| state.completed.get(k).cloned().unwrap_or(Ok(None)))
            .collect::<Vec<_>>();
        for completer in state.core.completers.iter_mut() {
            completer.complete(Ok(None));
        }
        state.core.finish(Ok(values));
        Ok(())
    }

    /// Ends the batch with a failure. Keys without a value fail with `error` and are evicted.
    pub fn on_error(&self, error: LoadError) -> Result<(), SubscriberError> {
        let mut state = self.state.lock();
        state.core.phase.check("on_error")?;
        state.core.error(error);
        Ok(())
    }

    /// Feeds every entry of `stream` to [`MappedBatchSubscriber::on_next`], then completes.
    pub async fn consume<S>(self, stream: S) -> Result<(), SubscriberError>
    where
        S: Stream<Item = (K, Loaded<V>)>,
    {
        futures::pin_mut!(stream);
        while let Some((key, value)) = stream.next().await {
            self.on_next(key, value)?;
        }
        self.on_complete()
    }
}
