use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::{error::LoadError, instrumentation::InstrumentationContext};

/// The outcome of loading one key: a value, "no value" (`Ok(None)`), or an error.
pub type Loaded<V> = Result<Option<V>, LoadError>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(0);

/// A cloneable handle to the eventual result of a [`DataLoader::load`](crate::DataLoader::load)
/// call.
///
/// Every caller that requests the same cache key while an entry is live receives a clone of the
/// same handle, so they all observe a single batch function result.
#[derive(Clone)]
pub struct LoadFuture<V> {
    id: u64,
    inner: Shared<BoxFuture<'static, Loaded<V>>>,
}

impl<V> LoadFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = Loaded<V>> + Send + 'static,
    {
        Self { id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed), inner: fut.boxed().shared() }
    }

    /// A handle that is already resolved.
    pub fn ready(result: Loaded<V>) -> Self {
        Self::from_future(future::ready(result))
    }

    /// Returns the result if the handle has resolved, without waiting.
    pub fn peek(&self) -> Option<Loaded<V>> {
        if let Some(result) = self.inner.peek() {
            return Some(result.clone());
        }
        self.inner.clone().now_or_never()
    }

    pub fn is_done(&self) -> bool {
        self.peek().is_some()
    }

    /// True if both handles are clones of the same pending load.
    pub(crate) fn same_handle(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> Future for LoadFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = Loaded<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

impl<V> fmt::Debug for LoadFuture<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture").finish_non_exhaustive()
    }
}

/// The write side of a [`LoadFuture`]. Completing twice is a no-op; dropping it unresolved
/// resolves the handle with [`LoadError::Abandoned`].
pub(crate) struct Completer<V> {
    tx: Option<oneshot::Sender<Loaded<V>>>,
    instrumentation: Option<Box<dyn InstrumentationContext>>,
    on_abandon: Option<Box<dyn FnOnce() + Send>>,
}

impl<V> Completer<V> {
    pub(crate) fn with_instrumentation(
        mut self,
        instrumentation: Option<Box<dyn InstrumentationContext>>,
    ) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Runs `f` if the completer is dropped without completing, after the handle has resolved
    /// with [`LoadError::Abandoned`].
    pub(crate) fn on_abandon<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_abandon = Some(Box::new(f));
        self
    }

    /// Delivers `result` to every holder of the handle. Returns false if already completed.
    pub(crate) fn complete(&mut self, result: Loaded<V>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                self.on_abandon = None;
                if let Some(ctx) = self.instrumentation.take() {
                    ctx.on_completed(result.as_ref().err());
                }
                // A closed receiver only means every caller dropped its handle.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.tx.is_none()
    }
}

impl<V> Drop for Completer<V> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Some(ctx) = self.instrumentation.take() {
                ctx.on_completed(Some(&LoadError::Abandoned));
            }
            drop(tx);
            if let Some(f) = self.on_abandon.take() {
                f();
            }
        }
    }
}

/// Creates an unresolved handle together with the completer that resolves it.
pub(crate) fn pending<V>() -> (Completer<V>, LoadFuture<V>)
where
    V: Clone + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = LoadFuture::from_future(rx.map(|r| r.unwrap_or(Err(LoadError::Abandoned))));
    (Completer { tx: Some(tx), instrumentation: None, on_abandon: None }, handle)
}

/// The result of [`DataLoader::dispatch`](crate::DataLoader::dispatch).
///
/// Awaiting it (it implements [`IntoFuture`]) yields every dispatched key's result, in queue
/// order across all batch groups.
pub struct DispatchResult<V> {
    keys_count: usize,
    was_dispatched: bool,
    values: BoxFuture<'static, Vec<Loaded<V>>>,
}

impl<V> DispatchResult<V>
where
    V: Send + 'static,
{
    pub(crate) fn new(keys_count: usize, values: BoxFuture<'static, Vec<Loaded<V>>>) -> Self {
        Self { keys_count, was_dispatched: true, values }
    }

    pub(crate) fn empty() -> Self {
        Self { keys_count: 0, was_dispatched: false, values: future::ready(Vec::new()).boxed() }
    }

    /// Number of queued entries drained by this dispatch.
    pub fn keys_count(&self) -> usize {
        self.keys_count
    }

    pub fn was_dispatched(&self) -> bool {
        self.was_dispatched
    }

    pub fn into_values(self) -> BoxFuture<'static, Vec<Loaded<V>>> {
        self.values
    }
}

impl<V> IntoFuture for DispatchResult<V>
where
    V: Send + 'static,
{
    type Output = Vec<Loaded<V>>;
    type IntoFuture = BoxFuture<'static, Vec<Loaded<V>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.values
    }
}

impl<V> fmt::Debug for DispatchResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchResult")
            .field("keys_count", &self.keys_count)
            .field("was_dispatched", &self.was_dispatched)
            .finish_non_exhaustive()
    }
}
