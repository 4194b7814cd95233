use std::fmt;

use futures::future::{BoxFuture, FutureExt};

/// Lets the caller decide *when* a batch function runs, e.g. after a delay or on another
/// runtime. It cannot change which keys are grouped together.
///
/// The scheduler must eventually invoke the call it is given. A call that is dropped without
/// being invoked fails its keys with [`LoadError::Abandoned`](crate::LoadError::Abandoned).
pub trait BatchLoaderScheduler: Send + Sync {
    fn schedule(&self, call: ScheduledBatchLoaderCall) -> BoxFuture<'static, ()>;
}

/// One deferred batch function invocation.
pub struct ScheduledBatchLoaderCall {
    key_count: usize,
    call: BoxFuture<'static, ()>,
}

impl ScheduledBatchLoaderCall {
    pub(crate) fn new(key_count: usize, call: BoxFuture<'static, ()>) -> Self {
        Self { key_count, call }
    }

    /// Number of keys the batch function will receive.
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Runs the batch function and delivers its results to the waiting loader.
    pub async fn invoke(self) {
        self.call.await
    }
}

impl fmt::Debug for ScheduledBatchLoaderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledBatchLoaderCall").field("key_count", &self.key_count).finish()
    }
}

/// Runs every call as soon as it is scheduled.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl BatchLoaderScheduler for ImmediateScheduler {
    fn schedule(&self, call: ScheduledBatchLoaderCall) -> BoxFuture<'static, ()> {
        call.invoke().boxed()
    }
}
