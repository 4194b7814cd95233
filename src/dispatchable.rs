use std::any::Any;
use std::time::Duration;

use crate::stats::Statistics;

/// The type-erased view of a [`DataLoader`](crate::DataLoader) that registries, dispatch
/// predicates and instrumentation work with.
pub trait Dispatchable: Send + Sync + 'static {
    fn name(&self) -> Option<&str>;

    /// Dispatches the loader's queue without waiting for the results and returns how many queued
    /// entries were drained. Returns 0 and drains nothing when the work has nowhere to run.
    fn dispatch_keys(&self) -> usize;

    /// The number of entries currently queued.
    fn dispatch_depth(&self) -> usize;

    fn time_since_dispatch(&self) -> Duration;

    fn statistics(&self) -> Statistics;

    /// True when both views refer to the same underlying loader.
    fn is_same(&self, other: &dyn Dispatchable) -> bool;

    fn as_any(&self) -> &dyn Any;
}
