use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatchable::Dispatchable;

type Test = dyn Fn(&str, &dyn Dispatchable) -> bool + Send + Sync;

/// Decides whether a registered loader should be dispatched now, given its registry name.
///
/// ```
/// use std::time::Duration;
/// use dataload_engine::DispatchPredicate;
///
/// // Wait for at least 10 queued keys, but never longer than 50ms.
/// let predicate = DispatchPredicate::depth_greater_than(9)
///     .or(DispatchPredicate::longer_than(Duration::from_millis(50)));
/// # let _ = predicate;
/// ```
#[derive(Clone)]
pub struct DispatchPredicate(Arc<Test>);

impl DispatchPredicate {
    pub fn from_fn<F>(test: F) -> Self
    where
        F: Fn(&str, &dyn Dispatchable) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(test))
    }

    pub fn always() -> Self {
        Self::from_fn(|_, _| true)
    }

    pub fn never() -> Self {
        Self::from_fn(|_, _| false)
    }

    /// True once more than `depth` entries are queued.
    pub fn depth_greater_than(depth: usize) -> Self {
        Self::from_fn(move |_, loader| loader.dispatch_depth() > depth)
    }

    /// True once the loader has gone longer than `duration` without a dispatch.
    pub fn longer_than(duration: Duration) -> Self {
        Self::from_fn(move |_, loader| loader.time_since_dispatch() > duration)
    }

    pub fn test(&self, name: &str, loader: &dyn Dispatchable) -> bool {
        (self.0)(name, loader)
    }

    pub fn and(self, other: DispatchPredicate) -> Self {
        Self::from_fn(move |name, loader| self.test(name, loader) && other.test(name, loader))
    }

    pub fn or(self, other: DispatchPredicate) -> Self {
        Self::from_fn(move |name, loader| self.test(name, loader) || other.test(name, loader))
    }

    pub fn negate(self) -> Self {
        Self::from_fn(move |name, loader| !self.test(name, loader))
    }
}

impl Default for DispatchPredicate {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for DispatchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DispatchPredicate(..)")
    }
}
