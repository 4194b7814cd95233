//! Before/after hooks around loads, dispatches and batch function invocations.
//!
//! Each `begin_*` hook may return an [`InstrumentationContext`]. The loader calls
//! [`InstrumentationContext::on_dispatched`] once the operation has been started and
//! [`InstrumentationContext::on_completed`] once its outcome is known.

use std::fmt;
use std::sync::Arc;

use crate::{dispatchable::Dispatchable, error::LoadError};

pub trait InstrumentationContext: Send {
    fn on_dispatched(&self) {}

    fn on_completed(self: Box<Self>, error: Option<&LoadError>) {
        let _ = error;
    }
}

pub trait DataLoaderInstrumentation: Send + Sync {
    /// Called for every `load` call, including ones answered from the cache.
    fn begin_load(
        &self,
        _loader: &dyn Dispatchable,
        _key: &dyn fmt::Debug,
    ) -> Option<Box<dyn InstrumentationContext>> {
        None
    }

    /// Called for every dispatch that drains at least one queued entry.
    fn begin_dispatch(
        &self,
        _loader: &dyn Dispatchable,
    ) -> Option<Box<dyn InstrumentationContext>> {
        None
    }

    /// Called before each batch function invocation.
    fn begin_batch_loader(
        &self,
        _loader: &dyn Dispatchable,
        _key_count: usize,
    ) -> Option<Box<dyn InstrumentationContext>> {
        None
    }
}

type DispatchedFn = Box<dyn Fn() + Send>;
type CompletedFn = Box<dyn FnOnce(Option<&LoadError>) + Send>;

/// An [`InstrumentationContext`] built from closures.
#[derive(Default)]
pub struct SimpleInstrumentationContext {
    on_dispatched: Option<DispatchedFn>,
    on_completed: Option<CompletedFn>,
}

impl SimpleInstrumentationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_dispatched(mut self, f: impl Fn() + Send + 'static) -> Self {
        self.on_dispatched = Some(Box::new(f));
        self
    }

    pub fn on_completed(mut self, f: impl FnOnce(Option<&LoadError>) + Send + 'static) -> Self {
        self.on_completed = Some(Box::new(f));
        self
    }

    pub fn boxed(self) -> Option<Box<dyn InstrumentationContext>> {
        Some(Box::new(self))
    }
}

impl InstrumentationContext for SimpleInstrumentationContext {
    fn on_dispatched(&self) {
        if let Some(f) = &self.on_dispatched {
            f();
        }
    }

    fn on_completed(self: Box<Self>, error: Option<&LoadError>) {
        if let Some(f) = self.on_completed {
            f(error);
        }
    }
}

/// Runs several instrumentations in order.
///
/// With zero instrumentations every hook returns `None`, and with one the hook is delegated
/// directly, so neither case allocates a combined context.
#[derive(Clone, Default)]
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn DataLoaderInstrumentation>>,
}

impl ChainedInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, instrumentation: Arc<dyn DataLoaderInstrumentation>) -> Self {
        self.instrumentations.push(instrumentation);
        self
    }

    pub fn prepend(mut self, instrumentation: Arc<dyn DataLoaderInstrumentation>) -> Self {
        self.instrumentations.insert(0, instrumentation);
        self
    }

    pub fn instrumentations(&self) -> &[Arc<dyn DataLoaderInstrumentation>] {
        &self.instrumentations
    }

    fn chain<F>(&self, begin: F) -> Option<Box<dyn InstrumentationContext>>
    where
        F: Fn(&dyn DataLoaderInstrumentation) -> Option<Box<dyn InstrumentationContext>>,
    {
        match self.instrumentations.as_slice() {
            [] => None,
            [only] => begin(only.as_ref()),
            many => {
                let mut contexts =
                    many.iter().filter_map(|i| begin(i.as_ref())).collect::<Vec<_>>();
                match contexts.len() {
                    0 | 1 => contexts.pop(),
                    _ => Some(Box::new(ChainedContext(contexts))),
                }
            }
        }
    }
}

impl DataLoaderInstrumentation for ChainedInstrumentation {
    fn begin_load(
        &self,
        loader: &dyn Dispatchable,
        key: &dyn fmt::Debug,
    ) -> Option<Box<dyn InstrumentationContext>> {
        self.chain(|i| i.begin_load(loader, key))
    }

    fn begin_dispatch(&self, loader: &dyn Dispatchable) -> Option<Box<dyn InstrumentationContext>> {
        self.chain(|i| i.begin_dispatch(loader))
    }

    fn begin_batch_loader(
        &self,
        loader: &dyn Dispatchable,
        key_count: usize,
    ) -> Option<Box<dyn InstrumentationContext>> {
        self.chain(|i| i.begin_batch_loader(loader, key_count))
    }
}

struct ChainedContext(Vec<Box<dyn InstrumentationContext>>);

impl InstrumentationContext for ChainedContext {
    fn on_dispatched(&self) {
        for ctx in &self.0 {
            ctx.on_dispatched();
        }
    }

    fn on_completed(self: Box<Self>, error: Option<&LoadError>) {
        for ctx in self.0 {
            ctx.on_completed(error);
        }
    }
}
