//! Request coalescing, batching and caching for async key lookups.
//!
//! A [`DataLoader`] collects `load` calls for one unit of work, hands the distinct keys to a batch
//! function on [`DataLoader::dispatch`], and caches the resulting handles. A [`Registry`] or
//! [`ScheduledRegistry`] dispatches many loaders together.

mod batch_function;
mod cache;
mod dispatch_predicate;
mod dispatchable;
mod environment;
mod error;
mod future;
mod instrumentation;
mod load_request;
mod loader;
mod loader_worker;
mod options;
mod reconciler;
mod registry;
mod scheduled_registry;
mod scheduler;
mod stats;
mod subscriber;
mod value_cache;

pub use batch_function::{BatchFunction, BatchPublisher, MappedBatchFunction, MappedBatchPublisher};
pub use cache::CacheMap;
pub use dispatch_predicate::DispatchPredicate;
pub use dispatchable::Dispatchable;
pub use environment::{BatchContext, BatchEnvironment, KeyContext};
pub use error::{LoadError, RegistryError, SubscriberError, ValueCacheError};
pub use future::{DispatchResult, LoadFuture, Loaded};
pub use instrumentation::{
    ChainedInstrumentation, DataLoaderInstrumentation, InstrumentationContext,
    SimpleInstrumentationContext,
};
pub use loader::DataLoader;
pub use options::{BatchContextProvider, CacheKeyFn, DataLoaderOptions};
pub use registry::{Registry, RegistryBuilder};
pub use scheduled_registry::{ScheduledRegistry, ScheduledRegistryBuilder};
pub use scheduler::{BatchLoaderScheduler, ImmediateScheduler, ScheduledBatchLoaderCall};
pub use stats::{
    NoOpStatisticsCollector, SimpleStatisticsCollector, Statistics, StatisticsCollector,
};
pub use subscriber::{BatchSubscriber, MappedBatchSubscriber};
pub use value_cache::{NoOpValueCache, ValueCache};
