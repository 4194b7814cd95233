use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    environment::BatchEnvironment,
    error::LoadError,
    future::Loaded,
    subscriber::{BatchSubscriber, MappedBatchSubscriber},
};

/// A `BatchFunction` defines the method through which a [`DataLoader`](crate::DataLoader) fetches
/// batched data from some resource. It receives the keys that were queued during the loader's
/// most recent batch window, in queue order, together with the batch environment.
///
/// The returned list must line up with `keys`: the value at index `i` resolves the caller that
/// requested `keys[i]`. A per-key `Err` fails only that key; returning a list of the wrong length
/// fails every key in the batch with [`LoadError::SizeMismatch`]. Returning `Err` from the function
/// itself fails the whole batch and evicts its keys from the cache so they are retried later.
#[async_trait]
pub trait BatchFunction<K, V>: Send + Sync {
    async fn load(
        &self,
        keys: &[K],
        env: &BatchEnvironment<K>,
    ) -> Result<Vec<Loaded<V>>, LoadError>;
}

/// A map-shaped batch function.
///
/// Unlike [`BatchFunction`], it is not required to return a result for every key it was given.
/// Requesters of keys absent from the returned map receive `Ok(None)`.
#[async_trait]
pub trait MappedBatchFunction<K, V>: Send + Sync {
    async fn load(
        &self,
        keys: &HashSet<K>,
        env: &BatchEnvironment<K>,
    ) -> Result<HashMap<K, Loaded<V>>, LoadError>;
}

/// A batch function that pushes its results one at a time, in key order, into the subscriber.
///
/// The publisher owns the subscriber and may hand clones of it to other tasks. It must finish by
/// calling [`BatchSubscriber::on_complete`] or [`BatchSubscriber::on_error`]; dropping every clone
/// without doing so fails the outstanding keys with [`LoadError::Abandoned`].
pub trait BatchPublisher<K, V>: Send + Sync {
    fn load(&self, keys: Vec<K>, subscriber: BatchSubscriber<K, V>, env: BatchEnvironment<K>);
}

/// A batch function that pushes `(key, value)` entries, in any order, into the subscriber.
pub trait MappedBatchPublisher<K, V>: Send + Sync {
    fn load(&self, keys: Vec<K>, subscriber: MappedBatchSubscriber<K, V>, env: BatchEnvironment<K>);
}

/// The batch function a loader was built with.
pub(crate) enum BatchLoader<K, V> {
    List(Arc<dyn BatchFunction<K, V>>),
    Mapped(Arc<dyn MappedBatchFunction<K, V>>),
    Publisher(Arc<dyn BatchPublisher<K, V>>),
    MappedPublisher(Arc<dyn MappedBatchPublisher<K, V>>),
}

impl<K, V> BatchLoader<K, V> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            BatchLoader::List(_) => "list",
            BatchLoader::Mapped(_) => "mapped",
            BatchLoader::Publisher(_) => "publisher",
            BatchLoader::MappedPublisher(_) => "mapped_publisher",
        }
    }
}
