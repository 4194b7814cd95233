use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use crate::future::LoadFuture;

/// The in-process cache of a [`DataLoader`](crate::DataLoader), mapping a cache key to the
/// handle of a pending or completed load.
///
/// Implementations are only ever touched while the owning loader holds its internal lock, so they
/// need no synchronization of their own. Eviction policy is up to the implementation; the default
/// is an unbounded `HashMap` that lives as long as the loader.
pub trait CacheMap<K, V>: Send + Sync {
    fn contains_key(&self, key: &K) -> bool;

    /// Returns the handle cached for `key`.
    fn get(&self, key: &K) -> Option<LoadFuture<V>>;

    /// Returns every cached handle.
    fn get_all(&self) -> Vec<LoadFuture<V>>;

    fn set(&mut self, key: K, value: LoadFuture<V>);

    fn delete(&mut self, key: &K);
    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> CacheMap<K, V> for HashMap<K, LoadFuture<V>, S>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Send + Sync,
{
    fn contains_key(&self, key: &K) -> bool {
        HashMap::contains_key(self, key)
    }

    fn get(&self, key: &K) -> Option<LoadFuture<V>> {
        HashMap::get(self, key).cloned()
    }

    fn get_all(&self) -> Vec<LoadFuture<V>> {
        self.values().cloned().collect::<Vec<_>>()
    }

    fn set(&mut self, key: K, value: LoadFuture<V>) {
        self.insert(key, value);
    }

    fn delete(&mut self, key: &K) {
        self.remove(key);
    }

    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}
