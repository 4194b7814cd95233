use async_trait::async_trait;

use crate::error::ValueCacheError;

/// An optional second-level cache of resolved values, typically backed by an external store.
///
/// When a loader has a value cache, every batch first asks it for the queued keys; keys it
/// returns skip the batch function entirely. Values the batch function produces are written
/// back afterwards. Any error other than a real hit is treated as a cache miss, so a failing
/// store degrades to calling the batch function.
///
/// Return [`ValueCacheError::NotSupported`] from a method to opt out of it.
#[async_trait]
pub trait ValueCache<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<V, ValueCacheError>;

    /// Looks up many keys at once. The result must line up with `keys`.
    ///
    /// The default issues one [`ValueCache::get`] per key.
    async fn get_values(
        &self,
        keys: &[K],
    ) -> Result<Vec<Result<V, ValueCacheError>>, ValueCacheError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await);
        }
        Ok(values)
    }

    async fn set(&self, key: &K, value: &V) -> Result<(), ValueCacheError>;

    /// Stores many entries at once. The default issues one [`ValueCache::set`] per entry and
    /// stops at the first failure.
    async fn set_values(&self, entries: &[(K, V)]) -> Result<(), ValueCacheError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), ValueCacheError>;

    async fn clear(&self) -> Result<(), ValueCacheError>;
}

/// A value cache that stores nothing and reports every operation as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpValueCache;

#[async_trait]
impl<K, V> ValueCache<K, V> for NoOpValueCache
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, _key: &K) -> Result<V, ValueCacheError> {
        Err(ValueCacheError::NotSupported)
    }

    async fn get_values(
        &self,
        _keys: &[K],
    ) -> Result<Vec<Result<V, ValueCacheError>>, ValueCacheError> {
        Err(ValueCacheError::NotSupported)
    }

    async fn set(&self, _key: &K, _value: &V) -> Result<(), ValueCacheError> {
        Err(ValueCacheError::NotSupported)
    }

    async fn delete(&self, _key: &K) -> Result<(), ValueCacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), ValueCacheError> {
        Ok(())
    }
}
