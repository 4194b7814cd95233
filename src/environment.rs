use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Caller-defined data handed to every batch function invocation, produced by the
/// `batch_context` provider in [`DataLoaderOptions`](crate::DataLoaderOptions).
pub type BatchContext = Arc<dyn Any + Send + Sync>;

/// Per-key data supplied through
/// [`DataLoader::load_with_context`](crate::DataLoader::load_with_context).
///
/// Call contexts never take part in coalescing; only the derived cache key does.
pub type KeyContext = Arc<dyn Any + Send + Sync>;

/// The read-only environment a batch function is invoked with.
pub struct BatchEnvironment<K> {
    context: Option<BatchContext>,
    key_contexts: HashMap<K, KeyContext>,
    key_contexts_list: Vec<Option<KeyContext>>,
}

impl<K> BatchEnvironment<K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(
        context: Option<BatchContext>,
        keys: &[K],
        key_contexts_list: Vec<Option<KeyContext>>,
    ) -> Self {
        let key_contexts = keys
            .iter()
            .zip(key_contexts_list.iter())
            .filter_map(|(k, ctx)| ctx.as_ref().map(|ctx| (k.clone(), Arc::clone(ctx))))
            .collect();
        Self { context, key_contexts, key_contexts_list }
    }

    /// The batch context downcast to `T`, if one was provided and has that type.
    pub fn context<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|ctx| ctx.downcast_ref::<T>())
    }

    pub fn raw_context(&self) -> Option<&BatchContext> {
        self.context.as_ref()
    }

    /// The call context supplied with `key`, downcast to `T`.
    pub fn key_context<T: Any + Send + Sync>(&self, key: &K) -> Option<&T> {
        self.key_contexts.get(key).and_then(|ctx| ctx.downcast_ref::<T>())
    }

    /// Keys that were loaded with a call context, mapped to that context.
    pub fn key_contexts(&self) -> &HashMap<K, KeyContext> {
        &self.key_contexts
    }

    /// Call contexts aligned with the batch's key order; `None` where no context was given.
    pub fn key_contexts_list(&self) -> &[Option<KeyContext>] {
        &self.key_contexts_list
    }
}

impl<K> Default for BatchEnvironment<K> {
    fn default() -> Self {
        Self { context: None, key_contexts: HashMap::new(), key_contexts_list: Vec::new() }
    }
}

impl<K: Clone> Clone for BatchEnvironment<K> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            key_contexts: self.key_contexts.clone(),
            key_contexts_list: self.key_contexts_list.clone(),
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for BatchEnvironment<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEnvironment")
            .field("has_context", &self.context.is_some())
            .field("keys_with_context", &self.key_contexts.keys().collect::<Vec<_>>())
            .finish()
    }
}
