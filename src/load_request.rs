use crate::{
    environment::KeyContext,
    future::{Completer, LoadFuture},
};

/// A queued `load` call waiting for the next dispatch.
pub(crate) struct LoadRequest<K, V> {
    pub(crate) key: K,
    pub(crate) context: Option<KeyContext>,
    pub(crate) completer: Completer<V>,
    /// The caller's handle, kept so a dispatch can report every result it produced.
    pub(crate) handle: LoadFuture<V>,
}

/// One batch group, unzipped into the parallel lists the batch functions work with.
pub(crate) struct BatchParts<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) contexts: Vec<Option<KeyContext>>,
    pub(crate) completers: Vec<Completer<V>>,
}

impl<K, V> BatchParts<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            contexts: Vec::with_capacity(capacity),
            completers: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, key: K, context: Option<KeyContext>, completer: Completer<V>) {
        self.keys.push(key);
        self.contexts.push(context);
        self.completers.push(completer);
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K, V> FromIterator<LoadRequest<K, V>> for BatchParts<K, V> {
    fn from_iter<I: IntoIterator<Item = LoadRequest<K, V>>>(requests: I) -> Self {
        let requests = requests.into_iter();
        let mut parts = BatchParts::with_capacity(requests.size_hint().0);
        for request in requests {
            parts.push(request.key, request.context, request.completer);
        }
        parts
    }
}
