use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// The error a [`LoadFuture`](crate::LoadFuture) resolves with.
///
/// Errors are shared between every caller coalesced onto the same key, so the type is cheap to
/// clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The batch function (or a per-key marker it returned) reported a failure.
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync>),

    /// A list-shaped batch function returned a different number of values than it was given keys.
    #[error("the batch function returned {values} values for {keys} keys")]
    SizeMismatch { keys: usize, values: usize },

    /// The completing side was dropped before a value was delivered.
    #[error("the load was abandoned before a value was delivered")]
    Abandoned,
}

impl LoadError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        LoadError::Failed(Arc::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        LoadError::Failed(Arc::new(Message(message.into())))
    }

    /// Returns the wrapped failure when this is a [`LoadError::Failed`].
    pub fn failure(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            LoadError::Failed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("strict mode is enabled and a data loader is already registered under '{name}'")]
    StrictMode { name: String },

    #[error("the data loader has no name and cannot be registered by name")]
    Unnamed,
}

/// A streaming subscriber callback was invoked outside of its allowed sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberError {
    #[error("on_complete has already been called; {signal} may not be invoked")]
    AlreadyCompleted { signal: &'static str },

    #[error("on_error has already been called; {signal} may not be invoked")]
    AlreadyErrored { signal: &'static str },
}

/// Failures reported by a [`ValueCache`](crate::ValueCache).
///
/// `NotFound` and `NotSupported` are expected outcomes and are treated as cache misses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueCacheError {
    #[error("no value is cached for the key")]
    NotFound,

    #[error("the value cache does not support this operation")]
    NotSupported,

    #[error("value cache failure: {0}")]
    Failed(Arc<dyn StdError + Send + Sync>),
}

impl ValueCacheError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ValueCacheError::Failed(Arc::new(error))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, ValueCacheError::NotFound | ValueCacheError::NotSupported)
    }
}
