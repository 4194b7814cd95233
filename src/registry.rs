use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    dispatchable::Dispatchable, error::RegistryError, loader::DataLoader, stats::Statistics,
};

/// A named set of loaders that are dispatched together.
///
/// Loaders enter the registry through the [`Dispatchable`] trait, so loaders with different key and
/// value types can live side by side. Registration order is kept and [`Registry::dispatch_all`]
/// dispatches in that order.
///
/// In strict mode, binding a name that already refers to a different loader fails with
/// [`RegistryError::StrictMode`]. Otherwise the new loader replaces the old binding in place.
pub struct Registry {
    entries: RwLock<Vec<(String, Arc<dyn Dispatchable>)>>,
    strict_mode: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()), strict_mode: false }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn is_strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Binds `loader` to `name`.
    pub fn register<D>(&self, name: impl Into<String>, loader: D) -> Result<&Self, RegistryError>
    where
        D: Dispatchable,
    {
        self.bind(name.into(), Arc::new(loader))?;
        Ok(self)
    }

    /// Binds `loader` under its own [`Dispatchable::name`].
    pub fn register_named<D>(&self, loader: D) -> Result<&Self, RegistryError>
    where
        D: Dispatchable,
    {
        let name = loader.name().map(str::to_owned).ok_or(RegistryError::Unnamed)?;
        self.register(name, loader)
    }

    /// Binds `loader` to `name` and hands it back.
    pub fn register_and_get<K, V>(
        &self,
        name: impl Into<String>,
        loader: DataLoader<K, V>,
    ) -> Result<DataLoader<K, V>, RegistryError>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.bind(name.into(), Arc::new(loader.clone()))?;
        Ok(loader)
    }

    /// Returns the loader bound to `name`, creating and binding one with `make` if the name is
    /// free. Returns `None` when the name is bound to a loader of another type.
    pub fn compute_if_absent<K, V, F>(&self, name: &str, make: F) -> Option<DataLoader<K, V>>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(&str) -> DataLoader<K, V>,
    {
        let mut entries = self.entries.write();
        if let Some((_, existing)) = entries.iter().find(|(n, _)| n == name) {
            return existing.as_any().downcast_ref::<DataLoader<K, V>>().cloned();
        }
        let loader = make(name);
        entries.push((name.to_owned(), Arc::new(loader.clone())));
        Some(loader)
    }

    /// Removes the binding for `name`, returning the loader that was bound.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Dispatchable>> {
        let mut entries = self.entries.write();
        let idx = entries.iter().position(|(n, _)| n == name)?;
        Some(entries.remove(idx).1)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn loaders(&self) -> Vec<Arc<dyn Dispatchable>> {
        self.entries.read().iter().map(|(_, loader)| Arc::clone(loader)).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Dispatchable>> {
        self.entries.read().iter().find(|(n, _)| n == name).map(|(_, loader)| Arc::clone(loader))
    }

    /// Returns the loader bound to `name` if it has the requested key and value types.
    pub fn get_data_loader<K, V>(&self, name: &str) -> Option<DataLoader<K, V>>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get(name)?.as_any().downcast_ref::<DataLoader<K, V>>().cloned()
    }

    /// A new registry holding this registry's bindings followed by `other`'s. The strict mode of
    /// `self` applies to the merge.
    pub fn combine(&self, other: &Registry) -> Result<Registry, RegistryError> {
        let combined =
            Registry { entries: RwLock::new(self.snapshot()), strict_mode: self.strict_mode };
        for (name, loader) in other.snapshot() {
            combined.bind(name, loader)?;
        }
        Ok(combined)
    }

    /// Dispatches every registered loader, whatever its queue holds, and returns the total number
    /// of queued entries drained.
    #[tracing::instrument(skip(self))]
    pub fn dispatch_all(&self) -> usize {
        let total = self.snapshot().iter().map(|(_, loader)| loader.dispatch_keys()).sum();
        tracing::debug!(total, "dispatched registry");
        total
    }

    /// The sum of every registered loader's queue depth.
    pub fn dispatch_depth(&self) -> usize {
        self.snapshot().iter().map(|(_, loader)| loader.dispatch_depth()).sum()
    }

    /// The combined statistics of every registered loader.
    pub fn statistics(&self) -> Statistics {
        self.snapshot()
            .iter()
            .fold(Statistics::default(), |acc, (_, loader)| acc.combine(&loader.statistics()))
    }

    /// Concurrent dispatches iterate a copy of the bindings so registration is never blocked on
    /// a dispatch.
    pub(crate) fn snapshot(&self) -> Vec<(String, Arc<dyn Dispatchable>)> {
        self.entries.read().clone()
    }

    pub(crate) fn bind(
        &self,
        name: String,
        loader: Arc<dyn Dispatchable>,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) if existing.is_same(loader.as_ref()) => {}
            Some(_) if self.strict_mode => {
                tracing::error!(
                    %name,
                    "refusing to replace a registered data loader in strict mode"
                );
                return Err(RegistryError::StrictMode { name });
            }
            Some((_, existing)) => *existing = loader,
            None => entries.push((name, loader)),
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys())
            .field("strict_mode", &self.strict_mode)
            .finish()
    }
}

/// Collects bindings for a [`Registry`]. The strict-mode rules are applied by
/// [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Arc<dyn Dispatchable>)>,
    strict_mode: bool,
}

impl RegistryBuilder {
    pub fn strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn register<D>(mut self, name: impl Into<String>, loader: D) -> Self
    where
        D: Dispatchable,
    {
        self.entries.push((name.into(), Arc::new(loader)));
        self
    }

    /// Adds every binding of `registry`.
    pub fn register_all(mut self, registry: &Registry) -> Self {
        self.entries.extend(registry.snapshot());
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let registry = Registry { entries: RwLock::new(Vec::new()), strict_mode: self.strict_mode };
        for (name, loader) in self.entries {
            registry.bind(name, loader)?;
        }
        Ok(registry)
    }
}
