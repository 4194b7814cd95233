use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing_futures::Instrument;

use crate::{
    dispatch_predicate::DispatchPredicate,
    dispatchable::Dispatchable,
    error::RegistryError,
    registry::{Registry, RegistryBuilder},
};

const DEFAULT_SCHEDULE: Duration = Duration::from_millis(10);

/// A [`Registry`] whose [`dispatch_all`](ScheduledRegistry::dispatch_all) only dispatches the
/// loaders a [`DispatchPredicate`] approves of.
///
/// A loader that is not dispatched gets a re-check scheduled after
/// [`schedule_duration`](ScheduledRegistry::schedule_duration). The re-check tests the predicate
/// again and either dispatches or schedules another re-check, until the predicate holds or the
/// registry is closed. In ticker mode a re-check is scheduled after every dispatch as well, so the
/// loop keeps running until [`close`](ScheduledRegistry::close).
///
/// Re-checks run on the runtime given to the builder, or on the runtime current when
/// `dispatch_all` is called. They hold only a weak reference to the registry, so dropping the
/// registry ends them.
///
/// Every [`Registry`] method is available through `Deref`; loaders registered that way use the
/// registry-wide predicate. [`unregister`](ScheduledRegistry::unregister) also drops the name's
/// own predicate, so a loader bound to the name later starts from the registry-wide one.
pub struct ScheduledRegistry {
    inner: Arc<ScheduledInner>,
}

struct ScheduledInner {
    registry: Registry,
    predicate: DispatchPredicate,
    predicates: RwLock<HashMap<String, DispatchPredicate>>,
    schedule: Duration,
    ticker_mode: bool,
    closed: AtomicBool,
    runtime: Option<Handle>,
}

impl ScheduledRegistry {
    pub fn builder() -> ScheduledRegistryBuilder {
        ScheduledRegistryBuilder::default()
    }

    /// Dispatches every loader whose predicate holds and schedules a re-check for the rest.
    /// Returns the number of queued entries drained now.
    #[tracing::instrument(skip(self))]
    pub fn dispatch_all(&self) -> usize {
        self.inner
            .registry
            .snapshot()
            .into_iter()
            .map(|(name, loader)| self.inner.dispatch_or_reschedule(name, loader))
            .sum()
    }

    /// Dispatches every loader without consulting any predicate.
    pub fn dispatch_all_immediately(&self) -> usize {
        self.inner.registry.dispatch_all()
    }

    /// Schedules a re-check for every loader without testing the predicates first.
    pub fn reschedule_now(&self) {
        for (name, loader) in self.inner.registry.snapshot() {
            self.inner.reschedule(name, loader);
        }
    }

    /// Stops scheduling re-checks. Re-checks already scheduled still fire once but schedule no
    /// further ones.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("scheduled registry closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn schedule_duration(&self) -> Duration {
        self.inner.schedule
    }

    pub fn is_ticker_mode(&self) -> bool {
        self.inner.ticker_mode
    }

    /// The predicate consulted for `name`: its own if it was registered with one, otherwise the
    /// registry-wide one.
    pub fn dispatch_predicate(&self, name: &str) -> DispatchPredicate {
        self.inner.predicate_for(name)
    }

    /// Removes the binding for `name` together with its own predicate, if it had one.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Dispatchable>> {
        if self.inner.predicates.write().remove(name).is_some() {
            tracing::debug!(%name, "dropped dispatch predicate override");
        }
        self.inner.registry.unregister(name)
    }
}

impl ScheduledInner {
    fn predicate_for(&self, name: &str) -> DispatchPredicate {
        self.predicates.read().get(name).unwrap_or(&self.predicate).clone()
    }

    fn dispatch_or_reschedule(
        self: &Arc<Self>,
        name: String,
        loader: Arc<dyn Dispatchable>,
    ) -> usize {
        let should_dispatch = self.predicate_for(&name).test(&name, loader.as_ref());
        let dispatched = if should_dispatch { loader.dispatch_keys() } else { 0 };
        tracing::trace!(%name, should_dispatch, dispatched, "tested dispatch predicate");
        if self.ticker_mode || !should_dispatch {
            self.reschedule(name, loader);
        }
        dispatched
    }

    fn reschedule(self: &Arc<Self>, name: String, loader: Arc<dyn Dispatchable>) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::info!(%name, "registry is closed; not rescheduling");
            return;
        }
        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                tracing::warn!(%name, "no runtime available; cannot schedule a dispatch re-check");
                return;
            }
        };

        let registry: Weak<ScheduledInner> = Arc::downgrade(self);
        let schedule = self.schedule;
        let span = tracing::debug_span!("dispatch_recheck", loader = %name);
        runtime.spawn(
            async move {
                tokio::time::sleep(schedule).await;
                match registry.upgrade() {
                    Some(registry) => {
                        registry.dispatch_or_reschedule(name, loader);
                    }
                    None => tracing::debug!("registry dropped before the re-check fired"),
                }
            }
            .instrument(span),
        );
    }
}

impl Deref for ScheduledRegistry {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        &self.inner.registry
    }
}

impl Drop for ScheduledRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ScheduledRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledRegistry")
            .field("registry", &self.inner.registry)
            .field("schedule", &self.inner.schedule)
            .field("ticker_mode", &self.inner.ticker_mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Configures a [`ScheduledRegistry`]. By default every loader is dispatched as soon as
/// `dispatch_all` is called and re-checks are 10ms apart.
pub struct ScheduledRegistryBuilder {
    registry: RegistryBuilder,
    predicate: DispatchPredicate,
    predicates: HashMap<String, DispatchPredicate>,
    schedule: Duration,
    ticker_mode: bool,
    runtime: Option<Handle>,
}

impl Default for ScheduledRegistryBuilder {
    fn default() -> Self {
        Self {
            registry: RegistryBuilder::default(),
            predicate: DispatchPredicate::always(),
            predicates: HashMap::new(),
            schedule: DEFAULT_SCHEDULE,
            ticker_mode: false,
            runtime: None,
        }
    }
}

impl ScheduledRegistryBuilder {
    /// The delay before a re-check.
    pub fn schedule(mut self, schedule: Duration) -> Self {
        self.schedule = schedule;
        self
    }

    /// The registry-wide predicate.
    pub fn dispatch_predicate(mut self, predicate: DispatchPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Keep re-checking every loader after the first `dispatch_all`, even after dispatching it.
    pub fn ticker_mode(mut self, ticker_mode: bool) -> Self {
        self.ticker_mode = ticker_mode;
        self
    }

    pub fn strict_mode(mut self, strict_mode: bool) -> Self {
        self.registry = self.registry.strict_mode(strict_mode);
        self
    }

    /// The runtime re-checks are spawned on.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn register<D>(mut self, name: impl Into<String>, loader: D) -> Self
    where
        D: Dispatchable,
    {
        self.registry = self.registry.register(name, loader);
        self
    }

    /// Registers `loader` with a predicate of its own that overrides the registry-wide one.
    pub fn register_with_predicate<D>(
        mut self,
        name: impl Into<String>,
        loader: D,
        predicate: DispatchPredicate,
    ) -> Self
    where
        D: Dispatchable,
    {
        let name = name.into();
        self.predicates.insert(name.clone(), predicate);
        self.registry = self.registry.register(name, loader);
        self
    }

    /// Adds every binding of `registry`.
    pub fn register_all(mut self, registry: &Registry) -> Self {
        self.registry = self.registry.register_all(registry);
        self
    }

    pub fn build(self) -> Result<ScheduledRegistry, RegistryError> {
        let inner = ScheduledInner {
            registry: self.registry.build()?,
            predicate: self.predicate,
            predicates: RwLock::new(self.predicates),
            schedule: self.schedule,
            ticker_mode: self.ticker_mode,
            closed: AtomicBool::new(false),
            runtime: self.runtime,
        };
        Ok(ScheduledRegistry { inner: Arc::new(inner) })
    }
}
