//! Per-instance lifecycle facade
//!
//! A [`Scope`] owns the resources created on behalf of one hosting instance.
//! Every `create` and `destroy` becomes one unit on the scope's
//! [`SerialQueue`], so lifecycle work for one instance never overlaps and
//! runs in call order. `get` never enqueues; it reads the registry directly
//! and relies on the synchronous destroy flag to fail fast.
//!
//! # Re-entrancy
//!
//! A constructor or destructor runs *on* the scope's queue. Awaiting another
//! `create`, `destroy` or a `get` of a not-yet-constructed resource of the
//! same scope from inside it waits on a unit queued behind the current one
//! and never completes. Issue such calls without awaiting them, or capture
//! already-constructed resources before calling `create`.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use super::config::ScopeConfig;
use super::descriptor::{Constructor, Descriptor, ErasedValue};
use super::entry::Entry;
use super::errors::{LifecycleError, LifecycleResult};
use super::id::ResourceId;
use super::registry::Registry;
use crate::error::{CommonError, Failure};
use crate::observability::{UnobservedFailure, UnobservedFailureHook};
use crate::sync::queue::{Pending, QueueConfig, QueueError, QueueMetricsSnapshot, SerialQueue};

#[derive(Clone)]
struct Inner {
    registry: Arc<Mutex<Registry>>,
    queue: SerialQueue,
}

enum ScopeState {
    Uninit,
    Active(Inner),
    /// `destroy_all` is draining the queue
    Closing(Inner),
    TornDown,
}

impl ScopeState {
    fn inner(&self) -> Option<&Inner> {
        match self {
            Self::Active(inner) | Self::Closing(inner) => Some(inner),
            Self::Uninit | Self::TornDown => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Uninit => "uninit",
            Self::Active(_) => "active",
            Self::Closing(_) => "closing",
            Self::TornDown => "torn_down",
        }
    }
}

/// Outcome of [`Scope::destroy_all`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Entries removed from the registry, including those whose destructor
    /// failed
    pub destroyed: usize,
    /// Destructor failures, in teardown order
    pub failures: Vec<LifecycleError>,
}

impl TeardownReport {
    /// Every destructor succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resources bound to the lifetime of one hosting instance
///
/// `H` is the host context handed to every constructor. The registry and
/// queue are created on the first `create` or `destroy`, which must happen
/// inside a tokio runtime.
pub struct Scope<H = ()> {
    host: Arc<H>,
    config: ScopeConfig,
    reporter: Option<UnobservedFailureHook>,
    state: Mutex<ScopeState>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(())
    }
}

impl<H> Scope<H>
where
    H: Send + Sync + 'static,
{
    /// Create a scope with the default configuration
    pub fn new(host: H) -> Self {
        Self::with_shared_host(Arc::new(host))
    }

    /// Create a scope around an already shared host context
    pub fn with_shared_host(host: Arc<H>) -> Self {
        Self { host, config: ScopeConfig::default(), reporter: None, state: Mutex::new(ScopeState::Uninit) }
    }

    /// Start building a configured scope
    pub fn builder(host: H) -> ScopeBuilder<H> {
        ScopeBuilder::new(Arc::new(host))
    }

    /// Schedule construction of a resource
    ///
    /// The id is claimed before this returns, so a second `create` with the
    /// same id fails immediately with [`LifecycleError::DuplicateId`]. The
    /// constructor runs once every earlier unit of this scope has finished.
    /// The returned [`Pending`] resolves to the shared resource or to
    /// [`LifecycleError::ConstructorFailure`].
    pub fn create<T>(&self, descriptor: Descriptor<H, T>) -> LifecycleResult<Pending<Arc<T>, LifecycleError>>
    where
        T: Send + Sync + 'static,
    {
        let inner = self.activate()?;
        let (id, constructor, destructor) = descriptor.into_parts();

        let entry = {
            let mut registry = inner.registry.lock();
            let seq = registry.claim(id.as_ref())?;
            let entry = Arc::new(Entry::new::<T>(seq, id, destructor));
            registry.register(&entry);
            entry
        };

        let registry = Arc::clone(&inner.registry);
        let host = Arc::clone(&self.host);
        Ok(inner.queue.enqueue("create", move || construct(registry, entry, host, constructor)))
    }

    /// Look up a resource by id
    ///
    /// Unknown ids and ids already passed to [`destroy`](Self::destroy) fail
    /// with [`LifecycleError::ResourceNotFound`] as of this call, before the
    /// returned future is first polled. For a resource still under
    /// construction the future waits for the constructor, then checks the
    /// destroy flag again.
    pub fn get<T>(&self, id: impl Into<ResourceId>) -> BoxFuture<'static, LifecycleResult<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        let id = id.into();
        let checked = self.lookup_live::<T>(&id);

        async move {
            let entry = checked?;
            let value = entry
                .settled()
                .await
                .map_err(|source| LifecycleError::ConstructorFailure { id: Some(id.clone()), source })?;

            if entry.is_pending_destroy() {
                return Err(LifecycleError::ResourceNotFound(id));
            }
            value.downcast::<T>().map_err(|_| LifecycleError::TypeMismatch {
                id,
                expected: std::any::type_name::<T>(),
                actual: entry.type_name(),
            })
        }
        .boxed()
    }

    /// Schedule destruction of a resource
    ///
    /// The resource is flagged before this returns, so later `get` calls fail
    /// at once. The unit runs the destructor on the settled value and removes
    /// the entry whether or not the destructor succeeds. Destroying an id
    /// with no entry, or one already destroyed, resolves `Ok(())`.
    pub fn destroy(&self, id: impl Into<ResourceId>) -> LifecycleResult<Pending<(), LifecycleError>> {
        let id = id.into();
        let inner = self.activate()?;

        let horizon = {
            let registry = inner.registry.lock();
            if let Some(entry) = registry.lookup(&id) {
                if entry.mark_pending_destroy() {
                    debug!(scope = %self.config.label, resource = %id, "resource_destroy_requested");
                }
            }
            registry.horizon()
        };

        let registry = Arc::clone(&inner.registry);
        Ok(inner.queue.enqueue("destroy", move || async move {
            // Entries claimed after the destroy call belong to a later create.
            let target = registry.lock().lookup(&id).filter(|entry| entry.seq() < horizon);
            match target {
                Some(entry) => dispose(&registry, entry).await,
                None => {
                    debug!(resource = %id, "resource_destroy_noop");
                    Ok(())
                }
            }
        }))
    }

    /// Tear down every live resource in reverse construction order
    ///
    /// Waits for queued work to finish, runs one destroy unit per live entry
    /// (most recently constructed first) and then discards the registry. A
    /// failing destructor does not stop the ones after it; failures are
    /// collected in the report. Any later `create`, `get` or `destroy` fails
    /// with [`LifecycleError::InstanceTornDown`], as does a second call.
    #[instrument(skip(self), fields(scope = %self.config.label))]
    pub async fn destroy_all(&self) -> LifecycleResult<TeardownReport> {
        let inner = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ScopeState::TornDown) {
                ScopeState::Uninit => {
                    debug!("scope_torn_down_before_first_use");
                    return Ok(TeardownReport::default());
                }
                ScopeState::Active(inner) => {
                    *state = ScopeState::Closing(inner.clone());
                    inner
                }
                previous @ (ScopeState::Closing(_) | ScopeState::TornDown) => {
                    *state = previous;
                    return Err(LifecycleError::InstanceTornDown);
                }
            }
        };

        Ok(run_teardown(inner, || *self.state.lock() = ScopeState::TornDown).await)
    }

    /// Run [`destroy_all`](Self::destroy_all) once `signal` resolves
    ///
    /// This is the hook for a host whose teardown notification is a future
    /// (a oneshot receiver, a cancellation token, a shutdown signal).
    pub fn attach_teardown<S>(
        self: Arc<Self>,
        signal: S,
    ) -> LifecycleResult<JoinHandle<LifecycleResult<TeardownReport>>>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let span = info_span!("scope_teardown_signal", scope = %self.config.label);

        Ok(runtime.spawn(
            async move {
                signal.await;
                debug!("scope_teardown_signal_received");
                self.destroy_all().await
            }
            .instrument(span),
        ))
    }

    /// Whether `id` names a resource that has not been flagged for
    /// destruction
    pub fn contains(&self, id: impl Into<ResourceId>) -> bool {
        let id = id.into();
        self.state.lock().inner().is_some_and(|inner| inner.registry.lock().contains(&id))
    }

    /// Number of constructed resources awaiting teardown
    pub fn live_count(&self) -> usize {
        self.state.lock().inner().map_or(0, |inner| inner.registry.lock().live_count())
    }

    /// Whether `destroy_all` has completed its enqueue phase
    pub fn is_torn_down(&self) -> bool {
        matches!(*self.state.lock(), ScopeState::TornDown)
    }

    /// Resolve once every unit queued before this call has finished
    pub fn idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let marker = self.state.lock().inner().map(|inner| inner.queue.idle());
        async move {
            if let Some(marker) = marker {
                marker.await;
            }
        }
    }

    /// Queue counters, once the scope has been used and until teardown
    pub fn metrics(&self) -> Option<QueueMetricsSnapshot> {
        self.state.lock().inner().map(|inner| inner.queue.metrics())
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Host context handed to constructors
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    fn activate(&self) -> LifecycleResult<Inner> {
        let mut state = self.state.lock();
        if matches!(*state, ScopeState::Uninit) {
            *state = ScopeState::Active(self.initialize()?);
        }
        match &*state {
            ScopeState::Active(inner) => Ok(inner.clone()),
            _ => Err(LifecycleError::InstanceTornDown),
        }
    }

    fn initialize(&self) -> LifecycleResult<Inner> {
        let mut queue_config = QueueConfig::new(self.config.label.clone());
        queue_config.reporter = self.reporter.clone();
        let queue = SerialQueue::new(queue_config)?;
        debug!(scope = %self.config.label, "scope_initialized");
        Ok(Inner { registry: Arc::default(), queue })
    }

    fn lookup_live<T: 'static>(&self, id: &ResourceId) -> LifecycleResult<Arc<Entry>> {
        let state = self.state.lock();
        let inner = match &*state {
            ScopeState::Uninit => return Err(LifecycleError::ResourceNotFound(id.clone())),
            ScopeState::TornDown => return Err(LifecycleError::InstanceTornDown),
            ScopeState::Active(inner) | ScopeState::Closing(inner) => inner,
        };

        let entry = inner
            .registry
            .lock()
            .lookup(id)
            .filter(|entry| !entry.is_pending_destroy())
            .ok_or_else(|| LifecycleError::ResourceNotFound(id.clone()))?;

        if !entry.holds::<T>() {
            return Err(LifecycleError::TypeMismatch {
                id: id.clone(),
                expected: std::any::type_name::<T>(),
                actual: entry.type_name(),
            });
        }
        Ok(entry)
    }
}

impl<H> Drop for Scope<H> {
    fn drop(&mut self) {
        let inner = match std::mem::replace(self.state.get_mut(), ScopeState::TornDown) {
            ScopeState::Active(inner) | ScopeState::Closing(inner) => inner,
            ScopeState::Uninit | ScopeState::TornDown => return,
        };
        let label = self.config.label.as_str();

        if !self.config.teardown_on_drop {
            warn!(
                scope = label,
                live = inner.registry.lock().live_count(),
                "scope_dropped_without_teardown"
            );
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                warn!(scope = label, "scope_dropped_spawning_teardown");
                let span = info_span!("scope_drop_teardown", scope = label);
                runtime.spawn(run_teardown(inner, || {}).instrument(span));
            }
            Err(_) => warn!(
                scope = label,
                live = inner.registry.lock().live_count(),
                "scope_dropped_outside_runtime_destructors_skipped"
            ),
        }
    }
}

impl<H> fmt::Debug for Scope<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Scope")
            .field("label", &self.config.label)
            .field("state", &state.name())
            .field("live", &state.inner().map_or(0, |inner| inner.registry.lock().live_count()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Scope`]
pub struct ScopeBuilder<H> {
    host: Arc<H>,
    config: ScopeConfig,
    reporter: Option<UnobservedFailureHook>,
}

impl<H> ScopeBuilder<H>
where
    H: Send + Sync + 'static,
{
    pub fn new(host: Arc<H>) -> Self {
        Self { host, config: ScopeConfig::default(), reporter: None }
    }

    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn teardown_on_drop(mut self, enabled: bool) -> Self {
        self.config.teardown_on_drop = enabled;
        self
    }

    /// Report failures nobody awaited to `reporter` instead of the
    /// process-wide hook
    pub fn on_unobserved_failure<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&UnobservedFailure<'_>) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn build(self) -> LifecycleResult<Scope<H>> {
        self.config.validate().map_err(|msg| CommonError::config_field("label", msg))?;
        Ok(Scope {
            host: self.host,
            config: self.config,
            reporter: self.reporter,
            state: Mutex::new(ScopeState::Uninit),
        })
    }
}

impl<H> fmt::Debug for ScopeBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("config", &self.config)
            .field("reporter", &self.reporter.as_ref().map(|_| "<hook>"))
            .finish_non_exhaustive()
    }
}

fn resource_label(entry: &Entry) -> String {
    match entry.id() {
        Some(id) => id.to_string(),
        None => format!("<{}>", entry.type_name()),
    }
}

async fn construct<H, T>(
    registry: Arc<Mutex<Registry>>,
    entry: Arc<Entry>,
    host: Arc<H>,
    constructor: Constructor<H, T>,
) -> LifecycleResult<Arc<T>>
where
    H: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    let outcome = AssertUnwindSafe(async move { constructor(host).await }).catch_unwind().await;

    let failure = match outcome {
        Ok(Ok(value)) => {
            let value = Arc::new(value);
            let erased: ErasedValue = value.clone();
            entry.settle(Ok(erased));
            let committed = registry.lock().commit(&entry);
            debug!(resource = %resource_label(&entry), committed, "resource_constructed");
            return Ok(value);
        }
        Ok(Err(err)) => Failure::new(err),
        Err(payload) => Failure::from_panic(&*payload),
    };

    entry.settle(Err(failure.clone()));
    warn!(
        resource = %resource_label(&entry),
        panicked = failure.is_panic(),
        error = %failure,
        "resource_construction_failed"
    );
    Err(LifecycleError::ConstructorFailure { id: entry.id().cloned(), source: failure })
}

/// Destroy one entry and unlink it, whatever the destructor does
async fn dispose(registry: &Mutex<Registry>, entry: Arc<Entry>) -> LifecycleResult<()> {
    let outcome = match entry.settled().await {
        Ok(value) => run_destructor(&entry, value).await,
        Err(_) => {
            debug!(resource = %resource_label(&entry), "resource_destroy_skipped_failed_construction");
            Ok(())
        }
    };
    registry.lock().remove(&entry);
    outcome
}

async fn run_destructor(entry: &Entry, value: ErasedValue) -> LifecycleResult<()> {
    let Some(destructor) = entry.take_destructor() else {
        debug!(resource = %resource_label(entry), "resource_released");
        return Ok(());
    };

    let outcome = AssertUnwindSafe(async move { destructor(value).await }).catch_unwind().await;
    let failure = match outcome {
        Ok(Ok(())) => {
            debug!(resource = %resource_label(entry), "resource_destroyed");
            return Ok(());
        }
        Ok(Err(err)) => Failure::new(err),
        Err(payload) => Failure::from_panic(&*payload),
    };

    warn!(
        resource = %resource_label(entry),
        panicked = failure.is_panic(),
        error = %failure,
        "resource_destructor_failed"
    );
    Err(LifecycleError::DestructorFailure { id: entry.id().cloned(), source: failure })
}

/// Drain the queue, then destroy live entries newest first
///
/// `discard` runs once every teardown unit is queued.
async fn run_teardown<F>(inner: Inner, discard: F) -> TeardownReport
where
    F: FnOnce(),
{
    inner.queue.idle().await;

    let order = inner.registry.lock().teardown_order();
    // Fail later `get` calls fast while the teardown units drain.
    for entry in &order {
        entry.mark_pending_destroy();
    }
    let units: Vec<_> = order
        .into_iter()
        .map(|entry| {
            let registry = Arc::clone(&inner.registry);
            inner.queue.enqueue("teardown", move || async move { dispose(&registry, entry).await })
        })
        .collect();

    discard();
    drop(inner);

    let mut report = TeardownReport::default();
    for unit in units {
        match unit.await {
            Ok(()) => report.destroyed += 1,
            Err(err @ LifecycleError::DestructorFailure { .. }) => {
                report.destroyed += 1;
                report.failures.push(err);
            }
            Err(err) => report.failures.push(err),
        }
    }

    info!(destroyed = report.destroyed, failed = report.failures.len(), "scope_torn_down");
    report
}
