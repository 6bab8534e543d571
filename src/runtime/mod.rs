use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::AbortHandle;
use tracing::debug;

use crate::identity::ErasedId;
use crate::{
    FinishedHandle, Handle, Reaction, RunningHandle, WorkflowError, WorkflowId, WorkflowOutput, WorkflowState,
    WorkflowType,
};

pub mod config;
pub mod instance;
pub mod reactor;
pub mod registry;

pub use config::PoolConfig;
pub use instance::{EventChannel, EventSink, WorkflowInstance};
pub use reactor::Reactor;
pub use registry::{FnWorker, Launcher, ReactorLauncher, Worker, WorkerReactor};

use registry::LauncherRegistry;

/// Poison-tolerant lock. Guarded sections are short, synchronous and never leave a map
/// half-updated.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live instance with its concrete type erased.
struct LiveEntry {
    instance: Arc<dyn Any + Send + Sync>,
    abort: AbortHandle,
}

struct PoolInner {
    config: PoolConfig,
    launchers: LauncherRegistry,
    instances: Mutex<HashMap<ErasedId, LiveEntry>>,
}

/// Non-owning reference to a pool, held by the instances it launched.
#[derive(Clone)]
pub(crate) struct WeakPool(Weak<PoolInner>);

impl WeakPool {
    pub(crate) fn upgrade(&self) -> Option<WorkflowPool> {
        self.0.upgrade().map(|inner| WorkflowPool { inner })
    }
}

/// Registry of launchers and of the live workflow instances they created.
///
/// At most one instance is live per [`WorkflowId`]: lookup and insertion happen under one
/// lock. An instance is removed by the call that observes its completion, or immediately
/// when it is abandoned or cancelled. Cloning the pool shares the same registries.
#[derive(Clone)]
pub struct WorkflowPool {
    inner: Arc<PoolInner>,
}

impl Default for WorkflowPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowPool {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        if config.install_subscriber {
            crate::logging::init_default_subscriber(&config.default_log_filter);
        }
        Self {
            inner: Arc::new(PoolInner {
                config,
                launchers: LauncherRegistry::default(),
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakPool {
        WeakPool(Arc::downgrade(&self.inner))
    }

    /// Register `launcher` for `ty`, replacing any previous one. Running instances keep the
    /// launcher they were created with.
    pub fn register<S, E, O, L>(&self, launcher: L, ty: WorkflowType<S, E, O>)
    where
        S: 'static,
        E: 'static,
        O: 'static,
        L: Launcher<S, E, O>,
    {
        let replaced = self.inner.launchers.register(Arc::new(launcher), &ty);
        debug!(pool = %self.name(), workflow_type = %ty, replaced, "registered launcher");
    }

    pub fn register_reactor<R: Reactor>(&self, reactor: R) {
        self.register(reactor.into_launcher(), R::workflow_type());
    }

    pub fn launcher_count(&self) -> usize {
        self.inner.launchers.len()
    }

    /// Start the instance for `handle.id` if none is live (seeded with `handle.state`), then
    /// wait until it publishes a state different from `handle.state` or finishes.
    ///
    /// A finished instance is removed from the pool before `Finished` is returned, so the next
    /// call for the same id starts a new instance. Cancellation surfaces as
    /// [`WorkflowError::Cancelled`], step failures as [`WorkflowError::ReactorFailed`].
    pub async fn await_update<S, E, O>(&self, handle: RunningHandle<S, E, O>) -> Result<Handle<S, E, O>, WorkflowError>
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        let instance = self.require_instance(&handle)?;
        match instance.next_update(&handle.state).await {
            Ok(Reaction::EnterState(state)) => Ok(Handle::Running(RunningHandle::new(handle.id, state))),
            Ok(Reaction::FinishWith(result)) => {
                self.reap(&handle.id, &instance);
                Ok(Handle::Finished(FinishedHandle::new(handle.id, result)))
            }
            Err(err) => {
                self.reap(&handle.id, &instance);
                Err(err)
            }
        }
    }

    /// Run `worker` on `input` as the instance named `name` and wait for its output. A call
    /// for an id whose worker is still running joins that computation instead of starting
    /// another one.
    pub async fn await_worker_result<W: Worker>(
        &self,
        worker: W,
        input: W::Input,
        name: impl Into<String>,
    ) -> Result<W::Output, WorkflowError> {
        let ty = W::workflow_type();
        let id = ty.make_id(name);
        self.register(worker.into_launcher(), ty);
        let mut handle = RunningHandle::new(id, input);
        loop {
            match self.await_update(handle).await? {
                Handle::Finished(finished) => return Ok(finished.result),
                Handle::Running(running) => handle = running,
            }
        }
    }

    /// Event sink for `id`. The live instance is looked up on every send; with none live the
    /// event is dropped. Never starts an instance.
    pub fn input<S, E, O>(&self, id: &WorkflowId<S, E, O>) -> EventSink<E>
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        let pool = self.downgrade();
        let target = id.clone();
        EventSink::new(
            id.to_string(),
            Arc::new(move |event: E| match pool.upgrade() {
                Some(pool) => pool.deliver(&target, event),
                None => false,
            }),
        )
    }

    /// Cancel the live instance at `id`, if any.
    pub fn abandon<S, E, O>(&self, id: &WorkflowId<S, E, O>) {
        let removed = lock(&self.inner.instances).remove(&id.erased());
        if let Some(entry) = removed {
            entry.abort.abort();
            debug!(pool = %self.name(), %id, "abandoned workflow");
        }
    }

    /// Cancel every live instance. Used at teardown.
    pub fn abandon_all(&self) {
        let drained: Vec<(ErasedId, LiveEntry)> = lock(&self.inner.instances).drain().collect();
        for (_, entry) in &drained {
            entry.abort.abort();
        }
        debug!(pool = %self.name(), count = drained.len(), "abandoned all workflows");
    }

    pub fn is_live<S, E, O>(&self, id: &WorkflowId<S, E, O>) -> bool {
        lock(&self.inner.instances).contains_key(&id.erased())
    }

    pub fn live_count(&self) -> usize {
        lock(&self.inner.instances).len()
    }

    /// The live instance at `id`, without starting one.
    pub fn live_instance<S, E, O>(&self, id: &WorkflowId<S, E, O>) -> Option<Arc<WorkflowInstance<S, E, O>>>
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        lock(&self.inner.instances).get(&id.erased()).map(downcast_entry)
    }

    /// Latest state published by the live instance at `id`.
    pub fn current_state<S, E, O>(&self, id: &WorkflowId<S, E, O>) -> Option<S>
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        self.live_instance(id).map(|instance| instance.current_state())
    }

    /// Look up or launch the instance for `handle.id`. The check and the insert happen under
    /// the same lock, so concurrent first references launch exactly one instance. A cancelled
    /// entry counts as absent.
    fn require_instance<S, E, O>(&self, handle: &RunningHandle<S, E, O>) -> Result<Arc<WorkflowInstance<S, E, O>>, WorkflowError>
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        let key = handle.id.erased();
        let mut instances = lock(&self.inner.instances);
        match instances.get(&key).map(downcast_entry::<S, E, O>) {
            Some(instance) if !instance.is_cancelled() => return Ok(instance),
            Some(_) => {
                instances.remove(&key);
                debug!(pool = %self.name(), id = %handle.id, "dropped cancelled workflow");
            }
            None => {}
        }
        let ty = handle.id.workflow_type();
        let launcher = self.inner.launchers.get(ty).ok_or_else(|| WorkflowError::Unregistered {
            workflow_type: ty.to_string(),
        })?;
        let instance = Arc::new(launcher.launch(handle.id.clone(), handle.state.clone(), self));
        instances.insert(
            key,
            LiveEntry {
                abort: instance.abort_handle(),
                instance: instance.clone(),
            },
        );
        debug!(pool = %self.name(), id = %handle.id, "launched workflow");
        Ok(instance)
    }

    /// Remove `instance` from `id`, unless a different instance already lives there.
    fn reap<S, E, O>(&self, id: &WorkflowId<S, E, O>, instance: &WorkflowInstance<S, E, O>)
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        if self.remove_if_current(id, instance) {
            debug!(pool = %self.name(), %id, "reaped workflow");
        }
    }

    /// Called by [`WorkflowInstance::cancel`].
    pub(crate) fn detach<S, E, O>(&self, id: &WorkflowId<S, E, O>, instance: &WorkflowInstance<S, E, O>)
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        if self.remove_if_current(id, instance) {
            debug!(pool = %self.name(), %id, "cancelled workflow");
        }
    }

    fn remove_if_current<S, E, O>(&self, id: &WorkflowId<S, E, O>, instance: &WorkflowInstance<S, E, O>) -> bool
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        let key = id.erased();
        let mut instances = lock(&self.inner.instances);
        let target: *const WorkflowInstance<S, E, O> = instance;
        let current = instances
            .get(&key)
            .is_some_and(|entry| std::ptr::addr_eq(Arc::as_ptr(&entry.instance), target));
        if current {
            instances.remove(&key);
        }
        current
    }

    fn deliver<S, E, O>(&self, id: &WorkflowId<S, E, O>, event: E) -> bool
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
    {
        match self.live_instance(id) {
            Some(instance) => instance.send_event(event),
            None => false,
        }
    }
}

impl std::fmt::Debug for WorkflowPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowPool")
            .field("name", &self.name())
            .field("launchers", &self.launcher_count())
            .field("live", &self.live_count())
            .finish()
    }
}

fn downcast_entry<S, E, O>(entry: &LiveEntry) -> Arc<WorkflowInstance<S, E, O>>
where
    S: WorkflowState,
    E: Send + 'static,
    O: WorkflowOutput,
{
    match entry.instance.clone().downcast::<WorkflowInstance<S, E, O>>() {
        Ok(instance) => instance,
        Err(_) => unreachable!("live entries are keyed by their own type triple"),
    }
}
