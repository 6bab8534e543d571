use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::instance::{EventChannel, WorkflowInstance};
use super::reactor::Reactor;
use super::{WorkflowPool, lock};
use crate::identity::ErasedType;
use crate::{Reaction, WorkflowId, WorkflowOutput, WorkflowState, WorkflowType};

/// Factory for workflow instances of one type. Stateless; registered per type.
///
/// `launch` runs while the pool holds its creation lock, so it must not call back into the
/// pool synchronously. Spawning a task that uses the pool later is fine.
pub trait Launcher<S, E, O>: Send + Sync + 'static {
    fn launch(&self, id: WorkflowId<S, E, O>, initial_state: S, pool: &WorkflowPool) -> WorkflowInstance<S, E, O>;
}

/// Launches a [`Reactor`] by spawning its execution loop.
pub struct ReactorLauncher<R> {
    reactor: Arc<R>,
}

impl<R: Reactor> ReactorLauncher<R> {
    pub fn new(reactor: R) -> Self {
        Self::from_arc(Arc::new(reactor))
    }

    pub fn from_arc(reactor: Arc<R>) -> Self {
        Self { reactor }
    }
}

impl<R: Reactor> Launcher<R::State, R::Event, R::Output> for ReactorLauncher<R> {
    fn launch(
        &self,
        id: WorkflowId<R::State, R::Event, R::Output>,
        initial_state: R::State,
        pool: &WorkflowPool,
    ) -> WorkflowInstance<R::State, R::Event, R::Output> {
        WorkflowInstance::spawn(self.reactor.clone(), id, initial_state, pool.clone())
    }
}

/// Type-erased `Type -> Launcher` map. Each value is an `Arc<dyn Launcher<S, E, O>>` for the
/// triple of its key, so downcasts by key never mismatch.
#[derive(Default)]
pub(crate) struct LauncherRegistry {
    inner: Mutex<HashMap<ErasedType, Box<dyn Any + Send + Sync>>>,
}

impl LauncherRegistry {
    /// Returns whether a previous launcher was replaced.
    pub(crate) fn register<S, E, O>(&self, launcher: Arc<dyn Launcher<S, E, O>>, ty: &WorkflowType<S, E, O>) -> bool
    where
        S: 'static,
        E: 'static,
        O: 'static,
    {
        lock(&self.inner).insert(ty.erased(), Box::new(launcher)).is_some()
    }

    pub(crate) fn get<S, E, O>(&self, ty: &WorkflowType<S, E, O>) -> Option<Arc<dyn Launcher<S, E, O>>>
    where
        S: 'static,
        E: 'static,
        O: 'static,
    {
        lock(&self.inner)
            .get(&ty.erased())?
            .downcast_ref::<Arc<dyn Launcher<S, E, O>>>()
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}

// ---------------- Workers

/// A one-shot asynchronous computation with no intermediate states and no events.
///
/// Run through [`WorkflowPool::await_worker_result`], a worker gets the same identity-keyed,
/// cancelable, selectable treatment as a full reactor: concurrent calls for one id share a
/// single in-flight `call`.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    type Input: WorkflowState;
    type Output: WorkflowOutput;

    async fn call(&self, input: Self::Input) -> anyhow::Result<Self::Output>;

    fn workflow_type() -> WorkflowType<Self::Input, Infallible, Self::Output>
    where
        Self: Sized,
    {
        WorkflowType::new()
    }

    fn into_launcher(self) -> ReactorLauncher<WorkerReactor<Self>>
    where
        Self: Sized,
    {
        ReactorLauncher::new(WorkerReactor(self))
    }
}

/// Single-step reactor around a [`Worker`]: call it, finish with its output.
pub struct WorkerReactor<W>(pub W);

#[async_trait]
impl<W: Worker> Reactor for WorkerReactor<W> {
    type State = W::Input;
    type Event = Infallible;
    type Output = W::Output;

    async fn on_react(
        &self,
        state: W::Input,
        _events: &mut EventChannel<Infallible>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<W::Input, W::Output>> {
        Ok(Reaction::FinishWith(self.0.call(state).await?))
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<W>()
    }
}

/// Function wrapper that implements [`Worker`].
pub struct FnWorker<I, O, F, Fut> {
    f: F,
    _marker: PhantomData<fn(I) -> (O, Fut)>,
}

impl<I, O, F, Fut> FnWorker<I, O, F, Fut>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f, _marker: PhantomData }
    }
}

#[async_trait]
impl<I, O, F, Fut> Worker for FnWorker<I, O, F, Fut>
where
    I: WorkflowState,
    O: WorkflowOutput,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn call(&self, input: I) -> anyhow::Result<O> {
        (self.f)(input).await
    }
}
