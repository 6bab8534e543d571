//! In-process engine for long-lived, hierarchically composable state machines.
//!
//! A [`WorkflowPool`] maps typed identities to live workflow instances. Each instance is a
//! [`Reactor`] driven step by step through its states until it finishes with a result.
//! It provides:
//!
//! - Identity: [`WorkflowType`] and [`WorkflowId`], keyed by `(state, event, output)` types
//! - Data model: [`Reaction`] produced by each step, [`Handle`] describing what a caller last saw
//! - The pool: `await_update`, `await_worker_result`, `input`, `abandon`, `abandon_all`
//! - [`Worker`]s for wrapping plain async calls in the same identity-keyed machinery
//! - [`Select`] for racing nested updates, worker results, events and arbitrary futures
//! - [`Snapshot`] helpers for states that embed their children's snapshots
//!
//! Delegation is explicit: a parent that stops referencing a running child must call
//! [`WorkflowPool::abandon`] for it. The pool never infers ownership.
use std::fmt;

pub mod error;
pub mod futures;
pub mod identity;
pub mod logging;
pub mod runtime;
pub mod snapshot;

pub use crate::error::WorkflowError;
pub use crate::futures::Select;
pub use crate::identity::{WorkflowId, WorkflowType};
pub use crate::runtime::{
    EventChannel, EventSink, FnWorker, Launcher, PoolConfig, Reactor, ReactorLauncher, Worker, WorkerReactor,
    WorkflowInstance, WorkflowPool,
};
pub use crate::snapshot::{Snapshot, SnapshotError, SnapshotReader, SnapshotWriter};

/// Bounds every workflow state satisfies. States are compared to skip redundant updates and
/// rendered with `Debug` when a step fails.
pub trait WorkflowState: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> WorkflowState for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Bounds every workflow result satisfies. Results are replayed to every awaiter.
pub trait WorkflowOutput: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> WorkflowOutput for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Outcome of one reactor step: continue in a new state, or finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction<S, O> {
    EnterState(S),
    FinishWith(O),
}

/// Point-in-time view of a running instance: the last state the holder saw.
pub struct RunningHandle<S, E, O> {
    pub id: WorkflowId<S, E, O>,
    pub state: S,
}

impl<S, E, O> RunningHandle<S, E, O> {
    pub fn new(id: WorkflowId<S, E, O>, state: S) -> Self {
        Self { id, state }
    }
}

/// The result an instance finished with.
pub struct FinishedHandle<S, E, O> {
    pub id: WorkflowId<S, E, O>,
    pub result: O,
}

impl<S, E, O> FinishedHandle<S, E, O> {
    pub fn new(id: WorkflowId<S, E, O>, result: O) -> Self {
        Self { id, result }
    }
}

/// What [`WorkflowPool::await_update`] reports back.
pub enum Handle<S, E, O> {
    Running(RunningHandle<S, E, O>),
    Finished(FinishedHandle<S, E, O>),
}

impl<S, E, O> Handle<S, E, O> {
    pub fn id(&self) -> &WorkflowId<S, E, O> {
        match self {
            Handle::Running(running) => &running.id,
            Handle::Finished(finished) => &finished.id,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Handle::Finished(_))
    }
}

// Manual impls: deriving would demand `E: Clone + Debug + PartialEq` for a phantom parameter.

impl<S: Clone, E, O> Clone for RunningHandle<S, E, O> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone(), self.state.clone())
    }
}

impl<S: PartialEq, E, O> PartialEq for RunningHandle<S, E, O> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.state == other.state
    }
}

impl<S: fmt::Debug, E, O> fmt::Debug for RunningHandle<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Running")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

impl<S, E, O: Clone> Clone for FinishedHandle<S, E, O> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone(), self.result.clone())
    }
}

impl<S, E, O: PartialEq> PartialEq for FinishedHandle<S, E, O> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.result == other.result
    }
}

impl<S, E, O: fmt::Debug> fmt::Debug for FinishedHandle<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finished")
            .field("id", &self.id)
            .field("result", &self.result)
            .finish()
    }
}

impl<S: Clone, E, O: Clone> Clone for Handle<S, E, O> {
    fn clone(&self) -> Self {
        match self {
            Handle::Running(running) => Handle::Running(running.clone()),
            Handle::Finished(finished) => Handle::Finished(finished.clone()),
        }
    }
}

impl<S: PartialEq, E, O: PartialEq> PartialEq for Handle<S, E, O> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Handle::Running(a), Handle::Running(b)) => a == b,
            (Handle::Finished(a), Handle::Finished(b)) => a == b,
            _ => false,
        }
    }
}

impl<S: fmt::Debug, E, O: fmt::Debug> fmt::Debug for Handle<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Running(running) => running.fmt(f),
            Handle::Finished(finished) => finished.fmt(f),
        }
    }
}
