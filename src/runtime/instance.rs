use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{Instrument, info_span, trace};

use super::{WeakPool, WorkflowPool};
use super::reactor::{Reactor, run_reactor};
use crate::logging::panic_message;
use crate::{Reaction, WorkflowError, WorkflowId, WorkflowOutput, WorkflowState};

type Outcome<O> = Shared<BoxFuture<'static, Result<O, WorkflowError>>>;

/// Runtime handle of one running reactor.
///
/// Owned by the pool entry that launched it. The state channel keeps the current state and
/// wakes subscribers on every change; the outcome resolves once and is replayed to every
/// awaiter afterwards.
pub struct WorkflowInstance<S, E, O> {
    id: WorkflowId<S, E, O>,
    states: watch::Receiver<S>,
    events: mpsc::UnboundedSender<E>,
    outcome: Outcome<O>,
    abort: AbortHandle,
    cancelled: AtomicBool,
    pool: WeakPool,
}

impl<S, E, O> WorkflowInstance<S, E, O>
where
    S: WorkflowState,
    E: Send + 'static,
    O: WorkflowOutput,
{
    /// Spawn the execution loop of `reactor` on the current tokio runtime.
    pub fn spawn<R>(reactor: Arc<R>, id: WorkflowId<S, E, O>, initial_state: S, pool: WorkflowPool) -> Self
    where
        R: Reactor<State = S, Event = E, Output = O>,
    {
        let (state_tx, states) = watch::channel(initial_state.clone());
        let (events, event_rx) = mpsc::unbounded_channel();
        let owner = pool.downgrade();
        let span = info_span!("workflow", pool = %pool.name(), id = %id);
        let task = tokio::spawn(
            run_reactor(reactor, id.clone(), initial_state, EventChannel::new(event_rx), state_tx, pool).instrument(span),
        );
        let abort = task.abort_handle();
        let label = id.to_string();
        let outcome = task
            .map(move |joined| match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => Err(WorkflowError::cancelled(&label)),
                Err(err) => Err(WorkflowError::ReactorFailed {
                    reactor: "<task>".to_string(),
                    id: label,
                    state: "<unknown>".to_string(),
                    message: match err.try_into_panic() {
                        Ok(payload) => panic_message(&*payload),
                        Err(err) => err.to_string(),
                    },
                }),
            })
            .boxed()
            .shared();
        Self {
            id,
            states,
            events,
            outcome,
            abort,
            cancelled: AtomicBool::new(false),
            pool: owner,
        }
    }

    pub fn id(&self) -> &WorkflowId<S, E, O> {
        &self.id
    }

    /// Latest published state.
    pub fn current_state(&self) -> S {
        self.states.borrow().clone()
    }

    /// Subscribe to state changes; the receiver starts at the current state.
    pub fn states(&self) -> watch::Receiver<S> {
        self.states.clone()
    }

    /// Current state followed by every later one; ends when the instance ends.
    pub fn state_stream(&self) -> BoxStream<'static, S> {
        stream::unfold((self.states.clone(), true), |(mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let state = rx.borrow_and_update().clone();
            Some((state, (rx, false)))
        })
        .boxed()
    }

    /// Queue an event for the reactor. Returns false once the loop has ended.
    ///
    /// The queue is unbounded: events wait there until a step receives them, so a reactor
    /// that never receives keeps every event sent to it until it ends.
    pub fn send_event(&self, event: E) -> bool {
        self.events.send(event).is_ok()
    }

    /// Terminal outcome; any number of callers may await it.
    pub async fn result(&self) -> Result<O, WorkflowError> {
        self.outcome.clone().await
    }

    /// Interrupt the loop at its next suspension point. Awaiters see `Cancelled`.
    ///
    /// If this instance is the one live in its pool, it is removed there at once; the next
    /// `await_update` for its id starts a fresh instance.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
        if let Some(pool) = self.pool.upgrade() {
            pool.detach(&self.id, self);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    pub(crate) fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Wait for a state different from `last_seen`, or for the outcome. A newer state
    /// is reported before the outcome even when the loop has already ended.
    pub(crate) async fn next_update(&self, last_seen: &S) -> Result<Reaction<S, O>, WorkflowError> {
        let mut states = self.states.clone();
        loop {
            if let Some(state) = changed_from(&mut states, last_seen) {
                return Ok(Reaction::EnterState(state));
            }
            if states.changed().await.is_err() {
                break;
            }
        }
        if let Some(state) = changed_from(&mut states, last_seen) {
            return Ok(Reaction::EnterState(state));
        }
        self.outcome.clone().await.map(Reaction::FinishWith)
    }
}

fn changed_from<S: Clone + PartialEq>(states: &mut watch::Receiver<S>, last_seen: &S) -> Option<S> {
    let current = states.borrow_and_update();
    (*current != *last_seen).then(|| current.clone())
}

impl<S, E, O> fmt::Debug for WorkflowInstance<S, E, O>
where
    S: WorkflowState,
    E: Send + 'static,
    O: WorkflowOutput,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowInstance")
            .field("id", &self.id)
            .field("finished", &self.abort.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The reactor's side of its event queue, handed to every `on_react` step.
pub struct EventChannel<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> EventChannel<E> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<E>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once no sender can deliver any more.
    pub async fn receive(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Next event accepted by `filter`, projected to `T`. Rejected events are discarded.
    pub async fn receive_matching<T>(&mut self, mut filter: impl FnMut(E) -> Option<T> + Send) -> Option<T>
    where
        E: Send,
    {
        while let Some(event) = self.rx.recv().await {
            if let Some(accepted) = filter(event) {
                return Some(accepted);
            }
            trace!("event discarded by filter");
        }
        None
    }

    pub fn try_receive(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel").finish_non_exhaustive()
    }
}

/// Sends events to whichever instance is live at an id when `send` is called.
/// Events for an id with no live instance are dropped.
pub struct EventSink<E> {
    target: String,
    deliver: Arc<dyn Fn(E) -> bool + Send + Sync>,
}

impl<E> EventSink<E> {
    pub(crate) fn new(target: String, deliver: Arc<dyn Fn(E) -> bool + Send + Sync>) -> Self {
        Self { target, deliver }
    }

    /// Returns whether a live instance accepted the event.
    ///
    /// Acceptance means queued, not received. The instance's queue has no bound and holds
    /// events until a step receives them or the instance ends.
    pub fn send(&self, event: E) -> bool {
        let delivered = (self.deliver)(event);
        if !delivered {
            trace!(workflow = %self.target, "dropping event for absent workflow");
        }
        delivered
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            deliver: self.deliver.clone(),
        }
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("target", &self.target).finish()
    }
}
