use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::instance::EventChannel;
use super::registry::ReactorLauncher;
use super::WorkflowPool;
use crate::logging::panic_message;
use crate::{Reaction, WorkflowError, WorkflowId, WorkflowOutput, WorkflowState, WorkflowType};

/// Definition of a state machine: one suspendable transition step.
///
/// `on_react` may await events, nested workflows (via the pool), workers, or any other
/// future. Errors escaping it end the instance with [`WorkflowError::ReactorFailed`], except
/// a [`WorkflowError::Cancelled`] at the root of the chain, which passes through unchanged.
#[async_trait]
pub trait Reactor: Send + Sync + 'static {
    type State: WorkflowState;
    type Event: Send + 'static;
    type Output: WorkflowOutput;

    async fn on_react(
        &self,
        state: Self::State,
        events: &mut EventChannel<Self::Event>,
        pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<Self::State, Self::Output>>;

    /// Name recorded in failures and logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn workflow_type() -> WorkflowType<Self::State, Self::Event, Self::Output>
    where
        Self: Sized,
    {
        WorkflowType::new()
    }

    fn into_launcher(self) -> ReactorLauncher<Self>
    where
        Self: Sized,
    {
        ReactorLauncher::new(self)
    }
}

/// Drive `reactor` from `initial_state` until it finishes, publishing every entered state.
pub(crate) async fn run_reactor<R: Reactor>(
    reactor: Arc<R>,
    id: WorkflowId<R::State, R::Event, R::Output>,
    initial_state: R::State,
    mut events: EventChannel<R::Event>,
    states: watch::Sender<R::State>,
    pool: WorkflowPool,
) -> Result<R::Output, WorkflowError> {
    let mut reaction = Reaction::EnterState(initial_state);
    let mut steps: u64 = 0;
    loop {
        let state = match reaction {
            Reaction::EnterState(state) => state,
            Reaction::FinishWith(result) => {
                debug!(steps, "workflow finished");
                return Ok(result);
            }
        };
        publish(&states, &state);
        let step = AssertUnwindSafe(reactor.on_react(state.clone(), &mut events, &pool))
            .catch_unwind()
            .await;
        steps = steps.saturating_add(1);
        reaction = match step {
            Ok(Ok(next)) => next,
            Ok(Err(err)) => return Err(translate_failure(reactor.name(), &id, &state, err)),
            Err(payload) => return Err(failed(reactor.name(), &id, &state, panic_message(&*payload))),
        };
    }
}

fn publish<S: WorkflowState>(states: &watch::Sender<S>, state: &S) {
    let changed = states.send_if_modified(|current| {
        if *current == *state {
            false
        } else {
            *current = state.clone();
            true
        }
    });
    if changed {
        trace!(?state, "published state");
    }
}

fn translate_failure<S, E, O>(
    reactor: &str,
    id: &WorkflowId<S, E, O>,
    state: &impl std::fmt::Debug,
    err: anyhow::Error,
) -> WorkflowError {
    if let Some(cancelled) = err.downcast_ref::<WorkflowError>().filter(|e| e.is_cancelled()) {
        debug!(%id, "step cancelled");
        return cancelled.clone();
    }
    failed(reactor, id, state, format!("{err:#}"))
}

fn failed<S, E, O>(
    reactor: &str,
    id: &WorkflowId<S, E, O>,
    state: &impl std::fmt::Debug,
    message: String,
) -> WorkflowError {
    let state = format!("{state:?}");
    warn!(%id, reactor, state = %state, error = %message, "reactor step failed");
    WorkflowError::ReactorFailed {
        reactor: reactor.to_string(),
        id: id.to_string(),
        state,
        message,
    }
}
