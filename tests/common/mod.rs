#![allow(dead_code)]
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_workflow::{
    EventChannel, FnWorker, Handle, Launcher, PoolConfig, Reaction, Reactor, RunningHandle, Select, Worker,
    WorkflowError, WorkflowId, WorkflowInstance, WorkflowPool,
};

pub fn test_pool() -> WorkflowPool {
    WorkflowPool::with_config(PoolConfig::default().with_name("test").with_subscriber(true))
}

/// Poll `cond` every 5ms until it holds or `timeout_ms` elapses.
pub async fn wait_for(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drive `handle` through `await_update` until it finishes, collecting every state seen.
pub async fn run_to_completion<S, E, O>(
    pool: &WorkflowPool,
    mut handle: RunningHandle<S, E, O>,
) -> Result<(Vec<S>, O), WorkflowError>
where
    S: rust_workflow::WorkflowState,
    E: Send + 'static,
    O: rust_workflow::WorkflowOutput,
{
    let mut seen = Vec::new();
    loop {
        match pool.await_update(handle).await? {
            Handle::Running(running) => {
                seen.push(running.state.clone());
                handle = running;
            }
            Handle::Finished(finished) => return Ok((seen, finished.result)),
        }
    }
}

// Wraps a launcher and counts how many instances it started.
pub struct CountingLauncher<L> {
    pub inner: L,
    pub launches: Arc<AtomicUsize>,
}

impl<L> CountingLauncher<L> {
    pub fn new(inner: L) -> (Self, Arc<AtomicUsize>) {
        let launches = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                launches: launches.clone(),
            },
            launches,
        )
    }
}

impl<S, E, O, L: Launcher<S, E, O>> Launcher<S, E, O> for CountingLauncher<L> {
    fn launch(&self, id: WorkflowId<S, E, O>, initial_state: S, pool: &WorkflowPool) -> WorkflowInstance<S, E, O> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.inner.launch(id, initial_state, pool)
    }
}

// ---------------- sample reactors

/// "s0" -> "s1" -> finish with "r0", without waiting for anything.
pub struct TwoStep;

#[async_trait]
impl Reactor for TwoStep {
    type State = String;
    type Event = ();
    type Output = String;

    async fn on_react(
        &self,
        state: String,
        _events: &mut EventChannel<()>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<String, String>> {
        Ok(match state.as_str() {
            "s0" => Reaction::EnterState("s1".to_string()),
            _ => Reaction::FinishWith("r0".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Go;

/// Same transitions as [`TwoStep`], one per received [`Go`].
pub struct Gate;

#[async_trait]
impl Reactor for Gate {
    type State = String;
    type Event = Go;
    type Output = String;

    async fn on_react(
        &self,
        state: String,
        events: &mut EventChannel<Go>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<String, String>> {
        if events.receive().await.is_none() {
            anyhow::bail!("event queue closed");
        }
        Ok(match state.as_str() {
            "s0" => Reaction::EnterState("s1".to_string()),
            _ => Reaction::FinishWith("r0".to_string()),
        })
    }
}

/// Counts up to 3 with `delay` between steps, then finishes with ten times the count.
pub struct Counter {
    pub delay: Duration,
}

#[async_trait]
impl Reactor for Counter {
    type State = u32;
    type Event = ();
    type Output = u32;

    async fn on_react(
        &self,
        n: u32,
        _events: &mut EventChannel<()>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<u32, u32>> {
        if n >= 3 {
            return Ok(Reaction::FinishWith(n * 10));
        }
        tokio::time::sleep(self.delay).await;
        Ok(Reaction::EnterState(n + 1))
    }
}

/// Re-enters state 0 `repeats` times before moving to 1, then finishes.
pub struct Repeater {
    pub repeats: usize,
    pub steps: Arc<AtomicUsize>,
}

#[async_trait]
impl Reactor for Repeater {
    type State = u8;
    type Event = ();
    type Output = usize;

    async fn on_react(
        &self,
        state: u8,
        _events: &mut EventChannel<()>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<u8, usize>> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(match state {
            0 if step <= self.repeats => Reaction::EnterState(0),
            0 => Reaction::EnterState(1),
            _ => Reaction::FinishWith(step),
        })
    }
}

/// Increments its state until it reaches `fail_at`, where it errors (or panics).
pub struct Faulty {
    pub fail_at: i64,
    pub panic: bool,
}

#[async_trait]
impl Reactor for Faulty {
    type State = i64;
    type Event = ();
    type Output = i64;

    async fn on_react(
        &self,
        n: i64,
        _events: &mut EventChannel<()>,
        _pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<i64, i64>> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if n == self.fail_at {
            if self.panic {
                panic!("faulty reactor hit {n}");
            }
            anyhow::bail!("faulty reactor hit {n}");
        }
        Ok(Reaction::EnterState(n + 1))
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

// ---------------- delegation

#[derive(Debug, Clone, PartialEq)]
pub enum ParentState {
    Idle,
    Delegating(RunningHandle<u32, (), u32>),
}

#[derive(Debug)]
pub enum ParentEvent {
    Stop,
}

/// Starts a [`Counter`] child and follows it until it finishes, or abandons it on `Stop`.
pub struct Parent {
    pub child_name: &'static str,
}

#[async_trait]
impl Reactor for Parent {
    type State = ParentState;
    type Event = ParentEvent;
    type Output = String;

    async fn on_react(
        &self,
        state: ParentState,
        events: &mut EventChannel<ParentEvent>,
        pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<ParentState, String>> {
        let child = match state {
            ParentState::Idle => {
                let id = Counter::workflow_type().make_id(self.child_name);
                return Ok(Reaction::EnterState(ParentState::Delegating(RunningHandle::new(id, 0))));
            }
            ParentState::Delegating(child) => child,
        };
        let child_id = child.id.clone();
        let reaction = Select::new()
            .on_update(pool, child, |update| {
                update.map(|handle| match handle {
                    Handle::Running(running) => Reaction::EnterState(ParentState::Delegating(running)),
                    Handle::Finished(finished) => {
                        Reaction::FinishWith(format!("child finished with {}", finished.result))
                    }
                })
            })
            .on_event(events, |event| {
                pool.abandon(&child_id);
                Ok(Reaction::FinishWith(match event {
                    Some(ParentEvent::Stop) => "stopped".to_string(),
                    None => "orphaned".to_string(),
                }))
            })
            .run()
            .await?;
        Ok(reaction)
    }
}

/// Awaits a [`Gate`] child named "nested" and fails with whatever the child fails with.
pub struct Follower;

#[async_trait]
impl Reactor for Follower {
    type State = bool;
    type Event = ();
    type Output = String;

    async fn on_react(
        &self,
        _state: bool,
        _events: &mut EventChannel<()>,
        pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<bool, String>> {
        let child = RunningHandle::new(Gate::workflow_type().make_id("nested"), "s0".to_string());
        let (_, result) = run_to_completion(pool, child).await?;
        Ok(Reaction::FinishWith(result))
    }
}

/// Races a nested [`Gate`] named "nested" against its own next event; never abandons the child.
pub struct Racer;

#[async_trait]
impl Reactor for Racer {
    type State = ();
    type Event = String;
    type Output = String;

    async fn on_react(
        &self,
        _state: (),
        events: &mut EventChannel<String>,
        pool: &WorkflowPool,
    ) -> anyhow::Result<Reaction<(), String>> {
        let nested = RunningHandle::new(Gate::workflow_type().make_id("nested"), "s0".to_string());
        let outcome = Select::new()
            .on_update(pool, nested, |update| match update {
                Ok(Handle::Running(running)) => format!("nested state:{}", running.state),
                Ok(Handle::Finished(finished)) => format!("nested result:{}", finished.result),
                Err(err) => format!("nested error:{err}"),
            })
            .on_event(events, |event| format!("event:{}", event.unwrap_or_default()))
            .run()
            .await;
        Ok(Reaction::FinishWith(outcome))
    }
}

// ---------------- workers

/// Doubles its input after `delay`, counting invocations.
pub fn slow_doubler(calls: Arc<AtomicUsize>, delay: Duration) -> impl Worker<Input = u32, Output = u32> {
    FnWorker::new(move |n: u32| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            anyhow::Ok(n * 2)
        }
    })
}
