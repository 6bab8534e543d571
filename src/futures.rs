//! Racing several pending sources and committing to the first one that resolves.
//!
//! A [`Select`] collects cases, each a source paired with a handler mapping the source's
//! payload into a common result type. [`Select::run`] polls the cases in the order they were
//! added, runs the handler of the first source to complete, and drops every other case.
//!
//! Dropping a losing case cancels only the wait started for this select. A pool instance
//! behind a losing `on_update` keeps running and stays reachable by its id; the caller
//! abandons it explicitly if it is no longer referenced.
use std::future::Future;
use std::time::Duration;

use ::futures::future::{self, BoxFuture, FutureExt};
use tracing::{trace, warn};

use crate::runtime::{EventChannel, Worker, WorkflowPool};
use crate::{Handle, RunningHandle, WorkflowError, WorkflowOutput, WorkflowState};

/// Builder for a one-shot race between heterogeneous sources.
pub struct Select<'a, R> {
    cases: Vec<BoxFuture<'a, R>>,
}

impl<'a, R: Send + 'a> Default for Select<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R: Send + 'a> Select<'a, R> {
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Wait for the next update of the instance behind `handle`, starting it if needed.
    pub fn on_update<S, E, O, F>(self, pool: &'a WorkflowPool, handle: RunningHandle<S, E, O>, handler: F) -> Self
    where
        S: WorkflowState,
        E: Send + 'static,
        O: WorkflowOutput,
        F: FnOnce(Result<Handle<S, E, O>, WorkflowError>) -> R + Send + 'a,
    {
        self.case(async move { handler(pool.await_update(handle).await) })
    }

    /// Wait for `worker`'s result on `input`, joining a running computation with the same name.
    pub fn on_worker_result<W, F>(
        self,
        pool: &'a WorkflowPool,
        worker: W,
        input: W::Input,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        W: Worker,
        F: FnOnce(Result<W::Output, WorkflowError>) -> R + Send + 'a,
    {
        let name = name.into();
        self.case(async move { handler(pool.await_worker_result(worker, input, name).await) })
    }

    pub fn on_future<T, Fut, F>(self, source: Fut, handler: F) -> Self
    where
        Fut: Future<Output = T> + Send + 'a,
        F: FnOnce(T) -> R + Send + 'a,
    {
        self.case(source.map(handler))
    }

    /// Next event from the instance's own queue. The handler sees `None` if the queue is closed.
    pub fn on_event<E, F>(self, events: &'a mut EventChannel<E>, handler: F) -> Self
    where
        E: Send + 'a,
        F: FnOnce(Option<E>) -> R + Send + 'a,
    {
        self.case(async move { handler(events.receive().await) })
    }

    /// Next event accepted by `filter`. Events the filter rejects are consumed and discarded.
    pub fn on_event_matching<E, T, P, F>(self, events: &'a mut EventChannel<E>, filter: P, handler: F) -> Self
    where
        E: Send + 'a,
        T: Send + 'a,
        P: FnMut(E) -> Option<T> + Send + 'a,
        F: FnOnce(Option<T>) -> R + Send + 'a,
    {
        self.case(async move { handler(events.receive_matching(filter).await) })
    }

    pub fn on_timeout<F>(self, after: Duration, handler: F) -> Self
    where
        F: FnOnce() -> R + Send + 'a,
    {
        self.case(async move {
            tokio::time::sleep(after).await;
            handler()
        })
    }

    /// Resolve to the handler output of the first case to complete. Ties go to the case added
    /// first. A select without cases never completes.
    pub async fn run(self) -> R {
        if self.cases.is_empty() {
            warn!("select has no cases and will never complete");
            return future::pending().await;
        }
        let cases = self.cases.len();
        let (result, index, _) = future::select_all(self.cases).await;
        trace!(index, cases, "select committed");
        result
    }

    fn case(mut self, fut: impl Future<Output = R> + Send + 'a) -> Self {
        self.cases.push(fut.boxed());
        self
    }
}
