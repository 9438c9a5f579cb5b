//! Dispatch
//!
//! Firing a signal happens in two phases:
//!
//! 1. [`Signal::fire`](crate::Signal::fire) resolves the requested events into
//!    dependency paths and snapshots the matching listeners. The result is an
//!    [`Invoker`], an immutable plan that can be called any number of times.
//!
//! 2. [`Invoker::call`] runs the plan with a payload on the calling thread.
//!    [`AsyncInvoker::call`] hands the same plan to a worker and returns a
//!    [`FireHandle`] future.
//!
//! # Ordering
//!
//! Paths run in the order the events were requested. Within a path, events
//! run in dependency order and listeners in registration order.
//!
//! # Failures
//!
//! Under [`ErrorPolicy::FailFast`] a failing listener stops the rest of its
//! event, and every later event of the same path that depends on the failed
//! one is skipped. Unrelated events still run. The first failure is returned
//! once the plan has finished.
//!
//! # Threading
//!
//! No lock is held while listeners run, so listeners may register new
//! listeners or fire signals themselves. Those changes are seen by the next
//! call to `fire`, not by plans that already exist.
//!
//! # Async Listeners
//!
//! Async listeners are awaited one at a time, in plan order, on the worker
//! that runs an [`AsyncInvoker`]. A synchronous [`Invoker::call`] cannot
//! await them and reports an [`AsyncListenerError`] as that listener's
//! failure instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use indexmap::IndexSet;
use smallvec::SmallVec;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;

use super::listener::{Invocation, ListenerEntry, ListenerFuture, ReceiverId};
use super::signal::SignalState;
use crate::config::{AsyncWorker, ErrorPolicy, SignalConfig};
use crate::error::{
    AsyncListenerError, ListenerInvocationError, ListenerResult, Result, SignalError,
};
use crate::graph::{EventName, EventPath};

/// Lifecycle of one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringState {
    /// Looking up the dependency path of each requested event.
    Resolving,
    /// Snapshotting listeners in path order.
    Ordering,
    /// Running listeners.
    Invoking,
    /// Every eligible listener ran without error.
    Completed,
    /// At least one listener failed.
    Failed,
}

/// Which events to fire and at whom.
#[derive(Debug, Clone, Default)]
pub struct FireOptions {
    events: Vec<EventName>,
    receivers: SmallVec<[ReceiverId; 2]>,
}

impl FireOptions {
    /// Fire the default event at every listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one event to fire.
    pub fn event(mut self, event: impl Into<EventName>) -> Self {
        self.events.push(event.into());
        self
    }

    /// Add several events to fire, in order.
    pub fn events<I, E>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        self.events.extend(events.into_iter().map(Into::into));
        self
    }

    /// Restrict bound listeners to those of `instance`.
    ///
    /// Can be called several times to allow several instances. Free-function
    /// listeners are not affected.
    pub fn receiver<T: ?Sized>(self, instance: &Arc<T>) -> Self {
        self.receiver_id(ReceiverId::of(instance))
    }

    /// Restrict bound listeners to the instance with this receiver ID.
    pub fn receiver_id(mut self, receiver: ReceiverId) -> Self {
        self.receivers.push(receiver);
        self
    }

    /// The requested events, or the default event when none were given.
    pub fn targets(&self) -> Vec<EventName> {
        if self.events.is_empty() {
            vec![EventName::default()]
        } else {
            self.events.clone()
        }
    }

    /// Receivers bound listeners are restricted to; empty means all of them.
    pub fn receivers(&self) -> &[ReceiverId] {
        &self.receivers
    }
}

struct DispatchStep<A, R> {
    event: EventName,
    ancestors: IndexSet<EventName>,
    listeners: Vec<ListenerEntry<A, R>>,
}

struct DispatchPath<A, R> {
    steps: Vec<DispatchStep<A, R>>,
}

/// A resolved, reusable firing plan.
pub struct Invoker<A, R> {
    signal: Arc<str>,
    policy: ErrorPolicy,
    paths: Arc<[DispatchPath<A, R>]>,
}

impl<A, R> Invoker<A, R>
where
    A: 'static,
    R: 'static,
{
    pub(crate) fn plan(
        signal: Arc<str>,
        config: &SignalConfig,
        state: &SignalState<A, R>,
        options: &FireOptions,
    ) -> Self {
        tracing::trace!(signal = %signal, state = ?FiringState::Resolving);
        let resolved = state.graph.resolve_all(options.targets());

        tracing::trace!(signal = %signal, state = ?FiringState::Ordering);
        let paths = resolved
            .into_iter()
            .map(|path| DispatchPath {
                steps: path
                    .into_iter()
                    .map(|event| DispatchStep {
                        ancestors: state.graph.ancestors(event.as_str()),
                        listeners: state
                            .listeners
                            .lookup(event.as_str())
                            .into_iter()
                            .filter(|entry| entry.accepts(options.receivers()))
                            .collect(),
                        event,
                    })
                    .collect(),
            })
            .collect();

        Self {
            signal,
            policy: config.error_policy,
            paths,
        }
    }

    /// The events this plan fires, one path per requested event.
    pub fn event_paths(&self) -> Vec<EventPath> {
        self.paths
            .iter()
            .map(|path| path.steps.iter().map(|step| step.event.clone()).collect())
            .collect()
    }

    /// Number of listener invocations the plan holds.
    pub fn listener_count(&self) -> usize {
        self.paths
            .iter()
            .flat_map(|path| path.steps.iter())
            .map(|step| step.listeners.len())
            .sum()
    }

    /// Run every listener of the plan with `args` on the calling thread.
    ///
    /// Returns the listeners' results in invocation order, or the first
    /// listener failure. Async listeners fail with [`AsyncListenerError`].
    pub fn call(&self, args: &A) -> Result<Vec<R>> {
        self.execute(args, &mut FutureDriver::Unavailable)
    }

    fn execute(&self, args: &A, driver: &mut FutureDriver) -> Result<Vec<R>> {
        tracing::trace!(signal = %self.signal, state = ?FiringState::Invoking);

        let mut results = Vec::with_capacity(self.listener_count());
        let mut first_error: Option<ListenerInvocationError> = None;

        for path in self.paths.iter() {
            let mut failed: IndexSet<&EventName> = IndexSet::new();

            for step in &path.steps {
                if let Some(blocker) = step.ancestors.iter().find(|event| failed.contains(event)) {
                    tracing::warn!(
                        signal = %self.signal,
                        event = %step.event,
                        failed_dependency = %blocker,
                        "skipping event because a dependency failed"
                    );
                    continue;
                }

                for entry in &step.listeners {
                    let Some(invocation) = entry.invoke(args) else {
                        tracing::trace!(
                            signal = %self.signal,
                            event = %step.event,
                            listener = %entry.label(),
                            "skipping dropped receiver"
                        );
                        continue;
                    };
                    tracing::trace!(
                        signal = %self.signal,
                        event = %step.event,
                        listener = %entry.label(),
                        "invoked listener"
                    );

                    let outcome = match invocation {
                        Invocation::Ready(outcome) => outcome,
                        Invocation::Pending(future) => driver.drive(future),
                    };
                    match outcome {
                        Ok(value) => results.push(value),
                        Err(source) => {
                            tracing::warn!(
                                signal = %self.signal,
                                event = %step.event,
                                listener = %entry.label(),
                                error = %source,
                                "listener failed"
                            );
                            if self.policy == ErrorPolicy::LogAndContinue {
                                continue;
                            }
                            failed.insert(&step.event);
                            if first_error.is_none() {
                                first_error = Some(ListenerInvocationError {
                                    event: step.event.clone(),
                                    listener: entry.label().clone(),
                                    source,
                                });
                            }
                            break;
                        }
                    }
                }
            }
        }

        match first_error {
            Some(error) => {
                tracing::debug!(signal = %self.signal, state = ?FiringState::Failed, event = %error.event);
                Err(error.into())
            }
            None => {
                tracing::debug!(
                    signal = %self.signal,
                    state = ?FiringState::Completed,
                    listeners = results.len()
                );
                Ok(results)
            }
        }
    }
}

/// Runs the futures of async listeners to completion on the current thread.
enum FutureDriver {
    /// Synchronous firing.
    Unavailable,
    /// Worker thread of a running tokio runtime.
    Runtime(Handle),
    /// No runtime around; one is built on first use.
    Local(Option<Runtime>),
}

impl FutureDriver {
    fn drive<R>(&mut self, future: ListenerFuture<R>) -> ListenerResult<R> {
        match self {
            Self::Unavailable => Err(AsyncListenerError.into()),
            Self::Runtime(handle) => handle.block_on(future),
            Self::Local(slot) => {
                let runtime = match slot.take() {
                    Some(runtime) => runtime,
                    None => Builder::new_current_thread().enable_all().build()?,
                };
                let outcome = runtime.block_on(future);
                *slot = Some(runtime);
                outcome
            }
        }
    }
}

impl<A, R> Clone for Invoker<A, R> {
    fn clone(&self) -> Self {
        Self {
            signal: Arc::clone(&self.signal),
            policy: self.policy,
            paths: Arc::clone(&self.paths),
        }
    }
}

impl<A, R> std::fmt::Debug for Invoker<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("signal", &self.signal)
            .field("policy", &self.policy)
            .field("paths", &self.paths.len())
            .finish()
    }
}

/// A firing plan that runs off the calling thread.
pub struct AsyncInvoker<A, R> {
    invoker: Invoker<A, R>,
    worker: AsyncWorker,
}

impl<A, R> AsyncInvoker<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(invoker: Invoker<A, R>, worker: AsyncWorker) -> Self {
        Self { invoker, worker }
    }

    /// The underlying synchronous plan.
    pub fn invoker(&self) -> &Invoker<A, R> {
        &self.invoker
    }

    /// Submit the plan to a worker and return a handle to its outcome.
    ///
    /// The work starts immediately. Dropping the handle does not stop it.
    /// With [`AsyncWorker::BlockingPool`] outside a tokio runtime the handle
    /// resolves to [`SignalError::NoRuntime`] and no listener runs.
    pub fn call(&self, args: A) -> FireHandle<R> {
        let (tx, rx) = oneshot::channel();
        let runtime = Handle::try_current().ok();

        if self.worker == AsyncWorker::BlockingPool && runtime.is_none() {
            tracing::warn!(
                signal = %self.invoker.signal,
                "blocking pool requested outside a tokio runtime"
            );
            let _ = tx.send(Err(SignalError::NoRuntime));
            return FireHandle { rx };
        }

        let invoker = self.invoker.clone();
        let job = move |mut driver: FutureDriver| {
            let outcome = invoker.execute(&args, &mut driver);
            // The caller may have dropped the handle; the work still counts.
            let _ = tx.send(outcome);
        };

        match (self.worker, runtime) {
            (AsyncWorker::DedicatedThread, runtime) => {
                let driver = runtime.map_or(FutureDriver::Local(None), FutureDriver::Runtime);
                spawn_thread(&self.invoker.signal, move || job(driver));
            }
            (_, Some(handle)) => {
                let driver = FutureDriver::Runtime(handle.clone());
                handle.spawn_blocking(move || job(driver));
            }
            (_, None) => {
                tracing::debug!(
                    signal = %self.invoker.signal,
                    "no tokio runtime, firing on a dedicated thread"
                );
                spawn_thread(&self.invoker.signal, move || job(FutureDriver::Local(None)));
            }
        }

        FireHandle { rx }
    }
}

fn spawn_thread<F>(signal: &str, job: F)
where
    F: FnOnce() + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(format!("tocsin-{signal}"))
        .spawn(job);
    if let Err(error) = spawned {
        tracing::warn!(signal, %error, "failed to spawn firing thread");
    }
}

impl<A, R> Clone for AsyncInvoker<A, R> {
    fn clone(&self) -> Self {
        Self {
            invoker: self.invoker.clone(),
            worker: self.worker,
        }
    }
}

impl<A, R> std::fmt::Debug for AsyncInvoker<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncInvoker")
            .field("invoker", &self.invoker)
            .field("worker", &self.worker)
            .finish()
    }
}

/// Outcome of an asynchronous firing.
///
/// Resolves once every listener of the plan has run.
#[derive(Debug)]
#[must_use = "the firing runs regardless, but its outcome is lost if the handle is dropped"]
pub struct FireHandle<R> {
    rx: oneshot::Receiver<Result<Vec<R>>>,
}

impl<R> FireHandle<R> {
    /// Block the current thread until the firing finishes.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<Vec<R>> {
        self.rx.blocking_recv().unwrap_or(Err(SignalError::WorkerLost))
    }
}

impl<R> Future for FireHandle<R> {
    type Output = Result<Vec<R>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SignalError::WorkerLost)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{AsyncListenerFn, ListenerTable, Wire};
    use crate::error::ListenerLabel;
    use crate::graph::EventGraph;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn state() -> SignalState<Log, ()> {
        SignalState {
            graph: EventGraph::new(),
            listeners: ListenerTable::new(),
        }
    }

    fn logger(state: &mut SignalState<Log, ()>, event: &str, text: &'static str) {
        state.graph.add_event(event);
        state.listeners.register_function(
            &Wire::on(event),
            ListenerLabel::from(text),
            Arc::new(move |log: &Log| -> ListenerResult<()> {
                log.lock().push(text.to_string());
                Ok(())
            }),
        );
    }

    fn failing(state: &mut SignalState<Log, ()>, event: &str) {
        state.listeners.register_function(
            &Wire::on(event),
            ListenerLabel::from("boom"),
            Arc::new(|_: &Log| -> ListenerResult<()> { Err("boom".into()) }),
        );
    }

    fn pending(state: &mut SignalState<Log, ()>, event: &str, text: &'static str) {
        state.graph.add_event(event);
        let f: Arc<AsyncListenerFn<Log, ()>> = Arc::new(move |log: &Log| -> ListenerFuture<()> {
            let log = Arc::clone(log);
            Box::pin(async move {
                tokio::task::yield_now().await;
                log.lock().push(text.to_string());
                Ok(())
            })
        });
        state.listeners.register_async_function(&Wire::on(event), ListenerLabel::from(text), f);
    }

    fn plan(
        state: &SignalState<Log, ()>,
        config: &SignalConfig,
        options: FireOptions,
    ) -> Invoker<Log, ()> {
        Invoker::plan(Arc::from("test"), config, state, &options)
    }

    #[test]
    fn options_default_to_default_event() {
        let options = FireOptions::new();
        assert_eq!(options.targets(), vec![EventName::default()]);
        assert!(options.receivers().is_empty());

        let options = FireOptions::new().event("a").events(["b", "c"]);
        assert_eq!(options.targets().len(), 3);
    }

    #[test]
    fn plan_is_resolved_before_call() {
        let mut state = state();
        state.graph.declare_dependency("B", ["A"]).unwrap();
        logger(&mut state, "A", "a");
        logger(&mut state, "B", "b");

        let invoker = plan(&state, &SignalConfig::default(), FireOptions::new().event("B"));
        assert_eq!(invoker.event_paths(), vec![vec![EventName::from("A"), EventName::from("B")]]);
        assert_eq!(invoker.listener_count(), 2);
    }

    #[test]
    fn invoker_is_reusable() {
        let mut state = state();
        logger(&mut state, crate::graph::DEFAULT_EVENT, "x");
        let invoker = plan(&state, &SignalConfig::default(), FireOptions::new());

        let log = Log::default();
        invoker.call(&log).unwrap();
        invoker.clone().call(&log).unwrap();
        assert_eq!(*log.lock(), vec!["x", "x"]);
    }

    #[test]
    fn failure_blocks_dependents_but_not_unrelated_events() {
        let mut state = state();
        state.graph.declare_dependency("B", ["A"]).unwrap();
        state.graph.declare_dependency("D", ["A", "C"]).unwrap();
        logger(&mut state, "C", "c");
        failing(&mut state, "A");
        logger(&mut state, "A", "a-after");
        logger(&mut state, "B", "b");
        logger(&mut state, "D", "d");

        let log = Log::default();
        let err = plan(&state, &SignalConfig::default(), FireOptions::new().events(["D", "B"]))
            .call(&log)
            .unwrap_err();

        match err {
            SignalError::Listener(error) => {
                assert_eq!(error.event, "A");
                assert_eq!(error.listener.as_str(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Path D is [A, C, D]: C still runs, D is skipped. Path B is [A, B]: B is skipped.
        assert_eq!(*log.lock(), vec!["c"]);
    }

    #[test]
    fn log_and_continue_runs_everything_else() {
        let mut state = state();
        state.graph.declare_dependency("B", ["A"]).unwrap();
        failing(&mut state, "A");
        logger(&mut state, "A", "a");
        logger(&mut state, "B", "b");

        let config = SignalConfig::default().with_error_policy(ErrorPolicy::LogAndContinue);
        let log = Log::default();
        let results = plan(&state, &config, FireOptions::new().event("B")).call(&log).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn worker_lost_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<Result<Vec<()>>>();
        drop(tx);
        let handle = FireHandle { rx };
        assert!(matches!(handle.wait(), Err(SignalError::WorkerLost)));
    }

    #[test]
    fn sync_call_rejects_async_listener_as_a_failure() {
        let mut state = state();
        state.graph.declare_dependency("B", ["A"]).unwrap();
        pending(&mut state, "A", "later");
        logger(&mut state, "B", "b");
        logger(&mut state, "C", "c");

        let log = Log::default();
        let err = plan(&state, &SignalConfig::default(), FireOptions::new().events(["B", "C"]))
            .call(&log)
            .unwrap_err();

        match err {
            SignalError::Listener(error) => {
                assert_eq!(error.event, "A");
                assert_eq!(error.listener.as_str(), "later");
                assert!(error.source.downcast_ref::<AsyncListenerError>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*log.lock(), vec!["c"]);
    }

    #[test]
    fn async_call_without_runtime_awaits_in_plan_order() {
        let mut state = state();
        state.graph.declare_dependency("B", ["A"]).unwrap();
        pending(&mut state, "A", "a");
        logger(&mut state, "A", "a-sync");
        pending(&mut state, "B", "b");

        let invoker = plan(&state, &SignalConfig::default(), FireOptions::new().event("B"));
        let log = Log::default();
        let results = AsyncInvoker::new(invoker, AsyncWorker::Auto)
            .call(Arc::clone(&log))
            .wait()
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(*log.lock(), vec!["a", "a-sync", "b"]);
    }

    #[test]
    fn blocking_pool_needs_a_runtime() {
        let mut state = state();
        logger(&mut state, crate::graph::DEFAULT_EVENT, "x");
        let invoker = plan(&state, &SignalConfig::default(), FireOptions::new());

        let log = Log::default();
        let outcome = AsyncInvoker::new(invoker, AsyncWorker::BlockingPool)
            .call(Arc::clone(&log))
            .wait();

        assert!(matches!(outcome, Err(SignalError::NoRuntime)));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn dedicated_thread_works_without_runtime() {
        let mut state = state();
        logger(&mut state, crate::graph::DEFAULT_EVENT, "x");
        let invoker = plan(&state, &SignalConfig::default(), FireOptions::new());

        let log = Log::default();
        AsyncInvoker::new(invoker, AsyncWorker::DedicatedThread)
            .call(Arc::clone(&log))
            .wait()
            .unwrap();
        assert_eq!(*log.lock(), vec!["x"]);
    }
}
