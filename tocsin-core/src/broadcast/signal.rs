//! Signal Implementation
//!
//! A Signal is a named broadcaster. It owns an event graph and a listener
//! table, and fans a firing out to every matching listener.
//!
//! # How Signals Work
//!
//! 1. Listeners are registered for one or more events, optionally declaring
//!    which events must run before theirs.
//!
//! 2. Types can be wired through a [`ClassTemplate`]. Every instance created
//!    through the signal gets its own weakly bound listeners.
//!
//! 3. Firing resolves the requested events into dependency paths and runs the
//!    listeners of each event in order.
//!
//! # Thread Safety
//!
//! The graph and the listener table sit behind one read-write lock.
//! Registration takes the write lock; firing takes the read lock only while
//! building its plan. Listeners always run with the lock released.
//!
//! # Identity
//!
//! Clones of a `Signal` share all state. Named signals are looked up through
//! a [`SignalRegistry`], which hands out the same signal for the same name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::dispatch::{AsyncInvoker, FireOptions, Invoker};
use super::listener::{BoundMethod, ListenerFuture, ListenerId};
use super::reactive::Reactive;
use super::registry::SignalRegistry;
use super::table::ListenerTable;
use super::wire::{ClassTemplate, Wire};
use crate::config::SignalConfig;
use crate::error::{ListenerResult, Result};
use crate::graph::{EventGraph, EventName, EventPath};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Everything a signal mutates on registration and reads on firing.
pub(crate) struct SignalState<A, R> {
    pub graph: EventGraph,
    pub listeners: ListenerTable<A, R>,
}

struct SignalInner<A, R> {
    id: u64,
    name: Arc<str>,
    anonymous: bool,
    config: SignalConfig,
    state: RwLock<SignalState<A, R>>,
}

/// A broadcaster of payloads of type `A` to listeners returning `R`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use tocsin_core::{FireOptions, Signal, Wire};
///
/// let signal: Signal<Arc<Mutex<Vec<&'static str>>>> = Signal::anonymous();
/// signal.connect(Wire::on("A"), |log| { log.lock().push("A"); Ok(()) }).unwrap();
/// signal
///     .connect(Wire::on("B").depends_on(["A"]), |log| { log.lock().push("B"); Ok(()) })
///     .unwrap();
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// signal.fire_with(FireOptions::new().event("B")).call(&log).unwrap();
/// assert_eq!(*log.lock(), vec!["A", "B"]);
/// ```
pub struct Signal<A, R = ()> {
    inner: Arc<SignalInner<A, R>>,
}

impl<A, R> Signal<A, R> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.inner.anonymous
    }

    pub fn config(&self) -> &SignalConfig {
        &self.inner.config
    }

    /// Whether both handles point at the same signal.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A, R> Signal<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    pub(crate) fn create(name: Option<&str>, config: SignalConfig) -> Self {
        let id = next_signal_id();
        let (name, anonymous) = match name {
            Some(name) if !name.is_empty() => (Arc::from(name), false),
            _ => (Arc::from(format!("anonymous-{id}")), true),
        };
        tracing::debug!(signal = %name, anonymous, "created signal");

        Self {
            inner: Arc::new(SignalInner {
                id,
                name,
                anonymous,
                config,
                state: RwLock::new(SignalState {
                    graph: EventGraph::new(),
                    listeners: ListenerTable::new(),
                }),
            }),
        }
    }

    /// Get the signal registered under `name` in the global registry,
    /// creating it on first use.
    ///
    /// An empty name yields a fresh anonymous signal.
    pub fn named(name: &str) -> Result<Self> {
        SignalRegistry::global().get_or_create(name)
    }

    /// Create a signal that is not registered under any name.
    pub fn anonymous() -> Self {
        Self::create(None, SignalConfig::default())
    }

    pub fn anonymous_with_config(config: SignalConfig) -> Self {
        Self::create(None, config)
    }

    /// Register a free function for the default event.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&A) -> ListenerResult<R> + Send + Sync + 'static,
    {
        let wire = Wire::default_event();
        let label = wire.label_or::<F>();
        let mut state = self.inner.state.write();
        state.listeners.prune();
        let id = state
            .listeners
            .register_function(&wire, label.clone(), Arc::new(listener));
        tracing::debug!(signal = %self.inner.name, listener = %label, "registered listener");
        id
    }

    /// Register a free function for the events of `wire`, declaring its
    /// dependencies.
    ///
    /// Fails without registering anything if a dependency would close a cycle.
    pub fn connect<F>(&self, wire: Wire, listener: F) -> Result<ListenerId>
    where
        F: Fn(&A) -> ListenerResult<R> + Send + Sync + 'static,
    {
        let label = wire.label_or::<F>();
        let mut state = self.inner.state.write();
        declare_wire(&mut state.graph, &wire)?;
        state.listeners.prune();
        let id = state
            .listeners
            .register_function(&wire, label.clone(), Arc::new(listener));
        tracing::debug!(
            signal = %self.inner.name,
            listener = %label,
            events = ?wire.events(),
            "registered listener"
        );
        Ok(id)
    }

    /// Register an async free function for the events of `wire`.
    ///
    /// Async listeners run only under [`fire_async`](Self::fire_async), where
    /// each future is awaited in plan order before the next listener starts.
    /// A synchronous firing reports them as failed.
    pub fn connect_async<F>(&self, wire: Wire, listener: F) -> Result<ListenerId>
    where
        F: Fn(&A) -> ListenerFuture<R> + Send + Sync + 'static,
    {
        let label = wire.label_or::<F>();
        let mut state = self.inner.state.write();
        declare_wire(&mut state.graph, &wire)?;
        state.listeners.prune();
        let id = state
            .listeners
            .register_async_function(&wire, label.clone(), Arc::new(listener));
        tracing::debug!(
            signal = %self.inner.name,
            listener = %label,
            events = ?wire.events(),
            "registered async listener"
        );
        Ok(id)
    }

    /// Register one method of an existing instance, bound weakly.
    pub fn connect_bound<T, F>(
        &self,
        instance: &Arc<T>,
        wire: Wire,
        method: F,
    ) -> Result<ListenerId>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &A) -> ListenerResult<R> + Send + Sync + 'static,
    {
        let label = wire.label_or::<F>();
        let mut state = self.inner.state.write();
        declare_wire(&mut state.graph, &wire)?;
        state.listeners.prune();
        let method = BoundMethod::Sync(Arc::new(method));
        let id = state
            .listeners
            .register_bound(instance, &wire, label.clone(), method);
        tracing::debug!(
            signal = %self.inner.name,
            listener = %label,
            events = ?wire.events(),
            "registered bound listener"
        );
        Ok(id)
    }

    /// Wire the type `T`.
    ///
    /// Dependencies of every templated method are declared now. Instances
    /// created afterwards through [`instantiate`](Self::instantiate) or
    /// [`attach`](Self::attach) get one listener per templated method.
    pub fn register_class<T>(&self, template: ClassTemplate<T, A, R>) -> Result<()>
    where
        T: Send + Sync + 'static,
    {
        let mut state = self.inner.state.write();

        let mut staged = state.graph.clone();
        for method in template.methods() {
            declare_wire(&mut staged, &method.wire)?;
        }
        state.graph = staged;

        tracing::debug!(
            signal = %self.inner.name,
            class = std::any::type_name::<T>(),
            methods = template.method_count(),
            "registered class template"
        );
        state.listeners.register_class_template(template);
        Ok(())
    }

    /// Wrap `value` in an `Arc` and bind its wired methods.
    pub fn instantiate<T>(&self, value: T) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let instance = Arc::new(value);
        self.attach(&instance);
        instance
    }

    /// Bind the wired methods of an instance built elsewhere.
    ///
    /// Returns the number of listener entries created; zero if `T` was never
    /// registered with [`register_class`](Self::register_class). Attaching the
    /// same instance twice binds it twice.
    pub fn attach<T>(&self, instance: &Arc<T>) -> usize
    where
        T: Send + Sync + 'static,
    {
        let mut state = self.inner.state.write();
        state.listeners.prune();
        let created = state.listeners.on_instance_created(instance);
        tracing::debug!(
            signal = %self.inner.name,
            class = std::any::type_name::<T>(),
            listeners = created,
            "bound instance"
        );
        created
    }

    /// Declare that `event` runs after every event in `depends_on`.
    pub fn declare_dependency<I, E>(&self, event: impl Into<EventName>, depends_on: I) -> Result<()>
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        self.inner.state.write().graph.declare_dependency(event, depends_on)
    }

    /// The dependency path of `event`, as a one-element list.
    pub fn get_event_path(&self, event: impl Into<EventName>) -> Vec<EventPath> {
        vec![self.inner.state.read().graph.resolve(event)]
    }

    /// One dependency path per requested event, in order.
    pub fn event_paths<I, E>(&self, events: I) -> Vec<EventPath>
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        self.inner.state.read().graph.resolve_all(events)
    }

    /// Plan a synchronous firing of the default event.
    pub fn fire(&self) -> Invoker<A, R> {
        self.fire_with(FireOptions::new())
    }

    /// Plan a synchronous firing.
    pub fn fire_with(&self, options: FireOptions) -> Invoker<A, R> {
        let state = self.inner.state.read();
        Invoker::plan(Arc::clone(&self.inner.name), &self.inner.config, &state, &options)
    }

    /// Plan an asynchronous firing of the default event.
    pub fn fire_async(&self) -> AsyncInvoker<A, R> {
        self.fire_async_with(FireOptions::new())
    }

    /// Plan an asynchronous firing.
    pub fn fire_async_with(&self, options: FireOptions) -> AsyncInvoker<A, R> {
        AsyncInvoker::new(self.fire_with(options), self.inner.config.async_worker)
    }

    /// Live listeners registered for `event`.
    pub fn listener_count(&self, event: impl AsRef<str>) -> usize {
        self.inner.state.read().listeners.listener_count(event.as_ref())
    }

    /// Live listeners across all events.
    pub fn live_listener_count(&self) -> usize {
        self.inner.state.read().listeners.live_count()
    }

    /// Create a value that fires this signal whenever it is set.
    pub fn reactive(&self, initial: A) -> Reactive<A, R>
    where
        A: Clone,
    {
        Reactive::new(self.clone(), initial)
    }
}

fn declare_wire(graph: &mut EventGraph, wire: &Wire) -> Result<()> {
    let mut staged = graph.clone();
    for event in wire.events() {
        staged.add_event(event.clone());
        staged.declare_dependency(event, wire.dependencies().cloned())?;
    }
    *graph = staged;
    Ok(())
}

impl<A, R> Clone for Signal<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> fmt::Debug for Signal<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("events", &state.graph.event_count())
            .field("listeners", &state.listeners.live_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn anonymous_signals_never_alias() {
        let s1: Signal<()> = Signal::anonymous();
        let s2: Signal<()> = Signal::anonymous();
        assert!(!s1.same_as(&s2));
        assert_ne!(s1.id(), s2.id());
        assert!(s1.is_anonymous());
        assert!(s1.name().starts_with("anonymous-"));
    }

    #[test]
    fn clone_shares_state() {
        let s1: Signal<()> = Signal::anonymous();
        let s2 = s1.clone();
        s2.register(|_| Ok(()));
        assert!(s1.same_as(&s2));
        assert_eq!(s1.live_listener_count(), 1);
    }

    #[test]
    fn register_returns_results_in_order() {
        let signal: Signal<i32, i32> = Signal::anonymous();
        signal.register(|x| Ok(x + 1));
        signal.register(|x| Ok(x * 10));
        assert_eq!(signal.fire().call(&2).unwrap(), vec![3, 20]);
    }

    #[test]
    fn firing_without_listeners_is_a_no_op() {
        let signal: Signal<(), i32> = Signal::anonymous();
        assert!(signal.fire().call(&()).unwrap().is_empty());
        assert!(signal
            .fire_with(FireOptions::new().event("nobody"))
            .call(&())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn connect_rejects_cycles_and_registers_nothing() {
        let signal: Signal<()> = Signal::anonymous();
        signal.connect(Wire::on("B").depends_on(["A"]), |_| Ok(())).unwrap();

        let err = signal
            .connect(Wire::on("A").depends_on(["B"]), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SignalError::Cycle { .. }));
        assert_eq!(signal.listener_count("A"), 0);
        assert_eq!(
            signal.get_event_path("B"),
            vec![vec![EventName::from("A"), EventName::from("B")]]
        );
    }

    #[test]
    fn multi_event_wire_is_all_or_nothing() {
        let signal: Signal<()> = Signal::anonymous();
        signal.declare_dependency("X", ["Y"]).unwrap();

        // "ok" would be fine, but "Y" depending on "X" is a cycle.
        let err = signal
            .connect(Wire::on("ok").and_on("Y").depends_on(["X"]), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SignalError::Cycle { .. }));
        assert_eq!(signal.get_event_path("ok"), vec![vec![EventName::from("ok")]]);
    }

    #[test]
    fn template_cycle_is_reported_at_registration() {
        struct Part;
        let signal: Signal<()> = Signal::anonymous();
        let err = signal
            .register_class(
                ClassTemplate::<Part, ()>::new()
                    .method(Wire::on("B").depends_on(["A"]), |_, _| Ok(()))
                    .method(Wire::on("A").depends_on(["B"]), |_, _| Ok(())),
            )
            .unwrap_err();
        assert!(matches!(err, SignalError::Cycle { .. }));
        assert_eq!(signal.get_event_path("B"), vec![vec![EventName::from("B")]]);
    }

    #[test]
    fn bound_method_fires_until_instance_drops() {
        struct Counter(AtomicI32);

        let signal: Signal<()> = Signal::anonymous();
        let counter = Arc::new(Counter(AtomicI32::new(0)));
        signal
            .connect_bound(&counter, Wire::default_event(), |c: &Counter, _| {
                c.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        signal.fire().call(&()).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        drop(counter);
        assert_eq!(signal.live_listener_count(), 0);
        assert!(signal.fire().call(&()).unwrap().is_empty());
    }

    #[test]
    fn plans_snapshot_listeners() {
        let signal: Signal<(), &'static str> = Signal::anonymous();
        signal.register(|_| Ok("early"));
        let invoker = signal.fire();
        signal.register(|_| Ok("late"));

        assert_eq!(invoker.call(&()).unwrap(), vec!["early"]);
        assert_eq!(signal.fire().call(&()).unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn listener_may_register_while_firing() {
        let signal: Signal<()> = Signal::anonymous();
        let inner = signal.clone();
        signal.register(move |_| {
            inner.register(|_| Ok(()));
            Ok(())
        });

        signal.fire().call(&()).unwrap();
        assert_eq!(signal.live_listener_count(), 2);
    }

    #[test]
    fn debug_shows_name_and_counts() {
        let registry = SignalRegistry::new();
        let signal: Signal<()> = registry.get_or_create("debugged").unwrap();
        signal.connect(Wire::on("a"), |_| Ok(())).unwrap();

        let rendered = format!("{signal:?}");
        assert!(rendered.contains("\"debugged\""));
        assert!(rendered.contains("events: 2"));
        assert!(rendered.contains("listeners: 1"));
    }
}
