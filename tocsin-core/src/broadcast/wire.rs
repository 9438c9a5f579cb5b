//! Wiring metadata.
//!
//! A [`Wire`] says which events a listener answers and which events those
//! depend on. A [`ClassTemplate`] groups wired methods of one type so that
//! every instance created through a signal gets its own bound listeners.
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tocsin_core::{ClassTemplate, Signal, Wire};
//!
//! struct Tire {
//!     rotations: AtomicU32,
//! }
//!
//! let signal: Signal<()> = Signal::anonymous();
//! signal
//!     .register_class(
//!         ClassTemplate::new()
//!             .method(Wire::on("roll"), |tire: &Tire, _: &()| {
//!                 tire.rotations.fetch_add(1, Ordering::SeqCst);
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//!
//! let tire = signal.instantiate(Tire { rotations: AtomicU32::new(0) });
//! signal.fire_with(tocsin_core::FireOptions::new().event("roll")).call(&()).unwrap();
//! assert_eq!(tire.rotations.load(Ordering::SeqCst), 1);
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use super::listener::{BoundMethod, ListenerFuture};
use crate::error::{ListenerLabel, ListenerResult};
use crate::graph::EventName;

/// Events a listener answers, their dependencies, and an optional label.
#[derive(Debug, Clone, Default)]
pub struct Wire {
    events: IndexSet<EventName>,
    depends_on: IndexSet<EventName>,
    label: Option<ListenerLabel>,
}

impl Wire {
    /// Wire to the default event.
    pub fn default_event() -> Self {
        Self::default()
    }

    /// Wire to a named event.
    pub fn on(event: impl Into<EventName>) -> Self {
        Self::default().and_on(event)
    }

    /// Also answer `event`.
    pub fn and_on(mut self, event: impl Into<EventName>) -> Self {
        self.events.insert(event.into());
        self
    }

    /// Every wired event runs after all of `events`.
    pub fn depends_on<I, E>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        self.depends_on.extend(events.into_iter().map(Into::into));
        self
    }

    /// Name the listener in logs and errors.
    pub fn named(mut self, label: impl AsRef<str>) -> Self {
        self.label = Some(ListenerLabel::from(label.as_ref()));
        self
    }

    /// The wired events, or the default event when none was given.
    pub fn events(&self) -> Vec<EventName> {
        if self.events.is_empty() {
            vec![EventName::default()]
        } else {
            self.events.iter().cloned().collect()
        }
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &EventName> {
        self.depends_on.iter()
    }

    pub(crate) fn label_or<F: ?Sized>(&self) -> ListenerLabel {
        self.label
            .clone()
            .unwrap_or_else(|| ListenerLabel::from(type_name::<F>()))
    }
}

pub(crate) struct TemplateMethod<T, A, R> {
    pub wire: Wire,
    pub label: ListenerLabel,
    pub method: BoundMethod<T, A, R>,
}

/// The wired methods of type `T`, in declaration order.
///
/// Registering a template with a signal declares its dependencies right away.
/// Listeners are only created when an instance is built through
/// [`Signal::instantiate`](crate::Signal::instantiate) or attached with
/// [`Signal::attach`](crate::Signal::attach).
pub struct ClassTemplate<T, A, R = ()> {
    methods: Vec<TemplateMethod<T, A, R>>,
}

impl<T, A, R> ClassTemplate<T, A, R>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Add a wired method.
    pub fn method<F>(mut self, wire: Wire, method: F) -> Self
    where
        F: Fn(&T, &A) -> ListenerResult<R> + Send + Sync + 'static,
    {
        let label = wire.label_or::<F>();
        self.methods.push(TemplateMethod {
            wire,
            label,
            method: BoundMethod::Sync(Arc::new(method)),
        });
        self
    }

    /// Add a wired async method.
    ///
    /// The method receives a strong handle to its instance, which the returned
    /// future may hold until it completes.
    pub fn async_method<F>(mut self, wire: Wire, method: F) -> Self
    where
        F: Fn(Arc<T>, &A) -> ListenerFuture<R> + Send + Sync + 'static,
    {
        let label = wire.label_or::<F>();
        self.methods.push(TemplateMethod {
            wire,
            label,
            method: BoundMethod::Async(Arc::new(method)),
        });
        self
    }

    pub(crate) fn methods(&self) -> &[TemplateMethod<T, A, R>] {
        &self.methods
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl<T, A, R> Default for ClassTemplate<T, A, R>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A, R> fmt::Debug for ClassTemplate<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassTemplate")
            .field("class", &type_name::<T>())
            .field(
                "methods",
                &self.methods.iter().map(|m| m.label.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
