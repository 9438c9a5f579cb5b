//! Listener entries.
//!
//! A listener is either a free function or a method bound to a live instance.
//! Bound listeners hold only a [`Weak`] reference to their instance, so a
//! signal never keeps application objects alive. Once the instance is dropped
//! the entry stops firing and is pruned on the next registration.
//!
//! Either kind can be synchronous or asynchronous. Async listeners return a
//! boxed future; they only run when the signal is fired with `fire_async`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;

use crate::error::{ListenerLabel, ListenerResult};

/// A free-function listener.
pub type ListenerFn<A, R> = dyn Fn(&A) -> ListenerResult<R> + Send + Sync;

/// A method listener, called with the instance it is bound to.
pub type MethodFn<T, A, R> = dyn Fn(&T, &A) -> ListenerResult<R> + Send + Sync;

/// What an async listener hands back. It must not borrow the payload.
pub type ListenerFuture<R> = BoxFuture<'static, ListenerResult<R>>;

/// An async free-function listener.
pub type AsyncListenerFn<A, R> = dyn Fn(&A) -> ListenerFuture<R> + Send + Sync;

/// An async method listener. It gets a strong handle to the instance so the
/// future can keep it alive until it finishes.
pub type AsyncMethodFn<T, A, R> = dyn Fn(Arc<T>, &A) -> ListenerFuture<R> + Send + Sync;

/// Outcome of starting a listener.
pub enum Invocation<R> {
    /// A synchronous listener ran to completion.
    Ready(ListenerResult<R>),
    /// An async listener returned a future that still has to be driven.
    Pending(ListenerFuture<R>),
}

impl<R> fmt::Debug for Invocation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(&result.is_ok()).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Unique identifier for a registered listener.
///
/// A listener registered for several events keeps the same ID in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of an instance, used to aim a firing at specific receivers.
///
/// Two `ReceiverId`s are equal only if they come from the same live
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(usize);

impl ReceiverId {
    pub fn of<T: ?Sized>(instance: &Arc<T>) -> Self {
        Self(Arc::as_ptr(instance) as *const () as usize)
    }
}

/// Position of an entry within an event bucket.
///
/// Entries sort by the registration of the construct that owns them (a
/// function, a class template, or an ad-hoc bound method), then by instance
/// creation, then by method declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct EntryOrder {
    pub construct: u64,
    pub instance: u64,
    pub method: usize,
}

/// A listener bound to an instance it does not own.
pub(crate) trait BoundListener<A, R>: Send + Sync {
    fn receiver(&self) -> ReceiverId;

    fn is_live(&self) -> bool;

    fn is_async(&self) -> bool;

    /// Start the method, or return `None` if the instance is gone.
    fn call(&self, args: &A) -> Option<Invocation<R>>;
}

/// A method of `T`, sync or async.
pub(crate) enum BoundMethod<T, A, R> {
    Sync(Arc<MethodFn<T, A, R>>),
    Async(Arc<AsyncMethodFn<T, A, R>>),
}

impl<T, A, R> Clone for BoundMethod<T, A, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(method) => Self::Sync(Arc::clone(method)),
            Self::Async(method) => Self::Async(Arc::clone(method)),
        }
    }
}

/// A method bound weakly to one instance.
pub(crate) struct WeakMethod<T, A, R> {
    instance: Weak<T>,
    receiver: ReceiverId,
    method: BoundMethod<T, A, R>,
}

impl<T, A, R> WeakMethod<T, A, R> {
    pub fn new(instance: &Arc<T>, method: BoundMethod<T, A, R>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            receiver: ReceiverId::of(instance),
            method,
        }
    }
}

impl<T, A, R> BoundListener<A, R> for WeakMethod<T, A, R>
where
    T: Send + Sync + 'static,
{
    fn receiver(&self) -> ReceiverId {
        self.receiver
    }

    fn is_live(&self) -> bool {
        self.instance.strong_count() > 0
    }

    fn is_async(&self) -> bool {
        matches!(self.method, BoundMethod::Async(_))
    }

    fn call(&self, args: &A) -> Option<Invocation<R>> {
        let instance = self.instance.upgrade()?;
        Some(match &self.method {
            BoundMethod::Sync(method) => Invocation::Ready(method(&instance, args)),
            BoundMethod::Async(method) => Invocation::Pending(method(instance, args)),
        })
    }
}

enum Callback<A, R> {
    Free(Arc<ListenerFn<A, R>>),
    FreeAsync(Arc<AsyncListenerFn<A, R>>),
    Bound(Arc<dyn BoundListener<A, R>>),
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Free(f) => Self::Free(Arc::clone(f)),
            Self::FreeAsync(f) => Self::FreeAsync(Arc::clone(f)),
            Self::Bound(b) => Self::Bound(Arc::clone(b)),
        }
    }
}

/// A registered listener for one event.
pub struct ListenerEntry<A, R> {
    id: ListenerId,
    label: ListenerLabel,
    order: EntryOrder,
    callback: Callback<A, R>,
}

impl<A, R> ListenerEntry<A, R> {
    pub(crate) fn free(
        id: ListenerId,
        label: ListenerLabel,
        order: EntryOrder,
        f: Arc<ListenerFn<A, R>>,
    ) -> Self {
        Self {
            id,
            label,
            order,
            callback: Callback::Free(f),
        }
    }

    pub(crate) fn free_async(
        id: ListenerId,
        label: ListenerLabel,
        order: EntryOrder,
        f: Arc<AsyncListenerFn<A, R>>,
    ) -> Self {
        Self {
            id,
            label,
            order,
            callback: Callback::FreeAsync(f),
        }
    }

    pub(crate) fn bound(
        id: ListenerId,
        label: ListenerLabel,
        order: EntryOrder,
        bound: Arc<dyn BoundListener<A, R>>,
    ) -> Self {
        Self {
            id,
            label,
            order,
            callback: Callback::Bound(bound),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn label(&self) -> &ListenerLabel {
        &self.label
    }

    pub(crate) fn order(&self) -> EntryOrder {
        self.order
    }

    /// The instance this entry is bound to, if any.
    pub fn receiver(&self) -> Option<ReceiverId> {
        match &self.callback {
            Callback::Free(_) | Callback::FreeAsync(_) => None,
            Callback::Bound(bound) => Some(bound.receiver()),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.callback, Callback::Bound(_))
    }

    /// Whether the listener returns a future.
    pub fn is_async(&self) -> bool {
        match &self.callback {
            Callback::Free(_) => false,
            Callback::FreeAsync(_) => true,
            Callback::Bound(bound) => bound.is_async(),
        }
    }

    /// Free functions are always live.
    pub fn is_live(&self) -> bool {
        match &self.callback {
            Callback::Free(_) | Callback::FreeAsync(_) => true,
            Callback::Bound(bound) => bound.is_live(),
        }
    }

    /// Whether this entry is eligible for a firing aimed at `receivers`.
    ///
    /// An empty receiver list accepts everything. Free functions have no
    /// owning instance and are accepted by any receiver list.
    pub fn accepts(&self, receivers: &[ReceiverId]) -> bool {
        match self.receiver() {
            Some(receiver) if !receivers.is_empty() => receivers.contains(&receiver),
            _ => true,
        }
    }

    /// Start the listener. Returns `None` when its instance has been dropped.
    ///
    /// Sync listeners run to completion here. Async listeners only build
    /// their future; the caller decides how to drive it.
    pub fn invoke(&self, args: &A) -> Option<Invocation<R>> {
        match &self.callback {
            Callback::Free(f) => Some(Invocation::Ready(f(args))),
            Callback::FreeAsync(f) => Some(Invocation::Pending(f(args))),
            Callback::Bound(bound) => bound.call(args),
        }
    }
}

impl<A, R> Clone for ListenerEntry<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            label: self.label.clone(),
            order: self.order,
            callback: self.callback.clone(),
        }
    }
}

impl<A, R> fmt::Debug for ListenerEntry<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("receiver", &self.receiver())
            .field("async", &self.is_async())
            .field("live", &self.is_live())
            .finish()
    }
}
