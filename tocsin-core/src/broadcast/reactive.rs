//! Reactive Values
//!
//! A [`Reactive`] holds a value and fires its signal's default event every
//! time the value changes, passing the new value as payload.
//!
//! ```rust
//! use tocsin_core::Signal;
//!
//! let signal: Signal<i32, i32> = Signal::anonymous();
//! signal.register(|count| Ok(count * 2));
//!
//! let count = signal.reactive(0);
//! assert_eq!(count.set(5).unwrap(), vec![10]);
//! assert_eq!(count.update(|n| n + 1).unwrap(), vec![12]);
//! assert_eq!(count.get(), 6);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::signal::Signal;
use crate::error::Result;

/// A value that broadcasts its changes.
pub struct Reactive<A, R = ()> {
    value: Arc<RwLock<A>>,
    signal: Signal<A, R>,
}

impl<A, R> Reactive<A, R>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(signal: Signal<A, R>, initial: A) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
            signal,
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> A {
        self.value.read().clone()
    }

    /// Store `value` and fire the default event with it.
    ///
    /// The value is stored even if a listener fails.
    pub fn set(&self, value: A) -> Result<Vec<R>> {
        *self.value.write() = value.clone();
        // Fire with a copy so listeners may read or set this value again.
        self.signal.fire().call(&value)
    }

    /// Replace the value with `f(current)` and fire.
    pub fn update<F>(&self, f: F) -> Result<Vec<R>>
    where
        F: FnOnce(&A) -> A,
    {
        let next = {
            let mut guard = self.value.write();
            let next = f(&guard);
            *guard = next.clone();
            next
        };
        self.signal.fire().call(&next)
    }

    /// The signal fired on every change.
    pub fn signal(&self) -> &Signal<A, R> {
        &self.signal
    }
}

impl<A, R> Clone for Reactive<A, R> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            signal: self.signal.clone(),
        }
    }
}

impl<A: fmt::Debug, R> fmt::Debug for Reactive<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("value", &*self.value.read())
            .field("signal", &self.signal.name())
            .finish()
    }
}
