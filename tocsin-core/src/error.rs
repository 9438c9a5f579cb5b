//! Error types shared by every part of the crate.

use std::fmt;

use thiserror::Error;

use crate::graph::EventName;

/// Error type a listener returns to signal failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a listener hands back to the dispatcher.
pub type ListenerResult<R> = std::result::Result<R, BoxError>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors surfaced by registration, lookup, and firing.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Declaring `event` as depending on `dependency` would close a cycle.
    /// The graph is left exactly as it was before the declaration.
    #[error("event `{event}` cannot depend on `{dependency}`: the dependency graph would contain a cycle")]
    Cycle {
        event: EventName,
        dependency: EventName,
    },

    /// A listener failed while the signal was being fired.
    #[error(transparent)]
    Listener(#[from] ListenerInvocationError),

    /// A named signal exists, but with other payload or result types.
    #[error("signal `{name}` already exists with a different payload type (requested `{expected}`)")]
    TypeMismatch { name: String, expected: &'static str },

    /// The asynchronous worker went away without reporting a result.
    #[error("async firing worker stopped before reporting a result")]
    WorkerLost,

    /// `AsyncWorker::BlockingPool` was requested outside a tokio runtime.
    #[error("no tokio runtime is running to host the blocking pool")]
    NoRuntime,

    /// The process-wide registry was configured after it was first used.
    #[error("the global signal registry is already initialized")]
    AlreadyInitialized,

    #[error("invalid signal configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A listener returned an error during dispatch.
#[derive(Debug, Error)]
#[error("listener `{listener}` failed on event `{event}`: {source}")]
pub struct ListenerInvocationError {
    /// Event being dispatched when the listener failed.
    pub event: EventName,
    /// Label of the listener (its wire name or callable type name).
    pub listener: ListenerLabel,
    #[source]
    pub source: BoxError,
}

/// An async listener was reached by a synchronous firing.
///
/// Reported as the listener's failure, so it is contained like any other.
#[derive(Debug, Error)]
#[error("async listener cannot run in a synchronous firing; use `fire_async`")]
pub struct AsyncListenerError;

/// Human-readable identity of a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerLabel(pub(crate) std::sync::Arc<str>);

impl ListenerLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListenerLabel {
    fn from(label: &str) -> Self {
        Self(label.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_names_both_events() {
        let err = SignalError::Cycle {
            event: EventName::from("A"),
            dependency: EventName::from("B"),
        };
        let message = err.to_string();
        assert!(message.contains("`A`"));
        assert!(message.contains("`B`"));
    }

    #[test]
    fn listener_error_keeps_source() {
        let err = ListenerInvocationError {
            event: EventName::from("save"),
            listener: ListenerLabel::from("audit"),
            source: "disk full".into(),
        };
        assert_eq!(err.to_string(), "listener `audit` failed on event `save`: disk full");

        let wrapped: SignalError = err.into();
        assert!(matches!(wrapped, SignalError::Listener(ref inner) if inner.event.as_str() == "save"));
    }
}
