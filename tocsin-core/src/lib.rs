//! Tocsin Core
//!
//! In-process publish/subscribe signals. It implements:
//!
//! - Named signals that are singletons per registry
//! - Event dependencies, resolved into a deterministic topological path
//! - Free-function listeners and class methods bound weakly to instances
//! - Synchronous and asynchronous firing through reusable invokers
//! - Async listeners, awaited in order by asynchronous firings
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `broadcast`: Signals, the registry, listener storage and dispatch
//! - `graph`: Per-signal event dependency graph
//! - `config`: Per-registry settings, loadable from JSON
//! - `error`: The crate's error type
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tocsin_core::{ClassTemplate, FireOptions, Signal, SignalRegistry, Wire};
//!
//! struct Wheel {
//!     turns: AtomicU32,
//! }
//!
//! let registry = SignalRegistry::new();
//! let drive: Signal<u32> = registry.get_or_create("drive").unwrap();
//!
//! drive
//!     .register_class(ClassTemplate::new().method(
//!         Wire::on("turn").depends_on(["start"]),
//!         |wheel: &Wheel, turns: &u32| {
//!             wheel.turns.fetch_add(*turns, Ordering::SeqCst);
//!             Ok(())
//!         },
//!     ))
//!     .unwrap();
//!
//! let front = drive.instantiate(Wheel { turns: AtomicU32::new(0) });
//! let back = drive.instantiate(Wheel { turns: AtomicU32::new(0) });
//!
//! // Fire at one wheel only.
//! drive
//!     .fire_with(FireOptions::new().event("turn").receiver(&front))
//!     .call(&3)
//!     .unwrap();
//!
//! assert_eq!(front.turns.load(Ordering::SeqCst), 3);
//! assert_eq!(back.turns.load(Ordering::SeqCst), 0);
//! assert_eq!(drive.get_event_path("turn")[0].len(), 2);
//!
//! // Dropped instances stop receiving.
//! drop(back);
//! assert_eq!(drive.listener_count("turn"), 1);
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod graph;

pub use broadcast::{
    AsyncInvoker, ClassTemplate, FireHandle, FireOptions, FiringState, Invocation, Invoker,
    ListenerFuture, ListenerId, Reactive, ReceiverId, Signal, SignalRegistry, Wire,
};
pub use config::{AsyncWorker, ErrorPolicy, SignalConfig};
pub use error::{
    AsyncListenerError, BoxError, ListenerInvocationError, ListenerLabel, ListenerResult, Result,
    SignalError,
};
pub use graph::{EventName, EventPath, DEFAULT_EVENT};
