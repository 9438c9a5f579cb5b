//! Broadcasting
//!
//! This module contains the signal type and everything it is built from:
//!
//! - [`SignalRegistry`]: Name-to-signal lookup, one signal per name
//! - [`Signal`]: A broadcaster owning an event graph and a listener table
//! - [`Wire`] and [`ClassTemplate`]: Which events a listener or method answers
//! - [`ListenerTable`]: Listener entries bucketed by event
//! - [`Invoker`] and [`AsyncInvoker`]: Resolved firing plans
//! - [`Reactive`]: A value that fires its signal when it changes
//!
//! # Example
//!
//! ```rust
//! use tocsin_core::{FireOptions, Signal, SignalRegistry, Wire};
//!
//! let registry = SignalRegistry::new();
//! let build: Signal<(), &'static str> = registry.get_or_create("build").unwrap();
//!
//! build.connect(Wire::on("link").depends_on(["compile"]), |_| Ok("link")).unwrap();
//! build.connect(Wire::on("compile"), |_| Ok("compile")).unwrap();
//!
//! let results = build.fire_with(FireOptions::new().event("link")).call(&()).unwrap();
//! assert_eq!(results, vec!["compile", "link"]);
//! ```

mod dispatch;
mod listener;
mod reactive;
mod registry;
mod signal;
mod table;
mod wire;

pub use dispatch::{AsyncInvoker, FireHandle, FireOptions, FiringState, Invoker};
pub use listener::{
    AsyncListenerFn, AsyncMethodFn, Invocation, ListenerEntry, ListenerFn, ListenerFuture,
    ListenerId, MethodFn, ReceiverId,
};
pub use reactive::Reactive;
pub use registry::SignalRegistry;
pub use signal::Signal;
pub use table::ListenerTable;
pub use wire::{ClassTemplate, Wire};
