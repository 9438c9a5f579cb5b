//! Graph Nodes
//!
//! This module defines event names and the node type that lives in the
//! event dependency graph.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

/// Name reserved for the default event.
///
/// Firing a signal without naming any event targets this one, and listeners
/// registered without an event land here.
pub const DEFAULT_EVENT: &str = "<default>";

/// Name of an event within a signal.
///
/// Cheap to clone. `EventName::default()` is the default event.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(Arc<str>);

impl EventName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the default event.
    pub fn is_default(&self) -> bool {
        &*self.0 == DEFAULT_EVENT
    }
}

impl Default for EventName {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT)
    }
}

impl Borrow<str> for EventName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EventName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&String> for EventName {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

impl PartialEq<str> for EventName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for EventName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Debug for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node in the event graph.
///
/// Edges are stored in both directions. Both sets keep insertion order so
/// that traversals are deterministic.
#[derive(Debug, Clone, Default)]
pub struct EventNode {
    /// Events that must run before this one.
    dependencies: IndexSet<EventName>,

    /// Events that declared this one as a dependency.
    dependents: IndexSet<EventName>,
}

impl EventNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency (an event that must run first).
    pub fn add_dependency(&mut self, event: EventName) {
        self.dependencies.insert(event);
    }

    pub fn dependencies(&self) -> &IndexSet<EventName> {
        &self.dependencies
    }

    /// Add a dependent (an event that waits on this one).
    pub fn add_dependent(&mut self, event: EventName) {
        self.dependents.insert(event);
    }

    pub fn dependents(&self) -> &IndexSet<EventName> {
        &self.dependents
    }
}
