//! Event Dependency Graph
//!
//! Each signal owns one event graph describing which of its events must be
//! dispatched before which.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are event names
//! - Edges point from a dependency to its dependent: if B depends on A,
//!   there is an edge from A to B
//!
//! Firing an event first resolves its dependency path, the ordered list of
//! every event that has to run before it, and then dispatches the path in
//! order.
//!
//! # Design Decisions
//!
//! 1. Cycles are rejected when an edge is declared, never at firing time.
//!
//! 2. Nodes are kept in registration order, which breaks ties between events
//!    that do not depend on each other.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    so that cycle checks and path resolution are both simple traversals.

mod event_graph;
mod node;

pub use event_graph::{EventGraph, EventPath};
pub use node::{EventName, EventNode, DEFAULT_EVENT};
