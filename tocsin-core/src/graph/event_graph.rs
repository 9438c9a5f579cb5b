//! Event Graph
//!
//! The event graph records which events of a signal must run before which.
//! It ensures that dependencies are always dispatched before their dependents.
//!
//! # Algorithm
//!
//! Resolving a target event is a topological sort restricted to the target's
//! ancestors:
//!
//! 1. Walk dependency edges backwards from the target to collect its ancestors
//! 2. Count, for each collected event, how many of its dependencies are collected
//! 3. Repeatedly emit the ready event with the lowest registration index
//! 4. Release its dependents, and continue until every event is emitted
//!
//! Because the target is the only sink among its ancestors, it is always last.
//! Choosing the lowest registration index among ready events makes the order
//! unique for a given graph.
//!
//! Cycles are rejected when an edge is declared, so resolution never sees one.

use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::node::{EventName, EventNode};
use crate::error::{Result, SignalError};

/// An ordered list of events, dependencies first.
pub type EventPath = Vec<EventName>;

/// Per-signal dependency graph between events.
#[derive(Debug, Clone)]
pub struct EventGraph {
    /// All events in the graph, in registration order.
    nodes: IndexMap<EventName, EventNode>,
}

impl EventGraph {
    /// Create a graph holding only the default event.
    pub fn new() -> Self {
        let mut nodes = IndexMap::new();
        nodes.insert(EventName::default(), EventNode::new());
        Self { nodes }
    }

    /// Add an event with no dependencies if it is not already present.
    pub fn add_event(&mut self, event: impl Into<EventName>) {
        self.nodes.entry(event.into()).or_default();
    }

    /// Declare that `event` runs after every event in `depends_on`.
    ///
    /// Missing events are added. If any of the new edges would close a cycle
    /// the whole declaration is rejected and the graph is left unchanged.
    pub fn declare_dependency<I, E>(&mut self, event: impl Into<EventName>, depends_on: I) -> Result<()>
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        let event = event.into();
        let depends_on: IndexSet<EventName> = depends_on.into_iter().map(Into::into).collect();

        // Every new edge ends at `event`, so a cycle can only appear if `event`
        // already reaches one of the new dependencies.
        for dependency in &depends_on {
            if *dependency == event || self.reaches(&event, dependency) {
                return Err(SignalError::Cycle {
                    event,
                    dependency: dependency.clone(),
                });
            }
        }

        self.add_event(event.clone());
        for dependency in depends_on {
            self.nodes
                .entry(dependency.clone())
                .or_default()
                .add_dependent(event.clone());
            if let Some(node) = self.nodes.get_mut(&event) {
                node.add_dependency(dependency.clone());
            }
            tracing::debug!(%event, %dependency, "declared event dependency");
        }

        Ok(())
    }

    /// Whether `to` can be reached from `from` by following dependent edges.
    fn reaches(&self, from: &EventName, to: &EventName) -> bool {
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.dependents().iter());
            }
        }

        false
    }

    /// All transitive dependencies of `event`, not including `event` itself.
    pub fn ancestors(&self, event: &str) -> IndexSet<EventName> {
        let mut ancestors = IndexSet::new();
        let mut queue: VecDeque<&EventName> = self
            .nodes
            .get(event)
            .map(|node| node.dependencies().iter().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if !ancestors.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.dependencies().iter());
            }
        }

        ancestors
    }

    /// Resolve the dependency path of `target`.
    ///
    /// The path holds every ancestor exactly once, each before its dependents,
    /// and ends with `target`. Events the graph has never seen resolve to a
    /// path containing only themselves.
    pub fn resolve(&self, target: impl Into<EventName>) -> EventPath {
        let target = target.into();
        if !self.nodes.contains_key(&target) {
            return vec![target];
        }

        let mut members = self.ancestors(target.as_str());
        members.insert(target);

        let mut in_degree: HashMap<usize, usize> = HashMap::new();
        let mut ready = BTreeSet::new();

        // Count in-degrees only over edges inside the member set.
        for event in &members {
            let Some((index, _, node)) = self.nodes.get_full(event) else {
                continue;
            };
            let degree = node
                .dependencies()
                .iter()
                .filter(|dep| members.contains(*dep))
                .count();
            in_degree.insert(index, degree);
            if degree == 0 {
                ready.insert(index);
            }
        }

        let mut path = Vec::with_capacity(members.len());

        // Kahn's algorithm, lowest registration index first.
        while let Some(index) = ready.pop_first() {
            let Some((event, node)) = self.nodes.get_index(index) else {
                continue;
            };
            path.push(event.clone());

            for dependent in node.dependents() {
                let Some(dependent_index) = self.nodes.get_index_of(dependent) else {
                    continue;
                };
                if let Some(degree) = in_degree.get_mut(&dependent_index) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(dependent_index);
                    }
                }
            }
        }

        path
    }

    /// Resolve each target independently, in the order given.
    ///
    /// A dependency shared by two targets shows up in both paths.
    pub fn resolve_all<I, E>(&self, targets: I) -> Vec<EventPath>
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        targets.into_iter().map(|target| self.resolve(target)).collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.nodes.contains_key(event)
    }

    /// Direct dependencies of `event`, in declaration order.
    pub fn dependencies_of(&self, event: &str) -> impl Iterator<Item = &EventName> {
        self.nodes
            .get(event)
            .into_iter()
            .flat_map(|node| node.dependencies().iter())
    }

    /// Events in registration order.
    pub fn events(&self) -> impl Iterator<Item = &EventName> {
        self.nodes.keys()
    }

    /// Get the total number of events in the graph.
    pub fn event_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for EventGraph {
    fn default() -> Self {
        Self::new()
    }
}
