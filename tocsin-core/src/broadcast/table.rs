//! Listener Table
//!
//! Per-signal storage for listener entries, bucketed by event.
//!
//! # Ordering
//!
//! Each bucket stays sorted by [`EntryOrder`]: entries appear in the order
//! their owning construct was registered. A class template counts as one
//! construct, so the methods of every instance of a wired class sit where
//! the template was registered, ordered by instance creation and then by
//! method declaration.
//!
//! # Liveness
//!
//! Bound entries hold weak references. [`ListenerTable::lookup`] skips dead
//! entries and [`ListenerTable::prune`] removes them.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::listener::{
    AsyncListenerFn, BoundListener, BoundMethod, EntryOrder, ListenerEntry, ListenerFn, ListenerId, WeakMethod,
};
use super::wire::{ClassTemplate, Wire};
use crate::error::ListenerLabel;
use crate::graph::EventName;

struct RegisteredTemplate {
    construct: u64,
    template: Arc<dyn Any + Send + Sync>,
}

/// Listener entries of one signal, by event.
pub struct ListenerTable<A, R> {
    buckets: IndexMap<EventName, Vec<ListenerEntry<A, R>>>,
    templates: HashMap<TypeId, RegisteredTemplate>,
    next_construct: u64,
    next_instance: u64,
}

impl<A, R> ListenerTable<A, R> {
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
            templates: HashMap::new(),
            next_construct: 0,
            next_instance: 1,
        }
    }

    fn next_construct(&mut self) -> u64 {
        let construct = self.next_construct;
        self.next_construct += 1;
        construct
    }

    fn insert(&mut self, event: EventName, entry: ListenerEntry<A, R>) {
        let bucket = self.buckets.entry(event).or_default();
        let position = bucket.partition_point(|existing| existing.order() <= entry.order());
        bucket.insert(position, entry);
    }

    /// Insert one entry per event of `wire`, all sharing a fresh ID and the
    /// next construct slot.
    fn register_construct<F>(&mut self, wire: &Wire, entry: F) -> ListenerId
    where
        F: Fn(ListenerId, EntryOrder) -> ListenerEntry<A, R>,
    {
        let id = ListenerId::new();
        let order = EntryOrder {
            construct: self.next_construct(),
            instance: 0,
            method: 0,
        };
        for event in wire.events() {
            self.insert(event, entry(id, order));
        }
        id
    }

    /// Add a free function under every event of `wire`.
    pub fn register_function(
        &mut self,
        wire: &Wire,
        label: ListenerLabel,
        f: Arc<ListenerFn<A, R>>,
    ) -> ListenerId {
        self.register_construct(wire, |id, order| {
            ListenerEntry::free(id, label.clone(), order, Arc::clone(&f))
        })
    }

    /// Add an async free function under every event of `wire`.
    pub fn register_async_function(
        &mut self,
        wire: &Wire,
        label: ListenerLabel,
        f: Arc<AsyncListenerFn<A, R>>,
    ) -> ListenerId {
        self.register_construct(wire, |id, order| {
            ListenerEntry::free_async(id, label.clone(), order, Arc::clone(&f))
        })
    }

    /// Live entries for `event`, in registration order.
    pub fn lookup(&self, event: &str) -> Vec<ListenerEntry<A, R>> {
        self.buckets
            .get(event)
            .map(|bucket| bucket.iter().filter(|entry| entry.is_live()).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop entries whose instance is gone. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(ListenerEntry::is_live);
            removed += before - bucket.len();
        }
        removed
    }

    /// Number of live entries for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.buckets
            .get(event)
            .map(|bucket| bucket.iter().filter(|entry| entry.is_live()).count())
            .unwrap_or(0)
    }

    /// Number of live entries across all events.
    pub fn live_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|entry| entry.is_live())
            .count()
    }
}

impl<A, R> ListenerTable<A, R>
where
    A: 'static,
    R: 'static,
{
    /// Add a single method bound weakly to `instance`.
    pub(crate) fn register_bound<T>(
        &mut self,
        instance: &Arc<T>,
        wire: &Wire,
        label: ListenerLabel,
        method: BoundMethod<T, A, R>,
    ) -> ListenerId
    where
        T: Send + Sync + 'static,
    {
        let bound: Arc<dyn BoundListener<A, R>> = Arc::new(WeakMethod::new(instance, method));
        self.register_construct(wire, |id, order| {
            ListenerEntry::bound(id, label.clone(), order, Arc::clone(&bound))
        })
    }

    /// Record the template for `T`. No entries are created yet.
    ///
    /// Registering a second template for the same type replaces the first for
    /// instances created afterwards.
    pub fn register_class_template<T>(&mut self, template: ClassTemplate<T, A, R>)
    where
        T: Send + Sync + 'static,
    {
        let construct = self.next_construct();
        self.templates.insert(
            TypeId::of::<T>(),
            RegisteredTemplate {
                construct,
                template: Arc::new(template),
            },
        );
    }

    /// Bind every templated method of `T` to `instance`.
    ///
    /// Returns the number of entries created. Types without a template get
    /// none.
    pub fn on_instance_created<T>(&mut self, instance: &Arc<T>) -> usize
    where
        T: Send + Sync + 'static,
    {
        let Some(registered) = self.templates.get(&TypeId::of::<T>()) else {
            return 0;
        };
        let construct = registered.construct;
        let Ok(template) = Arc::clone(&registered.template).downcast::<ClassTemplate<T, A, R>>() else {
            return 0;
        };

        let instance_seq = self.next_instance;
        self.next_instance += 1;

        let mut created = 0;
        for (index, templated) in template.methods().iter().enumerate() {
            let id = ListenerId::new();
            let order = EntryOrder {
                construct,
                instance: instance_seq,
                method: index,
            };
            let bound = Arc::new(WeakMethod::new(instance, templated.method.clone()));
            for event in templated.wire.events() {
                self.insert(
                    event,
                    ListenerEntry::bound(id, templated.label.clone(), order, bound.clone()),
                );
                created += 1;
            }
        }
        created
    }
}

impl<A, R> Default for ListenerTable<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Invocation, ListenerFuture, MethodFn, ReceiverId};
    use crate::error::ListenerResult;

    struct Widget;

    fn free(label: &'static str) -> (ListenerLabel, Arc<ListenerFn<(), &'static str>>) {
        (
            ListenerLabel::from(label),
            Arc::new(move |_: &()| -> ListenerResult<&'static str> { Ok(label) }),
        )
    }

    fn run(table: &ListenerTable<(), &'static str>, event: &str) -> Vec<&'static str> {
        table
            .lookup(event)
            .iter()
            .filter_map(|entry| entry.invoke(&()))
            .map(|invocation| match invocation {
                Invocation::Ready(result) => result.unwrap(),
                Invocation::Pending(_) => panic!("unexpected async listener"),
            })
            .collect()
    }

    #[test]
    fn functions_land_in_every_wired_event() {
        let mut table = ListenerTable::new();
        let (label, f) = free("f");
        let id = table.register_function(&Wire::on("a").and_on("b"), label, f);

        assert_eq!(table.listener_count("a"), 1);
        assert_eq!(table.listener_count("b"), 1);
        assert_eq!(table.listener_count(crate::graph::DEFAULT_EVENT), 0);
        assert_eq!(table.lookup("a")[0].id(), id);
        assert_eq!(table.lookup("b")[0].id(), id);
    }

    #[test]
    fn duplicate_registration_is_kept() {
        let mut table = ListenerTable::new();
        let (label, f) = free("f");
        table.register_function(&Wire::default_event(), label.clone(), f.clone());
        table.register_function(&Wire::default_event(), label, f);
        assert_eq!(run(&table, crate::graph::DEFAULT_EVENT), vec!["f", "f"]);
    }

    #[test]
    fn template_entries_sit_where_the_template_was_registered() {
        let mut table = ListenerTable::new();

        let (label, f) = free("first");
        table.register_function(&Wire::default_event(), label, f);

        table.register_class_template(
            ClassTemplate::<Widget, (), &'static str>::new()
                .method(Wire::default_event(), |_, _| Ok("m1"))
                .method(Wire::default_event(), |_, _| Ok("m2")),
        );

        let (label, f) = free("last");
        table.register_function(&Wire::default_event(), label, f);

        let w1 = Arc::new(Widget);
        let w2 = Arc::new(Widget);
        assert_eq!(table.on_instance_created(&w1), 2);
        assert_eq!(table.on_instance_created(&w2), 2);

        assert_eq!(
            run(&table, crate::graph::DEFAULT_EVENT),
            vec!["first", "m1", "m2", "m1", "m2", "last"]
        );
        assert_eq!(table.lookup(crate::graph::DEFAULT_EVENT)[1].receiver(), Some(ReceiverId::of(&w1)));
    }

    #[test]
    fn unknown_class_binds_nothing() {
        let mut table: ListenerTable<(), ()> = ListenerTable::new();
        assert_eq!(table.on_instance_created(&Arc::new(Widget)), 0);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn dropped_instances_disappear() {
        let mut table: ListenerTable<(), ()> = ListenerTable::new();
        table.register_class_template(
            ClassTemplate::<Widget, ()>::new()
                .method(Wire::on("a"), |_, _| Ok(()))
                .method(Wire::on("b"), |_, _| Ok(())),
        );

        let w1 = Arc::new(Widget);
        let w2 = Arc::new(Widget);
        table.on_instance_created(&w1);
        table.on_instance_created(&w2);
        assert_eq!(table.live_count(), 4);

        drop(w1);
        assert_eq!(table.live_count(), 2);
        assert_eq!(table.lookup("a").len(), 1);

        assert_eq!(table.prune(), 2);
        assert_eq!(table.prune(), 0);
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn bound_method_is_weak() {
        let mut table: ListenerTable<(), ()> = ListenerTable::new();
        let widget = Arc::new(Widget);
        let method: Arc<MethodFn<Widget, (), ()>> =
            Arc::new(|_: &Widget, _: &()| -> ListenerResult<()> { Ok(()) });
        table.register_bound(
            &widget,
            &Wire::default_event(),
            "poke".into(),
            BoundMethod::Sync(method),
        );

        assert_eq!(Arc::strong_count(&widget), 1);
        assert_eq!(table.live_count(), 1);
        drop(widget);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn async_functions_share_registration_order() {
        let mut table: ListenerTable<(), &'static str> = ListenerTable::new();
        let (label, f) = free("sync");
        table.register_function(&Wire::on("a"), label, f);
        let pending: Arc<AsyncListenerFn<(), &'static str>> =
            Arc::new(|_: &()| -> ListenerFuture<&'static str> {
                Box::pin(async { Ok("async") })
            });
        table.register_async_function(&Wire::on("a").and_on("b"), "later".into(), pending);

        let entries = table.lookup("a");
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_async());
        assert!(entries[1].is_async());
        assert_eq!(table.listener_count("b"), 1);
        assert_eq!(entries[1].id(), table.lookup("b")[0].id());
    }
}
