//! Ordered, filterable replay of one aggregate's events, and state
//! rehydration built on top of it.

use std::cmp::Ordering;

use crate::event::Event;
use crate::ordering::CausalOrdering;

/// Wraps one aggregate's event set and replays it in a chosen order,
/// optionally filtered, through consumers or collectors.
#[derive(Debug, Clone, Default)]
pub struct EventReplayer {
    events: Vec<Event>,
}

impl EventReplayer {
    /// A replayer preserving the given order.
    pub fn of(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn in_ascending_order(mut self, ordering: &CausalOrdering) -> Self {
        self.events.sort_by(|a, b| ordering.compare(a, b));
        self
    }

    pub fn in_descending_order(mut self, ordering: &CausalOrdering) -> Self {
        self.events.sort_by(|a, b| ordering.compare(b, a));
        self
    }

    /// Sort by an arbitrary comparator.
    pub fn ordered_by(mut self, compare: impl Fn(&Event, &Event) -> Ordering) -> Self {
        self.events.sort_by(compare);
        self
    }

    /// Keep only the events matching the predicate.
    pub fn filtered(mut self, predicate: impl Fn(&Event) -> bool) -> Self {
        self.events.retain(|event| predicate(event));
        self
    }

    /// Feed only the first event (in replay order) to the consumer.
    pub fn replay_first(&self, mut consumer: impl FnMut(&Event)) {
        if let Some(event) = self.events.first() {
            consumer(event);
        }
    }

    /// Feed every event, in replay order, to the consumer.
    pub fn replay_all(&self, mut consumer: impl FnMut(&Event)) {
        for event in &self.events {
            consumer(event);
        }
    }

    /// Adapt a typed handler into an event consumer, returning its result
    /// for the first event.
    pub fn collect_first<T>(&self, collector: impl Fn(&Event) -> Option<T>) -> Option<T> {
        self.events.first().and_then(collector)
    }

    /// Adapt a typed handler into an event consumer over every event.
    pub fn collect_all<T>(&self, collector: impl Fn(&Event) -> Option<T>) -> Vec<T> {
        self.events.iter().filter_map(collector).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn to_vec(self) -> Vec<Event> {
        self.events
    }
}

/// Reconstructs aggregate state by folding causally-ordered events.
///
/// Replay starts from absent state. An event carrying the initial
/// characteristic constructs the state when none exists yet; an event
/// without it mutates the state when present, and is a no-op while the
/// state is still absent. An initial event arriving when state already
/// exists is skipped. If no initial event survives filtering, the result
/// is `None`.
pub struct StateBuilder<S> {
    initial: Box<dyn Fn(&Event) -> S + Send + Sync>,
    update: Box<dyn Fn(&mut S, &Event) + Send + Sync>,
}

impl<S> StateBuilder<S> {
    pub fn new(
        initial: impl Fn(&Event) -> S + Send + Sync + 'static,
        update: impl Fn(&mut S, &Event) + Send + Sync + 'static,
    ) -> Self {
        Self {
            initial: Box::new(initial),
            update: Box::new(update),
        }
    }

    /// Fold the replayer's events (expected to be in ascending causal
    /// order) into a state value.
    pub fn rehydrate(&self, replayer: &EventReplayer) -> Option<S> {
        let mut state: Option<S> = None;
        replayer.replay_all(|event| {
            match &mut state {
                None if event.is_initial() => state = Some((self.initial)(event)),
                Some(existing) if !event.is_initial() => (self.update)(existing, event),
                _ => {}
            }
        });
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use strata_core::tuple::{SlotType, TupleSchema, TupleSlot};
    use strata_core::{AggregateId, StreamTimestamp, TimeRange, VersionedName};

    use crate::event::EventType;

    fn schema() -> TupleSchema {
        TupleSchema::new("payload", vec![TupleSlot::new("n", SlotType::Integer)]).unwrap()
    }

    fn initial_event(millis: i64, n: i64) -> Event {
        make(EventType::initial("counter", VersionedName::new("started")), millis, n)
    }

    fn update_event(millis: i64, n: i64) -> Event {
        make(EventType::new("counter", VersionedName::new("bumped")), millis, n)
    }

    fn make(event_type: EventType, millis: i64, n: i64) -> Event {
        Event::of(
            event_type,
            AggregateId::new("counter", "c-1"),
            StreamTimestamp::of("s", Utc.timestamp_millis_opt(millis).unwrap()),
            schema().make(vec![json!(n)]).unwrap(),
        )
    }

    fn value_of(event: &Event) -> i64 {
        event.parameters().get("n").unwrap().as_i64().unwrap()
    }

    fn counter_builder() -> StateBuilder<i64> {
        StateBuilder::new(value_of, |state, event| *state += value_of(event))
    }

    #[test]
    fn replays_in_ascending_causal_order() {
        let replayer = EventReplayer::of(vec![update_event(20, 2), initial_event(10, 1)])
            .in_ascending_order(&CausalOrdering::new());

        let mut seen = Vec::new();
        replayer.replay_all(|event| seen.push(value_of(event)));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn replay_first_feeds_one_event() {
        let replayer = EventReplayer::of(vec![initial_event(10, 1), update_event(20, 2)]);
        let mut seen = Vec::new();
        replayer.replay_first(|event| seen.push(value_of(event)));
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn collectors_adapt_typed_handlers() {
        let replayer = EventReplayer::of(vec![initial_event(10, 1), update_event(20, 2)]);
        assert_eq!(replayer.collect_first(|e| Some(value_of(e))), Some(1));
        assert_eq!(replayer.collect_all(|e| Some(value_of(e))), vec![1, 2]);
    }

    #[test]
    fn rehydration_folds_initial_then_updates() {
        // Started at 1, then bumped by 2: the later "started at 5" is
        // skipped because state already exists.
        let replayer = EventReplayer::of(vec![
            update_event(20, 2),
            initial_event(10, 1),
            initial_event(30, 5),
        ])
        .in_ascending_order(&CausalOrdering::new());

        assert_eq!(counter_builder().rehydrate(&replayer), Some(3));
    }

    #[test]
    fn updates_before_any_initial_event_are_no_ops() {
        let replayer = EventReplayer::of(vec![update_event(5, 100), initial_event(10, 1)])
            .ordered_by(|a, b| a.timestamp().cmp(b.timestamp()));

        assert_eq!(counter_builder().rehydrate(&replayer), Some(1));
    }

    #[test]
    fn filtering_out_the_initial_event_yields_absent_state() {
        let cutoff = TimeRange::from_inclusive(Utc.timestamp_millis_opt(15).unwrap())
            .to_unbounded();
        let replayer = EventReplayer::of(vec![initial_event(10, 1), update_event(20, 2)])
            .filtered(|event| cutoff.contains(event.timestamp().instant()))
            .in_ascending_order(&CausalOrdering::new());

        assert_eq!(counter_builder().rehydrate(&replayer), None);
    }

    #[test]
    fn point_in_time_truncation_yields_earlier_state() {
        let window =
            TimeRange::from_unbounded().to_inclusive(Utc.timestamp_millis_opt(10).unwrap());
        let replayer = EventReplayer::of(vec![initial_event(10, 1), update_event(20, 2)])
            .filtered(|event| window.contains(event.timestamp().instant()))
            .in_ascending_order(&CausalOrdering::new());

        assert_eq!(counter_builder().rehydrate(&replayer), Some(1));
    }
}
