//! The event store contract and the in-memory reference implementation.
//!
//! Persistence and retrieval are separate traits so adapters can implement
//! either side independently. Retrieval does not guarantee any ordering;
//! callers layer [`CausalOrdering`](crate::ordering::CausalOrdering) and
//! the replayer on top.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use strata_core::{AggregateId, TimeRange};

use crate::event::Event;
use crate::matching::EventTypeMatcher;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("event persistence failed: {0}")]
    Persistence(String),

    #[error("event retrieval failed: {0}")]
    Retrieval(String),

    #[error("event pipeline is shut down")]
    Closed,
}

impl EventStoreError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }
}

/// Durably appends events to the store.
///
/// Accepting a slice of events must be observably equivalent to accepting
/// each event in turn.
pub trait EventPersister: Send + Sync {
    fn accept(&self, events: &[Event]) -> Result<(), EventStoreError>;

    fn accept_one(&self, event: &Event) -> Result<(), EventStoreError> {
        self.accept(core::slice::from_ref(event))
    }
}

/// Fetches raw event history, in no particular order.
pub trait EventRetriever: Send + Sync {
    /// Events of one aggregate whose timestamps fall within the range and
    /// whose types the matcher understands.
    fn events_for(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: &TimeRange,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Bulk form amortizing one round trip across many aggregates of one
    /// type. Aggregates with no matching events are absent from the result.
    fn events_for_all(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_type: &str,
        ids: &BTreeSet<String>,
        range: &TimeRange,
    ) -> Result<HashMap<AggregateId, Vec<Event>>, EventStoreError>;
}

/// Reference store: linearizable, so a read issued after a completed batch
/// always observes that batch. Other backends choose and document their
/// own consistency model.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<AggregateId, Vec<Event>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_events(
        events: &[Event],
        matcher: &dyn EventTypeMatcher,
        range: &TimeRange,
    ) -> Vec<Event> {
        events
            .iter()
            .filter(|event| matcher.match_type(event.event_type()).is_some())
            .filter(|event| range.contains(event.timestamp().instant()))
            .cloned()
            .collect()
    }
}

impl EventPersister for InMemoryEventStore {
    fn accept(&self, events: &[Event]) -> Result<(), EventStoreError> {
        let mut store = self
            .events
            .write()
            .map_err(|_| EventStoreError::persistence("event store lock poisoned"))?;
        for event in events {
            store
                .entry(event.aggregate_id().clone())
                .or_default()
                .push(event.clone());
        }
        debug!(count = events.len(), "events persisted");
        Ok(())
    }
}

impl EventRetriever for InMemoryEventStore {
    fn events_for(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: &TimeRange,
    ) -> Result<Vec<Event>, EventStoreError> {
        let store = self
            .events
            .read()
            .map_err(|_| EventStoreError::retrieval("event store lock poisoned"))?;
        Ok(store
            .get(aggregate_id)
            .map(|events| Self::matching_events(events, matcher, range))
            .unwrap_or_default())
    }

    fn events_for_all(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_type: &str,
        ids: &BTreeSet<String>,
        range: &TimeRange,
    ) -> Result<HashMap<AggregateId, Vec<Event>>, EventStoreError> {
        let store = self
            .events
            .read()
            .map_err(|_| EventStoreError::retrieval("event store lock poisoned"))?;

        let mut result = HashMap::new();
        for id in ids {
            let aggregate_id = AggregateId::new(aggregate_type, id.clone());
            if let Some(events) = store.get(&aggregate_id) {
                let matching = Self::matching_events(events, matcher, range);
                if !matching.is_empty() {
                    result.insert(aggregate_id, matching);
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use strata_core::tuple::{SlotType, TupleSchema, TupleSlot};
    use strata_core::{StreamTimestamp, VersionedName};

    use crate::event::EventType;
    use crate::matching::MapEventTypeMatcher;

    fn schema() -> TupleSchema {
        TupleSchema::new("payload", vec![TupleSlot::new("n", SlotType::Integer)]).unwrap()
    }

    fn created_type() -> EventType {
        EventType::initial("order", VersionedName::new("created"))
    }

    fn event(id: &str, millis: i64, n: i64) -> Event {
        Event::of(
            created_type(),
            AggregateId::new("order", id),
            StreamTimestamp::of("s", Utc.timestamp_millis_opt(millis).unwrap()),
            schema().make(vec![json!(n)]).unwrap(),
        )
    }

    fn matcher() -> MapEventTypeMatcher {
        MapEventTypeMatcher::new().register(created_type(), schema())
    }

    #[test]
    fn persisted_events_are_retrievable_per_aggregate() {
        let store = InMemoryEventStore::new();
        store
            .accept(&[event("o-1", 10, 1), event("o-2", 20, 2)])
            .unwrap();

        let events = store
            .events_for(
                &matcher(),
                &AggregateId::new("order", "o-1"),
                &TimeRange::unbounded(),
            )
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].aggregate_id().id(), "o-1");
    }

    #[test]
    fn retrieval_applies_the_time_range() {
        let store = InMemoryEventStore::new();
        store
            .accept(&[event("o-1", 10, 1), event("o-1", 20, 2), event("o-1", 30, 3)])
            .unwrap();

        let range = TimeRange::from_inclusive(Utc.timestamp_millis_opt(10).unwrap())
            .to_exclusive(Utc.timestamp_millis_opt(30).unwrap());
        let events = store
            .events_for(&matcher(), &AggregateId::new("order", "o-1"), &range)
            .unwrap();

        let instants: Vec<i64> = events
            .iter()
            .map(|e| e.timestamp().instant().timestamp_millis())
            .collect();
        assert_eq!(instants, vec![10, 20]);
    }

    #[test]
    fn retrieval_drops_unmatched_types() {
        let store = InMemoryEventStore::new();
        store.accept_one(&event("o-1", 10, 1)).unwrap();

        let unmatched = MapEventTypeMatcher::new();
        let events = store
            .events_for(
                &unmatched,
                &AggregateId::new("order", "o-1"),
                &TimeRange::unbounded(),
            )
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn bulk_retrieval_groups_by_aggregate_and_omits_empty() {
        let store = InMemoryEventStore::new();
        store
            .accept(&[event("o-1", 10, 1), event("o-1", 20, 2), event("o-2", 30, 3)])
            .unwrap();

        let ids: BTreeSet<String> =
            ["o-1", "o-2", "o-3"].into_iter().map(String::from).collect();
        let by_id = store
            .events_for_all(&matcher(), "order", &ids, &TimeRange::unbounded())
            .unwrap();

        assert_eq!(by_id.len(), 2);
        assert_eq!(by_id[&AggregateId::new("order", "o-1")].len(), 2);
        assert!(!by_id.contains_key(&AggregateId::new("order", "o-3")));
    }
}
