//! Event sources: retrieval, preloaded snapshots, and read-through caching.
//!
//! An [`EventSource`] is the query surface state reconstruction works
//! against. `preload` executes one bulk retrieval and hands back an
//! immutable snapshot, so rehydrating N aggregates costs one round trip
//! instead of N. Snapshots never see writes made after they were taken;
//! a stale snapshot is discarded and rebuilt, never invalidated in place.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::debug;

use strata_core::{AggregateId, TimeRange};

use crate::event::Event;
use crate::matching::EventTypeMatcher;
use crate::ordering::CausalOrdering;
use crate::replay::EventReplayer;
use crate::storage::{EventRetriever, EventStoreError};

/// The query surface over an aggregate's history.
#[derive(Clone)]
pub struct EventSource {
    retriever: Arc<dyn EventRetriever>,
}

impl EventSource {
    pub fn retrieving_from(retriever: Arc<dyn EventRetriever>) -> Self {
        Self { retriever }
    }

    /// One aggregate's events within the range, in no particular order.
    pub fn get_events(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: &TimeRange,
    ) -> Result<Vec<Event>, EventStoreError> {
        self.retriever.events_for(matcher, aggregate_id, range)
    }

    /// A replayer over one aggregate's events, pre-sorted into ascending
    /// causal order.
    pub fn replaying(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: &TimeRange,
        ordering: &CausalOrdering,
    ) -> Result<EventReplayer, EventStoreError> {
        let events = self.get_events(matcher, aggregate_id, range)?;
        Ok(EventReplayer::of(events).in_ascending_order(ordering))
    }

    /// Fetch the histories of many aggregates of one type in a single bulk
    /// retrieval, returning an immutable snapshot queryable per aggregate.
    pub fn preload(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_type: &str,
        ids: &BTreeSet<String>,
        range: &TimeRange,
    ) -> Result<CachedEventSource, EventStoreError> {
        let events = self
            .retriever
            .events_for_all(matcher, aggregate_type, ids, range)?;
        debug!(
            aggregate_type,
            requested = ids.len(),
            found = events.len(),
            "event histories preloaded"
        );
        Ok(CachedEventSource {
            cache: EventCache::containing(events),
        })
    }
}

/// An immutable snapshot of per-aggregate event histories.
#[derive(Debug, Clone, Default)]
pub struct EventCache {
    events: HashMap<AggregateId, Vec<Event>>,
}

impl EventCache {
    pub fn containing(events: HashMap<AggregateId, Vec<Event>>) -> Self {
        Self { events }
    }

    pub fn events_for(&self, aggregate_id: &AggregateId, range: &TimeRange) -> Vec<Event> {
        self.events
            .get(aggregate_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| range.contains(event.timestamp().instant()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn aggregate_ids(&self) -> impl Iterator<Item = &AggregateId> {
        self.events.keys()
    }
}

/// An [`EventSource`]-shaped view over a preloaded [`EventCache`].
///
/// Queries are I/O-free; the type matcher was already applied during
/// preload, so per-aggregate lookups only re-apply the time range.
#[derive(Debug, Clone)]
pub struct CachedEventSource {
    cache: EventCache,
}

impl CachedEventSource {
    pub fn over(cache: EventCache) -> Self {
        Self { cache }
    }

    pub fn get_events(&self, aggregate_id: &AggregateId, range: &TimeRange) -> Vec<Event> {
        self.cache.events_for(aggregate_id, range)
    }

    pub fn replaying(
        &self,
        aggregate_id: &AggregateId,
        range: &TimeRange,
        ordering: &CausalOrdering,
    ) -> EventReplayer {
        EventReplayer::of(self.get_events(aggregate_id, range)).in_ascending_order(ordering)
    }

    pub fn cache(&self) -> &EventCache {
        &self.cache
    }
}

/// A read-through caching wrapper over a retriever.
///
/// The first query for an aggregate fetches its full history and caches
/// it; later queries for the same aggregate are served from memory with
/// only the time range re-applied. Cached histories never see later
/// writes.
pub struct CachingEventSource {
    retriever: Arc<dyn EventRetriever>,
    cache: RwLock<HashMap<AggregateId, Vec<Event>>>,
}

impl CachingEventSource {
    pub fn retrieving_with(retriever: Arc<dyn EventRetriever>) -> Self {
        Self {
            retriever,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_events(
        &self,
        matcher: &dyn EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: &TimeRange,
    ) -> Result<Vec<Event>, EventStoreError> {
        let in_range = |events: &[Event]| {
            events
                .iter()
                .filter(|event| range.contains(event.timestamp().instant()))
                .cloned()
                .collect::<Vec<_>>()
        };

        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EventStoreError::retrieval("event cache lock poisoned"))?;
            if let Some(events) = cache.get(aggregate_id) {
                return Ok(in_range(events));
            }
        }

        let history =
            self.retriever
                .events_for(matcher, aggregate_id, &TimeRange::unbounded())?;
        let mut cache = self
            .cache
            .write()
            .map_err(|_| EventStoreError::retrieval("event cache lock poisoned"))?;
        let events = cache.entry(aggregate_id.clone()).or_insert(history);
        Ok(in_range(events))
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
    use crate::storage::{EventPersister, InMemoryEventStore};

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

    fn store_with(events: &[Event]) -> Arc<InMemoryEventStore> {
        let store = Arc::new(InMemoryEventStore::new());
        store.accept(events).unwrap();
        store
    }

    #[test]
    fn preload_serves_many_aggregates_from_one_snapshot() {
        let store = store_with(&[event("o-1", 10, 1), event("o-2", 20, 2)]);
        let source = EventSource::retrieving_from(store);

        let ids: BTreeSet<String> = ["o-1", "o-2"].into_iter().map(String::from).collect();
        let snapshot = source
            .preload(&matcher(), "order", &ids, &TimeRange::unbounded())
            .unwrap();

        assert_eq!(
            snapshot
                .get_events(&AggregateId::new("order", "o-1"), &TimeRange::unbounded())
                .len(),
            1
        );
        assert_eq!(
            snapshot
                .get_events(&AggregateId::new("order", "o-2"), &TimeRange::unbounded())
                .len(),
            1
        );
    }

    #[test]
    fn snapshots_do_not_see_later_writes() {
        let store = store_with(&[event("o-1", 10, 1)]);
        let source = EventSource::retrieving_from(Arc::clone(&store) as Arc<dyn EventRetriever>);

        let ids: BTreeSet<String> = ["o-1"].into_iter().map(String::from).collect();
        let snapshot = source
            .preload(&matcher(), "order", &ids, &TimeRange::unbounded())
            .unwrap();

        store.accept_one(&event("o-1", 20, 2)).unwrap();

        assert_eq!(
            snapshot
                .get_events(&AggregateId::new("order", "o-1"), &TimeRange::unbounded())
                .len(),
            1
        );
    }

    #[test]
    fn cached_queries_re_apply_the_time_range() {
        let store = store_with(&[event("o-1", 10, 1), event("o-1", 20, 2)]);
        let caching = CachingEventSource::retrieving_with(store);

        let all = caching
            .get_events(
                &matcher(),
                &AggregateId::new("order", "o-1"),
                &TimeRange::unbounded(),
            )
            .unwrap();
        assert_eq!(all.len(), 2);

        let early = caching
            .get_events(
                &matcher(),
                &AggregateId::new("order", "o-1"),
                &TimeRange::from_unbounded().to_inclusive(Utc.timestamp_millis_opt(10).unwrap()),
            )
            .unwrap();
        assert_eq!(early.len(), 1);
    }
}
