//! The event log: processing-id assignment, persistence, and the filter
//! chain in front of it.
//!
//! Filters compose as an explicit ordered chain built once at startup.
//! Each stage receives the events plus a handle to the rest of the chain,
//! so it can rewrite or drop events before persistence (pre) and observe
//! what was actually persisted (post).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use strata_core::TimeUuidGenerator;

use crate::event::{Event, EventIdentity};
use crate::storage::{EventPersister, EventStoreError};

/// Accepts batches of freshly-produced events, assigns processing ids and
/// persists them, returning the events as persisted.
///
/// A batch is applied in one call; the log never observes part of one.
pub trait EventLog: Send + Sync {
    fn apply(&self, events: Vec<Event>) -> Result<Vec<Event>, EventStoreError>;
}

impl<T: EventLog + ?Sized> EventLog for Arc<T> {
    fn apply(&self, events: Vec<Event>) -> Result<Vec<Event>, EventStoreError> {
        (**self).apply(events)
    }
}

/// The terminal log stage: assign a processing id to every event lacking
/// one, then hand the whole batch to the persister.
pub struct PersistingEventLog {
    persister: Arc<dyn EventPersister>,
    ids: Arc<TimeUuidGenerator>,
}

impl PersistingEventLog {
    pub fn persisting_to(persister: Arc<dyn EventPersister>, ids: Arc<TimeUuidGenerator>) -> Self {
        Self { persister, ids }
    }
}

impl EventLog for PersistingEventLog {
    fn apply(&self, events: Vec<Event>) -> Result<Vec<Event>, EventStoreError> {
        let processed: Vec<Event> = events
            .iter()
            .map(|event| match event.processing_id() {
                Some(_) => event.clone(),
                None => event.processed(self.ids.next()),
            })
            .collect();

        self.persister.accept(&processed)?;
        Ok(processed)
    }
}

/// One stage of the log's middleware chain.
pub trait EventLogFilter: Send + Sync {
    fn apply(
        &self,
        events: Vec<Event>,
        next: &dyn EventLog,
    ) -> Result<Vec<Event>, EventStoreError>;
}

/// An [`EventLog`] running every batch through an ordered filter chain
/// before the inner log.
pub struct FilteredEventLog {
    filters: Vec<Arc<dyn EventLogFilter>>,
    inner: Arc<dyn EventLog>,
}

impl FilteredEventLog {
    pub fn filtering(
        inner: Arc<dyn EventLog>,
        filters: Vec<Arc<dyn EventLogFilter>>,
    ) -> Self {
        Self { filters, inner }
    }
}

struct ChainTail<'a> {
    filters: &'a [Arc<dyn EventLogFilter>],
    inner: &'a dyn EventLog,
}

impl EventLog for ChainTail<'_> {
    fn apply(&self, events: Vec<Event>) -> Result<Vec<Event>, EventStoreError> {
        match self.filters.split_first() {
            Some((head, tail)) => head.apply(
                events,
                &ChainTail {
                    filters: tail,
                    inner: self.inner,
                },
            ),
            None => self.inner.apply(events),
        }
    }
}

impl EventLog for FilteredEventLog {
    fn apply(&self, events: Vec<Event>) -> Result<Vec<Event>, EventStoreError> {
        ChainTail {
            filters: &self.filters,
            inner: self.inner.as_ref(),
        }
        .apply(events)
    }
}

/// Emits a tracing event on either side of persistence.
pub struct TracingEventLogFilter;

impl EventLogFilter for TracingEventLogFilter {
    fn apply(
        &self,
        events: Vec<Event>,
        next: &dyn EventLog,
    ) -> Result<Vec<Event>, EventStoreError> {
        debug!(count = events.len(), "applying events to log");
        let persisted = next.apply(events)?;
        debug!(count = persisted.len(), "events persisted to log");
        Ok(persisted)
    }
}

/// Drops events whose identity was already seen within a TTL window,
/// giving idempotent handling of at-least-once upstream delivery.
///
/// Entries expire after the TTL; there is no capacity bound.
pub struct DeduplicatingFilter {
    ttl: Duration,
    seen: Mutex<HashMap<EventIdentity, Instant>>,
}

impl DeduplicatingFilter {
    pub fn remembering_for(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic check-and-insert: true exactly once per identity per TTL
    /// window.
    fn first_seen(&self, identity: &EventIdentity) -> Result<bool, EventStoreError> {
        let now = Instant::now();
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| EventStoreError::persistence("deduplication set lock poisoned"))?;
        seen.retain(|_, at| now.duration_since(*at) < self.ttl);

        Ok(match seen.entry(identity.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        })
    }
}

impl EventLogFilter for DeduplicatingFilter {
    fn apply(
        &self,
        events: Vec<Event>,
        next: &dyn EventLog,
    ) -> Result<Vec<Event>, EventStoreError> {
        let mut first_seen = Vec::with_capacity(events.len());
        for event in events {
            if self.first_seen(event.identity())? {
                first_seen.push(event);
            } else {
                debug!(identity = %event.identity(), "duplicate event dropped");
            }
        }

        if first_seen.is_empty() {
            return Ok(first_seen);
        }
        next.apply(first_seen)
    }
}
