//! Mapping event types to the schemas needed to interpret their parameters.
//!
//! A matcher is the explicit registration table that decouples stores and
//! codecs from any particular handler binding: given an [`EventType`], it
//! answers with the [`TupleSchema`] of that type's parameters, or `None`
//! for types it does not understand.

use std::collections::HashMap;

use strata_core::tuple::TupleSchema;

use crate::event::EventType;

pub trait EventTypeMatcher: Send + Sync {
    fn match_type(&self, event_type: &EventType) -> Option<TupleSchema>;
}

impl<F> EventTypeMatcher for F
where
    F: Fn(&EventType) -> Option<TupleSchema> + Send + Sync,
{
    fn match_type(&self, event_type: &EventType) -> Option<TupleSchema> {
        self(event_type)
    }
}

/// A matcher backed by a registration map, built once at startup.
#[derive(Debug, Default, Clone)]
pub struct MapEventTypeMatcher {
    schemas: HashMap<EventType, TupleSchema>,
}

impl MapEventTypeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(entries: impl IntoIterator<Item = (EventType, TupleSchema)>) -> Self {
        Self {
            schemas: entries.into_iter().collect(),
        }
    }

    pub fn register(mut self, event_type: EventType, schema: TupleSchema) -> Self {
        self.schemas.insert(event_type, schema);
        self
    }

    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.schemas.keys()
    }
}

impl EventTypeMatcher for MapEventTypeMatcher {
    fn match_type(&self, event_type: &EventType) -> Option<TupleSchema> {
        self.schemas.get(event_type).cloned()
    }
}
