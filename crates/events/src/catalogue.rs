//! Tracking which aggregates of each type currently exist.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use crate::event::Event;

/// A registry of live aggregate ids per aggregate type.
///
/// Backends that shard (e.g. a wide-column store) conventionally bucket
/// rows by `abs(hash(id)) % bucket_count` purely to bound partition width;
/// the bucket count is a deployment-time constant and changing it requires
/// rewriting the catalogue data.
pub trait AggregateCatalogue: Send + Sync {
    fn add(&self, aggregate_type: &str, id: &str);
    fn remove(&self, aggregate_type: &str, id: &str);
    fn ids(&self, aggregate_type: &str) -> Vec<String>;
}

/// Apply an event to the catalogue: initial events register their
/// aggregate, terminal events retire it.
pub fn update_catalogue(catalogue: &dyn AggregateCatalogue, event: &Event) {
    let aggregate_id = event.aggregate_id();
    if event.is_initial() {
        debug!(aggregate = %aggregate_id, "aggregate catalogued");
        catalogue.add(aggregate_id.aggregate_type(), aggregate_id.id());
    }
    if event.is_terminal() {
        debug!(aggregate = %aggregate_id, "aggregate retired from catalogue");
        catalogue.remove(aggregate_id.aggregate_type(), aggregate_id.id());
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAggregateCatalogue {
    ids: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryAggregateCatalogue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateCatalogue for InMemoryAggregateCatalogue {
    fn add(&self, aggregate_type: &str, id: &str) {
        if let Ok(mut ids) = self.ids.write() {
            ids.entry(aggregate_type.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn remove(&self, aggregate_type: &str, id: &str) {
        if let Ok(mut ids) = self.ids.write()
            && let Some(of_type) = ids.get_mut(aggregate_type)
        {
            of_type.remove(id);
        }
    }

    fn ids(&self, aggregate_type: &str) -> Vec<String> {
        self.ids
            .read()
            .ok()
            .and_then(|ids| ids.get(aggregate_type).map(|s| s.iter().cloned().collect()))
            .unwrap_or_default()
    }
}
