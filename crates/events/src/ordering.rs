//! Causal ordering of heterogeneous event types.
//!
//! Replay needs a total order over events whose types differ: which event
//! counts as "the" initial event, and in what order updates fold into
//! state. The order is derived from per-type integer ranks with a
//! timestamp tie-break, so declared happens-first/last hints win over
//! wall-clock order.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::event::{Event, EventType};

/// Rank of event types carrying the initial characteristic.
const INITIAL_RANK: i32 = i32::MIN;

/// Rank of event types carrying the terminal characteristic.
const TERMINAL_RANK: i32 = i32::MAX;

/// Default rank of unranked, uncharacterised types: just before any
/// terminal event.
const PRE_TERMINAL_RANK: i32 = i32::MAX - 1;

/// A comparator over events of possibly-different types.
///
/// Explicitly registered ranks take precedence; otherwise initial types
/// rank first, terminal types last, and everything else just before
/// terminal. Ties within a rank break by stream timestamp.
#[derive(Debug, Default, Clone)]
pub struct CausalOrdering {
    ranks: HashMap<EventType, i32>,
}

impl CausalOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranking(entries: impl IntoIterator<Item = (EventType, i32)>) -> Self {
        Self {
            ranks: entries.into_iter().collect(),
        }
    }

    /// Register an explicit rank for an event type.
    pub fn ranked(mut self, event_type: EventType, rank: i32) -> Self {
        self.ranks.insert(event_type, rank);
        self
    }

    pub fn rank_of(&self, event: &Event) -> i32 {
        if let Some(rank) = self.ranks.get(event.event_type()) {
            return *rank;
        }
        if event.is_initial() {
            INITIAL_RANK
        } else if event.is_terminal() {
            TERMINAL_RANK
        } else {
            PRE_TERMINAL_RANK
        }
    }

    pub fn compare(&self, left: &Event, right: &Event) -> Ordering {
        self.rank_of(left)
            .cmp(&self.rank_of(right))
            .then_with(|| left.timestamp().cmp(right.timestamp()))
    }
}
