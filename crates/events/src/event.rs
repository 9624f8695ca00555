//! The event data model: characteristics, types, identity, metadata and the
//! event value itself.
//!
//! Events are immutable value objects. "Marking" an event as processed
//! produces a new copy carrying the processing id; nothing in a history is
//! ever mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::timeuuid;
use strata_core::tuple::Tuple;
use strata_core::{AggregateId, StreamTimestamp, VersionedName};
use uuid::Uuid;

/// Behavioural flags of an event type, accumulated with bitwise OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Characteristics(u32);

impl Characteristics {
    pub const NONE: Characteristics = Characteristics(0);

    /// The event creates its aggregate.
    pub const IS_INITIAL: Characteristics = Characteristics(1);

    /// The event ends its aggregate's lifecycle.
    pub const IS_TERMINAL: Characteristics = Characteristics(2);

    pub const fn of(flags: &[Characteristics]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < flags.len() {
            bits |= flags[i].0;
            i += 1;
        }
        Characteristics(bits)
    }

    pub const fn with(self, other: Characteristics) -> Self {
        Characteristics(self.0 | other.0)
    }

    pub const fn contains(self, other: Characteristics) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Characteristics(bits)
    }
}

/// The type of an event: which aggregate type it belongs to, its versioned
/// name, and its characteristics.
///
/// Equality and hashing consider only the aggregate type and name. The
/// characteristics describe behaviour of the type, not identity, so an
/// event decoded from the wire matches its registered type even if the two
/// sides disagree about flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    aggregate_type: String,
    name: VersionedName,
    characteristics: Characteristics,
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.aggregate_type == other.aggregate_type && self.name == other.name
    }
}

impl Eq for EventType {}

impl core::hash::Hash for EventType {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.aggregate_type.hash(state);
        self.name.hash(state);
    }
}

impl EventType {
    pub fn new(aggregate_type: impl Into<String>, name: VersionedName) -> Self {
        Self::with_characteristics(aggregate_type, name, Characteristics::NONE)
    }

    pub fn with_characteristics(
        aggregate_type: impl Into<String>,
        name: VersionedName,
        characteristics: Characteristics,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            name,
            characteristics,
        }
    }

    /// An event type carrying the initial characteristic.
    pub fn initial(aggregate_type: impl Into<String>, name: VersionedName) -> Self {
        Self::with_characteristics(aggregate_type, name, Characteristics::IS_INITIAL)
    }

    /// An event type carrying the terminal characteristic.
    pub fn terminal(aggregate_type: impl Into<String>, name: VersionedName) -> Self {
        Self::with_characteristics(aggregate_type, name, Characteristics::IS_TERMINAL)
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn name(&self) -> &VersionedName {
        &self.name
    }

    pub fn characteristics(&self) -> Characteristics {
        self.characteristics
    }

    pub fn is_initial(&self) -> bool {
        self.characteristics.contains(Characteristics::IS_INITIAL)
    }

    pub fn is_terminal(&self) -> bool {
        self.characteristics.contains(Characteristics::IS_TERMINAL)
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.name)
    }
}

/// What makes one event occurrence distinct from every other: the aggregate
/// it belongs to and its stream timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    aggregate_id: AggregateId,
    timestamp: StreamTimestamp,
}

impl EventIdentity {
    pub fn new(aggregate_id: AggregateId, timestamp: StreamTimestamp) -> Self {
        Self {
            aggregate_id,
            timestamp,
        }
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn timestamp(&self) -> &StreamTimestamp {
        &self.timestamp
    }
}

impl core::fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.aggregate_id, self.timestamp)
    }
}

/// Everything about an event except its parameters.
///
/// The processing id, when present, must be a time-ordered (version 1
/// layout) uuid: its embedded timestamp is the only "processed at" value
/// the kernel stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    event_type: EventType,
    identity: EventIdentity,
    processing_id: Option<Uuid>,
}

impl EventMetadata {
    pub fn new(event_type: EventType, identity: EventIdentity) -> Self {
        Self {
            event_type,
            identity,
            processing_id: None,
        }
    }

    /// A copy of this metadata carrying the supplied processing id.
    ///
    /// Panics when the id is not time-ordered; that is a caller bug, not a
    /// runtime data condition.
    pub fn processed(&self, processing_id: Uuid) -> Self {
        assert!(
            timeuuid::is_time_ordered(&processing_id),
            "processing id {processing_id} is not a time-ordered uuid"
        );
        Self {
            event_type: self.event_type.clone(),
            identity: self.identity.clone(),
            processing_id: Some(processing_id),
        }
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn identity(&self) -> &EventIdentity {
        &self.identity
    }

    pub fn processing_id(&self) -> Option<Uuid> {
        self.processing_id
    }

    /// The instant at which the event was durably accepted, decoded from
    /// the processing id.
    pub fn processing_time(&self) -> Option<DateTime<Utc>> {
        self.processing_id
            .and_then(|id| timeuuid::instant_of(&id).ok())
    }
}

/// An occurrence in some aggregate's history.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    metadata: EventMetadata,
    parameters: Tuple,
}

impl Event {
    pub fn of(
        event_type: EventType,
        aggregate_id: AggregateId,
        timestamp: StreamTimestamp,
        parameters: Tuple,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(event_type, EventIdentity::new(aggregate_id, timestamp)),
            parameters,
        }
    }

    pub fn from_parts(metadata: EventMetadata, parameters: Tuple) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &Tuple {
        &self.parameters
    }

    pub fn event_type(&self) -> &EventType {
        self.metadata.event_type()
    }

    pub fn identity(&self) -> &EventIdentity {
        self.metadata.identity()
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        self.metadata.identity().aggregate_id()
    }

    pub fn timestamp(&self) -> &StreamTimestamp {
        self.metadata.identity().timestamp()
    }

    pub fn characteristics(&self) -> Characteristics {
        self.metadata.event_type().characteristics()
    }

    pub fn is_initial(&self) -> bool {
        self.metadata.event_type().is_initial()
    }

    pub fn is_terminal(&self) -> bool {
        self.metadata.event_type().is_terminal()
    }

    pub fn processing_id(&self) -> Option<Uuid> {
        self.metadata.processing_id()
    }

    pub fn processing_time(&self) -> Option<DateTime<Utc>> {
        self.metadata.processing_time()
    }

    /// A copy of this event carrying the supplied processing id.
    pub fn processed(&self, processing_id: Uuid) -> Self {
        Self {
            metadata: self.metadata.processed(processing_id),
            parameters: self.parameters.clone(),
        }
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} {}", self.event_type(), self.identity(), self.parameters)
    }
}
