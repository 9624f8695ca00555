//! The event side of the event-sourcing kernel.
//!
//! The data model ([`event`]), schema matching ([`matching`]), causal
//! ordering ([`ordering`]), sourcing and caching ([`sourcing`]), replay and
//! rehydration ([`replay`]), the batching/bus/log pipeline ([`batching`],
//! [`bus`], [`logging`]), the store contract with its in-memory reference
//! implementation ([`storage`]), the aggregate catalogue ([`catalogue`]),
//! and the JSON wire codec ([`json`]).
//!
//! Data flows: a producer opens a batch on a [`bus::EventBus`], accepted
//! events are flushed as one unit to a [`logging::EventLog`] which assigns
//! processing ids and persists through an [`storage::EventPersister`].
//! Reconstruction runs the other way: a [`storage::EventRetriever`] feeds
//! a [`sourcing::EventSource`], and [`replay::EventReplayer`] plus
//! [`ordering::CausalOrdering`] fold the history back into state.

pub mod batching;
pub mod bus;
pub mod catalogue;
pub mod event;
pub mod json;
pub mod logging;
pub mod matching;
pub mod ordering;
pub mod replay;
pub mod sourcing;
pub mod storage;

pub use batching::{EventBatch, EventBatchFilter, SubBatchingEventBatch};
pub use bus::{AsyncEventBus, EventBus, EventBusExt, LoggingEventBus, ProcessingEventBus};
pub use catalogue::{AggregateCatalogue, InMemoryAggregateCatalogue, update_catalogue};
pub use event::{Characteristics, Event, EventIdentity, EventMetadata, EventType};
pub use json::{JsonCodecError, from_json, to_json};
pub use logging::{DeduplicatingFilter, EventLog, EventLogFilter, FilteredEventLog, PersistingEventLog};
pub use matching::{EventTypeMatcher, MapEventTypeMatcher};
pub use ordering::CausalOrdering;
pub use replay::{EventReplayer, StateBuilder};
pub use sourcing::{CachedEventSource, CachingEventSource, EventCache, EventSource};
pub use storage::{EventPersister, EventRetriever, EventStoreError, InMemoryEventStore};
