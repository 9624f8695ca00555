//! Foundation value types for the event-sourcing kernel.
//!
//! This crate contains **pure value types** only: identifiers, stream
//! timestamps and time ranges, time-ordered UUID generation, and the
//! runtime-typed tuple record model. No pipeline or IO concerns live here.

pub mod id;
pub mod time;
pub mod timeuuid;
pub mod tuple;

pub use id::{AggregateId, VersionedName};
pub use time::{StreamTimestamp, TimeRange, TimeRangeBound};
pub use timeuuid::TimeUuidGenerator;
pub use tuple::{SlotType, Tuple, TupleError, TupleKey, TupleSchema, TupleSlot};
