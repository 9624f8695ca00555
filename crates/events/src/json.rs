//! The JSON wire format for events.
//!
//! An encoded event is an object with a `metadata` member carrying
//! identity and type information, and a `parameters` member mapping slot
//! names to JSON values. Decoding needs an
//! [`EventTypeMatcher`](crate::matching::EventTypeMatcher) to recover the
//! schema that interprets the parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use strata_core::timeuuid;
use strata_core::tuple::TupleError;
use strata_core::{AggregateId, StreamTimestamp, VersionedName};

use chrono::TimeZone;

use crate::event::{Characteristics, Event, EventType};
use crate::matching::EventTypeMatcher;

#[derive(Debug, Error)]
pub enum JsonCodecError {
    #[error("malformed event json: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no schema registered for event type '{0}'")]
    UnknownEventType(String),

    #[error("'{0}' is not a valid time-ordered processing id")]
    InvalidProcessingId(String),

    #[error("event timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error(transparent)]
    Parameters(#[from] TupleError),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    aggregate_type: String,
    aggregate_id: String,
    name: String,
    version: String,
    /// Epoch milliseconds.
    event_timestamp: i64,
    stream_id: String,
    /// Empty string when no processing id has been assigned.
    processing_id: String,
    characteristics: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    metadata: WireMetadata,
    parameters: BTreeMap<String, Value>,
}

pub fn to_json(event: &Event) -> Result<String, JsonCodecError> {
    let metadata = WireMetadata {
        aggregate_type: event.aggregate_id().aggregate_type().to_string(),
        aggregate_id: event.aggregate_id().id().to_string(),
        name: event.event_type().name().name().to_string(),
        version: event.event_type().name().version().to_string(),
        event_timestamp: event.timestamp().instant().timestamp_millis(),
        stream_id: event.timestamp().stream_id().to_string(),
        processing_id: event
            .processing_id()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        characteristics: event.characteristics().bits(),
    };

    Ok(serde_json::to_string(&WireEvent {
        metadata,
        parameters: event.parameters().to_map(),
    })?)
}

pub fn from_json(json: &str, matcher: &dyn EventTypeMatcher) -> Result<Event, JsonCodecError> {
    let wire: WireEvent = serde_json::from_str(json)?;
    let metadata = wire.metadata;

    let event_type = EventType::with_characteristics(
        metadata.aggregate_type.clone(),
        VersionedName::with_version(metadata.name, metadata.version),
        Characteristics::from_bits(metadata.characteristics),
    );
    let schema = matcher
        .match_type(&event_type)
        .ok_or_else(|| JsonCodecError::UnknownEventType(event_type.to_string()))?;

    let instant = chrono::Utc
        .timestamp_millis_opt(metadata.event_timestamp)
        .single()
        .ok_or(JsonCodecError::InvalidTimestamp(metadata.event_timestamp))?;
    let event = Event::of(
        event_type,
        AggregateId::new(metadata.aggregate_type, metadata.aggregate_id),
        StreamTimestamp::of(metadata.stream_id, instant),
        schema.make_from_map(wire.parameters)?,
    );

    if metadata.processing_id.is_empty() {
        return Ok(event);
    }
    let processing_id = Uuid::parse_str(&metadata.processing_id)
        .ok()
        .filter(timeuuid::is_time_ordered)
        .ok_or(JsonCodecError::InvalidProcessingId(metadata.processing_id))?;
    Ok(event.processed(processing_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use strata_core::TimeUuidGenerator;
    use strata_core::tuple::{SlotType, TupleSchema, TupleSlot};

    use crate::matching::MapEventTypeMatcher;

    fn schema() -> TupleSchema {
        TupleSchema::new(
            "order_created",
            vec![
                TupleSlot::new("customer", SlotType::String),
                TupleSlot::new("total", SlotType::Integer),
            ],
        )
        .unwrap()
    }

    fn created_type() -> EventType {
        EventType::initial("order", VersionedName::with_version("created", "2"))
    }

    fn matcher() -> MapEventTypeMatcher {
        MapEventTypeMatcher::new().register(created_type(), schema())
    }

    fn sample_event() -> Event {
        Event::of(
            created_type(),
            AggregateId::new("order", "o-1"),
            StreamTimestamp::of("s", Utc.timestamp_millis_opt(1_000).unwrap()),
            schema().make(vec![json!("arthur"), json!(250)]).unwrap(),
        )
    }

    #[test]
    fn encodes_the_documented_member_names() {
        let json: Value = serde_json::from_str(&to_json(&sample_event()).unwrap()).unwrap();
        let metadata = &json["metadata"];

        assert_eq!(metadata["aggregateType"], "order");
        assert_eq!(metadata["aggregateId"], "o-1");
        assert_eq!(metadata["name"], "created");
        assert_eq!(metadata["version"], "2");
        assert_eq!(metadata["eventTimestamp"], 1_000);
        assert_eq!(metadata["streamId"], "s");
        assert_eq!(metadata["processingId"], "");
        assert_eq!(metadata["characteristics"], 1);
        assert_eq!(json["parameters"]["customer"], "arthur");
        assert_eq!(json["parameters"]["total"], 250);
    }

    #[test]
    fn round_trips_through_the_wire_format() {
        let generator = TimeUuidGenerator::new();
        let event = sample_event().processed(generator.next());

        let decoded = from_json(&to_json(&event).unwrap(), &matcher()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.characteristics(), event.characteristics());
    }

    #[test]
    fn decoding_rejects_unregistered_types() {
        let unregistered = MapEventTypeMatcher::new();
        let result = from_json(&to_json(&sample_event()).unwrap(), &unregistered);
        assert!(matches!(result, Err(JsonCodecError::UnknownEventType(_))));
    }

    #[test]
    fn decoding_rejects_a_non_time_ordered_processing_id() {
        let mut json: Value =
            serde_json::from_str(&to_json(&sample_event()).unwrap()).unwrap();
        json["metadata"]["processingId"] = json!(Uuid::now_v7().to_string());

        let result = from_json(&json.to_string(), &matcher());
        assert!(matches!(result, Err(JsonCodecError::InvalidProcessingId(_))));
    }
}
