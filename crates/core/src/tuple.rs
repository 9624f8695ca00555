//! Runtime-typed named-record containers for event and command parameters.
//!
//! A [`TupleSchema`] names and types an ordered set of slots; a [`Tuple`] is
//! a validated record conforming to one schema. Schemas are built once per
//! event/command type and shared; tuples are built per occurrence and never
//! mutated. Validation reports **every** violating slot in one error rather
//! than failing on the first.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TupleError {
    #[error("slot names are not unique in schema '{0}'")]
    DuplicateSlotNames(String),

    #[error("expected {expected} values, but received {received}")]
    Arity { expected: usize, received: usize },

    /// One combined message enumerating every violating slot.
    #[error("type mismatches: {0}")]
    TypeMismatch(String),

    #[error("schema '{schema}' has no slot named '{slot}'")]
    UnknownSlot { schema: String, slot: String },

    #[error("expected keys [{expected}], but were [{received}]")]
    KeyMismatch { expected: String, received: String },

    #[error("keys [{keys}] do not all belong to schema '{schema}'")]
    ForeignKeys { schema: String, keys: String },

    #[error("not all slots of schema '{schema}' are filled by keys [{keys}]")]
    UnfilledSlots { schema: String, keys: String },

    #[error("failed to deserialize slot '{slot}': {message}")]
    Deserialize { slot: String, message: String },
}

/// Runtime type descriptor for one tuple slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotType {
    String,
    Integer,
    Float,
    Boolean,
    /// Epoch milliseconds.
    Timestamp,
    Uuid,
    /// Accepts any JSON value.
    Json,
    Optional(Box<SlotType>),
    List(Box<SlotType>),
    /// String-keyed map with uniformly-typed values.
    Map(Box<SlotType>),
}

impl SlotType {
    pub fn optional(inner: SlotType) -> Self {
        SlotType::Optional(Box::new(inner))
    }

    pub fn list_of(element: SlotType) -> Self {
        SlotType::List(Box::new(element))
    }

    pub fn map_of(value: SlotType) -> Self {
        SlotType::Map(Box::new(value))
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SlotType::String => value.is_string(),
            SlotType::Integer => value.is_i64() || value.is_u64(),
            SlotType::Float => value.is_number(),
            SlotType::Boolean => value.is_boolean(),
            SlotType::Timestamp => value.is_i64() || value.is_u64(),
            SlotType::Uuid => value.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()),
            SlotType::Json => true,
            SlotType::Optional(inner) => value.is_null() || inner.accepts(value),
            SlotType::List(element) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| element.accepts(item))),
            SlotType::Map(value_type) => value
                .as_object()
                .is_some_and(|entries| entries.values().all(|v| value_type.accepts(v))),
        }
    }
}

impl core::fmt::Display for SlotType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SlotType::String => write!(f, "string"),
            SlotType::Integer => write!(f, "integer"),
            SlotType::Float => write!(f, "float"),
            SlotType::Boolean => write!(f, "boolean"),
            SlotType::Timestamp => write!(f, "timestamp"),
            SlotType::Uuid => write!(f, "uuid"),
            SlotType::Json => write!(f, "json"),
            SlotType::Optional(inner) => write!(f, "optional<{inner}>"),
            SlotType::List(element) => write!(f, "list<{element}>"),
            SlotType::Map(value) => write!(f, "map<{value}>"),
        }
    }
}

/// A named, typed slot within a [`TupleSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleSlot {
    name: String,
    slot_type: SlotType,
}

impl TupleSlot {
    pub fn new(name: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            name: name.into(),
            slot_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_type(&self) -> &SlotType {
        &self.slot_type
    }
}

impl core::fmt::Display for TupleSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.name, self.slot_type)
    }
}

static SCHEMA_IDS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct SchemaInner {
    id: u64,
    name: String,
    slots: Vec<TupleSlot>,
    index: HashMap<String, usize>,
}

/// An ordered collection of [`TupleSlot`]s defining what may be stored in a
/// conforming [`Tuple`].
///
/// Cloning is cheap (the definition lives behind an `Arc`), so a schema is
/// built once per event/command type and handed around freely. Every schema
/// instance carries a process-unique id; [`TupleKey`]s minted by a schema
/// are usable only against clones of that instance.
#[derive(Debug, Clone)]
pub struct TupleSchema {
    inner: Arc<SchemaInner>,
}

impl PartialEq for TupleSchema {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name && self.inner.slots == other.inner.slots
    }
}

impl Eq for TupleSchema {}

impl TupleSchema {
    /// Create a schema with the supplied slots, rejecting duplicate names.
    pub fn new(name: impl Into<String>, slots: Vec<TupleSlot>) -> Result<TupleSchema, TupleError> {
        let name = name.into();
        let mut index = HashMap::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            if index.insert(slot.name.clone(), i).is_some() {
                return Err(TupleError::DuplicateSlotNames(name));
            }
        }

        Ok(TupleSchema {
            inner: Arc::new(SchemaInner {
                id: SCHEMA_IDS.fetch_add(1, Ordering::Relaxed),
                name,
                slots,
                index,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn slots(&self) -> &[TupleSlot] {
        &self.inner.slots
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.inner.slots.iter().map(|slot| slot.name.as_str())
    }

    /// Make a tuple of the supplied positional values, validating arity and
    /// every slot type.
    pub fn make(&self, values: Vec<Value>) -> Result<Tuple, TupleError> {
        if values.len() != self.inner.slots.len() {
            return Err(TupleError::Arity {
                expected: self.inner.slots.len(),
                received: values.len(),
            });
        }

        let mismatches: Vec<String> = self
            .inner
            .slots
            .iter()
            .zip(values.iter())
            .filter(|(slot, value)| !slot.slot_type.accepts(value))
            .map(|(slot, value)| format!("slot ({slot}) does not accept value <{value}>"))
            .collect();
        if !mismatches.is_empty() {
            return Err(TupleError::TypeMismatch(mismatches.join(", ")));
        }

        Ok(Tuple {
            schema: self.clone(),
            values,
        })
    }

    /// Create a tuple from a map of name/value pairs.
    ///
    /// The map's key set must exactly equal the schema's slot-name set;
    /// extra or missing keys are rejected, never silently ignored.
    pub fn make_from_map(&self, values: BTreeMap<String, Value>) -> Result<Tuple, TupleError> {
        self.check_matching_keys(values.keys().map(String::as_str))?;

        let mut positional = vec![Value::Null; self.inner.slots.len()];
        for (name, value) in values {
            positional[self.inner.index[&name]] = value;
        }
        self.make(positional)
    }

    /// Build a tuple from key/value pairs, validating that every key
    /// belongs to this schema and that every slot is filled.
    pub fn make_with(&self, key_values: Vec<TupleKeyValue>) -> Result<Tuple, TupleError> {
        let key_names = || {
            key_values
                .iter()
                .map(|kv| kv.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        if key_values.iter().any(|kv| kv.schema_id != self.inner.id) {
            return Err(TupleError::ForeignKeys {
                schema: self.inner.name.clone(),
                keys: key_names(),
            });
        }

        let mut filled = vec![false; self.inner.slots.len()];
        for kv in &key_values {
            filled[kv.index] = true;
        }
        if !filled.iter().all(|f| *f) {
            return Err(TupleError::UnfilledSlots {
                schema: self.inner.name.clone(),
                keys: key_names(),
            });
        }

        let mut positional = vec![Value::Null; self.inner.slots.len()];
        for kv in key_values {
            positional[kv.index] = kv.value;
        }
        self.make(positional)
    }

    /// Create a tuple out of a map of serialized values, using the supplied
    /// per-slot deserializer. The map's key set must exactly equal the
    /// schema's slot-name set.
    pub fn deserialize<V>(
        &self,
        deserializer: impl Fn(&V, &SlotType) -> Result<Value, String>,
        values: &BTreeMap<String, V>,
    ) -> Result<Tuple, TupleError> {
        self.check_matching_keys(values.keys().map(String::as_str))?;

        let mut positional = Vec::with_capacity(self.inner.slots.len());
        for slot in &self.inner.slots {
            let raw = &values[&slot.name];
            let value =
                deserializer(raw, &slot.slot_type).map_err(|message| TupleError::Deserialize {
                    slot: slot.name.clone(),
                    message,
                })?;
            positional.push(value);
        }

        self.make(positional)
    }

    /// Mint a key for O(1) typed access to the named slot, bound to this
    /// schema instance.
    pub fn key<T: DeserializeOwned>(&self, name: &str) -> Result<TupleKey<T>, TupleError> {
        let index = *self
            .inner
            .index
            .get(name)
            .ok_or_else(|| TupleError::UnknownSlot {
                schema: self.inner.name.clone(),
                slot: name.to_string(),
            })?;

        Ok(TupleKey {
            schema_id: self.inner.id,
            schema_name: self.inner.name.clone(),
            name: name.to_string(),
            index,
            _marker: PhantomData,
        })
    }

    fn check_matching_keys<'a>(
        &self,
        keys: impl Iterator<Item = &'a str>,
    ) -> Result<(), TupleError> {
        let mut received: Vec<&str> = keys.collect();
        received.sort_unstable();
        let mut expected: Vec<&str> = self.slot_names().collect();
        expected.sort_unstable();

        if received != expected {
            return Err(TupleError::KeyMismatch {
                expected: expected.join(", "),
                received: received.join(", "),
            });
        }
        Ok(())
    }
}

impl core::fmt::Display for TupleSchema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let slots = self
            .inner
            .slots
            .iter()
            .map(TupleSlot::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}{{{slots}}}", self.inner.name)
    }
}

/// A key that retrieves a value directly from a tuple, bypassing name
/// lookup, in a typed way.
///
/// Keys are only usable against the schema instance that minted them; using
/// one against a different schema is a programmer error and panics.
#[derive(Debug, Clone)]
pub struct TupleKey<T> {
    schema_id: u64,
    schema_name: String,
    name: String,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TupleKey<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Serialize> TupleKey<T> {
    /// Pair this key with a value, for building a tuple from key/value
    /// pairs.
    pub fn of(&self, value: T) -> TupleKeyValue {
        TupleKeyValue {
            schema_id: self.schema_id,
            name: self.name.clone(),
            index: self.index,
            value: serde_json::to_value(value).expect("tuple key values serialize to json"),
        }
    }
}

/// A ([`TupleKey`], value) pair used to build tuples.
#[derive(Debug, Clone)]
pub struct TupleKeyValue {
    schema_id: u64,
    name: String,
    index: usize,
    value: Value,
}

/// An immutable record of named, typed values conforming to a
/// [`TupleSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    schema: TupleSchema,
    values: Vec<Value>,
}

impl Tuple {
    pub fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    /// Get the value in the slot with the supplied name.
    pub fn get(&self, name: &str) -> Result<&Value, TupleError> {
        let index = self
            .schema
            .inner
            .index
            .get(name)
            .ok_or_else(|| TupleError::UnknownSlot {
                schema: self.schema.inner.name.clone(),
                slot: name.to_string(),
            })?;
        Ok(&self.values[*index])
    }

    /// Get the value in the slot referenced by the supplied key.
    ///
    /// Panics if the key was minted by a different schema, or if the stored
    /// value does not convert to `T`; both indicate caller bugs rather than
    /// runtime data conditions.
    pub fn get_key<T: DeserializeOwned>(&self, key: &TupleKey<T>) -> T {
        assert!(
            key.schema_id == self.schema.inner.id,
            "key '{}' of schema '{}' used against schema '{}'",
            key.name,
            key.schema_name,
            self.schema.inner.name
        );

        serde_json::from_value(self.values[key.index].clone()).unwrap_or_else(|e| {
            panic!(
                "slot '{}' of schema '{}' does not convert to the key's type: {e}",
                key.name, self.schema.inner.name
            )
        })
    }

    /// Serialize the tuple into a name-keyed map using the supplied
    /// per-value serializer.
    pub fn serialize<V>(&self, serializer: impl Fn(&Value) -> V) -> BTreeMap<String, V> {
        self.schema
            .inner
            .slots
            .iter()
            .zip(self.values.iter())
            .map(|(slot, value)| (slot.name.clone(), serializer(value)))
            .collect()
    }

    /// The contents of the tuple as a name-keyed map.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.serialize(Value::clone)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl core::fmt::Display for Tuple {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let body = self
            .schema
            .inner
            .slots
            .iter()
            .zip(self.values.iter())
            .map(|(slot, value)| format!("{}={}", slot.name, value))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}{{{body}}}", self.schema.inner.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn person_schema() -> TupleSchema {
        TupleSchema::new(
            "person",
            vec![
                TupleSlot::new("name", SlotType::String),
                TupleSlot::new("age", SlotType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_slot_names() {
        let result = TupleSchema::new(
            "broken",
            vec![
                TupleSlot::new("a", SlotType::String),
                TupleSlot::new("a", SlotType::Integer),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            TupleError::DuplicateSlotNames("broken".to_string())
        );
    }

    #[test]
    fn make_and_get_by_name() {
        let schema = person_schema();
        let tuple = schema.make(vec![json!("Arthur"), json!(42)]).unwrap();

        assert_eq!(tuple.get("name").unwrap(), &json!("Arthur"));
        assert_eq!(tuple.get("age").unwrap(), &json!(42));
    }

    #[test]
    fn reports_wrong_arity() {
        let schema = person_schema();
        assert_eq!(
            schema.make(vec![json!("Arthur")]).unwrap_err(),
            TupleError::Arity {
                expected: 2,
                received: 1
            }
        );
    }

    #[test]
    fn reports_every_mismatching_slot_in_one_error() {
        let schema = person_schema();
        let err = schema
            .make(vec![json!(1), json!("not a number")])
            .unwrap_err();

        match err {
            TupleError::TypeMismatch(message) => {
                assert!(message.contains("name"), "missing first slot: {message}");
                assert!(message.contains("age"), "missing second slot: {message}");
            }
            other => panic!("expected a combined type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn map_construction_requires_exact_key_set() {
        let schema = person_schema();

        let mut missing = BTreeMap::new();
        missing.insert("name".to_string(), json!("Arthur"));
        assert!(matches!(
            schema.make_from_map(missing).unwrap_err(),
            TupleError::KeyMismatch { .. }
        ));

        let mut extra = BTreeMap::new();
        extra.insert("name".to_string(), json!("Arthur"));
        extra.insert("age".to_string(), json!(42));
        extra.insert("shoe_size".to_string(), json!(9));
        assert!(matches!(
            schema.make_from_map(extra).unwrap_err(),
            TupleError::KeyMismatch { .. }
        ));
    }

    #[test]
    fn map_round_trip_preserves_the_tuple() {
        let schema = person_schema();
        let tuple = schema.make(vec![json!("Arthur"), json!(42)]).unwrap();

        let rebuilt = schema.make_from_map(tuple.to_map()).unwrap();
        assert_eq!(rebuilt, tuple);
    }

    #[test]
    fn key_access_bypasses_name_lookup() {
        let schema = person_schema();
        let name_key: TupleKey<String> = schema.key("name").unwrap();
        let age_key: TupleKey<i64> = schema.key("age").unwrap();

        let tuple = schema.make(vec![json!("Arthur"), json!(42)]).unwrap();
        assert_eq!(tuple.get_key(&name_key), "Arthur");
        assert_eq!(tuple.get_key(&age_key), 42);
    }

    #[test]
    fn builds_from_key_value_pairs() {
        let schema = person_schema();
        let name_key: TupleKey<String> = schema.key("name").unwrap();
        let age_key: TupleKey<i64> = schema.key("age").unwrap();

        let tuple = schema
            .make_with(vec![age_key.of(42), name_key.of("Arthur".to_string())])
            .unwrap();
        assert_eq!(tuple.get("name").unwrap(), &json!("Arthur"));
    }

    #[test]
    fn key_value_construction_requires_all_slots() {
        let schema = person_schema();
        let name_key: TupleKey<String> = schema.key("name").unwrap();

        assert!(matches!(
            schema
                .make_with(vec![name_key.of("Arthur".to_string())])
                .unwrap_err(),
            TupleError::UnfilledSlots { .. }
        ));
    }

    #[test]
    #[should_panic(expected = "used against schema")]
    fn foreign_key_use_is_a_contract_violation() {
        let schema = person_schema();
        let other = person_schema(); // structurally equal, different instance
        let foreign_key: TupleKey<String> = other.key("name").unwrap();

        let tuple = schema.make(vec![json!("Arthur"), json!(42)]).unwrap();
        let _ = tuple.get_key(&foreign_key);
    }

    #[test]
    fn optional_and_list_slots_validate_elements() {
        let schema = TupleSchema::new(
            "prefs",
            vec![
                TupleSlot::new("nickname", SlotType::optional(SlotType::String)),
                TupleSlot::new("scores", SlotType::list_of(SlotType::Integer)),
            ],
        )
        .unwrap();

        assert!(schema.make(vec![json!(null), json!([1, 2, 3])]).is_ok());
        assert!(schema.make(vec![json!("np"), json!([1, "two"])]).is_err());
    }

    #[test]
    fn map_slots_validate_their_values() {
        let schema = TupleSchema::new(
            "labels",
            vec![TupleSlot::new("tags", SlotType::map_of(SlotType::String))],
        )
        .unwrap();

        assert!(schema.make(vec![json!({"env": "prod"})]).is_ok());
        assert!(schema.make(vec![json!({"env": 1})]).is_err());
        assert!(schema.make(vec![json!(["env"])]).is_err());
    }

    #[test]
    fn serialize_and_deserialize_are_inverse() {
        let schema = person_schema();
        let tuple = schema.make(vec![json!("Arthur"), json!(42)]).unwrap();

        let wire: BTreeMap<String, String> =
            tuple.serialize(|value| serde_json::to_string(value).unwrap());
        let rebuilt = schema
            .deserialize(
                |raw: &String, _| serde_json::from_str(raw).map_err(|e| e.to_string()),
                &wire,
            )
            .unwrap();

        assert_eq!(rebuilt, tuple);
    }

    proptest! {
        #[test]
        fn any_valid_person_round_trips_through_a_map(name in ".*", age in any::<i64>()) {
            let schema = person_schema();
            let tuple = schema.make(vec![json!(name), json!(age)]).unwrap();
            let rebuilt = schema.make_from_map(tuple.to_map()).unwrap();
            prop_assert_eq!(rebuilt, tuple);
        }
    }
}
