//! Property-based test generators using proptest.
//!
//! Strategies produce schemas, values that type-check against their
//! attribute, whole records, and sequences of container operations.

use chrono::{NaiveDateTime, TimeZone, Utc};
use itemdb_core::{Attribute, AttributeKind, ItemId, Record, Reference, Schema, Value, ID_ATTRIBUTE};
use proptest::prelude::*;
use std::sync::Arc;

/// Table every generated reference attribute points at.
pub const GENERATED_REFERENCE_TABLE: &str = "things";

/// Strategy for valid record type names.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Za-z0-9]{0,15}").expect("type name regex")
}

/// Strategy for whole-second date-times between 1970 and 2100.
pub fn date_time_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..4_102_444_800).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(|t| t.naive_utc())
            .unwrap_or_default()
    })
}

/// Strategy for every attribute kind.
pub fn attribute_kind_strategy() -> impl Strategy<Value = AttributeKind> {
    prop_oneof![
        Just(AttributeKind::Int8),
        Just(AttributeKind::Int16),
        Just(AttributeKind::Int32),
        Just(AttributeKind::Int64),
        Just(AttributeKind::UInt8),
        Just(AttributeKind::UInt16),
        Just(AttributeKind::UInt32),
        Just(AttributeKind::UInt64),
        Just(AttributeKind::Bool),
        Just(AttributeKind::Float32),
        Just(AttributeKind::Float64),
        Just(AttributeKind::String),
        Just(AttributeKind::Blob),
        Just(AttributeKind::DateTime),
        Just(AttributeKind::Reference(GENERATED_REFERENCE_TABLE.to_owned())),
    ]
}

/// Strategy for values accepted by `kind`.
///
/// Floats are finite so generated records compare equal to themselves.
pub fn value_strategy(kind: &AttributeKind) -> BoxedStrategy<Value> {
    match kind {
        AttributeKind::Int8 => any::<i8>().prop_map(Value::Int8).boxed(),
        AttributeKind::Int16 => any::<i16>().prop_map(Value::Int16).boxed(),
        AttributeKind::Int32 => any::<i32>().prop_map(Value::Int32).boxed(),
        AttributeKind::Int64 => any::<i64>().prop_map(Value::Int64).boxed(),
        AttributeKind::UInt8 => any::<u8>().prop_map(Value::UInt8).boxed(),
        AttributeKind::UInt16 => any::<u16>().prop_map(Value::UInt16).boxed(),
        AttributeKind::UInt32 => any::<u32>().prop_map(Value::UInt32).boxed(),
        AttributeKind::UInt64 => any::<u64>().prop_map(Value::UInt64).boxed(),
        AttributeKind::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        AttributeKind::Float32 => (-1.0e6f32..1.0e6).prop_map(Value::Float32).boxed(),
        AttributeKind::Float64 => (-1.0e12f64..1.0e12).prop_map(Value::Float64).boxed(),
        AttributeKind::String => ".{0,40}".prop_map(Value::String).boxed(),
        AttributeKind::Blob => prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Blob).boxed(),
        AttributeKind::DateTime => date_time_strategy().prop_map(Value::DateTime).boxed(),
        AttributeKind::Reference(_) => (-1i32..1000)
            .prop_map(|id| Value::Reference(Reference::from_id(id)))
            .boxed(),
    }
}

/// Strategy for schemas with up to `max_attributes` attributes of random
/// kinds, named `a0`, `a1`, ...
pub fn schema_strategy(max_attributes: usize) -> impl Strategy<Value = Arc<Schema>> {
    (
        type_name_strategy(),
        prop::collection::vec(attribute_kind_strategy(), 0..=max_attributes),
    )
        .prop_map(|(name, kinds)| {
            let mut builder = Schema::builder(name);
            for (i, kind) in kinds.into_iter().enumerate() {
                let default = default_for(&kind);
                let attribute = Attribute::new(format!("a{i}"), kind, default).expect("typed default");
                builder = builder.attribute(attribute);
            }
            builder.build().expect("generated schema")
        })
}

fn default_for(kind: &AttributeKind) -> Value {
    match kind {
        AttributeKind::Int8 => Value::Int8(0),
        AttributeKind::Int16 => Value::Int16(0),
        AttributeKind::Int32 => Value::Int32(0),
        AttributeKind::Int64 => Value::Int64(0),
        AttributeKind::UInt8 => Value::UInt8(0),
        AttributeKind::UInt16 => Value::UInt16(0),
        AttributeKind::UInt32 => Value::UInt32(0),
        AttributeKind::UInt64 => Value::UInt64(0),
        AttributeKind::Bool => Value::Bool(false),
        AttributeKind::Float32 => Value::Float32(0.0),
        AttributeKind::Float64 => Value::Float64(0.0),
        AttributeKind::String => Value::String(String::new()),
        AttributeKind::Blob => Value::Blob(Vec::new()),
        AttributeKind::DateTime => Value::DateTime(itemdb_core::epoch()),
        AttributeKind::Reference(_) => Value::Reference(Reference::Unset),
    }
}

/// Strategy for records of `schema` with a non-negative id.
pub fn record_strategy(schema: Arc<Schema>) -> impl Strategy<Value = Record> {
    let values: Vec<_> = schema
        .attributes()
        .iter()
        .filter(|a| a.name() != ID_ATTRIBUTE)
        .map(|a| value_strategy(a.kind()).prop_map({
            let name = a.name().to_owned();
            move |v| (name.clone(), v)
        }))
        .collect();
    (0..10_000i32, values).prop_map(move |(id, values)| {
        Record::build(&schema, values).expect("generated record").with_id(id)
    })
}

/// One step of a generated container workload.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerOp {
    /// Add an item with the given text.
    Add(String),
    /// Insert an item under an explicit id.
    Insert(ItemId, String),
    /// Overwrite an item.
    Set(ItemId, String),
    /// Remove an item.
    Remove(ItemId),
    /// Remove every item.
    Clear,
}

/// Strategy for single container operations over ids `0..max_id`.
pub fn container_op_strategy(max_id: ItemId) -> impl Strategy<Value = ContainerOp> {
    let text = || "[a-z]{0,8}";
    prop_oneof![
        4 => text().prop_map(ContainerOp::Add),
        2 => (0..max_id, text()).prop_map(|(id, t)| ContainerOp::Insert(id, t)),
        2 => (0..max_id, text()).prop_map(|(id, t)| ContainerOp::Set(id, t)),
        2 => (0..max_id).prop_map(ContainerOp::Remove),
        1 => Just(ContainerOp::Clear),
    ]
}

/// Strategy for operation sequences.
pub fn container_ops_strategy(max_id: ItemId, max_len: usize) -> impl Strategy<Value = Vec<ContainerOp>> {
    prop::collection::vec(container_op_strategy(max_id), 0..max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// A configuration for slow properties, such as ones touching disk.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemdb_codec::DataStream;

    proptest! {
        #[test]
        fn generated_values_type_check(
            (kind, value) in attribute_kind_strategy()
                .prop_flat_map(|kind| (Just(kind.clone()), value_strategy(&kind)))
        ) {
            prop_assert!(kind.accepts(&value));
        }

        #[test]
        fn records_survive_the_codec(
            (schema, record) in schema_strategy(8)
                .prop_flat_map(|schema| (Just(schema.clone()), record_strategy(schema)))
        ) {
            let mut stream = DataStream::new();
            record.encode(&mut stream).unwrap();
            let decoded = Record::decode(&schema, &mut stream).unwrap();
            prop_assert!(stream.is_empty());
            prop_assert_eq!(decoded, record);
        }

        #[test]
        fn type_names_make_valid_tables(name in type_name_strategy()) {
            let schema = Schema::builder(name.clone()).build().unwrap();
            prop_assert_eq!(schema.table(), format!("{}s", name.to_lowercase()));
        }
    }
}
