//! Record instances and their wire encoding.

use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::types::ItemId;
use crate::value::{Reference, Value};
use itemdb_codec::DataStream;
use std::fmt;
use std::sync::Arc;

/// One instance of a record type: a value per declared attribute.
///
/// Records are only handed out after construction succeeded and the
/// schema's validation hook accepted them.
///
/// # Example
///
/// ```
/// use itemdb_core::{Attribute, Record, Schema};
///
/// let schema = Schema::builder("Participant")
///     .attribute(Attribute::string("name", "Participant name"))
///     .build()
///     .unwrap();
///
/// let peter = Record::build(&schema, [("name", "Peter")]).unwrap();
/// assert_eq!(peter.id(), -1);
/// assert_eq!(peter.get_str("name"), Some("Peter"));
/// ```
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record holding every attribute's default.
    pub fn new(schema: &Arc<Schema>) -> CoreResult<Self> {
        Self::build(schema, std::iter::empty::<(&str, Value)>())
    }

    /// Creates a record from named values, filling the rest with defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error if more values than attributes are given,
    /// a name is not declared, a value has the wrong type, or the schema's
    /// validation hook rejects the result.
    pub fn build<I, K, V>(schema: &Arc<Schema>, values: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let given: Vec<(K, Value)> = values.into_iter().map(|(k, v)| (k, v.into())).collect();
        if given.len() > schema.len() {
            return Err(CoreError::validation(format!(
                "too many arguments for {}: {} given, {} declared",
                schema.name(),
                given.len(),
                schema.len()
            )));
        }

        let mut record = Self {
            schema: Arc::clone(schema),
            values: schema.attributes().iter().map(|a| a.default().clone()).collect(),
        };
        for (name, value) in given {
            record.set(name.as_ref(), value)?;
        }
        schema.validate(&record)?;
        Ok(record)
    }

    /// The record type.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The item id, or the sentinel if not yet persisted.
    #[must_use]
    pub fn id(&self) -> ItemId {
        match self.values[self.schema.id_index()] {
            Value::Int32(id) => id,
            // `set` and decoding keep the id attribute an Int32
            _ => crate::types::UNASSIGNED_ID,
        }
    }

    /// Replaces the item id.
    pub fn set_id(&mut self, id: ItemId) {
        let index = self.schema.id_index();
        self.values[index] = Value::Int32(id);
    }

    /// Returns a copy with the given id.
    #[must_use]
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.set_id(id);
        self
    }

    /// Values in canonical attribute order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a canonical position.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Assembles a record from values in canonical order and validates it.
    pub(crate) fn from_values(schema: &Arc<Schema>, values: Vec<Value>) -> CoreResult<Self> {
        if values.len() != schema.len() {
            return Err(CoreError::validation(format!(
                "{} expects {} values, got {}",
                schema.name(),
                schema.len(),
                values.len()
            )));
        }
        let record = Self {
            schema: Arc::clone(schema),
            values,
        };
        schema.validate(&record)?;
        Ok(record)
    }

    pub(crate) fn value_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    /// Value of the named attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// String value of the named attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer value of the named attribute, widened to `i64`.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Boolean value of the named attribute.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Reference value of the named attribute.
    #[must_use]
    pub fn get_reference(&self, name: &str) -> Option<&Reference> {
        self.get(name).and_then(Value::as_reference)
    }

    /// Sets the named attribute.
    ///
    /// # Errors
    ///
    /// Fails if the attribute is not declared or the value has the wrong type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        let index = self.schema.index_of(name).ok_or_else(|| {
            CoreError::validation(format!("no such argument for {}: {name}", self.schema.name()))
        })?;
        let value = value.into();
        let kind = self.schema.attributes()[index].kind();
        if !kind.accepts(&value) {
            return Err(CoreError::validation(format!(
                "{}.{name} is {kind}, got {}",
                self.schema.name(),
                value.type_name()
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Writes every attribute in canonical order.
    pub fn encode(&self, stream: &mut DataStream) -> CoreResult<()> {
        for (attribute, value) in self.schema.attributes().iter().zip(&self.values) {
            value.encode(attribute.kind(), stream)?;
        }
        Ok(())
    }

    /// Encodes into a fresh byte vector.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut stream = DataStream::new();
        self.encode(&mut stream)?;
        Ok(stream.as_slice().to_vec())
    }

    /// Reads a record of type `schema` and runs its validation hook.
    pub fn decode(schema: &Arc<Schema>, stream: &mut DataStream) -> CoreResult<Self> {
        let values = schema
            .attributes()
            .iter()
            .map(|a| Value::decode(a.kind(), stream))
            .collect::<CoreResult<Vec<_>>>()?;
        let record = Self {
            schema: Arc::clone(schema),
            values,
        };
        schema.validate(&record)?;
        Ok(record)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.schema, &other.schema) || self.schema.table() == other.schema.table())
            && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.schema.name());
        for (attribute, value) in self.schema.attributes().iter().zip(&self.values) {
            s.field(attribute.name(), value);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use chrono::NaiveDate;

    fn participant() -> Arc<Schema> {
        Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .unwrap()
    }

    fn everything() -> Arc<Schema> {
        let when = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Schema::builder("Everything")
            .attribute(Attribute::int8("a_i8", 1))
            .attribute(Attribute::int16("a_i16", 2))
            .attribute(Attribute::int32("a_i32", 3))
            .attribute(Attribute::int64("a_i64", 4))
            .attribute(Attribute::uint16("a_u16", 5))
            .attribute(Attribute::boolean("a_bool", true))
            .attribute(Attribute::float32("a_f32", 1.5))
            .attribute(Attribute::float64("a_f64", 2.5))
            .attribute(Attribute::string("a_str", "x"))
            .attribute(Attribute::blob("a_blob", vec![1, 2]))
            .attribute(Attribute::date_time("a_dt", when))
            .attribute(Attribute::reference_to("a_ref", "everythings"))
            .build()
            .unwrap()
    }

    #[test]
    fn default_construction_uses_defaults() {
        let schema = everything();
        let record = Record::new(&schema).unwrap();
        for (attribute, value) in schema.attributes().iter().zip(record.values()) {
            assert_eq!(value, attribute.default(), "{}", attribute.name());
        }
        assert_eq!(record.id(), -1);
    }

    #[test]
    fn unknown_argument_rejected() {
        let err = Record::build(&participant(), [("nmae", "Peter")]).unwrap_err();
        assert!(err.to_string().contains("no such argument"));
    }

    #[test]
    fn too_many_arguments_rejected() {
        let err = Record::build(
            &participant(),
            [("name", "a"), ("name", "b"), ("name", "c")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("too many arguments"));
    }

    #[test]
    fn wrong_type_rejected() {
        let err = Record::build(&participant(), [("name", 5i16)]).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn validator_blocks_construction() {
        let schema = Schema::builder("Positive")
            .attribute(Attribute::int32("n", 1))
            .validator(|r| match r.get_i64("n") {
                Some(n) if n > 0 => Ok(()),
                _ => Err(CoreError::validation("n must be positive")),
            })
            .build()
            .unwrap();

        assert!(Record::new(&schema).is_ok());
        assert!(Record::build(&schema, [("n", 0i32)]).is_err());
    }

    #[test]
    fn equality_compares_all_attributes() {
        let schema = participant();
        let a = Record::build(&schema, [("name", "Peter")]).unwrap();
        let b = Record::build(&schema, [("name", "Peter")]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_id(3));
    }

    #[test]
    fn wire_layout_follows_canonical_order() {
        let record = Record::build(&participant(), [("name", "Al")])
            .unwrap()
            .with_id(2);
        // id (int32) sorts before name (string)
        assert_eq!(record.to_bytes().unwrap(), [0, 0, 0, 2, 0, 2, b'A', b'l']);
    }

    #[test]
    fn encode_decode_every_kind() {
        let schema = everything();
        let mut record = Record::new(&schema).unwrap().with_id(12);
        record.set("a_i16", i16::MIN).unwrap();
        record.set("a_str", "").unwrap();
        record.set("a_ref", Reference::Id(4)).unwrap();

        let mut stream = DataStream::new();
        record.encode(&mut stream).unwrap();
        let decoded = Record::decode(&schema, &mut stream).unwrap();

        assert_eq!(decoded, record);
        assert!(stream.is_empty());
    }

    #[test]
    fn truncated_input_fails() {
        let schema = participant();
        let bytes = Record::build(&schema, [("name", "Peter")])
            .unwrap()
            .to_bytes()
            .unwrap();
        let mut stream = DataStream::from_slice(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            Record::decode(&schema, &mut stream),
            Err(CoreError::Codec(_))
        ));
    }

    #[test]
    fn debug_shows_type_and_fields() {
        let record = Record::build(&participant(), [("name", "Peter")]).unwrap();
        let text = format!("{record:?}");
        assert!(text.starts_with("Participant"));
        assert!(text.contains("Peter"));
    }
}
