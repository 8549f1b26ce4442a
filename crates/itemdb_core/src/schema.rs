//! Record type declarations.
//!
//! A [`Schema`] is built once per record type and shared through an `Arc`.
//! Its attributes are sorted by name; that order is the column order for
//! SQL tables and the field order for the wire codec.
//!
//! ```
//! use itemdb_core::{Attribute, Schema};
//!
//! let participant = Schema::builder("Participant")
//!     .attribute(Attribute::string("name", "Participant name"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(participant.table(), "participants");
//! let names: Vec<_> = participant.attributes().iter().map(|a| a.name()).collect();
//! assert_eq!(names, ["id", "name"]);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::types::UNASSIGNED_ID;
use crate::value::{Reference, Value};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the identifier attribute every record type carries.
pub const ID_ATTRIBUTE: &str = "id";

/// Validation hook run on every constructed or decoded record.
pub type Validator = Arc<dyn Fn(&Record) -> CoreResult<()> + Send + Sync>;

/// The type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Boolean.
    Bool,
    /// Single precision float.
    Float32,
    /// Double precision float.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary blob.
    Blob,
    /// Date-time.
    DateTime,
    /// Reference to an item of the record type stored in the named table.
    Reference(String),
}

impl AttributeKind {
    /// Returns true if `value` can be stored in an attribute of this kind.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Int8, Value::Int8(_))
                | (Self::Int16, Value::Int16(_))
                | (Self::Int32, Value::Int32(_))
                | (Self::Int64, Value::Int64(_))
                | (Self::UInt8, Value::UInt8(_))
                | (Self::UInt16, Value::UInt16(_))
                | (Self::UInt32, Value::UInt32(_))
                | (Self::UInt64, Value::UInt64(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Float32, Value::Float32(_))
                | (Self::Float64, Value::Float64(_))
                | (Self::String, Value::String(_))
                | (Self::Blob, Value::Blob(_))
                | (Self::DateTime, Value::DateTime(_))
                | (Self::Reference(_), Value::Reference(_))
        )
    }

    /// Target table of a reference kind.
    #[must_use]
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            Self::Reference(table) => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8 => f.write_str("int8"),
            Self::Int16 => f.write_str("int16"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::UInt8 => f.write_str("uint8"),
            Self::UInt16 => f.write_str("uint16"),
            Self::UInt32 => f.write_str("uint32"),
            Self::UInt64 => f.write_str("uint64"),
            Self::Bool => f.write_str("bool"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::Blob => f.write_str("blob"),
            Self::DateTime => f.write_str("datetime"),
            Self::Reference(table) => write!(f, "reference({table})"),
        }
    }
}

/// A typed field descriptor with a default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    default: Value,
}

impl Attribute {
    /// Creates an attribute, checking that `default` matches `kind`.
    ///
    /// # Errors
    ///
    /// Returns a schema error on a kind mismatch.
    pub fn new(name: impl Into<String>, kind: AttributeKind, default: Value) -> CoreResult<Self> {
        let name = name.into();
        if !kind.accepts(&default) {
            return Err(CoreError::schema(format!(
                "default for {name} is {} but the attribute is {kind}",
                default.type_name()
            )));
        }
        Ok(Self {
            name,
            kind,
            default,
        })
    }

    fn typed(name: impl Into<String>, kind: AttributeKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
        }
    }

    /// 8-bit signed integer attribute.
    pub fn int8(name: impl Into<String>, default: i8) -> Self {
        Self::typed(name, AttributeKind::Int8, default.into())
    }

    /// 16-bit signed integer attribute, the default integer width.
    pub fn int(name: impl Into<String>, default: i16) -> Self {
        Self::int16(name, default)
    }

    /// 16-bit signed integer attribute.
    pub fn int16(name: impl Into<String>, default: i16) -> Self {
        Self::typed(name, AttributeKind::Int16, default.into())
    }

    /// 32-bit signed integer attribute.
    pub fn int32(name: impl Into<String>, default: i32) -> Self {
        Self::typed(name, AttributeKind::Int32, default.into())
    }

    /// 64-bit signed integer attribute.
    pub fn int64(name: impl Into<String>, default: i64) -> Self {
        Self::typed(name, AttributeKind::Int64, default.into())
    }

    /// 8-bit unsigned integer attribute.
    pub fn uint8(name: impl Into<String>, default: u8) -> Self {
        Self::typed(name, AttributeKind::UInt8, default.into())
    }

    /// 16-bit unsigned integer attribute.
    pub fn uint16(name: impl Into<String>, default: u16) -> Self {
        Self::typed(name, AttributeKind::UInt16, default.into())
    }

    /// 32-bit unsigned integer attribute.
    pub fn uint32(name: impl Into<String>, default: u32) -> Self {
        Self::typed(name, AttributeKind::UInt32, default.into())
    }

    /// 64-bit unsigned integer attribute.
    pub fn uint64(name: impl Into<String>, default: u64) -> Self {
        Self::typed(name, AttributeKind::UInt64, default.into())
    }

    /// Boolean attribute.
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::typed(name, AttributeKind::Bool, default.into())
    }

    /// Single precision float attribute.
    pub fn float32(name: impl Into<String>, default: f32) -> Self {
        Self::typed(name, AttributeKind::Float32, default.into())
    }

    /// Double precision float attribute.
    pub fn float64(name: impl Into<String>, default: f64) -> Self {
        Self::typed(name, AttributeKind::Float64, default.into())
    }

    /// String attribute.
    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::typed(name, AttributeKind::String, Value::String(default.into()))
    }

    /// Blob attribute.
    pub fn blob(name: impl Into<String>, default: Vec<u8>) -> Self {
        Self::typed(name, AttributeKind::Blob, default.into())
    }

    /// Date-time attribute.
    pub fn date_time(name: impl Into<String>, default: NaiveDateTime) -> Self {
        Self::typed(name, AttributeKind::DateTime, default.into())
    }

    /// Reference to items of `target`. Defaults to no reference.
    pub fn reference(name: impl Into<String>, target: &Schema) -> Self {
        Self::reference_to(name, target.table())
    }

    /// Reference to items stored in the table named `table`.
    ///
    /// Use this for self references, where the target schema does not
    /// exist yet.
    pub fn reference_to(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::typed(
            name,
            AttributeKind::Reference(table.into()),
            Value::Reference(Reference::Unset),
        )
    }

    fn identifier() -> Self {
        Self::typed(ID_ATTRIBUTE, AttributeKind::Int32, Value::Int32(UNASSIGNED_ID))
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute kind.
    #[must_use]
    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// Default value for newly constructed records.
    #[must_use]
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// Default used for table DDL. References store the sentinel id.
    #[must_use]
    pub fn storage_default(&self) -> Value {
        match self.kind {
            AttributeKind::Reference(_) => Value::Int32(UNASSIGNED_ID),
            _ => self.default.clone(),
        }
    }
}

/// A record type: name, table name, sorted attributes, validation hook.
pub struct Schema {
    name: String,
    table: String,
    attributes: Vec<Attribute>,
    id_index: usize,
    validator: Option<Validator>,
}

impl Schema {
    /// Starts a schema for the record type `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Record type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name: lower-cased type name plus `s`.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Attributes in canonical order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Number of attributes, including `id`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always false: every schema has an `id`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.attributes[i])
    }

    /// Canonical position of an attribute.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes
            .binary_search_by(|a| a.name.as_str().cmp(name))
            .ok()
    }

    /// Canonical position of the `id` attribute.
    #[must_use]
    pub fn id_index(&self) -> usize {
        self.id_index
    }

    /// Positions and target tables of every reference attribute.
    pub fn references(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.attributes
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.kind.reference_target().map(|t| (i, t)))
    }

    /// Runs the validation hook.
    pub fn validate(&self, record: &Record) -> CoreResult<()> {
        match &self.validator {
            Some(validator) => validator(record),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("attributes", &self.attributes)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Builder for [`Schema`].
///
/// Attributes of base schemas are merged first; when two bases declare the
/// same name the one passed to [`extend`](Self::extend) first wins, and
/// attributes declared on the builder itself override every base.
#[must_use]
pub struct SchemaBuilder {
    name: String,
    bases: Vec<Arc<Schema>>,
    own: Vec<Attribute>,
    validator: Option<Validator>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            own: Vec::new(),
            validator: None,
        }
    }

    /// Inherits the attributes and validator of `base`.
    pub fn extend(mut self, base: &Arc<Schema>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Declares an attribute.
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.own.push(attribute);
        self
    }

    /// Sets the validation hook.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the type or an attribute name is not a
    /// word (`\w+`), an attribute is declared twice, or `id` is redeclared.
    pub fn build(self) -> CoreResult<Arc<Schema>> {
        let table = format!("{}s", self.name.to_lowercase());
        if !is_word(&self.name) {
            return Err(CoreError::schema(format!(
                "record type name {:?} is not a valid table name",
                self.name
            )));
        }

        let mut merged: BTreeMap<String, Attribute> = BTreeMap::new();
        for base in &self.bases {
            for attribute in &base.attributes {
                if attribute.name != ID_ATTRIBUTE {
                    merged
                        .entry(attribute.name.clone())
                        .or_insert_with(|| attribute.clone());
                }
            }
        }

        let mut declared = std::collections::HashSet::new();
        for attribute in self.own {
            if attribute.name == ID_ATTRIBUTE {
                return Err(CoreError::schema(format!(
                    "{} redeclares the id attribute",
                    self.name
                )));
            }
            if !is_word(&attribute.name) {
                return Err(CoreError::schema(format!(
                    "attribute name {:?} is not a word",
                    attribute.name
                )));
            }
            if !declared.insert(attribute.name.clone()) {
                return Err(CoreError::schema(format!(
                    "{} declares {} twice",
                    self.name, attribute.name
                )));
            }
            merged.insert(attribute.name.clone(), attribute);
        }
        merged.insert(ID_ATTRIBUTE.to_owned(), Attribute::identifier());

        let attributes: Vec<Attribute> = merged.into_values().collect();
        let id_index = attributes
            .iter()
            .position(|a| a.name == ID_ATTRIBUTE)
            .ok_or_else(|| CoreError::schema("missing id attribute"))?;
        let validator = self
            .validator
            .or_else(|| self.bases.iter().find_map(|b| b.validator.clone()));

        tracing::debug!(name = %self.name, table = %table, attributes = attributes.len(), "built schema");
        Ok(Arc::new(Schema {
            name: self.name,
            table,
            attributes,
            id_index,
            validator,
        }))
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &Schema) -> Vec<&str> {
        schema.attributes().iter().map(Attribute::name).collect()
    }

    #[test]
    fn attributes_sorted_with_id() {
        let schema = Schema::builder("Vote")
            .attribute(Attribute::boolean("valid", true))
            .attribute(Attribute::int32("amount", 0))
            .build()
            .unwrap();

        assert_eq!(names(&schema), ["amount", "id", "valid"]);
        assert_eq!(schema.id_index(), 1);
        assert_eq!(schema.attribute("id").unwrap().default(), &Value::Int32(-1));
        assert_eq!(schema.index_of("valid"), Some(2));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn table_name_is_lowercase_plural() {
        let schema = Schema::builder("VoteGroup").build().unwrap();
        assert_eq!(schema.name(), "VoteGroup");
        assert_eq!(schema.table(), "votegroups");
    }

    #[test]
    fn invalid_type_name_rejected() {
        let err = Schema::builder("Vote Group").build().unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
        assert!(Schema::builder("").build().is_err());
    }

    #[test]
    fn derived_overrides_base() {
        let base = Schema::builder("Base")
            .attribute(Attribute::string("name", "base"))
            .attribute(Attribute::int("rank", 1))
            .build()
            .unwrap();
        let derived = Schema::builder("Derived")
            .extend(&base)
            .attribute(Attribute::string("name", "derived"))
            .build()
            .unwrap();

        assert_eq!(names(&derived), ["id", "name", "rank"]);
        assert_eq!(
            derived.attribute("name").unwrap().default(),
            &Value::String("derived".into())
        );
        assert_eq!(derived.attribute("rank").unwrap().default(), &Value::Int16(1));
    }

    #[test]
    fn first_base_wins_between_bases() {
        let left = Schema::builder("Left")
            .attribute(Attribute::int("shared", 1))
            .build()
            .unwrap();
        let right = Schema::builder("Right")
            .attribute(Attribute::int("shared", 2))
            .build()
            .unwrap();
        let both = Schema::builder("Both").extend(&left).extend(&right).build().unwrap();

        assert_eq!(both.attribute("shared").unwrap().default(), &Value::Int16(1));
    }

    #[test]
    fn redeclaring_id_rejected() {
        let err = Schema::builder("Item")
            .attribute(Attribute::int32("id", 0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let result = Schema::builder("Item")
            .attribute(Attribute::int("a", 0))
            .attribute(Attribute::int("a", 1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn attribute_new_checks_default() {
        assert!(Attribute::new("n", AttributeKind::Int16, Value::Int16(3)).is_ok());
        assert!(Attribute::new("n", AttributeKind::Int16, Value::Int32(3)).is_err());
    }

    #[test]
    fn reference_storage_default_is_sentinel() {
        let target = Schema::builder("Participant").build().unwrap();
        let attr = Attribute::reference("vote1", &target);

        assert_eq!(attr.kind(), &AttributeKind::Reference("participants".into()));
        assert_eq!(attr.default(), &Value::Reference(Reference::Unset));
        assert_eq!(attr.storage_default(), Value::Int32(-1));
    }

    #[test]
    fn references_lists_positions() {
        let target = Schema::builder("Participant").build().unwrap();
        let schema = Schema::builder("Vote")
            .attribute(Attribute::reference("vote2", &target))
            .attribute(Attribute::reference("vote1", &target))
            .attribute(Attribute::boolean("valid", true))
            .build()
            .unwrap();

        let refs: Vec<_> = schema.references().collect();
        assert_eq!(refs, [(2, "participants"), (3, "participants")]);
    }

    #[test]
    fn integer_default_width() {
        assert_eq!(Attribute::int("n", 0).kind(), &AttributeKind::Int16);
    }
}
