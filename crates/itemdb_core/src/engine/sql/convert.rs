//! Mapping between attribute values and SQLite values.

use crate::error::{CoreError, CoreResult};
use crate::schema::AttributeKind;
use crate::value::{Reference, Value};
use chrono::NaiveDateTime;
use rusqlite::types::{Type, Value as SqlValue};

/// Text layout of date-times in SQL columns.
pub const SQL_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column type for an attribute kind, or `None` if the kind cannot be
/// stored in SQLite.
///
/// | kind | column |
/// |---|---|
/// | int8-int64, uint8-uint32, bool, reference | `INTEGER` |
/// | float32, float64 | `REAL` |
/// | string | `TEXT` |
/// | blob | `BLOB` |
/// | datetime | `TIMESTAMP` |
#[must_use]
pub fn column_type(kind: &AttributeKind) -> Option<&'static str> {
    match kind {
        AttributeKind::Int8
        | AttributeKind::Int16
        | AttributeKind::Int32
        | AttributeKind::Int64
        | AttributeKind::UInt8
        | AttributeKind::UInt16
        | AttributeKind::UInt32
        | AttributeKind::Bool
        | AttributeKind::Reference(_) => Some("INTEGER"),
        AttributeKind::Float32 | AttributeKind::Float64 => Some("REAL"),
        AttributeKind::String => Some("TEXT"),
        AttributeKind::Blob => Some("BLOB"),
        AttributeKind::DateTime => Some("TIMESTAMP"),
        AttributeKind::UInt64 => None,
    }
}

/// SQL literal for a column default.
pub(crate) fn default_literal(value: &Value) -> String {
    match value {
        Value::Bool(v) => i32::from(*v).to_string(),
        Value::Float32(v) => float_literal(f64::from(*v)),
        Value::Float64(v) => float_literal(*v),
        Value::String(v) => format!("'{}'", v.replace('\'', "''")),
        Value::Blob(v) => {
            let hex: String = v.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::DateTime(v) => format!("'{}'", v.format(SQL_DATE_TIME_FORMAT)),
        Value::Reference(r) => r.id().to_string(),
        other => other
            .as_i64()
            .map_or_else(|| "NULL".to_owned(), |v| v.to_string()),
    }
}

/// SQLite keeps infinities as `REAL` but stores NaN as `NULL`; `from_sql`
/// reads a `NULL` float column back as NaN.
fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "NULL".to_owned()
    } else if v.is_infinite() {
        if v > 0.0 { "9e999" } else { "-9e999" }.to_owned()
    } else {
        v.to_string()
    }
}

/// Converts a value for binding as a statement parameter.
pub(crate) fn to_sql(value: &Value) -> CoreResult<SqlValue> {
    Ok(match value {
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Float32(v) => SqlValue::Real(f64::from(*v)),
        Value::Float64(v) => SqlValue::Real(*v),
        Value::String(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
        Value::DateTime(v) => SqlValue::Text(v.format(SQL_DATE_TIME_FORMAT).to_string()),
        Value::Reference(r) => SqlValue::Integer(i64::from(r.id())),
        Value::UInt64(v) => {
            return Err(CoreError::validation(format!(
                "uint64 value {v} cannot be stored in SQL"
            )))
        }
        other => SqlValue::Integer(other.as_i64().ok_or_else(|| {
            CoreError::validation(format!("cannot bind {} value", other.type_name()))
        })?),
    })
}

fn mismatch(column: usize, name: &str, value: &SqlValue) -> CoreError {
    CoreError::Sql(rusqlite::Error::InvalidColumnType(
        column,
        name.to_owned(),
        value.data_type(),
    ))
}

fn narrow<T: TryFrom<i64>>(column: usize, v: i64) -> CoreResult<T> {
    T::try_from(v).map_err(|_| CoreError::Sql(rusqlite::Error::IntegralValueOutOfRange(column, v)))
}

/// Converts a column read back from SQLite into a value of `kind`.
pub(crate) fn from_sql(kind: &AttributeKind, column: usize, name: &str, value: SqlValue) -> CoreResult<Value> {
    let converted = match (kind, &value) {
        (AttributeKind::Int8, SqlValue::Integer(v)) => Value::Int8(narrow(column, *v)?),
        (AttributeKind::Int16, SqlValue::Integer(v)) => Value::Int16(narrow(column, *v)?),
        (AttributeKind::Int32, SqlValue::Integer(v)) => Value::Int32(narrow(column, *v)?),
        (AttributeKind::Int64, SqlValue::Integer(v)) => Value::Int64(*v),
        (AttributeKind::UInt8, SqlValue::Integer(v)) => Value::UInt8(narrow(column, *v)?),
        (AttributeKind::UInt16, SqlValue::Integer(v)) => Value::UInt16(narrow(column, *v)?),
        (AttributeKind::UInt32, SqlValue::Integer(v)) => Value::UInt32(narrow(column, *v)?),
        (AttributeKind::Bool, SqlValue::Integer(v)) => Value::Bool(*v != 0),
        (AttributeKind::Float32, SqlValue::Real(v)) => Value::Float32(*v as f32),
        (AttributeKind::Float32, SqlValue::Integer(v)) => Value::Float32(*v as f32),
        (AttributeKind::Float64, SqlValue::Real(v)) => Value::Float64(*v),
        (AttributeKind::Float64, SqlValue::Integer(v)) => Value::Float64(*v as f64),
        (AttributeKind::Float32, SqlValue::Null) => Value::Float32(f32::NAN),
        (AttributeKind::Float64, SqlValue::Null) => Value::Float64(f64::NAN),
        (AttributeKind::String, SqlValue::Text(v)) => Value::String(v.clone()),
        (AttributeKind::Blob, SqlValue::Blob(v)) => Value::Blob(v.clone()),
        (AttributeKind::DateTime, SqlValue::Text(v)) => Value::DateTime(
            NaiveDateTime::parse_from_str(v, SQL_DATE_TIME_FORMAT)
                .map_err(|_| mismatch(column, name, &value))?,
        ),
        (AttributeKind::Reference(_), SqlValue::Integer(v)) => {
            Value::Reference(Reference::from_id(narrow(column, *v)?))
        }
        _ => return Err(mismatch(column, name, &value)),
    };
    Ok(converted)
}

/// Parses a metadata timestamp column.
pub(crate) fn parse_date_time(column: usize, text: &str) -> CoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, SQL_DATE_TIME_FORMAT).map_err(|_| {
        CoreError::Sql(rusqlite::Error::InvalidColumnType(
            column,
            "lastUpdate".to_owned(),
            Type::Text,
        ))
    })
}
