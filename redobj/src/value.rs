use crate::error::DbError;
use crate::schema::PropertyKind;
use crate::types::{Datetime, Decimal128, ObjectId, Uuid};
use bincode::{Decode, Encode};
use std::cmp::Ordering;

/// Dynamic cell type of the storage engine. A persisted row is a `Vec<Value>`
/// in schema property order.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Timestamp { secs: i64, nanos: u32 },
    Uuid([u8; 16]),
    ObjectId([u8; 12]),
    Decimal { mantissa: i128, exponent: i32 },
    Link { table: String, key: u64 },
    List(Vec<Value>),
    Set(Vec<Value>),
    Dictionary(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Ordered comparison used by the query evaluator. Int and Double columns
    /// cross-compare numerically; any other kind mismatch is not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Timestamp { secs: s1, nanos: n1 }, Value::Timestamp { secs: s2, nanos: n2 }) => {
                Some((s1, n1).cmp(&(s2, n2)))
            }
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::ObjectId(a), Value::ObjectId(b)) => Some(a.cmp(b)),
            (Value::Decimal { mantissa: m1, exponent: e1 }, Value::Decimal { mantissa: m2, exponent: e2 }) => {
                Some(Decimal128::new(*m1, *e1).cmp(&Decimal128::new(*m2, *e2)))
            }
            (Value::Link { table: t1, key: k1 }, Value::Link { table: t2, key: k2 }) => {
                if t1 == t2 {
                    Some(k1.cmp(k2))
                } else {
                    Some(t1.cmp(t2))
                }
            }
            _ => None,
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> serde_json::Value {
        use serde_json::json;
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => json!(i),
            Value::Bool(b) => json!(b),
            Value::Double(d) => json!(d),
            Value::String(s) => json!(s),
            Value::Binary(b) => json!(b),
            Value::Timestamp { secs, nanos } => json!(Datetime::from_timestamp(*secs, *nanos).to_string()),
            Value::Uuid(bytes) => json!(Uuid::from_bytes(*bytes).to_string()),
            Value::ObjectId(bytes) => json!(ObjectId(*bytes).to_string()),
            Value::Decimal { mantissa, exponent } => json!(Decimal128::new(*mantissa, *exponent).to_string()),
            Value::Link { table, key } => json!({ "table": table, "key": key }),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Into::into).collect()),
            Value::Set(items) => serde_json::Value::Array(items.iter().map(Into::into).collect()),
            Value::Dictionary(entries) => {
                serde_json::Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.into())).collect())
            }
        }
    }
}

pub type Row = Vec<Value>;

pub fn encode_row(row: &Row) -> Result<Vec<u8>, DbError> {
    Ok(bincode::encode_to_vec(row, bincode::config::standard())?)
}

pub fn decode_row(bytes: &[u8]) -> Result<Row, DbError> {
    let (row, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(row)
}

/// Canonicalization between a property's Rust type and its stored `Value`:
/// enums as their underlying integer, absent optionals as null, binary as a
/// byte span.
pub trait PropertyValue: Clone + PartialEq + std::fmt::Debug + 'static {
    const KIND: PropertyKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, DbError>;
}

fn mismatch<T>(expected: &str, got: Value) -> Result<T, DbError> {
    Err(DbError::SchemaMismatch(format!("expected {} value, got {:?}", expected, got)))
}

impl PropertyValue for i64 {
    const KIND: PropertyKind = PropertyKind::Int;

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Int(i) => Ok(i),
            other => mismatch("int", other),
        }
    }
}

impl PropertyValue for bool {
    const KIND: PropertyKind = PropertyKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", other),
        }
    }
}

impl PropertyValue for f64 {
    const KIND: PropertyKind = PropertyKind::Double;

    fn to_value(&self) -> Value {
        Value::Double(*self)
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Double(d) => Ok(d),
            other => mismatch("double", other),
        }
    }
}

impl PropertyValue for String {
    const KIND: PropertyKind = PropertyKind::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch("string", other),
        }
    }
}

impl PropertyValue for Vec<u8> {
    const KIND: PropertyKind = PropertyKind::Binary;

    fn to_value(&self) -> Value {
        Value::Binary(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Binary(b) => Ok(b),
            other => mismatch("binary", other),
        }
    }
}

impl PropertyValue for Datetime {
    const KIND: PropertyKind = PropertyKind::Timestamp;

    fn to_value(&self) -> Value {
        Value::Timestamp { secs: self.secs(), nanos: self.subsec_nanos() }
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Timestamp { secs, nanos } => Ok(Datetime::from_timestamp(secs, nanos)),
            other => mismatch("timestamp", other),
        }
    }
}

impl PropertyValue for Uuid {
    const KIND: PropertyKind = PropertyKind::Uuid;

    fn to_value(&self) -> Value {
        Value::Uuid(*self.as_bytes())
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Uuid(bytes) => Ok(Uuid::from_bytes(bytes)),
            other => mismatch("uuid", other),
        }
    }
}

impl PropertyValue for ObjectId {
    const KIND: PropertyKind = PropertyKind::ObjectId;

    fn to_value(&self) -> Value {
        Value::ObjectId(self.0)
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::ObjectId(bytes) => Ok(ObjectId(bytes)),
            other => mismatch("object id", other),
        }
    }
}

impl PropertyValue for Decimal128 {
    const KIND: PropertyKind = PropertyKind::Decimal;

    fn to_value(&self) -> Value {
        Value::Decimal { mantissa: self.mantissa(), exponent: self.exponent() }
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Decimal { mantissa, exponent } => Ok(Decimal128::new(mantissa, exponent)),
            other => mismatch("decimal", other),
        }
    }
}

impl<V: PropertyValue> PropertyValue for Option<V> {
    const KIND: PropertyKind = V::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Null => Ok(None),
            other => Ok(Some(V::from_value(other)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_codec_round_trips_every_kind() {
        let row: Row = vec![
            Value::Null,
            Value::Int(-5),
            Value::Bool(true),
            Value::Double(1.25),
            Value::String("foo".into()),
            Value::Binary(vec![0, 1, 2]),
            Value::Timestamp { secs: 100, nanos: 42 },
            Value::Uuid([7u8; 16]),
            Value::ObjectId([9u8; 12]),
            Value::Decimal { mantissa: 375, exponent: -2 },
            Value::Link { table: "Person".into(), key: 3 },
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::Set(vec![Value::String("a".into())]),
            Value::Dictionary(vec![("k".into(), Value::Bool(false))]),
        ];
        let bytes = encode_row(&row).unwrap();
        assert_eq!(decode_row(&bytes).unwrap(), row);
    }

    #[test]
    fn int_and_double_cross_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Double(2.0)), Some(Ordering::Equal));
        assert_eq!(Value::Double(1.5).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(Value::Int(2).compare(&Value::String("2".into())), None);
    }

    #[test]
    fn optional_absent_is_null() {
        let none: Option<i64> = None;
        assert_eq!(none.to_value(), Value::Null);
        assert_eq!(<Option<i64>>::from_value(Value::Null).unwrap(), None);
        assert_eq!(<Option<i64>>::from_value(Value::Int(4)).unwrap(), Some(4));
    }
}
