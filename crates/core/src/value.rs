#![forbid(unsafe_code)]

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Semantic column type of a record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    /// Structured values, stored as an encoded BLOB.
    Blob,
}

impl FieldType {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Blob => "BLOB",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            Self::Text => Value::Text(String::new()),
            Self::Integer => Value::Integer(0),
            Self::Blob => Value::Blob(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value may be stored in a column of `field_type`.
    pub fn fits(&self, field_type: FieldType, not_null: bool) -> bool {
        match (self, field_type) {
            (Self::Null, _) => !not_null,
            (Self::Text(_), FieldType::Text)
            | (Self::Integer(_), FieldType::Integer)
            | (Self::Blob(_), FieldType::Blob) => true,
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    /// Encodes a structured value into a BLOB (JSON bytes).
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::Blob)
    }

    /// Decodes a BLOB produced by [`Value::encode`]. `Null` and empty blobs
    /// decode as `None`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match self {
            Self::Blob(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes).map(Some),
            _ => Ok(None),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn fits_respects_type_and_nullability() {
        assert!(Value::from("a").fits(FieldType::Text, true));
        assert!(!Value::from("a").fits(FieldType::Integer, false));
        assert!(Value::Null.fits(FieldType::Blob, false));
        assert!(!Value::Null.fits(FieldType::Blob, true));
    }

    #[test]
    fn structured_values_encode_to_blob() {
        let mut metadata = BTreeMap::new();
        metadata.insert("color".to_string(), "red".to_string());
        let value = Value::encode(&metadata).unwrap();
        assert!(value.fits(FieldType::Blob, true));
        let decoded: Option<BTreeMap<String, String>> = value.decode().unwrap();
        assert_eq!(decoded, Some(metadata));
        assert_eq!(
            FieldType::Blob
                .default_value()
                .decode::<BTreeMap<String, String>>()
                .unwrap(),
            None
        );
    }
}
