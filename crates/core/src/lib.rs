#![forbid(unsafe_code)]

mod changeset;
mod predicate;
mod schema;
mod value;

pub use changeset::*;
pub use predicate::*;
pub use schema::*;
pub use value::*;

pub mod ids {
    use uuid::Uuid;

    /// Primary key of a stored record. Persisted as a 16-byte BLOB.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RecordId(Uuid);

    impl RecordId {
        pub fn generate() -> Self {
            Self(Uuid::new_v4())
        }

        pub fn from_uuid(value: Uuid) -> Self {
            Self(value)
        }

        pub fn as_uuid(&self) -> &Uuid {
            &self.0
        }

        pub fn as_bytes(&self) -> &[u8; 16] {
            self.0.as_bytes()
        }

        pub fn to_vec(&self) -> Vec<u8> {
            self.0.as_bytes().to_vec()
        }

        pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, RecordIdError> {
            if bytes.is_empty() {
                return Err(RecordIdError::Empty);
            }
            Uuid::from_slice(bytes)
                .map(Self)
                .map_err(|_| RecordIdError::InvalidLength { len: bytes.len() })
        }

        pub fn parse(value: &str) -> Result<Self, RecordIdError> {
            let value = value.trim();
            if value.is_empty() {
                return Err(RecordIdError::Empty);
            }
            Uuid::parse_str(value)
                .map(Self)
                .map_err(|_| RecordIdError::InvalidFormat)
        }
    }

    impl From<RecordId> for crate::Value {
        fn from(value: RecordId) -> Self {
            crate::Value::Blob(value.to_vec())
        }
    }

    impl std::fmt::Display for RecordId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0.hyphenated())
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum RecordIdError {
        Empty,
        InvalidLength { len: usize },
        InvalidFormat,
    }

    impl RecordIdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "record id must not be empty",
                Self::InvalidLength { .. } => "record id must be 16 bytes",
                Self::InvalidFormat => "record id is not a valid uuid",
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn record_id_bytes_and_text_agree() {
            let id = RecordId::generate();
            let from_bytes = RecordId::try_from_bytes(id.as_bytes()).unwrap();
            let from_text = RecordId::parse(&id.to_string()).unwrap();
            assert_eq!(id, from_bytes);
            assert_eq!(id, from_text);
        }

        #[test]
        fn record_id_rejects_garbage() {
            assert_eq!(
                RecordId::try_from_bytes(&[]).unwrap_err(),
                RecordIdError::Empty
            );
            assert_eq!(
                RecordId::try_from_bytes(&[1, 2, 3]).unwrap_err(),
                RecordIdError::InvalidLength { len: 3 }
            );
            assert_eq!(
                RecordId::parse("not-a-uuid").unwrap_err(),
                RecordIdError::InvalidFormat
            );
        }
    }
}
