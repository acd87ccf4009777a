#![forbid(unsafe_code)]

use rr_core::{PredicateError, SchemaError};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    Schema(SchemaError),
    Predicate(PredicateError),
    UnknownField {
        table: String,
        field: String,
    },
    UnknownColumn {
        table: String,
        column: String,
    },
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    NoParentColumn {
        table: String,
    },
    InvalidRow {
        table: String,
        message: &'static str,
    },
    RowOutOfRange {
        row: usize,
        row_count: usize,
    },
    /// A per-field UPDATE failed after `persisted` fields were written.
    PartialCommit {
        table: String,
        field: String,
        persisted: Vec<String>,
        cause: Box<StoreError>,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Schema(err) => write!(f, "schema: {err}"),
            Self::Predicate(err) => write!(f, "predicate: {err}"),
            Self::UnknownField { table, field } => {
                write!(f, "unknown field (table={table}, field={field})")
            }
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column (table={table}, column={column})")
            }
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch (field={field}, expected={expected}, actual={actual})"
            ),
            Self::NoParentColumn { table } => {
                write!(f, "table has no parent key column (table={table})")
            }
            Self::InvalidRow { table, message } => {
                write!(f, "invalid row (table={table}): {message}")
            }
            Self::RowOutOfRange { row, row_count } => {
                write!(f, "row out of range (row={row}, row_count={row_count})")
            }
            Self::PartialCommit {
                table,
                field,
                persisted,
                cause,
            } => write!(
                f,
                "partial commit (table={table}, failed_field={field}, persisted=[{}]): {cause}",
                persisted.join(",")
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::PartialCommit { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<PredicateError> for StoreError {
    fn from(value: PredicateError) -> Self {
        Self::Predicate(value)
    }
}
