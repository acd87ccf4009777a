#![forbid(unsafe_code)]

use crate::value::{FieldType, Value};

pub const PRIMARY_KEY_COLUMN: &str = "ID";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    not_null: bool,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn not_null(&self) -> bool {
        self.not_null
    }

    /// Value a freshly constructed record holds before anything is loaded.
    pub fn default_value(&self) -> Value {
        if self.not_null {
            self.field_type.default_value()
        } else {
            Value::Null
        }
    }
}

/// Static description of one record type: its table, its ordered fields and
/// the optional self-referencing parent column. Built once per type by the
/// code generator and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    table: String,
    fields: Vec<FieldDescriptor>,
    parent_key_column: Option<String>,
}

impl SchemaDescriptor {
    pub fn builder(table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            table: table.into(),
            fields: Vec::new(),
            parent_key_column: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn primary_key_column(&self) -> &'static str {
        PRIMARY_KEY_COLUMN
    }

    pub fn parent_key_column(&self) -> Option<&str> {
        self.parent_key_column.as_deref()
    }

    /// True for every column a statement may reference: fields, the primary
    /// key and the parent column.
    pub fn has_column(&self, name: &str) -> bool {
        name == PRIMARY_KEY_COLUMN
            || self.parent_key_column.as_deref() == Some(name)
            || self.field(name).is_some()
    }
}

pub struct SchemaBuilder {
    table: String,
    fields: Vec<FieldDescriptor>,
    parent_key_column: Option<String>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType, not_null: bool) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            field_type,
            not_null,
        });
        self
    }

    pub fn text(self, name: impl Into<String>, not_null: bool) -> Self {
        self.field(name, FieldType::Text, not_null)
    }

    pub fn integer(self, name: impl Into<String>, not_null: bool) -> Self {
        self.field(name, FieldType::Integer, not_null)
    }

    pub fn blob(self, name: impl Into<String>, not_null: bool) -> Self {
        self.field(name, FieldType::Blob, not_null)
    }

    pub fn parent_key_column(mut self, name: impl Into<String>) -> Self {
        self.parent_key_column = Some(name.into());
        self
    }

    /// Declares a tree relation using the conventional `PARENT_<table>_ID`
    /// column.
    pub fn self_referencing(self) -> Self {
        let column = format!("PARENT_{}_ID", self.table);
        self.parent_key_column(column)
    }

    pub fn build(self) -> Result<SchemaDescriptor, SchemaError> {
        validate_identifier(&self.table).map_err(|_| SchemaError::InvalidTable {
            name: self.table.clone(),
        })?;
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields);
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.fields.len() + 1);
        for field in &self.fields {
            validate_identifier(&field.name).map_err(|_| SchemaError::InvalidField {
                name: field.name.clone(),
            })?;
            check_unique(&mut seen, &field.name)?;
        }

        if let Some(parent) = self.parent_key_column.as_deref() {
            validate_identifier(parent).map_err(|_| SchemaError::InvalidField {
                name: parent.to_string(),
            })?;
            check_unique(&mut seen, parent)?;
        }

        Ok(SchemaDescriptor {
            table: self.table,
            fields: self.fields,
            parent_key_column: self.parent_key_column,
        })
    }
}

fn check_unique(seen: &mut Vec<String>, name: &str) -> Result<(), SchemaError> {
    if name.eq_ignore_ascii_case(PRIMARY_KEY_COLUMN) {
        return Err(SchemaError::ReservedColumn {
            name: name.to_string(),
        });
    }
    if seen.iter().any(|other| other.eq_ignore_ascii_case(name)) {
        return Err(SchemaError::DuplicateField {
            name: name.to_string(),
        });
    }
    seen.push(name.to_string());
    Ok(())
}

/// Identifiers are spliced into SQL text, so only `[A-Za-z_][A-Za-z0-9_]*`
/// is accepted.
pub fn validate_identifier(value: &str) -> Result<(), SchemaError> {
    if value.is_empty() {
        return Err(SchemaError::EmptyIdentifier);
    }
    if value.len() > 128 {
        return Err(SchemaError::InvalidField {
            name: value.to_string(),
        });
    }
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(SchemaError::EmptyIdentifier);
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SchemaError::InvalidField {
            name: value.to_string(),
        });
    }
    if chars.any(|ch| !(ch.is_ascii_alphanumeric() || ch == '_')) {
        return Err(SchemaError::InvalidField {
            name: value.to_string(),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    EmptyIdentifier,
    InvalidTable { name: String },
    InvalidField { name: String },
    DuplicateField { name: String },
    ReservedColumn { name: String },
    NoFields,
}

impl SchemaError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyIdentifier => "identifier must not be empty",
            Self::InvalidTable { .. } => "table name must match [A-Za-z_][A-Za-z0-9_]*",
            Self::InvalidField { .. } => "column name must match [A-Za-z_][A-Za-z0-9_]*",
            Self::DuplicateField { .. } => "column names must be unique",
            Self::ReservedColumn { .. } => "column name is reserved for the primary key",
            Self::NoFields => "schema must declare at least one field",
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTable { name }
            | Self::InvalidField { name }
            | Self::DuplicateField { name }
            | Self::ReservedColumn { name } => write!(f, "{} ({name})", self.message()),
            _ => f.write_str(self.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("Note")
            .text("title", true)
            .blob("metadata", true)
            .integer("position", false)
            .self_referencing()
            .build()
            .unwrap()
    }

    #[test]
    fn builder_keeps_field_order_and_parent_column() {
        let schema = note_schema();
        assert_eq!(
            schema.field_names().collect::<Vec<_>>(),
            vec!["title", "metadata", "position"]
        );
        assert_eq!(schema.parent_key_column(), Some("PARENT_Note_ID"));
        assert_eq!(schema.field_index("metadata"), Some(1));
        assert!(schema.has_column("ID"));
        assert!(schema.has_column("PARENT_Note_ID"));
        assert!(!schema.has_column("body"));
    }

    #[test]
    fn defaults_follow_nullability() {
        let schema = note_schema();
        assert_eq!(
            schema.field("title").unwrap().default_value(),
            Value::Text(String::new())
        );
        assert_eq!(schema.field("position").unwrap().default_value(), Value::Null);
    }

    #[test]
    fn builder_rejects_bad_identifiers() {
        assert_eq!(
            SchemaDescriptor::builder("Note").build().unwrap_err(),
            SchemaError::NoFields
        );
        assert_eq!(
            SchemaDescriptor::builder("bad table")
                .text("title", true)
                .build()
                .unwrap_err(),
            SchemaError::InvalidTable {
                name: "bad table".to_string()
            }
        );
        assert_eq!(
            SchemaDescriptor::builder("Note")
                .text("title; DROP", true)
                .build()
                .unwrap_err(),
            SchemaError::InvalidField {
                name: "title; DROP".to_string()
            }
        );
        assert_eq!(
            SchemaDescriptor::builder("Note")
                .text("title", true)
                .integer("Title", true)
                .build()
                .unwrap_err(),
            SchemaError::DuplicateField {
                name: "Title".to_string()
            }
        );
        assert_eq!(
            SchemaDescriptor::builder("Note")
                .text("id", true)
                .build()
                .unwrap_err(),
            SchemaError::ReservedColumn {
                name: "id".to_string()
            }
        );
    }
}
