#![forbid(unsafe_code)]

use crate::database::{Database, StatementKind};
use crate::StoreError;
use rr_core::ids::RecordId;
use rr_core::{PredicateList, SchemaDescriptor, Value, WhereClause};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Row, ToSql, params, params_from_iter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One materialized result row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowData {
    pub id: RecordId,
    pub parent: Option<RecordId>,
    pub fields: BTreeMap<String, Value>,
}

pub fn create_table_sql(schema: &SchemaDescriptor) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.table());
    sql.push_str(&format!("    {} BLOB NOT NULL,\n", schema.primary_key_column()));
    if let Some(parent) = schema.parent_key_column() {
        sql.push_str(&format!("    {parent} BLOB,\n"));
    }
    for field in schema.fields() {
        let not_null = if field.not_null() { " NOT NULL" } else { "" };
        sql.push_str(&format!(
            "    {} {}{not_null},\n",
            field.name(),
            field.field_type().sql_type()
        ));
    }
    sql.push_str(&format!("    PRIMARY KEY ({})\n)", schema.primary_key_column()));
    sql
}

/// Column order: fields, then the parent column (if any), then the key.
/// The existing `rowid` is carried over, so replacing a stored row keeps
/// its position in `rowid`-ordered views.
pub fn insert_or_replace_sql(schema: &SchemaDescriptor) -> String {
    let mut columns: Vec<&str> = schema.field_names().collect();
    if let Some(parent) = schema.parent_key_column() {
        columns.push(parent);
    }
    columns.push(schema.primary_key_column());
    let key_param = columns.len();
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>();
    format!(
        "INSERT OR REPLACE INTO {table}(rowid,{}) VALUES ((SELECT rowid FROM {table} WHERE {} = ?{key_param}),{})",
        columns.join(","),
        schema.primary_key_column(),
        placeholders.join(","),
        table = schema.table(),
    )
}

pub fn update_column_sql(schema: &SchemaDescriptor, column: &str) -> String {
    format!(
        "UPDATE {} SET {column} = ?1 WHERE {} = ?2",
        schema.table(),
        schema.primary_key_column()
    )
}

pub fn delete_sql(schema: &SchemaDescriptor) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1",
        schema.table(),
        schema.primary_key_column()
    )
}

pub fn select_sql(schema: &SchemaDescriptor, clause: &WhereClause) -> String {
    if clause.is_empty() {
        format!("SELECT * FROM {} ORDER BY rowid", schema.table())
    } else {
        format!(
            "SELECT * FROM {} WHERE {} ORDER BY rowid",
            schema.table(),
            clause.fragment()
        )
    }
}

/// Key-only page query used by the cursor window.
pub fn select_keys_sql(schema: &SchemaDescriptor, clause: &WhereClause) -> String {
    let filter = if clause.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clause.fragment())
    };
    format!(
        "SELECT {} FROM {}{filter} ORDER BY rowid LIMIT :page_limit OFFSET :page_offset",
        schema.primary_key_column(),
        schema.table()
    )
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn optional_id_value(id: Option<RecordId>) -> SqlValue {
    id.map(|id| SqlValue::Blob(id.to_vec()))
        .unwrap_or(SqlValue::Null)
}

/// Builds and runs the statements for one record type.
#[derive(Clone, Debug)]
pub struct SqlMapper {
    db: Arc<Database>,
    schema: Arc<SchemaDescriptor>,
}

impl SqlMapper {
    pub fn new(db: Arc<Database>, schema: Arc<SchemaDescriptor>) -> Self {
        Self { db, schema }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn ensure_table(&self) -> Result<(), StoreError> {
        let sql = create_table_sql(&self.schema);
        self.db.execute(StatementKind::Ddl, &sql, params![])?;
        Ok(())
    }

    /// `values` are in schema field order.
    pub fn insert_or_replace(
        &self,
        id: RecordId,
        values: &[Value],
        parent: Option<RecordId>,
    ) -> Result<(), StoreError> {
        if values.len() != self.schema.fields().len() {
            return Err(StoreError::InvalidInput(
                "insert must bind one value per schema field",
            ));
        }
        let mut bound: Vec<SqlValue> = values.iter().map(to_sql_value).collect();
        if self.schema.parent_key_column().is_some() {
            bound.push(optional_id_value(parent));
        }
        bound.push(SqlValue::Blob(id.to_vec()));

        let sql = insert_or_replace_sql(&self.schema);
        self.db
            .execute(StatementKind::Insert, &sql, params_from_iter(bound.iter()))?;
        Ok(())
    }

    pub fn update_field(&self, id: RecordId, field: &str, value: &Value) -> Result<(), StoreError> {
        if self.schema.field(field).is_none() {
            return Err(StoreError::UnknownField {
                table: self.schema.table().to_string(),
                field: field.to_string(),
            });
        }
        let sql = update_column_sql(&self.schema, field);
        self.db.execute(
            StatementKind::Update,
            &sql,
            params![to_sql_value(value), id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    pub fn update_parent(&self, id: RecordId, parent: Option<RecordId>) -> Result<(), StoreError> {
        let column = self.parent_column()?;
        let sql = update_column_sql(&self.schema, column);
        self.db.execute(
            StatementKind::Update,
            &sql,
            params![optional_id_value(parent), id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: RecordId) -> Result<usize, StoreError> {
        let sql = delete_sql(&self.schema);
        self.db
            .execute(StatementKind::Delete, &sql, params![id.as_bytes().as_slice()])
    }

    pub fn select_where(&self, predicates: &PredicateList) -> Result<Vec<RowData>, StoreError> {
        let clause = self.where_clause(predicates)?;
        let sql = select_sql(&self.schema, &clause);
        let bound = bind_named(clause.params());
        let named = named_refs(&bound);
        self.db
            .query(&sql, named.as_slice(), |row| self.decode_row(row))
    }

    pub fn select_one(&self, id: RecordId) -> Result<Option<RowData>, StoreError> {
        let predicates = PredicateList::all([rr_core::Predicate::equals(
            self.schema.primary_key_column(),
            id,
        )]);
        Ok(self.select_where(&predicates)?.into_iter().next())
    }

    pub fn select_keys(
        &self,
        predicates: &PredicateList,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RecordId>, StoreError> {
        let clause = self.where_clause(predicates)?;
        let sql = select_keys_sql(&self.schema, &clause);
        let mut bound = bind_named(clause.params());
        bound.push((":page_limit".to_string(), SqlValue::Integer(page_bound(limit))));
        bound.push((":page_offset".to_string(), SqlValue::Integer(page_bound(offset))));
        let named = named_refs(&bound);
        let table = self.schema.table();
        self.db.query(&sql, named.as_slice(), |row| {
            let bytes = row.get_ref(0)?;
            decode_id(table, bytes)
        })
    }

    fn parent_column(&self) -> Result<&str, StoreError> {
        self.schema
            .parent_key_column()
            .ok_or_else(|| StoreError::NoParentColumn {
                table: self.schema.table().to_string(),
            })
    }

    fn where_clause(&self, predicates: &PredicateList) -> Result<WhereClause, StoreError> {
        if let Some(column) = predicates
            .columns()
            .find(|column| !self.schema.has_column(column))
        {
            return Err(StoreError::UnknownColumn {
                table: self.schema.table().to_string(),
                column: column.to_string(),
            });
        }
        Ok(predicates.to_where()?)
    }

    fn decode_row(&self, row: &Row<'_>) -> Result<RowData, StoreError> {
        let table = self.schema.table();
        let id = decode_id(table, row.get_ref(self.schema.primary_key_column())?)?;
        let parent = match self.schema.parent_key_column() {
            Some(column) => match row.get_ref(column)? {
                ValueRef::Null => None,
                other => Some(decode_id(table, other)?),
            },
            None => None,
        };
        let mut fields = BTreeMap::new();
        for field in self.schema.fields() {
            let value = decode_value(table, row.get_ref(field.name())?)?;
            fields.insert(field.name().to_string(), value);
        }
        Ok(RowData { id, parent, fields })
    }
}

fn decode_id(table: &str, value: ValueRef<'_>) -> Result<RecordId, StoreError> {
    match value {
        ValueRef::Blob(bytes) => {
            RecordId::try_from_bytes(bytes).map_err(|err| StoreError::InvalidRow {
                table: table.to_string(),
                message: err.message(),
            })
        }
        _ => Err(StoreError::InvalidRow {
            table: table.to_string(),
            message: "record id column must hold a blob",
        }),
    }
}

fn decode_value(table: &str, value: ValueRef<'_>) -> Result<Value, StoreError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(v) => Ok(Value::Integer(v)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| Value::Text(text.to_string()))
            .map_err(|_| StoreError::InvalidRow {
                table: table.to_string(),
                message: "text column is not valid utf-8",
            }),
        ValueRef::Blob(bytes) => Ok(Value::Blob(bytes.to_vec())),
        ValueRef::Real(_) => Err(StoreError::InvalidRow {
            table: table.to_string(),
            message: "real values are not supported",
        }),
    }
}

fn bind_named(params: &[(String, Value)]) -> Vec<(String, SqlValue)> {
    params
        .iter()
        .map(|(name, value)| (name.clone(), to_sql_value(value)))
        .collect()
}

fn named_refs(bound: &[(String, SqlValue)]) -> Vec<(&str, &dyn ToSql)> {
    bound
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

/// Bounds past `i64::MAX` cover every row SQLite can hold.
fn page_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
