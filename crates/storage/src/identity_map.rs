#![forbid(unsafe_code)]

use crate::record::Record;
use crate::sql_mapper::{RowData, SqlMapper};
use crate::undo_redo::UndoRedoCoordinator;
use crate::StoreError;
use rr_core::ids::RecordId;
use rr_core::{Predicate, PredicateList, SchemaDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of the live records of one type, keyed by primary key. The lock
/// covers lookup-or-insert only; no statement runs while it is held.
pub struct IdentityMap {
    mapper: SqlMapper,
    coordinator: Arc<UndoRedoCoordinator>,
    instances: Mutex<HashMap<RecordId, Arc<Record>>>,
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("table", &self.schema().table())
            .field("live", &self.live_count())
            .finish()
    }
}

impl IdentityMap {
    /// Creates the table if missing before any record of the type exists.
    pub fn open(mapper: SqlMapper, coordinator: Arc<UndoRedoCoordinator>) -> Result<Self, StoreError> {
        mapper.ensure_table()?;
        Ok(Self {
            mapper,
            coordinator,
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        self.mapper.schema()
    }

    pub fn mapper(&self) -> &SqlMapper {
        &self.mapper
    }

    pub fn live_count(&self) -> usize {
        self.instances().len()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.instances().contains_key(&id)
    }

    /// The live instance for `id`, constructed with default field values if
    /// none exists yet.
    pub fn with_id(&self, id: RecordId) -> Arc<Record> {
        self.lookup_or_insert(id, false)
    }

    /// Registers a record under a freshly generated key; its first commit
    /// inserts the row.
    pub fn new_record(&self) -> Arc<Record> {
        self.lookup_or_insert(RecordId::generate(), true)
    }

    fn lookup_or_insert(&self, id: RecordId, is_new: bool) -> Arc<Record> {
        let mut instances = self.instances();
        let record = instances.entry(id).or_insert_with(|| {
            tracing::debug!(table = self.schema().table(), %id, is_new, "record registered");
            Record::new(
                id,
                is_new,
                self.mapper.clone(),
                Arc::clone(&self.coordinator),
            )
        });
        Arc::clone(record)
    }

    /// Resolves a materialized row to its canonical instance and refreshes
    /// the fields that carry no pending edit.
    pub fn resolve(&self, row: &RowData) -> Arc<Record> {
        let record = self.with_id(row.id);
        record.hydrate(row);
        record
    }

    /// Reads the row for `id`. Returns `None` if the store has no such row.
    pub fn load(&self, id: RecordId) -> Result<Option<Arc<Record>>, StoreError> {
        Ok(self.mapper.select_one(id)?.map(|row| self.resolve(&row)))
    }

    pub fn find(&self, predicates: &PredicateList) -> Result<Vec<Arc<Record>>, StoreError> {
        let rows = self.mapper.select_where(predicates)?;
        Ok(rows.iter().map(|row| self.resolve(row)).collect())
    }

    pub fn children(&self, parent: RecordId) -> Result<Vec<Arc<Record>>, StoreError> {
        let column = self.parent_column()?;
        self.find(&PredicateList::all([Predicate::equals(column, parent)]))
    }

    pub fn add_child(&self, parent: &Record, child: &Record) -> Result<(), StoreError> {
        self.parent_column()?;
        self.mapper.update_parent(child.id(), Some(parent.id()))?;
        child.set_parent_local(Some(parent.id()));
        Ok(())
    }

    pub fn remove_child(&self, child: &Record) -> Result<(), StoreError> {
        self.parent_column()?;
        self.mapper.update_parent(child.id(), None)?;
        child.set_parent_local(None);
        Ok(())
    }

    /// Gives up the caller's handle. When nothing but the registry still
    /// holds the record it is unregistered, its undo/redo entries are
    /// dropped and, if a delete was staged, the row is deleted. Returns
    /// whether the record was freed.
    pub fn release(&self, record: Arc<Record>) -> Result<bool, StoreError> {
        let id = record.id();
        let freed = {
            let mut instances = self.instances();
            let registered = instances
                .get(&id)
                .is_some_and(|entry| Arc::ptr_eq(entry, &record));
            // One count for the registry, one for `record`.
            if registered && Arc::strong_count(&record) == 2 {
                instances.remove(&id);
                true
            } else {
                false
            }
        };
        if !freed {
            return Ok(false);
        }
        self.finalize(record)?;
        Ok(true)
    }

    /// Releases every record that nobody outside the registry holds.
    /// Returns how many were freed.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let unreferenced: Vec<Arc<Record>> = {
            let mut instances = self.instances();
            let ids: Vec<RecordId> = instances
                .iter()
                .filter(|(_, record)| Arc::strong_count(record) == 1)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| instances.remove(id)).collect()
        };
        let freed = unreferenced.len();
        let mut first_error = None;
        for record in unreferenced {
            if let Err(err) = self.finalize(record) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(freed),
        }
    }

    fn finalize(&self, record: Arc<Record>) -> Result<(), StoreError> {
        self.coordinator.forget(&record.undoable());
        tracing::debug!(table = self.schema().table(), id = %record.id(), "record released");
        if record.delete_pending() {
            self.mapper.delete(record.id())?;
            tracing::debug!(table = self.schema().table(), id = %record.id(), "staged delete executed");
        }
        Ok(())
    }

    fn parent_column(&self) -> Result<&str, StoreError> {
        self.schema()
            .parent_key_column()
            .ok_or_else(|| StoreError::NoParentColumn {
                table: self.schema().table().to_string(),
            })
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<RecordId, Arc<Record>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
