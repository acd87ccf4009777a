#![forbid(unsafe_code)]

use crate::cursor_view::CursorPaginatedView;
use crate::database::{Database, SqlStats};
use crate::identity_map::IdentityMap;
use crate::sql_mapper::SqlMapper;
use crate::undo_redo::UndoRedoCoordinator;
use crate::{StoreConfig, StoreError};
use rr_core::{PredicateList, SchemaDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Process-wide context: one connection, one undo/redo coordinator and one
/// identity map per registered record type.
#[derive(Debug)]
pub struct RecordStore {
    config: StoreConfig,
    db: Arc<Database>,
    coordinator: Arc<UndoRedoCoordinator>,
    maps: Mutex<HashMap<String, Arc<IdentityMap>>>,
}

impl RecordStore {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db = Database::open(&config)?;
        tracing::info!(
            storage = %config
                .db_path()
                .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string()),
            fetch_size = config.fetch_size(),
            "record store opened"
        );
        Ok(Self {
            config,
            db: Arc::new(db),
            coordinator: Arc::new(UndoRedoCoordinator::new()),
            maps: Mutex::new(HashMap::new()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn coordinator(&self) -> &Arc<UndoRedoCoordinator> {
        &self.coordinator
    }

    pub fn stats(&self) -> SqlStats {
        self.db.stats()
    }

    /// Creates the table for `schema` if missing and returns the type's
    /// identity map. Registering the same table twice returns the existing
    /// map; a different schema under a known table name is rejected.
    pub fn register(&self, schema: SchemaDescriptor) -> Result<Arc<IdentityMap>, StoreError> {
        let mut maps = self.maps();
        if let Some(existing) = maps.get(schema.table()) {
            if **existing.schema() != schema {
                return Err(StoreError::InvalidInput(
                    "table already registered with a different schema",
                ));
            }
            return Ok(Arc::clone(existing));
        }

        let table = schema.table().to_string();
        let mapper = SqlMapper::new(Arc::clone(&self.db), Arc::new(schema));
        let map = Arc::new(IdentityMap::open(mapper, Arc::clone(&self.coordinator))?);
        tracing::debug!(table = table.as_str(), "record type registered");
        maps.insert(table, Arc::clone(&map));
        Ok(map)
    }

    pub fn identity_map(&self, table: &str) -> Option<Arc<IdentityMap>> {
        self.maps().get(table).cloned()
    }

    /// A view over the rows of `map` matching `filter`, using the
    /// configured fetch size.
    pub fn view(
        &self,
        map: &Arc<IdentityMap>,
        filter: PredicateList,
    ) -> Result<CursorPaginatedView, StoreError> {
        CursorPaginatedView::new(Arc::clone(map), filter, self.config.fetch_size())
    }

    pub fn can_undo(&self) -> bool {
        self.coordinator.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.coordinator.can_redo()
    }

    pub fn undo(&self) -> Result<bool, StoreError> {
        self.coordinator.undo()
    }

    pub fn redo(&self) -> Result<bool, StoreError> {
        self.coordinator.redo()
    }

    fn maps(&self) -> MutexGuard<'_, HashMap<String, Arc<IdentityMap>>> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
