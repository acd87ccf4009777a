#![forbid(unsafe_code)]

use crate::identity_map::IdentityMap;
use crate::observers::{Observers, SubscriptionId};
use crate::record::Record;
use crate::StoreError;
use rr_core::ids::RecordId;
use rr_core::{Predicate, PredicateList, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type SharedView = Arc<Mutex<CursorPaginatedView>>;

pub const CHILDREN_ROLE: &str = "children";
pub const RECORD_ROLE: &str = "record";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Field(String),
    /// View of the rows whose parent key is this row's key.
    Children,
    /// The identity-mapped record itself.
    Record,
}

impl Role {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Field(name) => name,
            Self::Children => CHILDREN_ROLE,
            Self::Record => RECORD_ROLE,
        }
    }
}

#[derive(Clone)]
pub enum RoleValue {
    Value(Value),
    Children(SharedView),
    Record(Arc<Record>),
}

impl std::fmt::Debug for RoleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Children(_) => f.write_str("Children(..)"),
            Self::Record(record) => f.debug_tuple("Record").field(&record.id()).finish(),
        }
    }
}

impl RoleValue {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_children(self) -> Option<SharedView> {
        match self {
            Self::Children(view) => Some(view),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Arc<Record>> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewEvent {
    /// Rows `[first, last)` became visible.
    RowsInserted { first: usize, last: usize },
    DataChanged { row: usize, role: Role },
    StagingChanged,
    Reset,
}

/// Lazily grown window over a SELECT. Only the primary keys of confirmed
/// rows are read up front; records are resolved through the identity map
/// on first access and cached by row index.
pub struct CursorPaginatedView {
    map: Arc<IdentityMap>,
    filter: PredicateList,
    parent: Option<RecordId>,
    fetch_size: usize,
    keys: Vec<RecordId>,
    bottom: usize,
    at_end: bool,
    items: HashMap<usize, Arc<Record>>,
    children: HashMap<RecordId, SharedView>,
    staging: Option<Arc<Record>>,
    observers: Observers<ViewEvent>,
}

impl std::fmt::Debug for CursorPaginatedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorPaginatedView")
            .field("table", &self.map.schema().table())
            .field("parent", &self.parent)
            .field("bottom", &self.bottom)
            .field("at_end", &self.at_end)
            .finish()
    }
}

impl CursorPaginatedView {
    /// Runs the filtered SELECT and confirms the first `fetch_size` rows.
    pub fn new(
        map: Arc<IdentityMap>,
        filter: PredicateList,
        fetch_size: usize,
    ) -> Result<Self, StoreError> {
        Self::build(map, filter, None, fetch_size)
    }

    /// Rows whose parent key column equals `parent`.
    pub fn with_parent(
        map: Arc<IdentityMap>,
        parent: RecordId,
        fetch_size: usize,
    ) -> Result<Self, StoreError> {
        let column = map
            .schema()
            .parent_key_column()
            .ok_or_else(|| StoreError::NoParentColumn {
                table: map.schema().table().to_string(),
            })?
            .to_string();
        let filter = PredicateList::all([Predicate::equals(column, parent)]);
        Self::build(map, filter, Some(parent), fetch_size)
    }

    fn build(
        map: Arc<IdentityMap>,
        filter: PredicateList,
        parent: Option<RecordId>,
        fetch_size: usize,
    ) -> Result<Self, StoreError> {
        if fetch_size == 0 {
            return Err(StoreError::InvalidInput("fetch size must be positive"));
        }
        let mut view = Self {
            map,
            filter,
            parent,
            fetch_size,
            keys: Vec::new(),
            bottom: 0,
            at_end: false,
            items: HashMap::new(),
            children: HashMap::new(),
            staging: None,
            observers: Observers::default(),
        };
        view.prefetch(fetch_size)?;
        Ok(view)
    }

    pub fn subscribe(&self, listener: impl Fn(&ViewEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.map
    }

    pub fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn row_count(&self) -> usize {
        self.bottom
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn can_fetch_more(&self) -> bool {
        !self.at_end
    }

    pub fn fetch_more(&mut self) -> Result<(), StoreError> {
        self.prefetch(self.bottom.saturating_add(self.fetch_size))
    }

    /// Confirms rows `[0, to_row)`. A no-op past the end or when `to_row`
    /// does not exceed the current bottom. If fewer rows exist the window
    /// stops at the last one and is marked as at the end.
    pub fn prefetch(&mut self, to_row: usize) -> Result<(), StoreError> {
        if self.at_end || to_row <= self.bottom {
            return Ok(());
        }
        let old_bottom = self.bottom;
        let new_bottom = if self.seek(to_row)? {
            to_row
        } else {
            self.at_end = true;
            self.keys.len()
        };
        if new_bottom > old_bottom {
            self.bottom = new_bottom;
            self.observers.emit(&ViewEvent::RowsInserted {
                first: old_bottom,
                last: new_bottom,
            });
        }
        Ok(())
    }

    /// Positions the cursor so that `count` rows are known, reading keys
    /// forward from the last one seen. Returns `false` when the result has
    /// fewer rows.
    fn seek(&mut self, count: usize) -> Result<bool, StoreError> {
        if self.keys.len() >= count {
            return Ok(true);
        }
        let offset = self.keys.len();
        let page = self
            .map
            .mapper()
            .select_keys(&self.filter, offset, count - offset)?;
        self.keys.extend(page);
        Ok(self.keys.len() >= count)
    }

    /// Drops the window and re-runs the SELECT from the first row.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.keys.clear();
        self.items.clear();
        self.children.clear();
        self.bottom = 0;
        self.at_end = false;
        self.observers.emit(&ViewEvent::Reset);
        self.prefetch(self.fetch_size)
    }

    pub fn role_names(&self) -> Vec<Role> {
        let schema = self.map.schema();
        let mut roles: Vec<Role> = schema.field_names().map(Role::field).collect();
        if schema.parent_key_column().is_some() {
            roles.push(Role::Children);
        }
        roles.push(Role::Record);
        roles
    }

    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        self.role_names().into_iter().find(|role| role.name() == name)
    }

    pub fn record(&mut self, row: usize) -> Result<Arc<Record>, StoreError> {
        if row >= self.bottom {
            return Err(StoreError::RowOutOfRange {
                row,
                row_count: self.bottom,
            });
        }
        if let Some(record) = self.items.get(&row) {
            return Ok(Arc::clone(record));
        }

        let id = self.keys[row];
        let record = if self.map.contains(id) {
            self.map.with_id(id)
        } else {
            self.map.load(id)?.ok_or_else(|| StoreError::InvalidRow {
                table: self.map.schema().table().to_string(),
                message: "row no longer exists",
            })?
        };
        self.items.insert(row, Arc::clone(&record));
        Ok(record)
    }

    pub fn data(&mut self, row: usize, role: &Role) -> Result<RoleValue, StoreError> {
        let record = self.record(row)?;
        match role {
            Role::Field(name) => Ok(RoleValue::Value(record.get(name)?)),
            Role::Children => Ok(RoleValue::Children(self.child_view(record.id())?)),
            Role::Record => Ok(RoleValue::Record(record)),
        }
    }

    /// Field edits go through [`Record::set`], so they join the record's
    /// dirty tracking and undo history. Returns whether the value changed.
    pub fn set_data(&mut self, row: usize, role: &Role, value: Value) -> Result<bool, StoreError> {
        let Role::Field(name) = role else {
            return Err(StoreError::InvalidInput("only field roles are editable"));
        };
        let record = self.record(row)?;
        let changed = record.set(name, value)?;
        if changed {
            self.observers.emit(&ViewEvent::DataChanged {
                row,
                role: role.clone(),
            });
        }
        Ok(changed)
    }

    /// Cached per parent key, so repeated lookups share one view.
    pub fn child_view(&mut self, parent: RecordId) -> Result<SharedView, StoreError> {
        if let Some(view) = self.children.get(&parent) {
            return Ok(Arc::clone(view));
        }
        let view = Arc::new(Mutex::new(Self::with_parent(
            Arc::clone(&self.map),
            parent,
            self.fetch_size,
        )?));
        self.children.insert(parent, Arc::clone(&view));
        Ok(view)
    }

    pub fn staging(&self) -> Option<&Arc<Record>> {
        self.staging.as_ref()
    }

    /// Starts a new record that becomes a row once committed. In a child
    /// view the record is attached to the view's parent.
    pub fn create_staging(&mut self) -> Arc<Record> {
        let record = self.map.new_record();
        if let Some(parent) = self.parent {
            record.set_parent_local(Some(parent));
        }
        self.staging = Some(Arc::clone(&record));
        self.observers.emit(&ViewEvent::StagingChanged);
        record
    }

    /// Commits the staged record and fetches the rows that follow the
    /// current bottom, which picks the new row up.
    pub fn commit_staging(&mut self) -> Result<Option<Arc<Record>>, StoreError> {
        let Some(record) = self.staging.take() else {
            return Ok(None);
        };
        if let Err(err) = record.commit() {
            self.staging = Some(record);
            return Err(err);
        }
        self.at_end = false;
        self.prefetch(self.bottom.saturating_add(self.fetch_size))?;
        self.observers.emit(&ViewEvent::StagingChanged);
        Ok(Some(record))
    }

    pub fn discard_staging(&mut self) -> Option<Arc<Record>> {
        let record = self.staging.take();
        if record.is_some() {
            self.observers.emit(&ViewEvent::StagingChanged);
        }
        record
    }
}
