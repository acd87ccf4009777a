#![forbid(unsafe_code)]

use crate::observers::{Observers, SubscriptionId};
use crate::sql_mapper::{RowData, SqlMapper};
use crate::undo_redo::{UndoRedoCoordinator, Undoable};
use crate::StoreError;
use rr_core::ids::RecordId;
use rr_core::{ChangeSet, SchemaDescriptor, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordEvent {
    FieldChanged { field: String },
    DirtyChanged(bool),
    CanUndoChanged(bool),
    CanRedoChanged(bool),
    PendingDeleteChanged(bool),
    ParentChanged(Option<RecordId>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The whole row was written with INSERT OR REPLACE, keeping the
    /// `rowid` of a row that already existed.
    Inserted,
    /// One UPDATE per listed field.
    Updated { fields: Vec<String> },
    Unchanged,
}

#[derive(Clone, Debug)]
struct FieldSlot {
    current: Value,
    baseline: Value,
    dirty: bool,
}

impl FieldSlot {
    fn new(value: Value) -> Self {
        Self {
            current: value.clone(),
            baseline: value,
            dirty: false,
        }
    }
}

#[derive(Debug)]
struct RecordState {
    is_new: bool,
    delete_pending: bool,
    dirty: bool,
    can_undo: bool,
    can_redo: bool,
    parent: Option<RecordId>,
    fields: Vec<FieldSlot>,
    undo_stack: Vec<ChangeSet>,
    redo_stack: Vec<ChangeSet>,
}

impl RecordState {
    fn refresh_flags(&mut self, events: &mut Vec<RecordEvent>) {
        let dirty = self.fields.iter().any(|slot| slot.dirty);
        if dirty != self.dirty {
            self.dirty = dirty;
            events.push(RecordEvent::DirtyChanged(dirty));
        }
        let can_undo = !self.undo_stack.is_empty();
        if can_undo != self.can_undo {
            self.can_undo = can_undo;
            events.push(RecordEvent::CanUndoChanged(can_undo));
        }
        let can_redo = !self.redo_stack.is_empty();
        if can_redo != self.can_redo {
            self.can_redo = can_redo;
            events.push(RecordEvent::CanRedoChanged(can_redo));
        }
    }
}

#[derive(Clone, Copy)]
enum History {
    Undo,
    Redo,
}

/// One identity-mapped row. Field edits are tracked against the last
/// committed baseline; commits push change sets that undo/redo replay.
///
/// Mutations lock only this record's state. Callers that share a record
/// across threads must still order their edits themselves.
pub struct Record {
    id: RecordId,
    this: Weak<Record>,
    mapper: SqlMapper,
    coordinator: Arc<UndoRedoCoordinator>,
    state: Mutex<RecordState>,
    observers: Observers<RecordEvent>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Record")
            .field("table", &self.schema().table())
            .field("id", &self.id)
            .field("is_new", &state.is_new)
            .field("delete_pending", &state.delete_pending)
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl Record {
    pub(crate) fn new(
        id: RecordId,
        is_new: bool,
        mapper: SqlMapper,
        coordinator: Arc<UndoRedoCoordinator>,
    ) -> Arc<Self> {
        let fields = mapper
            .schema()
            .fields()
            .iter()
            .map(|field| FieldSlot::new(field.default_value()))
            .collect();
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            mapper,
            coordinator,
            state: Mutex::new(RecordState {
                is_new,
                delete_pending: false,
                dirty: false,
                can_undo: false,
                can_redo: false,
                parent: None,
                fields,
                undo_stack: Vec::new(),
                redo_stack: Vec::new(),
            }),
            observers: Observers::default(),
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        self.mapper.schema()
    }

    pub fn is_new(&self) -> bool {
        self.state().is_new
    }

    pub fn delete_pending(&self) -> bool {
        self.state().delete_pending
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub fn is_field_dirty(&self, field: &str) -> Result<bool, StoreError> {
        let index = self.field_index(field)?;
        Ok(self.state().fields[index].dirty)
    }

    pub fn can_undo(&self) -> bool {
        self.state().can_undo
    }

    pub fn can_redo(&self) -> bool {
        self.state().can_redo
    }

    pub fn undo_depth(&self) -> usize {
        self.state().undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.state().redo_stack.len()
    }

    pub fn parent_id(&self) -> Option<RecordId> {
        self.state().parent
    }

    pub fn get(&self, field: &str) -> Result<Value, StoreError> {
        let index = self.field_index(field)?;
        Ok(self.state().fields[index].current.clone())
    }

    pub fn values(&self) -> BTreeMap<String, Value> {
        let state = self.state();
        self.schema()
            .field_names()
            .zip(state.fields.iter())
            .map(|(name, slot)| (name.to_string(), slot.current.clone()))
            .collect()
    }

    pub fn subscribe(&self, listener: impl Fn(&RecordEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Returns `false` when `value` equals the current value. A fresh edit
    /// discards this record's redo history.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<bool, StoreError> {
        let value = value.into();
        let index = self.field_index(field)?;
        let descriptor = &self.schema().fields()[index];
        if !value.fits(descriptor.field_type(), descriptor.not_null()) {
            return Err(StoreError::TypeMismatch {
                field: field.to_string(),
                expected: descriptor.field_type().sql_type(),
                actual: value.type_name(),
            });
        }

        let mut events = Vec::new();
        let cleared = {
            let mut state = self.state();
            let slot = &mut state.fields[index];
            if slot.current == value {
                return Ok(false);
            }
            slot.current = value;
            slot.dirty = slot.current != slot.baseline;
            events.push(RecordEvent::FieldChanged {
                field: field.to_string(),
            });
            let cleared = state.redo_stack.len();
            state.redo_stack.clear();
            state.refresh_flags(&mut events);
            cleared
        };

        let undoable = self.undoable();
        for _ in 0..cleared {
            self.coordinator.redo_item_removed(&undoable);
        }
        self.observers.emit_all(&events);
        Ok(true)
    }

    pub fn discard_field_changes(&self, field: &str) -> Result<bool, StoreError> {
        let index = self.field_index(field)?;
        let mut events = Vec::new();
        {
            let mut state = self.state();
            let slot = &mut state.fields[index];
            if !slot.dirty {
                return Ok(false);
            }
            slot.current = slot.baseline.clone();
            slot.dirty = false;
            events.push(RecordEvent::FieldChanged {
                field: field.to_string(),
            });
            state.refresh_flags(&mut events);
        }
        self.observers.emit_all(&events);
        Ok(true)
    }

    pub fn discard_all_changes(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            for (slot, name) in state.fields.iter_mut().zip(self.schema().field_names()) {
                if slot.dirty {
                    slot.current = slot.baseline.clone();
                    slot.dirty = false;
                    events.push(RecordEvent::FieldChanged {
                        field: name.to_string(),
                    });
                }
            }
            state.refresh_flags(&mut events);
        }
        self.observers.emit_all(&events);
    }

    /// Marks the row for deletion. The DELETE runs when the record is
    /// released from its identity map; committing first re-saves the row
    /// and clears the mark.
    pub fn stage_delete(&self) {
        let changed = {
            let mut state = self.state();
            let changed = !state.delete_pending;
            state.delete_pending = true;
            changed
        };
        if changed {
            self.observers.emit(&RecordEvent::PendingDeleteChanged(true));
        }
    }

    /// New (or delete-pending) records are written whole with one
    /// INSERT OR REPLACE and gain no undo history. Otherwise every dirty
    /// field gets its own UPDATE, in schema order, with no enclosing
    /// transaction: on the first failing field the commit stops, earlier
    /// fields stay persisted, and the returned error lists them.
    pub fn commit(&self) -> Result<CommitOutcome, StoreError> {
        let mut events = Vec::new();
        let (result, undo_added) = {
            let mut state = self.state();
            if state.is_new || state.delete_pending {
                (self.commit_insert(&mut state, &mut events), false)
            } else {
                self.commit_updates(&mut state, &mut events)
            }
        };
        if undo_added {
            self.coordinator.undo_item_added(&self.undoable());
        }
        self.observers.emit_all(&events);
        result
    }

    fn commit_insert(
        &self,
        state: &mut RecordState,
        events: &mut Vec<RecordEvent>,
    ) -> Result<CommitOutcome, StoreError> {
        let values: Vec<Value> = state.fields.iter().map(|slot| slot.current.clone()).collect();
        self.mapper.insert_or_replace(self.id, &values, state.parent)?;

        state.is_new = false;
        for slot in &mut state.fields {
            slot.baseline = slot.current.clone();
            slot.dirty = false;
        }
        if state.delete_pending {
            state.delete_pending = false;
            events.push(RecordEvent::PendingDeleteChanged(false));
        }
        state.refresh_flags(events);
        tracing::debug!(table = self.schema().table(), id = %self.id, "record inserted");
        Ok(CommitOutcome::Inserted)
    }

    fn commit_updates(
        &self,
        state: &mut RecordState,
        events: &mut Vec<RecordEvent>,
    ) -> (Result<CommitOutcome, StoreError>, bool) {
        let schema = Arc::clone(self.schema());
        let mut changes = ChangeSet::new();
        let mut persisted = Vec::new();
        let mut failure = None;

        for (index, field) in schema.fields().iter().enumerate() {
            let slot = &mut state.fields[index];
            if !slot.dirty {
                continue;
            }
            match self.mapper.update_field(self.id, field.name(), &slot.current) {
                Ok(()) => {
                    let previous = std::mem::replace(&mut slot.baseline, slot.current.clone());
                    slot.dirty = false;
                    changes.record(field.name(), previous);
                    persisted.push(field.name().to_string());
                }
                Err(err) => {
                    failure = Some((field.name().to_string(), err));
                    break;
                }
            }
        }

        let undo_added = !changes.is_empty();
        if undo_added {
            state.undo_stack.push(changes);
        }
        state.refresh_flags(events);

        let result = match failure {
            None if persisted.is_empty() => Ok(CommitOutcome::Unchanged),
            None => Ok(CommitOutcome::Updated { fields: persisted }),
            Some((_, err)) if persisted.is_empty() => Err(err),
            Some((field, err)) => {
                tracing::error!(
                    table = schema.table(),
                    id = %self.id,
                    failed_field = field.as_str(),
                    persisted = ?persisted,
                    "commit stopped after a failed field update"
                );
                Err(StoreError::PartialCommit {
                    table: schema.table().to_string(),
                    field,
                    persisted,
                    cause: Box::new(err),
                })
            }
        };
        (result, undo_added)
    }

    /// Returns `false` when the undo stack is empty.
    pub fn undo(&self) -> Result<bool, StoreError> {
        self.replay(History::Undo)
    }

    /// Returns `false` when the redo stack is empty.
    pub fn redo(&self) -> Result<bool, StoreError> {
        self.replay(History::Redo)
    }

    /// Pops a change set, swaps its values with the current ones, writes
    /// the restored values through and pushes the set onto the other stack.
    /// A pending edit on an affected field moves into the set, so the
    /// opposite replay restores it. A field whose write fails stays dirty
    /// against the value still in the store.
    fn replay(&self, history: History) -> Result<bool, StoreError> {
        let schema = Arc::clone(self.schema());
        let mut events = Vec::new();
        let mut failure = None;
        {
            let mut state = self.state();
            let popped = match history {
                History::Undo => state.undo_stack.pop(),
                History::Redo => state.redo_stack.pop(),
            };
            let Some(mut changes) = popped else {
                return Ok(false);
            };

            for (index, field) in schema.fields().iter().enumerate() {
                let Some(stored) = changes.get_mut(field.name()) else {
                    continue;
                };
                let slot = &mut state.fields[index];
                // The outgoing value is the current one, pending edit included,
                // so replaying the other way brings it back.
                let restored = std::mem::replace(stored, slot.current.clone());
                if slot.current != restored {
                    slot.current = restored;
                    events.push(RecordEvent::FieldChanged {
                        field: field.name().to_string(),
                    });
                }

                if failure.is_none() {
                    match self.mapper.update_field(self.id, field.name(), &slot.current) {
                        Ok(()) => slot.baseline = slot.current.clone(),
                        Err(err) => failure = Some(err),
                    }
                }
                slot.dirty = slot.current != slot.baseline;
            }

            match history {
                History::Undo => state.redo_stack.push(changes),
                History::Redo => state.undo_stack.push(changes),
            }
            state.refresh_flags(&mut events);
        }

        let undoable = self.undoable();
        match history {
            History::Undo => {
                self.coordinator.undo_item_removed(&undoable);
                self.coordinator.redo_item_added(&undoable);
            }
            History::Redo => {
                self.coordinator.redo_item_removed(&undoable);
                self.coordinator.undo_item_added(&undoable);
            }
        }
        self.observers.emit_all(&events);

        match failure {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Takes stored values for every field without a pending edit.
    pub(crate) fn hydrate(&self, row: &RowData) {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            for (slot, name) in state.fields.iter_mut().zip(self.schema().field_names()) {
                if slot.dirty {
                    continue;
                }
                let Some(value) = row.fields.get(name) else {
                    continue;
                };
                if &slot.current != value || &slot.baseline != value {
                    slot.current = value.clone();
                    slot.baseline = value.clone();
                    events.push(RecordEvent::FieldChanged {
                        field: name.to_string(),
                    });
                }
            }
            if state.parent != row.parent {
                state.parent = row.parent;
                events.push(RecordEvent::ParentChanged(row.parent));
            }
        }
        self.observers.emit_all(&events);
    }

    pub(crate) fn set_parent_local(&self, parent: Option<RecordId>) {
        let changed = {
            let mut state = self.state();
            let changed = state.parent != parent;
            state.parent = parent;
            changed
        };
        if changed {
            self.observers.emit(&RecordEvent::ParentChanged(parent));
        }
    }

    pub(crate) fn undoable(&self) -> Weak<dyn Undoable> {
        self.this.clone() as Weak<dyn Undoable>
    }

    fn field_index(&self, field: &str) -> Result<usize, StoreError> {
        self.schema()
            .field_index(field)
            .ok_or_else(|| StoreError::UnknownField {
                table: self.schema().table().to_string(),
                field: field.to_string(),
            })
    }

    fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Undoable for Record {
    fn undo(&self) -> Result<bool, StoreError> {
        Record::undo(self)
    }

    fn redo(&self) -> Result<bool, StoreError> {
        Record::redo(self)
    }

    fn can_undo(&self) -> bool {
        Record::can_undo(self)
    }

    fn can_redo(&self) -> bool {
        Record::can_redo(self)
    }
}
