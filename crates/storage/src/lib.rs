#![forbid(unsafe_code)]

mod config;
mod context;
mod cursor_view;
mod database;
mod error;
mod identity_map;
mod observers;
mod record;
mod sql_mapper;
mod undo_redo;

pub use config::*;
pub use context::RecordStore;
pub use cursor_view::{
    CHILDREN_ROLE, CursorPaginatedView, RECORD_ROLE, Role, RoleValue, SharedView, ViewEvent,
};
pub use database::{Database, SqlStats};
pub use error::StoreError;
pub use identity_map::IdentityMap;
pub use observers::{Observers, SubscriptionId};
pub use record::{CommitOutcome, Record, RecordEvent};
pub use sql_mapper::{
    RowData, SqlMapper, create_table_sql, delete_sql, insert_or_replace_sql, select_keys_sql,
    select_sql, update_column_sql,
};
pub use undo_redo::{CoordinatorEvent, UndoRedoCoordinator, Undoable};
