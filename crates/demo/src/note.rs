#![forbid(unsafe_code)]

use rr_core::ids::RecordId;
use rr_core::{SchemaDescriptor, Value};
use rr_storage::{CommitOutcome, IdentityMap, Record, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TABLE: &str = "Note";
pub const TITLE: &str = "title";
pub const METADATA: &str = "metadata";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    pub tags: Vec<String>,
    pub pinned: bool,
}

pub fn schema() -> Result<SchemaDescriptor, StoreError> {
    Ok(SchemaDescriptor::builder(TABLE)
        .text(TITLE, true)
        .blob(METADATA, false)
        .self_referencing()
        .build()?)
}

pub fn register(store: &RecordStore) -> Result<Arc<IdentityMap>, StoreError> {
    store.register(schema()?)
}

/// Typed accessors over a `Note` record.
#[derive(Clone, Debug)]
pub struct Note {
    record: Arc<Record>,
}

impl Note {
    pub fn create(notes: &IdentityMap) -> Self {
        Self {
            record: notes.new_record(),
        }
    }

    pub fn with_id(notes: &IdentityMap, id: RecordId) -> Self {
        Self {
            record: notes.with_id(id),
        }
    }

    pub fn from_record(record: Arc<Record>) -> Self {
        Self { record }
    }

    pub fn id(&self) -> RecordId {
        self.record.id()
    }

    pub fn record(&self) -> &Arc<Record> {
        &self.record
    }

    pub fn title(&self) -> Result<String, StoreError> {
        let value = self.record.get(TITLE)?;
        Ok(value.as_text().unwrap_or_default().to_string())
    }

    pub fn set_title(&self, title: impl Into<String>) -> Result<bool, StoreError> {
        self.record.set(TITLE, title.into())
    }

    pub fn metadata(&self) -> Result<NoteMetadata, StoreError> {
        let value = self.record.get(METADATA)?;
        let decoded = value
            .decode::<NoteMetadata>()
            .map_err(|_| StoreError::InvalidInput("note metadata is not valid json"))?;
        Ok(decoded.unwrap_or_default())
    }

    pub fn set_metadata(&self, metadata: &NoteMetadata) -> Result<bool, StoreError> {
        let value = Value::encode(metadata)
            .map_err(|_| StoreError::InvalidInput("note metadata cannot be encoded"))?;
        self.record.set(METADATA, value)
    }

    pub fn save(&self) -> Result<CommitOutcome, StoreError> {
        self.record.commit()
    }

    pub fn children(&self, notes: &IdentityMap) -> Result<Vec<Note>, StoreError> {
        Ok(notes
            .children(self.id())?
            .into_iter()
            .map(Note::from_record)
            .collect())
    }

    pub fn add_child(&self, notes: &IdentityMap, child: &Note) -> Result<(), StoreError> {
        notes.add_child(&self.record, &child.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_round_trip() {
        let store = RecordStore::open_in_memory().expect("open store");
        let notes = register(&store).expect("register notes");
        let note = Note::create(&notes);
        assert_eq!(note.metadata().expect("empty metadata"), NoteMetadata::default());

        let metadata = NoteMetadata {
            tags: vec!["inbox".to_string()],
            pinned: true,
        };
        note.set_title("hello").expect("set title");
        note.set_metadata(&metadata).expect("set metadata");
        note.save().expect("save");

        let same = Note::with_id(&notes, note.id());
        assert_eq!(same.title().expect("title"), "hello");
        assert_eq!(same.metadata().expect("metadata"), metadata);
    }

    #[test]
    fn children_are_typed_notes() {
        let store = RecordStore::open_in_memory().expect("open store");
        let notes = register(&store).expect("register notes");
        let parent = Note::create(&notes);
        parent.set_title("parent").expect("set title");
        parent.save().expect("save parent");
        let child = Note::create(&notes);
        child.set_title("child").expect("set title");
        child.save().expect("save child");

        parent.add_child(&notes, &child).expect("add child");
        let children = parent.children(&notes).expect("children");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title().expect("title"), "child");
    }
}
