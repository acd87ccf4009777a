#![forbid(unsafe_code)]

use rr_core::ids::RecordId;
use rr_core::{Predicate, PredicateList, SchemaDescriptor, Value};
use rr_storage::{IdentityMap, RecordStore, StoreError};
use std::sync::Arc;

fn note_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder("Note")
        .text("title", true)
        .blob("metadata", false)
        .self_referencing()
        .build()
        .expect("note schema")
}

fn setup() -> (RecordStore, Arc<IdentityMap>) {
    let store = RecordStore::open_in_memory().expect("open store");
    let notes = store.register(note_schema()).expect("register notes");
    (store, notes)
}

fn committed_note(notes: &IdentityMap, title: &str) -> RecordId {
    let note = notes.new_record();
    note.set("title", title).expect("set title");
    note.commit().expect("insert");
    note.id()
}

fn titles(records: &[Arc<rr_storage::Record>]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            record
                .get("title")
                .expect("title")
                .as_text()
                .expect("text")
                .to_string()
        })
        .collect()
}

#[test]
fn same_key_yields_the_same_instance() {
    let (_store, notes) = setup();
    let id = committed_note(&notes, "shared");

    let first = notes.with_id(id);
    let second = notes.with_id(id);
    assert!(Arc::ptr_eq(&first, &second));

    let loaded = notes.load(id).expect("load").expect("row");
    assert!(Arc::ptr_eq(&first, &loaded));
    assert_eq!(notes.live_count(), 1);
}

#[test]
fn concurrent_lookups_agree_on_one_instance() {
    let (_store, notes) = setup();
    let id = RecordId::generate();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let notes = Arc::clone(&notes);
            std::thread::spawn(move || notes.with_id(id))
        })
        .collect();
    let records: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();

    assert!(records.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(notes.live_count(), 1);
}

#[test]
fn fresh_instances_start_with_defaults() {
    let (_store, notes) = setup();
    let note = notes.with_id(RecordId::generate());
    assert!(!note.is_new());
    assert_eq!(note.get("title").expect("title"), Value::from(""));
    assert_eq!(note.get("metadata").expect("metadata"), Value::Null);
    assert_eq!(note.parent_id(), None);
}

#[test]
fn loading_a_missing_key_returns_none() {
    let (_store, notes) = setup();
    assert!(notes.load(RecordId::generate()).expect("load").is_none());
}

#[test]
fn find_matches_like_patterns() {
    let (_store, notes) = setup();
    for title in ["yeet one", "hello", "yeet two", "bye"] {
        committed_note(&notes, title);
    }

    let found = notes
        .find(&PredicateList::all([Predicate::like("title", "%ye%")]))
        .expect("find");
    assert_eq!(titles(&found), vec!["yeet one", "yeet two", "bye"]);

    let either = notes
        .find(&PredicateList::any([
            Predicate::equals("title", "hello"),
            Predicate::equals("title", "bye"),
        ]))
        .expect("find any");
    assert_eq!(titles(&either), vec!["hello", "bye"]);
}

#[test]
fn like_matches_substrings_only() {
    let (_store, notes) = setup();
    for title in ["yeet one", "abc", "yelled"] {
        committed_note(&notes, title);
    }
    let found = notes
        .find(&PredicateList::all([Predicate::like("title", "%ye%")]))
        .expect("find");
    assert_eq!(titles(&found), vec!["yeet one", "yelled"]);
}

#[test]
fn find_rejects_columns_outside_the_schema() {
    let (_store, notes) = setup();
    let err = notes
        .find(&PredicateList::all([Predicate::equals("nope", 1_i64)]))
        .expect_err("unknown column");
    assert!(matches!(err, StoreError::UnknownColumn { .. }));
}

#[test]
fn find_keeps_pending_edits() {
    let (_store, notes) = setup();
    let id = committed_note(&notes, "stored");
    let note = notes.with_id(id);
    note.set("title", "editing").expect("edit");

    let found = notes
        .find(&PredicateList::all([Predicate::equals("title", "stored")]))
        .expect("find");
    assert_eq!(found.len(), 1);
    assert!(Arc::ptr_eq(&found[0], &note));
    assert_eq!(note.get("title").expect("title"), Value::from("editing"));
    assert!(note.is_dirty());
}

#[test]
fn children_follow_the_parent_column() {
    let (_store, notes) = setup();
    let parent = notes.with_id(committed_note(&notes, "parent"));
    let first = notes.with_id(committed_note(&notes, "first"));
    let second = notes.with_id(committed_note(&notes, "second"));
    committed_note(&notes, "unrelated");

    notes.add_child(&parent, &first).expect("add first");
    notes.add_child(&parent, &second).expect("add second");
    assert_eq!(first.parent_id(), Some(parent.id()));

    let children = notes.children(parent.id()).expect("children");
    assert_eq!(titles(&children), vec!["first", "second"]);

    notes.remove_child(&first).expect("remove first");
    assert_eq!(first.parent_id(), None);
    let children = notes.children(parent.id()).expect("children after remove");
    assert_eq!(titles(&children), vec!["second"]);
}

#[test]
fn child_created_before_commit_keeps_its_parent() {
    let (_store, notes) = setup();
    let parent = notes.with_id(committed_note(&notes, "parent"));
    let child = notes.new_record();
    child.set("title", "child").expect("set");
    child.commit().expect("insert");
    notes.add_child(&parent, &child).expect("add child");

    // A later whole-row write carries the parent column along.
    child.stage_delete();
    child.commit().expect("re-save");
    let children = notes.children(parent.id()).expect("children");
    assert_eq!(titles(&children), vec!["child"]);
}

#[test]
fn relations_require_a_parent_column() {
    let store = RecordStore::open_in_memory().expect("open store");
    let flat = store
        .register(
            SchemaDescriptor::builder("Flat")
                .text("name", false)
                .build()
                .expect("flat schema"),
        )
        .expect("register flat");
    let err = flat.children(RecordId::generate()).expect_err("no parent");
    assert!(matches!(err, StoreError::NoParentColumn { .. }));
}

#[test]
fn release_runs_the_staged_delete() {
    let (store, notes) = setup();
    let id = committed_note(&notes, "doomed");
    let note = notes.with_id(id);
    note.stage_delete();
    assert!(note.delete_pending());

    let extra = Arc::clone(&note);
    assert!(!notes.release(extra).expect("still shared"));
    assert!(notes.contains(id));

    let before = store.stats();
    assert!(notes.release(note).expect("release"));
    assert_eq!(store.stats().deletes - before.deletes, 1);
    assert!(!notes.contains(id));
    assert!(notes.load(id).expect("load").is_none());
}

#[test]
fn committing_clears_a_staged_delete() {
    let (store, notes) = setup();
    let id = committed_note(&notes, "saved");
    let note = notes.with_id(id);
    note.stage_delete();
    note.commit().expect("re-save");
    assert!(!note.delete_pending());

    let before = store.stats();
    assert!(notes.release(note).expect("release"));
    assert_eq!(store.stats().deletes, before.deletes);
    assert!(notes.load(id).expect("load").is_some());
}

#[test]
fn sweep_frees_unreferenced_records() {
    let (_store, notes) = setup();
    let kept = notes.with_id(committed_note(&notes, "kept"));
    committed_note(&notes, "dropped");
    assert_eq!(notes.live_count(), 2);

    assert_eq!(notes.sweep().expect("sweep"), 1);
    assert_eq!(notes.live_count(), 1);
    assert!(notes.contains(kept.id()));
}

#[test]
fn registering_a_table_twice_shares_the_map() {
    let store = RecordStore::open_in_memory().expect("open store");
    let first = store.register(note_schema()).expect("register");
    let second = store.register(note_schema()).expect("register again");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(store.identity_map("Note").is_some());

    let clash = SchemaDescriptor::builder("Note")
        .integer("count", true)
        .build()
        .expect("clashing schema");
    assert!(matches!(
        store.register(clash),
        Err(StoreError::InvalidInput(_))
    ));
}
