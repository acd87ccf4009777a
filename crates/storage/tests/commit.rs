#![forbid(unsafe_code)]

use rr_core::{SchemaDescriptor, Value};
use rr_storage::{CommitOutcome, RecordStore, StoreConfig, StoreError};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("rr_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn item_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder("Item")
        .text("a", false)
        .text("b", false)
        .text("c", false)
        .build()
        .expect("item schema")
}

#[test]
fn first_commit_inserts_then_updates_only_dirty_fields() {
    let store = RecordStore::open_in_memory().expect("open store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.new_record();
    assert!(item.is_new());

    item.set("a", "a0").expect("set a");
    let before = store.stats();
    assert_eq!(item.commit().expect("insert"), CommitOutcome::Inserted);
    let after_insert = store.stats();
    assert_eq!(after_insert.inserts - before.inserts, 1);
    assert_eq!(after_insert.updates, before.updates);
    assert!(!item.is_new());
    assert!(!item.can_undo());

    item.set("a", "a1").expect("set a");
    item.set("c", "c1").expect("set c");
    assert!(item.is_field_dirty("a").expect("a"));
    assert!(!item.is_field_dirty("b").expect("b"));

    let outcome = item.commit().expect("commit");
    assert_eq!(
        outcome,
        CommitOutcome::Updated {
            fields: vec!["a".to_string(), "c".to_string()]
        }
    );
    let after_update = store.stats();
    assert_eq!(after_update.updates - after_insert.updates, 2);
    assert_eq!(after_update.inserts, after_insert.inserts);
    assert!(!item.is_dirty());
    assert_eq!(item.undo_depth(), 1);

    assert_eq!(item.commit().expect("no-op"), CommitOutcome::Unchanged);
    assert_eq!(store.stats(), after_update);
}

#[test]
fn editing_back_to_the_baseline_is_not_dirty() {
    let store = RecordStore::open_in_memory().expect("open store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.new_record();
    item.set("a", "same").expect("set");
    item.commit().expect("insert");

    item.set("a", "other").expect("set other");
    assert!(item.is_dirty());
    item.set("a", "same").expect("set back");
    assert!(!item.is_dirty());
    assert!(!item.set("a", "same").expect("unchanged"));
    assert_eq!(item.commit().expect("commit"), CommitOutcome::Unchanged);
}

#[test]
fn discarding_restores_committed_values() {
    let store = RecordStore::open_in_memory().expect("open store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.new_record();
    item.set("a", "kept").expect("set");
    item.commit().expect("insert");

    item.set("a", "draft").expect("draft a");
    item.set("b", "draft").expect("draft b");
    assert!(item.discard_field_changes("a").expect("discard a"));
    assert_eq!(item.get("a").expect("a"), Value::from("kept"));
    assert!(item.is_dirty());

    item.discard_all_changes();
    assert_eq!(item.get("b").expect("b"), Value::Null);
    assert!(!item.is_dirty());
}

#[test]
fn setters_reject_unknown_fields_and_wrong_types() {
    let store = RecordStore::open_in_memory().expect("open store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.new_record();

    let err = item.set("missing", "x").expect_err("unknown field");
    assert!(matches!(err, StoreError::UnknownField { .. }));

    let err = item.set("a", 7_i64).expect_err("wrong type");
    assert!(matches!(
        err,
        StoreError::TypeMismatch {
            expected: "TEXT",
            actual: "integer",
            ..
        }
    ));
    assert!(!item.is_dirty());
}

#[test]
fn failed_field_update_reports_partial_commit() {
    let storage_dir = temp_dir("failed_field_update_reports_partial_commit");
    {
        let conn = rusqlite::Connection::open(storage_dir.join("records.db")).expect("raw open");
        conn.execute_batch(
            "CREATE TABLE Item (
                ID BLOB NOT NULL,
                a TEXT,
                b TEXT CHECK (b <> 'bad'),
                c TEXT,
                PRIMARY KEY (ID)
            )",
        )
        .expect("create constrained table");
    }

    let store = RecordStore::open(StoreConfig::on_disk(&storage_dir)).expect("open store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.new_record();
    item.commit().expect("insert");

    item.set("a", "ok").expect("set a");
    item.set("b", "bad").expect("set b");
    item.set("c", "fine").expect("set c");
    let err = item.commit().expect_err("constraint violation");
    match err {
        StoreError::PartialCommit {
            field, persisted, ..
        } => {
            assert_eq!(field, "b");
            assert_eq!(persisted, vec!["a".to_string()]);
        }
        other => panic!("expected partial commit, got {other}"),
    }

    assert!(!item.is_field_dirty("a").expect("a"));
    assert!(item.is_field_dirty("b").expect("b"));
    assert!(item.is_field_dirty("c").expect("c"));
    assert_eq!(item.undo_depth(), 1);
    assert_eq!(store.stats().failures, 1);

    let row = items
        .mapper()
        .select_one(item.id())
        .expect("select")
        .expect("row");
    assert_eq!(row.fields["a"], Value::from("ok"));
    assert_eq!(row.fields["c"], Value::Null);
}

#[test]
fn committed_rows_survive_reopen() {
    let storage_dir = temp_dir("committed_rows_survive_reopen");
    let id = {
        let store = RecordStore::open(StoreConfig::on_disk(&storage_dir)).expect("open store");
        let items = store.register(item_schema()).expect("register items");
        let item = items.new_record();
        item.set("a", "persisted").expect("set");
        item.commit().expect("insert");
        item.id()
    };

    let store = RecordStore::open(StoreConfig::on_disk(&storage_dir)).expect("reopen store");
    let items = store.register(item_schema()).expect("register items");
    let item = items.load(id).expect("load").expect("row exists");
    assert_eq!(item.get("a").expect("a"), Value::from("persisted"));
    assert!(!item.is_new());
    assert!(!item.is_dirty());
}
