#![forbid(unsafe_code)]

mod note;

use note::{Note, NoteMetadata};
use rr_core::{Predicate, PredicateList, Value};
use rr_storage::{RecordStore, Role, StoreConfig, StoreError};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        tracing::error!("demo failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), StoreError> {
    let store = RecordStore::open(StoreConfig::from_env()?)?;
    let notes = note::register(&store)?;

    let note = Note::create(&notes);
    note.set_metadata(&NoteMetadata {
        tags: vec!["demo".to_string()],
        pinned: false,
    })?;
    for title in ["yeet one", "yeet two", "yeet three"] {
        note.set_title(title)?;
        let outcome = note.save()?;
        tracing::info!(id = %note.id(), title, ?outcome, "note saved");
    }

    while store.undo()? {
        tracing::info!(title = %note.title()?, can_undo = store.can_undo(), "undo");
    }
    while store.redo()? {
        tracing::info!(title = %note.title()?, can_redo = store.can_redo(), "redo");
    }
    let again = Note::with_id(&notes, note.id());
    tracing::info!(
        same_instance = Arc::ptr_eq(again.record(), note.record()),
        "identity map lookup"
    );

    for title in ["first child", "second child"] {
        let child = Note::create(&notes);
        child.set_title(title)?;
        child.save()?;
        note.add_child(&notes, &child)?;
    }

    let mut view = store.view(
        &notes,
        PredicateList::all([Predicate::like("title", "%yeet%")]),
    )?;
    while view.can_fetch_more() {
        view.fetch_more()?;
    }
    let title_role = Role::field(note::TITLE);
    for row in 0..view.row_count() {
        let title = view
            .data(row, &title_role)?
            .into_value()
            .unwrap_or(Value::Null);
        let children = view
            .data(row, &Role::Children)?
            .into_children()
            .map(|children| {
                children
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .row_count()
            })
            .unwrap_or_default();
        tracing::info!(row, title = ?title, children, "listed");
    }

    tracing::info!(stats = ?store.stats(), "done");
    Ok(())
}
