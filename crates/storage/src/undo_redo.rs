#![forbid(unsafe_code)]

use crate::StoreError;
use crate::observers::{Observers, SubscriptionId};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

/// Capability shared by every record type that keeps undo/redo stacks.
pub trait Undoable: Send + Sync {
    /// Returns `false` when there was nothing to undo.
    fn undo(&self) -> Result<bool, StoreError>;
    /// Returns `false` when there was nothing to redo.
    fn redo(&self) -> Result<bool, StoreError>;
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorEvent {
    CanUndoChanged(bool),
    CanRedoChanged(bool),
}

#[derive(Default)]
struct Tracks {
    undo: Vec<Weak<dyn Undoable>>,
    redo: Vec<Weak<dyn Undoable>>,
}

#[derive(Clone, Copy)]
enum Track {
    Undo,
    Redo,
}

impl Track {
    fn event(self, available: bool) -> CoordinatorEvent {
        match self {
            Self::Undo => CoordinatorEvent::CanUndoChanged(available),
            Self::Redo => CoordinatorEvent::CanRedoChanged(available),
        }
    }
}

/// Cross-record recency index. Each undoable (or redoable) change set owns
/// one entry naming its record, newest last, so a global undo always lands
/// on whichever record most recently gained a change set. Entries are weak:
/// the coordinator never keeps a record alive.
#[derive(Default)]
pub struct UndoRedoCoordinator {
    tracks: Mutex<Tracks>,
    observers: Observers<CoordinatorEvent>,
}

impl std::fmt::Debug for UndoRedoCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracks = self.tracks();
        f.debug_struct("UndoRedoCoordinator")
            .field("undo_entries", &tracks.undo.len())
            .field("redo_entries", &tracks.redo.len())
            .finish()
    }
}

impl UndoRedoCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CoordinatorEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn can_undo(&self) -> bool {
        self.tracks().undo.iter().any(|item| item.strong_count() > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.tracks().redo.iter().any(|item| item.strong_count() > 0)
    }

    pub fn undo_depth(&self) -> usize {
        self.tracks().undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.tracks().redo.len()
    }

    pub fn undo_item_added(&self, item: &Weak<dyn Undoable>) {
        self.add(Track::Undo, item);
    }

    pub fn undo_item_removed(&self, item: &Weak<dyn Undoable>) {
        self.remove_last(Track::Undo, item);
    }

    pub fn redo_item_added(&self, item: &Weak<dyn Undoable>) {
        self.add(Track::Redo, item);
    }

    pub fn redo_item_removed(&self, item: &Weak<dyn Undoable>) {
        self.remove_last(Track::Redo, item);
    }

    /// Drops every entry for `item`, e.g. when its record leaves the
    /// identity map.
    pub fn forget(&self, item: &Weak<dyn Undoable>) {
        let events = {
            let mut tracks = self.tracks();
            let mut events = Vec::new();
            for track in [Track::Undo, Track::Redo] {
                let entries = select(&mut tracks, track);
                let before = !entries.is_empty();
                entries.retain(|entry| !Weak::ptr_eq(entry, item));
                if before && entries.is_empty() {
                    events.push(track.event(false));
                }
            }
            events
        };
        self.observers.emit_all(&events);
    }

    /// Undoes the most recent change set of whichever record registered
    /// last. Returns `false` when nothing is undoable.
    pub fn undo(&self) -> Result<bool, StoreError> {
        self.step(Track::Undo)
    }

    pub fn redo(&self) -> Result<bool, StoreError> {
        self.step(Track::Redo)
    }

    fn step(&self, track: Track) -> Result<bool, StoreError> {
        loop {
            let Some((item, target)) = self.last_alive(track) else {
                return Ok(false);
            };
            let applied = match track {
                Track::Undo => target.undo()?,
                Track::Redo => target.redo()?,
            };
            if applied {
                return Ok(true);
            }
            // The record had nothing left for this entry; drop it and retry.
            self.remove_last(track, &item);
        }
    }

    fn last_alive(
        &self,
        track: Track,
    ) -> Option<(Weak<dyn Undoable>, std::sync::Arc<dyn Undoable>)> {
        let (found, events) = {
            let mut tracks = self.tracks();
            let entries = select(&mut tracks, track);
            let before = !entries.is_empty();
            let mut found = None;
            while let Some(last) = entries.last() {
                if let Some(target) = last.upgrade() {
                    found = Some((last.clone(), target));
                    break;
                }
                entries.pop();
            }
            let events = if before && entries.is_empty() {
                vec![track.event(false)]
            } else {
                Vec::new()
            };
            (found, events)
        };
        self.observers.emit_all(&events);
        found
    }

    fn add(&self, track: Track, item: &Weak<dyn Undoable>) {
        let became_available = {
            let mut tracks = self.tracks();
            let entries = select(&mut tracks, track);
            let was_empty = entries.is_empty();
            entries.push(item.clone());
            was_empty
        };
        if became_available {
            self.observers.emit(&track.event(true));
        }
    }

    fn remove_last(&self, track: Track, item: &Weak<dyn Undoable>) {
        let became_empty = {
            let mut tracks = self.tracks();
            let entries = select(&mut tracks, track);
            match entries.iter().rposition(|entry| Weak::ptr_eq(entry, item)) {
                Some(index) => {
                    entries.remove(index);
                    entries.is_empty()
                }
                None => false,
            }
        };
        if became_empty {
            self.observers.emit(&track.event(false));
        }
    }

    fn tracks(&self) -> MutexGuard<'_, Tracks> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn select(tracks: &mut Tracks, track: Track) -> &mut Vec<Weak<dyn Undoable>> {
    match track {
        Track::Undo => &mut tracks.undo,
        Track::Redo => &mut tracks.redo,
    }
}
