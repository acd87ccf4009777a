#![forbid(unsafe_code)]

use crate::value::Value;
use std::collections::BTreeMap;

/// Field values captured by one commit: for every field that was dirty, the
/// value it held before the commit. Undo and redo swap these values with the
/// record's current ones and move the set between stacks.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ChangeSet {
    entries: BTreeMap<String, Value>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: impl Into<String>, previous: Value) {
        self.entries.insert(field.into(), previous);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.entries.get_mut(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.entries
            .iter_mut()
            .map(|(field, value)| (field.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
