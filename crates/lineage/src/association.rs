//! Value → lineage association.
//!
//! Keyed by value identity (the heap slot), never by value equality: two equal
//! integers in different slots have independent lineage. An entry does not
//! keep its node alive or vice versa; both live until the session ends.

use crate::provenance::ProvId;
use crate::value::ValueId;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct ProvenanceTable {
    entries: FxHashMap<ValueId, ProvId>,
}

impl ProvenanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: ValueId) -> Option<ProvId> {
        self.entries.get(&value).copied()
    }

    /// Associate `node` with `value`, returning the node it replaces.
    pub fn set(&mut self, value: ValueId, node: ProvId) -> Option<ProvId> {
        self.entries.insert(value, node)
    }

    pub fn remove(&mut self, value: ValueId) -> Option<ProvId> {
        self.entries.remove(&value)
    }

    /// Number of values that currently carry lineage.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
