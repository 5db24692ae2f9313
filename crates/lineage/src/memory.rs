//! The session heap: value slots, record containers and allocation counters.

use crate::bindings::BindingsArena;
use crate::builder::BindingsBuilder;
use crate::error::EvalResult;
use crate::value::{Value, ValueId};
use serde::Serialize;
use std::rc::Rc;

/// Allocation and evaluation counters of one session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EvalStats {
    pub nr_values: u64,
    pub nr_thunks: u64,
    pub nr_thunks_forced: u64,
    pub nr_attrsets: u64,
    pub nr_attrs_in_attrsets: u64,
    pub nr_lists: u64,
    pub nr_list_elems: u64,
    pub nr_provenance_nodes: u64,
    pub nr_tracked_values: u64,
}

pub struct EvalMemory {
    values: Vec<Value>,
    bindings: BindingsArena,
    nr_thunks: u64,
    nr_lists: u64,
    nr_list_elems: u64,
}

impl EvalMemory {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            bindings: BindingsArena::new(),
            nr_thunks: 0,
            nr_lists: 0,
            nr_list_elems: 0,
        }
    }

    pub fn alloc_value(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value::Null);
        self.init(id, value);
        id
    }

    /// Fill a slot that was reserved earlier, e.g. for recursive `let`.
    pub fn init(&mut self, id: ValueId, value: Value) {
        if let Value::Thunk(_) = value {
            self.nr_thunks += 1;
        }
        self.values[id.index()] = value;
    }

    /// Build a list value. The caller decides which slot it goes into.
    pub fn make_list(&mut self, items: Vec<ValueId>) -> Value {
        self.nr_lists += 1;
        self.nr_list_elems += items.len() as u64;
        Value::List(items.into())
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    /// Overwrite a slot in place. Used for forcing and for filling fresh slots.
    pub fn set(&mut self, id: ValueId, value: Value) {
        self.values[id.index()] = value;
    }

    pub fn list_items(&self, id: ValueId) -> Option<Rc<[ValueId]>> {
        match self.value(id) {
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    pub fn bindings(&self) -> &BindingsArena {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingsArena {
        &mut self.bindings
    }

    /// Allocate a container of exactly `capacity` attributes and a builder for it.
    pub fn build_bindings(&mut self, capacity: usize) -> EvalResult<BindingsBuilder> {
        let id = self.bindings.alloc(capacity)?;
        Ok(BindingsBuilder::new(id, capacity))
    }

    /// Counters owned by the heap; the session fills in the rest.
    pub fn stats(&self) -> EvalStats {
        EvalStats {
            nr_values: self.values.len() as u64,
            nr_thunks: self.nr_thunks,
            nr_attrsets: self.bindings.nr_attrsets(),
            nr_attrs_in_attrsets: self.bindings.nr_attrs_in_attrsets(),
            nr_lists: self.nr_lists,
            nr_list_elems: self.nr_list_elems,
            ..EvalStats::default()
        }
    }
}

impl Default for EvalMemory {
    fn default() -> Self {
        Self::new()
    }
}
