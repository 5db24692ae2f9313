//! Incremental construction of record containers.

use crate::bindings::{Attr, BindingsId};
use crate::memory::EvalMemory;
use crate::position::PosIdx;
use crate::symbol::Symbol;
use crate::value::{Value, ValueId};

/// Fills a freshly allocated container, then sorts it on [`finish`](Self::finish).
///
/// The builder only holds the container handle, so the heap stays free for
/// other allocations (including other builders) between pushes.
#[must_use = "a record is only usable after `finish`"]
#[derive(Debug)]
pub struct BindingsBuilder {
    bindings: BindingsId,
    capacity: usize,
    len: usize,
}

impl BindingsBuilder {
    pub(crate) fn new(bindings: BindingsId, capacity: usize) -> Self {
        Self {
            bindings,
            capacity,
            len: 0,
        }
    }

    pub fn bindings(&self) -> BindingsId {
        self.bindings
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an attribute backed by a fresh value slot and return that slot.
    ///
    /// The slot starts out as `null`; write the real value with
    /// [`EvalMemory::set`].
    ///
    /// # Panics
    /// Panics if the container is already full.
    pub fn push(&mut self, mem: &mut EvalMemory, name: Symbol, pos: PosIdx) -> ValueId {
        let value = mem.alloc_value(Value::Null);
        self.insert(mem, name, value, pos);
        value
    }

    /// Append an attribute pointing at an existing value slot.
    ///
    /// # Panics
    /// Panics if the container is already full.
    pub fn insert(&mut self, mem: &mut EvalMemory, name: Symbol, value: ValueId, pos: PosIdx) {
        mem.bindings_mut()
            .push(self.bindings, Attr::new(name, value, pos));
        self.len += 1;
    }

    /// Sort the attributes by name and hand out the finished container.
    pub fn finish(self, mem: &mut EvalMemory) -> BindingsId {
        mem.bindings_mut().sort(self.bindings);
        self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn finish_orders_attributes_by_symbol() {
        let mut symbols = SymbolTable::new();
        let a = symbols.create("a");
        let b = symbols.create("b");
        let c = symbols.create("c");
        let mut mem = EvalMemory::new();

        let mut builder = mem.build_bindings(3).unwrap();
        let c_slot = builder.push(&mut mem, c, PosIdx::NONE);
        mem.set(c_slot, Value::Int(3));
        let a_slot = builder.push(&mut mem, a, PosIdx::NONE);
        mem.set(a_slot, Value::Int(1));
        let shared = mem.alloc_value(Value::Int(2));
        builder.insert(&mut mem, b, shared, PosIdx::NONE);
        assert_eq!(builder.len(), 3);
        let id = builder.finish(&mut mem);

        let bindings = mem.bindings().get(id);
        let names: Vec<Symbol> = bindings.iter().map(|attr| attr.name).collect();
        assert_eq!(names, vec![a, b, c]);
        assert_eq!(bindings.get(b).map(|attr| attr.value), Some(shared));
        assert!(matches!(mem.value(c_slot), Value::Int(3)));
    }

    #[test]
    fn empty_builder_finishes_to_the_singleton() {
        let mut mem = EvalMemory::new();
        let builder = mem.build_bindings(0).unwrap();
        assert!(builder.is_empty());
        assert_eq!(builder.finish(&mut mem), BindingsId::EMPTY);
    }

    #[test]
    #[should_panic(expected = "beyond its capacity")]
    fn pushing_past_capacity_panics() {
        let mut symbols = SymbolTable::new();
        let mut mem = EvalMemory::new();
        let mut builder = mem.build_bindings(1).unwrap();
        builder.push(&mut mem, symbols.create("a"), PosIdx::NONE);
        builder.push(&mut mem, symbols.create("b"), PosIdx::NONE);
    }
}
