//! Interned attribute and variable names.

use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Index into the session's [`SymbolTable`].
///
/// Ordering follows interning order, which is the order record containers
/// sort their attributes by.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Symbol(u32);

impl Symbol {
    /// Never handed out by a table.
    pub(crate) const VACANT: Symbol = Symbol(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Intern table: name → Symbol and back.
#[derive(Default)]
pub struct SymbolTable {
    names: Vec<Rc<str>>,
    ids: FxHashMap<Rc<str>, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning the existing symbol if it was seen before.
    pub fn create(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.ids.get(name) {
            return symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        let name: Rc<str> = name.into();
        self.names.push(name.clone());
        self.ids.insert(name, symbol);
        symbol
    }

    /// Look up a name without interning it.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.ids.get(name).copied()
    }

    pub fn resolve(&self, symbol: Symbol) -> &str {
        &self.names[symbol.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolTable({} symbols)", self.names.len())
    }
}

/// Symbols the runtime itself needs, interned once per session.
#[derive(Debug, Clone, Copy)]
pub struct StaticSymbols {
    pub builtins: Symbol,
    pub identifier: Symbol,
    pub kind: Symbol,
    pub value: Symbol,
    pub provenance: Symbol,
    pub dependencies: Symbol,
    pub file: Symbol,
    pub line: Symbol,
    pub column: Symbol,
}

impl StaticSymbols {
    pub fn new(symbols: &mut SymbolTable) -> Self {
        Self {
            builtins: symbols.create("builtins"),
            identifier: symbols.create("identifier"),
            kind: symbols.create("kind"),
            value: symbols.create("value"),
            provenance: symbols.create("provenance"),
            dependencies: symbols.create("dependencies"),
            file: symbols.create("file"),
            line: symbols.create("line"),
            column: symbols.create("column"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut symbols = SymbolTable::new();
        let a = symbols.create("a");
        let b = symbols.create("b");
        assert_ne!(a, b);
        assert_eq!(symbols.create("a"), a);
        assert_eq!(symbols.resolve(b), "b");
        assert_eq!(symbols.get("c"), None);
        assert_eq!(symbols.len(), 2);
    }
}
