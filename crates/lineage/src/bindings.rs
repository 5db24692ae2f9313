//! Record (attribute set) containers and their arena.
//!
//! Every record is a fixed-capacity run of [`Attr`] slots inside one shared,
//! append-only slab. Allocation reserves `capacity` contiguous slots up front,
//! so several containers can be filled at the same time (forcing an attribute
//! may build other records) without ever moving each other's attributes.
//! Nothing is freed until the arena itself is dropped.
//!
//! After [`BindingsBuilder::finish`](crate::builder::BindingsBuilder::finish)
//! the attributes of a container are strictly ordered by [`Symbol`], which
//! makes lookups a binary search.

use crate::error::{EvalError, EvalResult};
use crate::position::PosIdx;
use crate::provenance::ProvId;
use crate::symbol::Symbol;
use crate::value::ValueId;
use rustc_hash::FxHashMap;

/// Type of the per-container size fields.
pub type SizeType = u32;

/// Handle to a record container.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BindingsId(u32);

impl BindingsId {
    /// The shared zero-capacity container every empty record points at.
    pub const EMPTY: Self = Self(0);

    pub fn is_empty_singleton(self) -> bool {
        self == Self::EMPTY
    }
}

/// One attribute: name, value slot and the position it was defined at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attr {
    pub name: Symbol,
    pub value: ValueId,
    pub pos: PosIdx,
}

impl Attr {
    /// Filler for reserved but not yet pushed slots. Never visible.
    const VACANT: Attr = Attr {
        name: Symbol::VACANT,
        value: ValueId(u32::MAX),
        pos: PosIdx::NONE,
    };

    pub fn new(name: Symbol, value: ValueId, pos: PosIdx) -> Self {
        Self { name, value, pos }
    }
}

/// Lineage annotation of a single attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrLineage {
    pub node: ProvId,
    pub pos: PosIdx,
}

/// Per-container lineage side table, allocated on first use.
#[derive(Clone, Debug, Default)]
pub struct LineageSidecar {
    map: FxHashMap<Symbol, AttrLineage>,
    /// Attribute names in the order they received lineage.
    path: Vec<Symbol>,
}

struct Header {
    start: usize,
    capacity: SizeType,
    len: SizeType,
    /// Position of the record expression that built the container.
    pos: PosIdx,
    lineage: Option<Box<LineageSidecar>>,
}

/// Read-only view of one container.
#[derive(Clone, Copy)]
pub struct Bindings<'a> {
    header: &'a Header,
    attrs: &'a [Attr],
}

impl<'a> Bindings<'a> {
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.header.capacity as usize
    }

    pub fn pos(&self) -> PosIdx {
        self.header.pos
    }

    /// Binary search by name. Only meaningful on finished containers.
    pub fn get(&self, name: Symbol) -> Option<&'a Attr> {
        self.attrs
            .binary_search_by_key(&name, |attr| attr.name)
            .ok()
            .map(|index| &self.attrs[index])
    }

    pub fn attrs(&self) -> &'a [Attr] {
        self.attrs
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Attr> {
        self.attrs.iter()
    }

    pub fn has_lineage(&self) -> bool {
        self.header.lineage.is_some()
    }

    pub fn lineage(&self, name: Symbol) -> Option<AttrLineage> {
        self.header.lineage.as_ref()?.map.get(&name).copied()
    }

    pub fn tracking_path(&self) -> &'a [Symbol] {
        self.header
            .lineage
            .as_deref()
            .map(|sidecar| sidecar.path.as_slice())
            .unwrap_or(&[])
    }
}

/// Bump allocator for record containers.
pub struct BindingsArena {
    headers: Vec<Header>,
    slab: Vec<Attr>,
    nr_attrsets: u64,
    nr_attrs_in_attrsets: u64,
    has_any_tracked_bindings: bool,
}

impl BindingsArena {
    /// Largest capacity the container size field can represent.
    pub const MAX_CAPACITY: usize = SizeType::MAX as usize;

    pub fn new() -> Self {
        Self {
            headers: vec![Header {
                start: 0,
                capacity: 0,
                len: 0,
                pos: PosIdx::NONE,
                lineage: None,
            }],
            slab: Vec::new(),
            nr_attrsets: 0,
            nr_attrs_in_attrsets: 0,
            has_any_tracked_bindings: false,
        }
    }

    /// Reserve a container with exactly `capacity` attribute slots.
    ///
    /// Zero capacity returns [`BindingsId::EMPTY`] without allocating.
    pub fn alloc(&mut self, capacity: usize) -> EvalResult<BindingsId> {
        if capacity == 0 {
            return Ok(BindingsId::EMPTY);
        }
        if capacity > Self::MAX_CAPACITY {
            return Err(EvalError::AttrSetTooLarge { size: capacity });
        }
        self.nr_attrsets += 1;
        self.nr_attrs_in_attrsets += capacity as u64;

        let start = self.slab.len();
        self.slab.resize(start + capacity, Attr::VACANT);
        let id = BindingsId(self.headers.len() as u32);
        self.headers.push(Header {
            start,
            capacity: capacity as SizeType,
            len: 0,
            pos: PosIdx::NONE,
            lineage: None,
        });
        log::trace!("allocated bindings {:?} with capacity {}", id, capacity);
        Ok(id)
    }

    pub fn get(&self, id: BindingsId) -> Bindings<'_> {
        let header = &self.headers[id.0 as usize];
        Bindings {
            header,
            attrs: &self.slab[header.start..header.start + header.len as usize],
        }
    }

    /// Append an attribute.
    ///
    /// # Panics
    /// Panics if the container is already full.
    pub(crate) fn push(&mut self, id: BindingsId, attr: Attr) {
        let header = &mut self.headers[id.0 as usize];
        assert!(
            header.len < header.capacity,
            "bindings {:?} pushed beyond its capacity of {}",
            id,
            header.capacity
        );
        self.slab[header.start + header.len as usize] = attr;
        header.len += 1;
    }

    pub(crate) fn sort(&mut self, id: BindingsId) {
        let header = &self.headers[id.0 as usize];
        let attrs = &mut self.slab[header.start..header.start + header.len as usize];
        attrs.sort_unstable_by_key(|attr| attr.name);
        debug_assert!(
            attrs.windows(2).all(|pair| pair[0].name < pair[1].name),
            "duplicate attribute names in bindings {:?}",
            id
        );
    }

    pub fn set_pos(&mut self, id: BindingsId, pos: PosIdx) {
        if id.is_empty_singleton() {
            return;
        }
        self.headers[id.0 as usize].pos = pos;
    }

    /// Give a container its lineage sidecar if it has none yet.
    pub fn init_lineage(&mut self, id: BindingsId) {
        if id.is_empty_singleton() {
            return;
        }
        let header = &mut self.headers[id.0 as usize];
        if header.lineage.is_none() {
            header.lineage = Some(Box::default());
            self.has_any_tracked_bindings = true;
        }
    }

    /// No-op unless [`init_lineage`](Self::init_lineage) was called first.
    pub fn set_lineage(&mut self, id: BindingsId, name: Symbol, lineage: AttrLineage) {
        if let Some(sidecar) = self.headers[id.0 as usize].lineage.as_mut() {
            sidecar.map.insert(name, lineage);
        }
    }

    /// No-op unless [`init_lineage`](Self::init_lineage) was called first.
    pub fn set_tracking_path(&mut self, id: BindingsId, path: Vec<Symbol>) {
        if let Some(sidecar) = self.headers[id.0 as usize].lineage.as_mut() {
            sidecar.path = path;
        }
    }

    /// Whether any container ever received a sidecar.
    pub fn has_any_tracked_bindings(&self) -> bool {
        self.has_any_tracked_bindings
    }

    pub fn nr_attrsets(&self) -> u64 {
        self.nr_attrsets
    }

    pub fn nr_attrs_in_attrsets(&self) -> u64 {
        self.nr_attrs_in_attrsets
    }
}

impl Default for BindingsArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::{ProvenanceInterner, kind};
    use crate::symbol::SymbolTable;

    fn attr(name: Symbol, value: u32) -> Attr {
        Attr::new(name, ValueId(value), PosIdx::NONE)
    }

    #[test]
    fn zero_capacity_is_the_shared_singleton() {
        let mut arena = BindingsArena::new();
        assert_eq!(arena.alloc(0), Ok(BindingsId::EMPTY));
        assert_eq!(arena.alloc(0), Ok(BindingsId::EMPTY));
        assert!(arena.get(BindingsId::EMPTY).is_empty());
        assert_eq!(arena.nr_attrsets(), 0);

        // The singleton is never mutated.
        arena.init_lineage(BindingsId::EMPTY);
        arena.set_pos(BindingsId::EMPTY, PosIdx::NONE);
        assert!(!arena.get(BindingsId::EMPTY).has_lineage());
        assert!(!arena.has_any_tracked_bindings());
    }

    #[test]
    fn capacity_above_size_field_is_rejected() {
        let mut arena = BindingsArena::new();
        let too_big = BindingsArena::MAX_CAPACITY + 1;
        assert_eq!(
            arena.alloc(too_big),
            Err(EvalError::AttrSetTooLarge { size: too_big })
        );
        assert_eq!(arena.nr_attrsets(), 0);
    }

    #[test]
    fn interleaved_containers_keep_their_slots() {
        let mut symbols = SymbolTable::new();
        let a = symbols.create("a");
        let b = symbols.create("b");
        let mut arena = BindingsArena::new();

        let first = arena.alloc(2).unwrap();
        let second = arena.alloc(1).unwrap();
        arena.push(first, attr(b, 1));
        arena.push(second, attr(a, 2));
        arena.push(first, attr(a, 3));
        arena.sort(first);

        let first = arena.get(first);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get(a).map(|attr| attr.value), Some(ValueId(3)));
        assert_eq!(first.get(b).map(|attr| attr.value), Some(ValueId(1)));
        assert_eq!(arena.get(second).attrs(), &[attr(a, 2)]);
        assert_eq!(arena.nr_attrsets(), 2);
        assert_eq!(arena.nr_attrs_in_attrsets(), 3);
    }

    #[test]
    #[should_panic(expected = "beyond its capacity")]
    fn pushing_past_capacity_panics() {
        let mut symbols = SymbolTable::new();
        let mut arena = BindingsArena::new();
        let id = arena.alloc(1).unwrap();
        arena.push(id, attr(symbols.create("a"), 0));
        arena.push(id, attr(symbols.create("b"), 1));
    }

    #[test]
    fn sidecar_is_created_lazily_once() {
        let mut symbols = SymbolTable::new();
        let a = symbols.create("a");
        let mut interner = ProvenanceInterner::new();
        let node = interner.intern(None, kind::DEFINITION, PosIdx::NONE, None);
        let mut arena = BindingsArena::new();
        let id = arena.alloc(1).unwrap();
        arena.push(id, attr(a, 0));

        let lineage = AttrLineage {
            node,
            pos: PosIdx::NONE,
        };
        // Without a sidecar the setters do nothing.
        arena.set_lineage(id, a, lineage);
        arena.set_tracking_path(id, vec![a]);
        assert_eq!(arena.get(id).lineage(a), None);
        assert!(arena.get(id).tracking_path().is_empty());

        arena.init_lineage(id);
        arena.set_lineage(id, a, lineage);
        arena.init_lineage(id);
        arena.set_tracking_path(id, vec![a]);
        assert_eq!(arena.get(id).lineage(a), Some(lineage));
        assert_eq!(arena.get(id).tracking_path(), &[a]);
        assert!(arena.has_any_tracked_bindings());
    }
}
