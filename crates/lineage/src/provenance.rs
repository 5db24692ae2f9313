//! Lineage nodes and their append-only arena.
//!
//! A [`Provenance`] node records one value-producing event. Nodes are owned
//! by the session's [`ProvenanceInterner`] and referenced everywhere else by
//! [`ProvId`] handles. The interner never removes or reorders nodes, so a
//! handle stays valid for as long as the session lives, and a node can only
//! depend on nodes created before it: the graph is a DAG by construction.
//! Sharing a node between several parents is fine.

use crate::position::PosIdx;
use crate::value::ValueId;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::ops::Index;

/// Handle to an interned lineage node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ProvId(u32);

impl ProvId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operation tags. The set is open: any string is a valid kind.
pub mod kind {
    /// Value explicitly tracked with `trackProvenance`.
    pub const DEFINITION: &str = "definition";
    pub const BINARY_ADD: &str = "binary_add";
    pub const BINARY_SUB: &str = "binary_sub";
    pub const BINARY_MUL: &str = "binary_mul";
    pub const BINARY_DIV: &str = "binary_div";
    pub const STRING_CONCAT: &str = "string_concat";
    pub const LIST_CONCAT: &str = "list_concat";
    pub const ATTR_MERGE: &str = "attr_merge";
    pub const STRING_INTERPOLATION: &str = "string_interpolation";
}

pub type Dependencies = SmallVec<[ProvId; 2]>;

/// One immutable lineage node.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// User-supplied identifier; `None` for nodes derived automatically.
    pub identifier: Option<ValueId>,
    pub kind: Cow<'static, str>,
    pub pos: PosIdx,
    /// Empty for leaves.
    pub deps: Dependencies,
}

impl Provenance {
    pub fn is_leaf(&self) -> bool {
        self.deps.is_empty()
    }
}

/// Append-only store of lineage nodes.
///
/// `intern` always allocates: structurally equal nodes are not deduplicated.
/// Hash-consing could be added here without changing any caller.
#[derive(Debug, Default)]
pub struct ProvenanceInterner {
    nodes: Vec<Provenance>,
}

impl ProvenanceInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &mut self,
        identifier: Option<ValueId>,
        kind: impl Into<Cow<'static, str>>,
        pos: PosIdx,
        deps: impl IntoIterator<Item = ProvId>,
    ) -> ProvId {
        let deps: Dependencies = deps.into_iter().collect();
        debug_assert!(
            deps.iter().all(|dep| dep.index() < self.nodes.len()),
            "lineage dependency does not exist yet"
        );
        let id = ProvId(self.nodes.len() as u32);
        self.nodes.push(Provenance {
            identifier,
            kind: kind.into(),
            pos,
            deps,
        });
        id
    }

    pub fn get(&self, id: ProvId) -> Option<&Provenance> {
        self.nodes.get(id.index())
    }

    /// Number of nodes ever interned.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Length of the longest dependency chain below `id`, counting `id`.
    pub fn depth(&self, id: ProvId) -> usize {
        let node = &self[id];
        1 + node
            .deps
            .iter()
            .map(|&dep| self.depth(dep))
            .max()
            .unwrap_or(0)
    }
}

impl Index<ProvId> for ProvenanceInterner {
    type Output = Provenance;

    fn index(&self, id: ProvId) -> &Provenance {
        &self.nodes[id.index()]
    }
}
