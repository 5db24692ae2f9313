//! Source positions.
//!
//! Expressions and attributes carry a compact [`PosIdx`] handle. The
//! [`PosTable`] resolves a handle to its origin plus 1-based line and column
//! only when somebody asks, so positions cost 4 bytes until they are rendered.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Handle into the session's [`PosTable`]. `PosIdx::NONE` means "no position".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct PosIdx(u32);

impl PosIdx {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// `self` unless it is `NONE`, in which case `fallback`.
    pub fn or(self, fallback: PosIdx) -> PosIdx {
        if self.is_none() { fallback } else { self }
    }
}

/// Where a piece of source code came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Synthetic code with no source at all.
    None,
    Path(PathBuf),
    /// An in-memory string (`eval`, tests).
    String,
    Stdin,
}

impl Origin {
    /// The name rendered in lineage records and error messages.
    pub fn display_name(&self) -> Option<String> {
        match self {
            Origin::None => None,
            Origin::Path(path) => Some(path.display().to_string()),
            Origin::String => Some("«string»".to_owned()),
            Origin::Stdin => Some("«stdin»".to_owned()),
        }
    }
}

/// Handle to a registered origin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OriginId(u32);

/// A resolved position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pos {
    pub origin: Origin,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin.display_name() {
            Some(name) => write!(f, "{}:{}:{}", name, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

struct OriginEntry {
    origin: Origin,
    source: Rc<str>,
    /// Byte offset of the first character of every line.
    line_starts: Vec<u32>,
}

/// Session-wide table of origins and byte-offset positions.
#[derive(Default)]
pub struct PosTable {
    origins: Vec<OriginEntry>,
    /// `positions[i]` backs `PosIdx(i + 1)`.
    positions: Vec<(OriginId, u32)>,
}

impl PosTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the source text of an origin.
    pub fn add_origin(&mut self, origin: Origin, source: &str) -> OriginId {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .match_indices('\n')
                    .map(|(offset, _)| offset as u32 + 1),
            )
            .collect();
        let id = OriginId(self.origins.len() as u32);
        self.origins.push(OriginEntry {
            origin,
            source: source.into(),
            line_starts,
        });
        id
    }

    /// Allocate a position for a byte offset inside a registered origin.
    pub fn add(&mut self, origin: OriginId, offset: usize) -> PosIdx {
        self.positions.push((origin, offset as u32));
        PosIdx(self.positions.len() as u32)
    }

    pub fn get(&self, pos: PosIdx) -> Option<Pos> {
        if pos.is_none() {
            return None;
        }
        let &(origin, offset) = self.positions.get(pos.0 as usize - 1)?;
        let entry = self.origins.get(origin.0 as usize)?;
        let line_index = match entry.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = entry.line_starts[line_index] as usize;
        let column = entry
            .source
            .get(line_start..offset as usize)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        Some(Pos {
            origin: entry.origin.clone(),
            line: line_index as u32 + 1,
            column: column as u32 + 1,
        })
    }

    pub fn source(&self, origin: OriginId) -> Option<&str> {
        self.origins.get(origin.0 as usize).map(|entry| &*entry.source)
    }

    /// Number of positions handed out.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_lines_and_columns() {
        let mut table = PosTable::new();
        let origin = table.add_origin(Origin::String, "let\n  x = «1»;\nin x");
        let first = table.add(origin, 0);
        let x = table.add(origin, 6);
        let after_unicode = table.add(origin, "let\n  x = «1".len());
        let body = table.add(origin, "let\n  x = «1»;\nin ".len());

        assert_eq!(table.get(first).map(|p| (p.line, p.column)), Some((1, 1)));
        assert_eq!(table.get(x).map(|p| (p.line, p.column)), Some((2, 3)));
        assert_eq!(table.get(after_unicode).map(|p| (p.line, p.column)), Some((2, 9)));
        assert_eq!(table.get(body).map(|p| (p.line, p.column)), Some((3, 4)));
    }

    #[test]
    fn none_resolves_to_nothing() {
        let table = PosTable::new();
        assert_eq!(table.get(PosIdx::NONE), None);
        assert_eq!(PosIdx::NONE.or(PosIdx(3)), PosIdx(3));
    }

    #[test]
    fn origin_display_names() {
        assert_eq!(Origin::String.display_name().as_deref(), Some("«string»"));
        assert_eq!(Origin::Stdin.display_name().as_deref(), Some("«stdin»"));
        assert_eq!(
            Origin::Path("/tmp/a.nix".into()).display_name().as_deref(),
            Some("/tmp/a.nix")
        );
        assert_eq!(Origin::None.display_name(), None);
    }
}
