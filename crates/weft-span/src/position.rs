use std::fmt;
use std::sync::Arc;

use text_size::{TextRange, TextSize};
use weft_structured::{Structured, Structurer};

/// Identity of a compilation unit. Cheap to clone, compared by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeLocation(Arc<str>);

impl CodeLocation {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeLocation({})", self.0)
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Structured for CodeLocation {
    fn destructure(&self, s: &mut Structurer) {
        s.value(self.as_str());
    }
}

/// A span of source text inside one compilation unit.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Position {
    loc: CodeLocation,
    range: TextRange,
}

impl Position {
    /// Panics if `left > right`.
    #[track_caller]
    pub fn new(loc: CodeLocation, left: u32, right: u32) -> Self {
        assert!(left <= right, "position with left {left} > right {right}");
        Self { loc, range: TextRange::new(left.into(), right.into()) }
    }

    pub fn from_range(loc: CodeLocation, range: TextRange) -> Self {
        Self { loc, range }
    }

    pub fn loc(&self) -> &CodeLocation {
        &self.loc
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn left(&self) -> TextSize {
        self.range.start()
    }

    pub fn right(&self) -> TextSize {
        self.range.end()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn left_edge(&self) -> Self {
        Self { loc: self.loc.clone(), range: TextRange::empty(self.left()) }
    }

    pub fn right_edge(&self) -> Self {
        Self { loc: self.loc.clone(), range: TextRange::empty(self.right()) }
    }

    /// Smallest position covering both. Positions from another unit are ignored.
    pub fn union(&self, other: &Self) -> Self {
        if self.loc != other.loc {
            return self.clone();
        }
        Self { loc: self.loc.clone(), range: self.range.cover(other.range) }
    }

    /// Covers every position yielded, or `fallback` when there are none.
    pub fn union_all<'a>(positions: impl IntoIterator<Item = &'a Self>, fallback: &Self) -> Self {
        let mut positions = positions.into_iter();
        let Some(first) = positions.next() else {
            return fallback.clone();
        };
        positions.fold(first.clone(), |acc, pos| acc.union(pos))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}-{}", self.loc, u32::from(self.left()), u32::from(self.right()))
    }
}

impl Structured for Position {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| {
            o.field("loc", &self.loc);
            o.field("left", &u32::from(self.left()));
            o.field("right", &u32::from(self.right()));
        });
    }
}
