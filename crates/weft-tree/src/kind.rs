use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use weft_span::CodeLocation;

use crate::tree::StayId;
use crate::value::Value;

/// Content tag of a node: leaf payload or the kind of composition.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Block,
    /// Child 0 is the callee, the rest are arguments.
    Call,
    /// Child 0 is the pattern, followed by metadata key/value pairs.
    Decl,
    /// Parameters followed by the body.
    Fun,
    /// Names bound by a destructuring declaration, optionally a [`NodeKind::Wildcard`].
    Destructure,
    Wildcard,
    LeftName(Name),
    RightName(Name),
    Value(Value),
    Stay(StayId),
    /// Rendering-only placeholder skipped by macro expansion.
    Esc { display: Arc<str> },
    /// Inert replacement for a subtree that failed a structural check.
    Error,
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::Wildcard
                | Self::LeftName(_)
                | Self::RightName(_)
                | Self::Value(_)
                | Self::Stay(_)
                | Self::Esc { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Block => "Block",
            Self::Call => "Call",
            Self::Decl => "Decl",
            Self::Fun => "Fun",
            Self::Destructure => "Destructure",
            Self::Wildcard => "Wildcard",
            Self::LeftName(_) => "LeftName",
            Self::RightName(_) => "RightName",
            Self::Value(_) => "Value",
            Self::Stay(_) => "Stay",
            Self::Esc { .. } => "Esc",
            Self::Error => "Error",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Name {
    Source(Arc<str>),
    Temporary { base: Arc<str>, uid: u32 },
    /// Reference to a binding published by another unit.
    Exported { module: CodeLocation, name: Arc<str> },
}

impl Name {
    pub fn source(text: &str) -> Self {
        Self::Source(text.into())
    }

    /// The text a user would write for this name.
    pub fn base(&self) -> &str {
        match self {
            Self::Source(text) => text,
            Self::Temporary { base, .. } => base,
            Self::Exported { name, .. } => name,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(text) => f.write_str(text),
            Self::Temporary { base, uid } => write!(f, "{base}#{uid}"),
            Self::Exported { module, name } => write!(f, "{module}.{name}"),
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

/// Allocates temporaries that cannot collide with source names or each other.
#[derive(Debug, Default)]
pub struct NameMaker {
    next: u32,
}

impl NameMaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, base: &str) -> Name {
        let uid = self.next;
        self.next += 1;
        Name::Temporary { base: base.into(), uid }
    }
}

/// Metadata key on a declaration.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Cow<'static, str>);

impl Symbol {
    pub const INIT: Self = Self(Cow::Borrowed("init"));
    pub const TYPE: Self = Self(Cow::Borrowed("type"));
    /// Where an import's placeholder waits for the exporter.
    pub const STAY: Self = Self(Cow::Borrowed("stay"));
    pub const EXPORT: Self = Self(Cow::Borrowed("export"));
    pub const JSON: Self = Self(Cow::Borrowed("json"));
    pub const IMPORTED: Self = Self(Cow::Borrowed("imported"));

    pub fn new(text: &str) -> Self {
        Self(Cow::Owned(text.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\{}", self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}
