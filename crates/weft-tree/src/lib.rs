//! Mutable, parent-linked tree shared by every rewrite pass.
//!
//! Nodes live in an arena owned by [`Tree`] and are addressed by [`NodeId`]
//! handles. The only way to change the shape of a tree is
//! [`Tree::replace`], which splices the output of a [`TreeBuilder`] into a
//! child range in one step and is the single place parent handles are set.

mod builder;
mod cst;
mod dump;
mod kind;
pub mod sexpr;
mod tree;
mod value;
mod visit;

#[cfg(test)]
mod tests;

pub use builder::{Marker, TreeBuilder};
pub use cst::{Cst, CstPart, CstToken, Operator, TokenKind, flatten};
pub use dump::TreeView;
pub use kind::{Name, NameMaker, NodeKind, Symbol};
pub use tree::{Edge, NodeId, StayError, StayId, Tree};
pub use value::{FilePathDecodeError, Value};
pub use visit::{Order, VisitCue, VisitError, Walked, fold, walk};
