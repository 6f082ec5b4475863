//! Backend output trees.
//!
//! A grammar's nodes declare their children as a static list of
//! [`Accessor`]s and their layout as a static list of [`FormatElement`]s.
//! Traversal and formatting work off those tables alone, so they never
//! need to know the concrete node types.

mod format;
pub mod lua;
mod reflect;

pub use format::{FormatElement, Formatter, format};
pub use reflect::{
    Accessor, BoundaryDescent, OutTree, any_child_depth, any_child_within_recursive,
    boundary_descent, child_count, child_or_null, children,
};
