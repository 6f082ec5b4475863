use std::fmt::Write;

use weft_structured::{Structured, Structurer};

use crate::kind::NodeKind;
use crate::tree::{NodeId, Tree};

impl Tree {
    /// Single-line s-expression of the subtree at `node`.
    ///
    /// Inner nodes print as `(Kind children...)`, leaves print their payload
    /// and `Esc` nodes print their display text.
    pub fn dump(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(node, &mut out);
        out
    }

    fn dump_into(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::LeftName(name) | NodeKind::RightName(name) => {
                let _ = write!(out, "{name}");
            }
            NodeKind::Value(value) => {
                let _ = write!(out, "{value}");
            }
            NodeKind::Stay(stay) => {
                let _ = write!(out, "{stay:?}");
            }
            NodeKind::Esc { display } => out.push_str(display),
            NodeKind::Wildcard => out.push('*'),
            kind => {
                out.push('(');
                out.push_str(kind.name());
                for &child in self.children(node) {
                    out.push(' ');
                    self.dump_into(child, out);
                }
                out.push(')');
            }
        }
    }

    pub fn view(&self, node: NodeId) -> TreeView<'_> {
        TreeView { tree: self, node }
    }
}

/// A subtree as a [`Structured`] value.
#[derive(Clone, Copy)]
pub struct TreeView<'t> {
    tree: &'t Tree,
    node: NodeId,
}

impl Structured for TreeView<'_> {
    fn destructure(&self, s: &mut Structurer) {
        let Self { tree, node } = *self;
        let kind = tree.kind(node);
        s.obj(|o| {
            o.field("kind", kind.name());
            o.field("pos", tree.pos(node));
            if kind.is_leaf() {
                o.field("leaf", &tree.dump(node));
            } else {
                o.key("children", |s| {
                    s.arr(|a| {
                        for &child in tree.children(node) {
                            a.element(&tree.view(child));
                        }
                    })
                });
            }
        });
    }
}
