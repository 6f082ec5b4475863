//! Concrete syntax trees as produced by a front end, and their conversion to [`Tree`].

use std::sync::Arc;

use weft_span::{CodeLocation, Position};

use crate::kind::{Name, NodeKind, Symbol};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Top level of a compilation unit.
    Root,
    Block,
    /// Callee followed by arguments.
    Call,
    /// Pattern, optional type, initializer.
    Let,
    /// Decorator name, the decorated declaration, then decorator arguments.
    Decorate,
    /// Destructuring pattern.
    Curly,
    /// Parameters followed by the body.
    Fun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Int,
    /// Text holds the decoded string content.
    Str,
    /// Text holds the symbol name without the leading backslash.
    Symbol,
    Star,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CstToken {
    pub kind: TokenKind,
    pub text: Arc<str>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cst {
    Inner { operator: Operator, operands: Vec<Cst>, pos: Position },
    Leaf(CstToken),
}

impl Cst {
    pub fn pos(&self) -> &Position {
        match self {
            Self::Inner { pos, .. } => pos,
            Self::Leaf(token) => &token.pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CstPart {
    LeftParenthesis { operator: Operator, pos: Position },
    Token(CstToken),
    RightParenthesis { operator: Operator, pos: Position },
}

/// Preorder event stream of `cst`: every inner node becomes a
/// `LeftParenthesis` at its left edge, its operands, and a
/// `RightParenthesis` at its right edge.
pub fn flatten(cst: &Cst) -> Vec<CstPart> {
    let mut parts = Vec::new();
    flatten_into(cst, &mut parts);
    parts
}

fn flatten_into(cst: &Cst, parts: &mut Vec<CstPart>) {
    match cst {
        Cst::Leaf(token) => parts.push(CstPart::Token(token.clone())),
        Cst::Inner { operator, operands, pos } => {
            parts.push(CstPart::LeftParenthesis { operator: *operator, pos: pos.left_edge() });
            for operand in operands {
                flatten_into(operand, parts);
            }
            parts.push(CstPart::RightParenthesis { operator: *operator, pos: pos.right_edge() });
        }
    }
}

enum Operand {
    Token(CstToken),
    Node(NodeId),
}

struct Frame {
    operator: Operator,
    left: Position,
    operands: Vec<Operand>,
}

impl Tree {
    /// Builds the tree of a compilation unit by reducing the flattened `cst`.
    ///
    /// A root operator's operands become the root block's children; any other
    /// CST becomes the single child of the root block.
    pub fn from_cst(loc: CodeLocation, cst: &Cst) -> Self {
        let mut tree = Tree::new(loc, cst.pos().clone());
        let mut stack: Vec<Frame> = Vec::new();
        let mut top = Vec::new();

        for part in flatten(cst) {
            match part {
                CstPart::LeftParenthesis { operator, pos } => {
                    stack.push(Frame { operator, left: pos, operands: Vec::new() });
                }
                CstPart::Token(token) => match stack.last_mut() {
                    Some(frame) => frame.operands.push(Operand::Token(token)),
                    None => top.push(tree.reduce_token(token, TokenRole::Use)),
                },
                CstPart::RightParenthesis { operator, pos } => {
                    let Some(frame) = stack.pop() else { unreachable!("flatten is balanced") };
                    debug_assert_eq!(frame.operator, operator);
                    let pos = frame.left.union(&pos);
                    if operator == Operator::Root && stack.is_empty() {
                        top.extend(tree.reduce_operands(frame.operands, |_, _| TokenRole::Use));
                        continue;
                    }
                    let node = tree.reduce(frame.operator, frame.operands, pos);
                    match stack.last_mut() {
                        Some(parent) => parent.operands.push(Operand::Node(node)),
                        None => top.push(node),
                    }
                }
            }
        }

        let root = tree.root();
        tree.replace(root, 0..0, |b| b.graft_all(top));
        tracing::trace!(nodes = tree.arena_len(), "tree built from cst");
        tree
    }

    fn reduce(&mut self, operator: Operator, operands: Vec<Operand>, pos: Position) -> NodeId {
        let count = operands.len();
        match operator {
            Operator::Root | Operator::Block => {
                let children = self.reduce_operands(operands, |_, _| TokenRole::Use);
                self.alloc(NodeKind::Block, pos, children)
            }
            Operator::Call => {
                let children = self.reduce_operands(operands, |_, _| TokenRole::Use);
                self.alloc(NodeKind::Call, pos, children)
            }
            Operator::Let => {
                let children = self.reduce_operands(operands, |i, _| {
                    if i == 0 { TokenRole::Bind } else { TokenRole::Use }
                });
                self.reduce_let(children, pos)
            }
            Operator::Decorate => {
                let mut operands = operands;
                if let Some(Operand::Token(token)) = operands.first_mut() {
                    if !token.text.starts_with('@') {
                        token.text = format!("@{}", token.text).into();
                    }
                }
                let children = self.reduce_operands(operands, |_, _| TokenRole::Use);
                self.alloc(NodeKind::Call, pos, children)
            }
            Operator::Curly => {
                let children = self.reduce_operands(operands, |_, _| TokenRole::Bind);
                self.alloc(NodeKind::Destructure, pos, children)
            }
            Operator::Fun => {
                let children = self.reduce_operands(operands, |i, _| {
                    if i + 1 < count { TokenRole::Bind } else { TokenRole::Use }
                });
                self.alloc(NodeKind::Fun, pos, children)
            }
        }
    }

    /// `pat [Type] (\key value)* init`
    fn reduce_let(&mut self, children: Vec<NodeId>, pos: Position) -> NodeId {
        let [pattern, middle @ .., init] = children.as_slice() else {
            return self.alloc(NodeKind::Error, pos, children);
        };
        let (ty, pairs) = match middle.split_first() {
            Some((&ty, pairs)) if middle.len() % 2 == 1 => (Some(ty), pairs),
            _ => (None, middle),
        };
        let well_formed = pairs.chunks(2).all(|pair| {
            matches!(self.kind(pair[0]), NodeKind::Value(Value::Symbol(_)))
        });
        if !well_formed {
            return self.alloc(NodeKind::Error, pos, children);
        }
        let mut decl_children = vec![*pattern];
        if let Some(ty) = ty {
            let key = self.key(Symbol::TYPE, ty);
            decl_children.extend([key, ty]);
        }
        decl_children.extend_from_slice(pairs);
        let key = self.key(Symbol::INIT, *init);
        decl_children.extend([key, *init]);
        self.alloc(NodeKind::Decl, pos, decl_children)
    }

    fn key(&mut self, key: Symbol, value: NodeId) -> NodeId {
        let key_pos = self.pos(value).left_edge();
        self.alloc(NodeKind::Value(Value::Symbol(key)), key_pos, Vec::new())
    }

    fn reduce_operands(
        &mut self,
        operands: Vec<Operand>,
        role: impl Fn(usize, &CstToken) -> TokenRole,
    ) -> Vec<NodeId> {
        operands
            .into_iter()
            .enumerate()
            .map(|(i, operand)| match operand {
                Operand::Node(node) => node,
                Operand::Token(token) => {
                    let role = role(i, &token);
                    self.reduce_token(token, role)
                }
            })
            .collect()
    }

    fn reduce_token(&mut self, token: CstToken, role: TokenRole) -> NodeId {
        let CstToken { kind, text, pos } = token;
        let kind = match (kind, role) {
            (TokenKind::Word, TokenRole::Bind) => NodeKind::LeftName(Name::Source(text)),
            (TokenKind::Word, TokenRole::Use) => NodeKind::RightName(Name::Source(text)),
            (TokenKind::Star, TokenRole::Bind) => NodeKind::Wildcard,
            (TokenKind::Star, TokenRole::Use) => NodeKind::Error,
            (TokenKind::Int, _) => match text.parse::<i64>() {
                Ok(value) => NodeKind::Value(Value::Int(value)),
                Err(_) => NodeKind::Error,
            },
            (TokenKind::Str, _) => NodeKind::Value(Value::Str(text)),
            (TokenKind::Symbol, _) => NodeKind::Value(Value::Symbol(Symbol::new(&text))),
        };
        self.alloc(kind, pos, Vec::new())
    }
}

#[derive(Clone, Copy)]
enum TokenRole {
    Bind,
    Use,
}
