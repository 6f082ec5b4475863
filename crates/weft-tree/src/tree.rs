use std::fmt;
use std::ops::Range;

use rustc_hash::{FxHashMap, FxHashSet};
use weft_span::{CodeLocation, Position};

use crate::builder::{Event, TreeBuilder};
use crate::kind::{Name, NodeKind, Symbol};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("tree has more than u32::MAX nodes"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identity of a placeholder leaf, stable across moves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StayId(u32);

impl fmt::Debug for StayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stay#{}", self.0)
    }
}

/// A child slot: the `index`-th child of `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub parent: NodeId,
    pub index: usize,
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) pos: Position,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct StaySlot {
    node: Option<NodeId>,
    consumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StayError {
    #[error("{0:?} was never placed in this tree")]
    Unknown(StayId),
    #[error("{0:?} was already consumed")]
    AlreadyConsumed(StayId),
}

/// The tree of one compilation unit.
#[derive(Debug)]
pub struct Tree {
    loc: CodeLocation,
    nodes: Vec<NodeData>,
    root: NodeId,
    stays: Vec<StaySlot>,
}

impl Tree {
    pub fn new(loc: CodeLocation, pos: Position) -> Self {
        let mut tree =
            Self { loc, nodes: Vec::with_capacity(64), root: NodeId(0), stays: Vec::new() };
        tree.root = tree.alloc(NodeKind::Block, pos, Vec::new());
        tree
    }

    pub fn loc(&self) -> &CodeLocation {
        &self.loc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.index()]
    }

    fn data_mut(&mut self, node: NodeId) -> &mut NodeData {
        &mut self.nodes[node.index()]
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.data(node).kind
    }

    pub fn pos(&self, node: NodeId) -> &Position {
        &self.data(node).pos
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.data(node).children
    }

    pub fn child(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.children(node).get(index).copied()
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.children(node).len()
    }

    pub fn edge(&self, node: NodeId) -> Option<Edge> {
        let parent = self.parent(node)?;
        let index = self.children(parent).iter().position(|&child| child == node)?;
        Some(Edge { parent, index })
    }

    /// Ancestors from the parent outwards.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |&node| self.parent(node))
    }

    fn top_of(&self, node: NodeId) -> NodeId {
        self.ancestors(node).last().unwrap_or(node)
    }

    /// Reachable from the root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.top_of(node) == self.root
    }

    pub fn name_of(&self, node: NodeId) -> Option<&Name> {
        match self.kind(node) {
            NodeKind::LeftName(name) | NodeKind::RightName(name) => Some(name),
            _ => None,
        }
    }

    pub fn value_of(&self, node: NodeId) -> Option<&Value> {
        match self.kind(node) {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Name of the callee when `call` is a call to a plain name.
    pub fn callee_name(&self, call: NodeId) -> Option<&Name> {
        if *self.kind(call) != NodeKind::Call {
            return None;
        }
        match self.kind(self.child(call, 0)?) {
            NodeKind::RightName(name) => Some(name),
            _ => None,
        }
    }

    pub fn decl_pattern(&self, decl: NodeId) -> Option<NodeId> {
        if *self.kind(decl) != NodeKind::Decl {
            return None;
        }
        self.child(decl, 0)
    }

    /// `(key index, key, value)` for every metadata pair of a declaration.
    pub fn metadata_entries(&self, decl: NodeId) -> Vec<(usize, Symbol, NodeId)> {
        if *self.kind(decl) != NodeKind::Decl {
            return Vec::new();
        }
        let children = self.children(decl);
        (1..children.len())
            .step_by(2)
            .filter_map(|index| {
                let key = self.value_of(children[index])?.as_symbol()?.clone();
                let value = *children.get(index + 1)?;
                Some((index, key, value))
            })
            .collect()
    }

    pub fn metadata(&self, decl: NodeId, key: &Symbol) -> Option<NodeId> {
        let entries = self.metadata_entries(decl);
        entries.into_iter().find(|(_, k, _)| k == key).map(|(_, _, value)| value)
    }

    pub fn metadata_key_index(&self, decl: NodeId, key: &Symbol) -> Option<usize> {
        let entries = self.metadata_entries(decl);
        entries.into_iter().find(|(_, k, _)| k == key).map(|(index, _, _)| index)
    }

    /// Replaces the children of `parent` in `range` with whatever `build` emits.
    ///
    /// Indices in `range` refer to the layout before the call. Returns the
    /// inserted roots in order. This is the only entry point that sets parent
    /// handles on an existing tree.
    #[track_caller]
    pub fn replace(
        &mut self,
        parent: NodeId,
        range: Range<usize>,
        build: impl FnOnce(&mut TreeBuilder<'_>),
    ) -> Vec<NodeId> {
        let len = self.child_count(parent);
        assert!(
            range.start <= range.end && range.end <= len,
            "replace range {range:?} out of bounds for {parent:?} with {len} children"
        );
        let default_pos = self.insertion_pos(parent, &range);
        let events = {
            let mut builder = TreeBuilder::new(self, default_pos.clone());
            build(&mut builder);
            builder.finish()
        };
        self.apply(parent, range, events, &default_pos)
    }

    /// Replaces a single node, see [`Tree::replace`].
    #[track_caller]
    pub fn replace_node(
        &mut self,
        node: NodeId,
        build: impl FnOnce(&mut TreeBuilder<'_>),
    ) -> Vec<NodeId> {
        let Edge { parent, index } = self.edge(node).expect("cannot replace a node without parent");
        self.replace(parent, index..index + 1, build)
    }

    fn insertion_pos(&self, parent: NodeId, range: &Range<usize>) -> Position {
        match self.child(parent, range.start) {
            Some(child) => self.pos(child).left_edge(),
            None => self.pos(parent).right_edge(),
        }
    }

    fn apply(
        &mut self,
        parent: NodeId,
        range: Range<usize>,
        events: Vec<Event>,
        default_pos: &Position,
    ) -> Vec<NodeId> {
        let removed = self.data(parent).children[range.clone()].to_vec();
        for node in removed {
            self.data_mut(node).parent = None;
        }

        let mut grafted = FxHashSet::default();
        let mut open: Vec<(NodeKind, Option<Position>, Vec<NodeId>)> = Vec::new();
        let mut roots = Vec::new();
        for event in events {
            let built = match event {
                Event::Start { kind, pos } => {
                    open.push((kind, pos, Vec::new()));
                    continue;
                }
                Event::Leaf { kind, pos } => self.alloc(kind, pos, Vec::new()),
                Event::Graft(node) => {
                    assert!(grafted.insert(node), "{node:?} grafted twice in one replace");
                    self.take_for_graft(node, parent);
                    node
                }
                Event::Finish => {
                    let (kind, pos, children) = open.pop().expect("finish without start");
                    let pos = pos.unwrap_or_else(|| {
                        Position::union_all(children.iter().map(|&c| self.pos(c)), default_pos)
                    });
                    self.alloc(kind, pos, children)
                }
            };
            match open.last_mut() {
                Some((_, _, children)) => children.push(built),
                None => roots.push(built),
            }
        }
        assert!(open.is_empty(), "builder finished with unclosed nodes");

        for &node in &roots {
            self.data_mut(node).parent = Some(parent);
        }
        self.data_mut(parent).children.splice(range, roots.iter().copied());
        roots
    }

    /// Detaches `node` so it can be grafted. Panics if `node` is reachable
    /// from the root, which would give it two live parents.
    #[track_caller]
    fn take_for_graft(&mut self, node: NodeId, target: NodeId) {
        assert!(node != self.root, "cannot graft the root");
        assert!(
            target != node && !self.ancestors(target).any(|a| a == node),
            "grafting {node:?} under {target:?} would create a cycle"
        );
        let Some(parent) = self.parent(node) else { return };
        assert!(
            !self.is_attached(node),
            "{node:?} is still attached under {parent:?}; deep copy it or replace its range first"
        );
        assert!(parent != target, "cannot move {node:?} within its own parent");
        self.data_mut(parent).children.retain(|&child| child != node);
        self.data_mut(node).parent = None;
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind, pos: Position, children: Vec<NodeId>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        for &child in &children {
            debug_assert!(self.data(child).parent.is_none(), "{child:?} already has a parent");
            self.data_mut(child).parent = Some(id);
        }
        if let NodeKind::Stay(stay) = kind {
            let slot = &mut self.stays[stay.0 as usize];
            assert!(slot.node.is_none(), "{stay:?} placed twice");
            slot.node = Some(id);
        }
        self.nodes.push(NodeData { kind, pos, parent: None, children });
        id
    }

    pub(crate) fn new_stay_id(&mut self) -> StayId {
        let id = StayId(self.stays.len().try_into().expect("too many stays"));
        self.stays.push(StaySlot::default());
        id
    }

    /// Detached copy of the subtree rooted at `node`.
    pub fn deep_copy(&mut self, node: NodeId) -> NodeId {
        self.deep_copy_with_map(node).0
    }

    /// Like [`Tree::deep_copy`], also mapping every original node to its copy.
    ///
    /// Stay leaves are copied with fresh identities.
    pub fn deep_copy_with_map(&mut self, node: NodeId) -> (NodeId, FxHashMap<NodeId, NodeId>) {
        let mut map = FxHashMap::default();
        let copy = self.copy_subtree(node, &mut map);
        (copy, map)
    }

    fn copy_subtree(&mut self, node: NodeId, map: &mut FxHashMap<NodeId, NodeId>) -> NodeId {
        let kind = match self.kind(node) {
            NodeKind::Stay(_) => NodeKind::Stay(self.new_stay_id()),
            kind => kind.clone(),
        };
        let pos = self.pos(node).clone();
        let children = self.children(node).to_vec();
        let copies = children.into_iter().map(|child| self.copy_subtree(child, map)).collect();
        let copy = self.alloc(kind, pos, copies);
        map.insert(node, copy);
        copy
    }

    /// The live leaf for `stay`, located by identity.
    pub fn find_stay(&self, stay: StayId) -> Option<NodeId> {
        let node = self.stays.get(stay.0 as usize)?.node?;
        self.is_attached(node).then_some(node)
    }

    pub fn consume_stay(&mut self, stay: StayId) -> Result<(), StayError> {
        let slot = self.stays.get_mut(stay.0 as usize).ok_or(StayError::Unknown(stay))?;
        if slot.node.is_none() {
            return Err(StayError::Unknown(stay));
        }
        if slot.consumed {
            return Err(StayError::AlreadyConsumed(stay));
        }
        slot.consumed = true;
        Ok(())
    }

    pub fn is_stay_consumed(&self, stay: StayId) -> bool {
        self.stays.get(stay.0 as usize).is_some_and(|slot| slot.consumed)
    }

    /// Stays still reachable from the root that nobody consumed.
    pub fn unconsumed_stays(&self) -> Vec<(StayId, NodeId)> {
        self.stays
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.consumed)
            .filter_map(|(index, slot)| {
                let node = slot.node?;
                self.is_attached(node).then_some((StayId(index as u32), node))
            })
            .collect()
    }
}
