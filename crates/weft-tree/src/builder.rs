use drop_bomb::DropBomb;
use weft_span::Position;

use crate::kind::{Name, NodeKind, Symbol};
use crate::tree::{NodeId, StayId, Tree};
use crate::value::Value;

pub(crate) enum Event {
    Start { kind: NodeKind, pos: Option<Position> },
    Leaf { kind: NodeKind, pos: Position },
    Graft(NodeId),
    Finish,
}

/// Records the replacement content for [`Tree::replace`].
///
/// Nothing touches the tree's shape until the builder is done; the whole
/// recording is then spliced in at once. Inner nodes without an explicit
/// position cover their children, or sit at the edge of the replaced range
/// when they have none.
pub struct TreeBuilder<'t> {
    tree: &'t mut Tree,
    events: Vec<Event>,
    default_pos: Position,
    depth: usize,
}

impl<'t> TreeBuilder<'t> {
    pub(crate) fn new(tree: &'t mut Tree, default_pos: Position) -> Self {
        Self { tree, events: Vec::new(), default_pos, depth: 0 }
    }

    pub(crate) fn finish(self) -> Vec<Event> {
        assert_eq!(self.depth, 0, "unfinished nodes in tree builder");
        self.events
    }

    /// The tree being edited, as it was before this replacement.
    pub fn tree(&self) -> &Tree {
        self.tree
    }

    pub fn default_pos(&self) -> &Position {
        &self.default_pos
    }

    pub fn start(&mut self, kind: NodeKind) -> Marker {
        self.start_inner(kind, None)
    }

    pub fn start_at(&mut self, kind: NodeKind, pos: Position) -> Marker {
        self.start_inner(kind, Some(pos))
    }

    #[track_caller]
    fn start_inner(&mut self, kind: NodeKind, pos: Option<Position>) -> Marker {
        assert!(!kind.is_leaf(), "{} is a leaf kind", kind.name());
        self.events.push(Event::Start { kind, pos });
        self.depth += 1;
        Marker::new()
    }

    pub fn node(&mut self, kind: NodeKind, children: impl FnOnce(&mut Self)) {
        let m = self.start(kind);
        children(self);
        m.complete(self);
    }

    pub fn node_at(&mut self, kind: NodeKind, pos: Position, children: impl FnOnce(&mut Self)) {
        let m = self.start_at(kind, pos);
        children(self);
        m.complete(self);
    }

    pub fn leaf(&mut self, kind: NodeKind) {
        let pos = self.default_pos.clone();
        self.leaf_at(kind, pos);
    }

    #[track_caller]
    pub fn leaf_at(&mut self, kind: NodeKind, pos: Position) {
        assert!(kind.is_leaf(), "{} is not a leaf kind", kind.name());
        assert!(!matches!(kind, NodeKind::Stay(_)), "use `TreeBuilder::stay` for placeholders");
        self.events.push(Event::Leaf { kind, pos });
    }

    pub fn value(&mut self, value: Value, pos: Position) {
        self.leaf_at(NodeKind::Value(value), pos);
    }

    pub fn symbol(&mut self, symbol: Symbol, pos: Position) {
        self.value(Value::Symbol(symbol), pos);
    }

    pub fn left_name(&mut self, name: Name, pos: Position) {
        self.leaf_at(NodeKind::LeftName(name), pos);
    }

    pub fn right_name(&mut self, name: Name, pos: Position) {
        self.leaf_at(NodeKind::RightName(name), pos);
    }

    /// Places a fresh placeholder leaf and returns its identity.
    pub fn stay(&mut self, pos: Position) -> StayId {
        let stay = self.tree.new_stay_id();
        self.events.push(Event::Leaf { kind: NodeKind::Stay(stay), pos });
        stay
    }

    /// Moves an existing node here.
    ///
    /// `node` must be detached, or live inside a subtree this same
    /// replacement removes. Grafting a node that stays attached elsewhere
    /// panics when the replacement is applied.
    pub fn graft(&mut self, node: NodeId) {
        self.events.push(Event::Graft(node));
    }

    pub fn graft_all(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            self.graft(node);
        }
    }

    /// Detached copy of `node`, ready to be grafted.
    pub fn copy(&mut self, node: NodeId) -> NodeId {
        self.tree.deep_copy(node)
    }
}

pub struct Marker {
    bomb: DropBomb,
}

impl Marker {
    fn new() -> Self {
        Self { bomb: DropBomb::new("Marker must be completed") }
    }

    pub fn complete(mut self, b: &mut TreeBuilder<'_>) {
        self.bomb.defuse();
        b.events.push(Event::Finish);
        b.depth -= 1;
    }
}
