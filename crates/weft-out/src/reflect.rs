use std::borrow::Cow;
use std::collections::VecDeque;

use weft_span::Position;

use crate::format::FormatElement;

/// One named slot of a node: a single optional child or a run of them.
pub enum Accessor<N> {
    One(fn(&N) -> Option<&N>),
    Many(fn(&N) -> &[N]),
}

impl<N> Clone for Accessor<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Accessor<N> {}

impl<N> Accessor<N> {
    /// How many logical children this slot contributes for `node`.
    pub fn count(self, node: &N) -> usize {
        match self {
            Self::One(f) => usize::from(f(node).is_some()),
            Self::Many(f) => f(node).len(),
        }
    }

    pub fn get(self, node: &N, index: usize) -> Option<&N> {
        match self {
            Self::One(f) => f(node).filter(|_| index == 0),
            Self::Many(f) => f(node).get(index),
        }
    }

    pub fn iter(self, node: &N) -> impl Iterator<Item = &N> {
        let (one, many) = match self {
            Self::One(f) => (f(node), &[][..]),
            Self::Many(f) => (None, f(node)),
        };
        one.into_iter().chain(many)
    }
}

/// A node of a backend's output grammar.
///
/// Every table is shared by all nodes of one variant. An accessor only
/// ever sees nodes of the variant that lists it; for anything else it
/// returns nothing.
pub trait OutTree: Sized + 'static {
    fn child_accessors(&self) -> &'static [Accessor<Self>];

    fn pos(&self) -> &Position;

    fn format_elements(&self) -> &'static [FormatElement];

    /// Text of a leaf, rendered for [`FormatElement::Text`].
    fn token_text(&self) -> Option<Cow<'_, str>> {
        None
    }
}

pub fn child_count<N: OutTree>(node: &N) -> usize {
    node.child_accessors().iter().map(|accessor| accessor.count(node)).sum()
}

/// The child at a flat `index` across every accessor.
pub fn child_or_null<N: OutTree>(node: &N, mut index: usize) -> Option<&N> {
    for accessor in node.child_accessors() {
        let count = accessor.count(node);
        if index < count {
            return accessor.get(node, index);
        }
        index -= count;
    }
    None
}

pub fn children<N: OutTree>(node: &N) -> impl Iterator<Item = &N> {
    node.child_accessors().iter().flat_map(move |accessor| accessor.iter(node))
}

/// Breadth-first walk below `root`. `enter` decides, per yielded node,
/// whether that node's own children are visited too.
pub fn boundary_descent<N, F>(root: &N, enter: F) -> BoundaryDescent<'_, N, F>
where
    N: OutTree,
    F: FnMut(&N) -> bool,
{
    BoundaryDescent { queue: children(root).collect(), enter }
}

pub struct BoundaryDescent<'a, N, F> {
    queue: VecDeque<&'a N>,
    enter: F,
}

impl<'a, N, F> Iterator for BoundaryDescent<'a, N, F>
where
    N: OutTree,
    F: FnMut(&N) -> bool,
{
    type Item = &'a N;

    fn next(&mut self) -> Option<&'a N> {
        let node = self.queue.pop_front()?;
        if (self.enter)(node) {
            self.queue.extend(children(node));
        }
        Some(node)
    }
}

/// Depth, counting direct children as 1, of the shallowest descendant
/// matching `pred` without crossing a node `within` rejects.
pub fn any_child_depth<N: OutTree>(
    root: &N,
    within: impl Fn(&N) -> bool,
    pred: impl Fn(&N) -> bool,
) -> Option<usize> {
    let mut frontier = children(root).collect::<Vec<_>>();
    let mut depth = 1;
    while !frontier.is_empty() {
        if frontier.iter().any(|&node| pred(node)) {
            return Some(depth);
        }
        frontier = frontier.into_iter().filter(|&node| within(node)).flat_map(children).collect();
        depth += 1;
    }
    None
}

/// Whether any descendant matches `pred`, looking inside a node only when
/// `within` accepts it.
pub fn any_child_within_recursive<N: OutTree>(
    root: &N,
    within: &dyn Fn(&N) -> bool,
    pred: &dyn Fn(&N) -> bool,
) -> bool {
    children(root).any(|child| {
        pred(child) || (within(child) && any_child_within_recursive(child, within, pred))
    })
}
