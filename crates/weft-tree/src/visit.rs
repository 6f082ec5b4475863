use crate::tree::{NodeId, Tree};

/// What a visitor wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitCue {
    Continue,
    /// Do not descend into the node just visited. Pre-order only.
    SkipOne,
    AllDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walked {
    Completed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VisitError {
    #[error("cannot skip the children of {0:?}, they were already visited")]
    SkipInPostOrder(NodeId),
}

pub fn walk(
    tree: &Tree,
    root: NodeId,
    order: Order,
    mut visitor: impl FnMut(&Tree, NodeId) -> VisitCue,
) -> Result<Walked, VisitError> {
    match order {
        Order::Pre => {
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                match visitor(tree, node) {
                    VisitCue::Continue => stack.extend(tree.children(node).iter().rev()),
                    VisitCue::SkipOne => {}
                    VisitCue::AllDone => return Ok(Walked::Stopped),
                }
            }
        }
        Order::Post => {
            let mut stack = vec![(root, false)];
            while let Some((node, expanded)) = stack.pop() {
                if !expanded {
                    stack.push((node, true));
                    stack.extend(tree.children(node).iter().rev().map(|&child| (child, false)));
                    continue;
                }
                match visitor(tree, node) {
                    VisitCue::Continue => {}
                    VisitCue::SkipOne => return Err(VisitError::SkipInPostOrder(node)),
                    VisitCue::AllDone => return Ok(Walked::Stopped),
                }
            }
        }
    }
    Ok(Walked::Completed)
}

/// Combines the contributions of visited nodes in visit order.
///
/// `combine` receives the accumulator so far and the next contribution, so
/// it need not be commutative.
pub fn fold<T>(
    tree: &Tree,
    root: NodeId,
    order: Order,
    mut f: impl FnMut(&Tree, NodeId) -> (VisitCue, Option<T>),
    mut combine: impl FnMut(T, T) -> T,
) -> Result<Option<T>, VisitError> {
    let mut acc: Option<T> = None;
    walk(tree, root, order, |tree, node| {
        let (cue, contribution) = f(tree, node);
        if let Some(next) = contribution {
            acc = Some(match acc.take() {
                Some(prev) => combine(prev, next),
                None => next,
            });
        }
        cue
    })?;
    Ok(acc)
}
