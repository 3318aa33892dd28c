//! Iterative traversal of plan graphs and predicate trees.
//!
//! Plans compiled from generated SQL can nest predicates and subqueries very
//! deeply, so every walk here uses an explicit work stack instead of
//! recursion.
//!
//! Two tools are provided:
//!
//! - [`Traversable`] + [`traverse_postorder`] fold a borrowed tree bottom-up
//!   (used to render predicate trees).
//! - [`plan_postorder`] orders the nodes of a plan graph children-first along
//!   ownership edges, detecting cycles on the way.

use rustc_hash::FxHashSet;
use xasl_result::{Error, Result};

use crate::arena::{PlanArena, XaslId};
use crate::predicate::PredExpr;

enum Frame<'a, T> {
    Enter(&'a T),
    Exit(&'a T, usize),
}

/// A tree that can be folded bottom-up without recursion.
pub trait Traversable: Sized {
    type Output;

    /// Direct children of this node, in fold order.
    fn visit_children(&self) -> Result<Vec<&Self>>;

    /// Build this node's result from its children's results.
    fn construct(&self, children: Vec<Self::Output>) -> Result<Self::Output>;
}

/// Fold `root` bottom-up using explicit work and result stacks.
pub fn traverse_postorder<T>(root: &T) -> Result<T::Output>
where
    T: Traversable,
{
    let mut work_stack: Vec<Frame<T>> = vec![Frame::Enter(root)];
    let mut result_stack: Vec<T::Output> = Vec::new();

    while let Some(frame) = work_stack.pop() {
        match frame {
            Frame::Enter(node) => {
                let children = node.visit_children()?;
                work_stack.push(Frame::Exit(node, children.len()));
                for child in children.into_iter().rev() {
                    work_stack.push(Frame::Enter(child));
                }
            }
            Frame::Exit(node, child_count) => {
                if result_stack.len() < child_count {
                    return Err(Error::Internal(
                        "traverse_postorder: result stack underflow".into(),
                    ));
                }
                let start = result_stack.len() - child_count;
                let children: Vec<T::Output> = result_stack.drain(start..).collect();
                result_stack.push(node.construct(children)?);
            }
        }
    }

    result_stack
        .pop()
        .ok_or_else(|| Error::Internal("traverse_postorder: empty result stack".into()))
}

impl Traversable for PredExpr {
    type Output = String;

    fn visit_children(&self) -> Result<Vec<&Self>> {
        Ok(match self {
            PredExpr::And(l, r) | PredExpr::Or(l, r) => vec![l.as_ref(), r.as_ref()],
            PredExpr::Not(inner) => vec![inner.as_ref()],
            PredExpr::Term(_) => Vec::new(),
        })
    }

    fn construct(&self, mut children: Vec<String>) -> Result<String> {
        let mut take = || {
            children
                .pop()
                .ok_or_else(|| Error::Internal("predicate fold lost a child".into()))
        };
        Ok(match self {
            PredExpr::And(_, _) => {
                let right = take()?;
                let left = take()?;
                format!("({left} AND {right})")
            }
            PredExpr::Or(_, _) => {
                let right = take()?;
                let left = take()?;
                format!("({left} OR {right})")
            }
            PredExpr::Not(_) => format!("NOT {}", take()?),
            PredExpr::Term(term) => crate::explain::render_term(term),
        })
    }
}

/// Nodes reachable from `root` along ownership edges, children before
/// parents. A node owned from two places is listed once.
///
/// Fails with [`Error::InvalidPlan`] if the ownership edges form a cycle.
pub fn plan_postorder(arena: &PlanArena, root: XaslId) -> Result<Vec<XaslId>> {
    enum Step {
        Enter(XaslId),
        Exit(XaslId),
    }

    let mut order = Vec::new();
    let mut done: FxHashSet<XaslId> = FxHashSet::default();
    let mut on_path: FxHashSet<XaslId> = FxHashSet::default();
    let mut work = vec![Step::Enter(root)];

    while let Some(step) = work.pop() {
        match step {
            Step::Enter(id) => {
                if done.contains(&id) {
                    continue;
                }
                if !on_path.insert(id) {
                    return Err(Error::InvalidPlan(format!("cycle through plan node {id}")));
                }
                work.push(Step::Exit(id));
                let children = arena.node(id)?.owned_children();
                for child in children.into_iter().rev() {
                    if on_path.contains(&child) {
                        return Err(Error::InvalidPlan(format!(
                            "cycle through plan node {child}"
                        )));
                    }
                    work.push(Step::Enter(child));
                }
            }
            Step::Exit(id) => {
                on_path.remove(&id);
                if done.insert(id) {
                    order.push(id);
                }
            }
        }
    }
    Ok(order)
}

/// Pre-order listing with depth, following ownership edges. Shared nodes
/// are listed at their first owner only.
pub fn plan_preorder(arena: &PlanArena, root: XaslId) -> Result<Vec<(XaslId, usize)>> {
    // Validates acyclicity before walking.
    plan_postorder(arena, root)?;

    let mut out = Vec::new();
    let mut seen: FxHashSet<XaslId> = FxHashSet::default();
    let mut work = vec![(root, 0usize)];
    while let Some((id, depth)) = work.pop() {
        if !seen.insert(id) {
            continue;
        }
        out.push((id, depth));
        let children = arena.node(id)?.owned_children();
        for child in children.into_iter().rev() {
            work.push((child, depth + 1));
        }
    }
    Ok(out)
}
