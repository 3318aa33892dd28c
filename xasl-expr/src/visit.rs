//! Iterative pre-order walkers over expressions and query blocks.
//!
//! Walks use an explicit work stack rather than recursion so that very deep
//! predicate chains (thousands of OR-ed terms are common in generated SQL)
//! cannot exhaust the thread stack.
//!
//! A walk either stays inside the current query block ([`WalkScope::Block`])
//! or also descends into nested subqueries and derived tables
//! ([`WalkScope::Nested`]). Aggregates and pseudo-columns belong to the block
//! that syntactically contains them, so the helpers that look for those use
//! `Block`; correlation analysis needs `Nested`.

use rustc_hash::FxHashSet;
use xasl_types::SpecId;

use crate::expr::{AggregateCall, Expr, ExprKind, NameRef, PseudoColumn};
use crate::statement::{Query, SelectBlock, block_roots, order_exprs};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// Do not descend into the children of the node just visited.
    SkipChildren,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkScope {
    Block,
    Nested,
}

enum Frame<'a> {
    Expr(&'a Expr),
    Query(&'a Query),
}

/// Visit every expression reachable from `roots` in pre-order.
pub fn walk<'a, I, F>(roots: I, scope: WalkScope, mut f: F)
where
    I: IntoIterator<Item = &'a Expr>,
    F: FnMut(&'a Expr) -> Visit,
{
    let mut work: Vec<Frame<'a>> = roots.into_iter().map(Frame::Expr).collect();
    work.reverse();

    while let Some(frame) = work.pop() {
        match frame {
            Frame::Expr(expr) => {
                if f(expr) == Visit::SkipChildren {
                    continue;
                }
                let mark = work.len();
                push_children(expr, scope, &mut work);
                work[mark..].reverse();
            }
            Frame::Query(query) => {
                let mark = work.len();
                push_query(query, &mut work);
                work[mark..].reverse();
            }
        }
    }
}

/// Visit every expression of `block`, including those of nested queries.
pub fn walk_block<'a, F>(block: &'a SelectBlock, f: F)
where
    F: FnMut(&'a Expr) -> Visit,
{
    let (exprs, queries) = block_roots(block);
    let mut roots: Vec<&'a Expr> = exprs;
    // Derived tables are not expressions; walk them via their own roots.
    let mut nested: Vec<&'a Expr> = Vec::new();
    let mut pending: Vec<&'a Query> = queries;
    while let Some(query) = pending.pop() {
        collect_query_roots(query, &mut nested, &mut pending);
    }
    roots.extend(nested);
    walk(roots, WalkScope::Nested, f);
}

fn collect_query_roots<'a>(query: &'a Query, exprs: &mut Vec<&'a Expr>, pending: &mut Vec<&'a Query>) {
    match query {
        Query::Select(block) => {
            let (e, q) = block_roots(block);
            exprs.extend(e);
            pending.extend(q);
        }
        Query::SetOp(op) => {
            exprs.extend(order_exprs(&op.order_by));
            pending.push(&op.left);
            pending.push(&op.right);
        }
    }
}

fn push_query<'a>(query: &'a Query, work: &mut Vec<Frame<'a>>) {
    match query {
        Query::Select(block) => {
            let (exprs, queries) = block_roots(block);
            work.extend(exprs.into_iter().map(Frame::Expr));
            work.extend(queries.into_iter().map(Frame::Query));
        }
        Query::SetOp(op) => {
            work.push(Frame::Query(&op.left));
            work.push(Frame::Query(&op.right));
            work.extend(order_exprs(&op.order_by).map(Frame::Expr));
        }
    }
}

fn push_children<'a>(expr: &'a Expr, scope: WalkScope, work: &mut Vec<Frame<'a>>) {
    use ExprKind::*;
    match &expr.kind {
        Literal(_) | Name(_) | Pseudo(_) => {}
        Unary { operand, .. } | Cast { operand, .. } | Prior(operand) | Not(operand) => {
            work.push(Frame::Expr(operand));
        }
        IsNull { operand, .. } => work.push(Frame::Expr(operand)),
        Arith { left, right, .. } | Compare { left, right, .. } | Quantified { left, right, .. } => {
            work.push(Frame::Expr(left));
            work.push(Frame::Expr(right));
        }
        Function { args, .. } | Tuple(args) | And(args) | Or(args) => {
            work.extend(args.iter().map(Frame::Expr));
        }
        SetLiteral { elements, .. } => work.extend(elements.iter().map(Frame::Expr)),
        Aggregate(AggregateCall { arg, .. }) => {
            if let Some(arg) = arg {
                work.push(Frame::Expr(arg));
            }
        }
        Between {
            operand, low, high, ..
        } => {
            work.push(Frame::Expr(operand));
            work.push(Frame::Expr(low));
            work.push(Frame::Expr(high));
        }
        Range { operand, ranges } => {
            work.push(Frame::Expr(operand));
            for range in ranges {
                if let Some(low) = &range.low {
                    work.push(Frame::Expr(low));
                }
                if let Some(high) = &range.high {
                    work.push(Frame::Expr(high));
                }
            }
        }
        Like {
            operand,
            pattern,
            escape,
            ..
        } => {
            work.push(Frame::Expr(operand));
            work.push(Frame::Expr(pattern));
            if let Some(escape) = escape {
                work.push(Frame::Expr(escape));
            }
        }
        Subquery(query) | Exists(query) => {
            if scope == WalkScope::Nested {
                work.push(Frame::Query(query));
            }
        }
    }
}

/// True if any expression in `roots` calls an aggregate function of the
/// current block.
pub fn contains_aggregate<'a, I>(roots: I) -> bool
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut found = false;
    walk(roots, WalkScope::Block, |expr| {
        if matches!(expr.kind, ExprKind::Aggregate(_)) {
            found = true;
            return Visit::SkipChildren;
        }
        Visit::Continue
    });
    found
}

/// True if `expr` references the given pseudo-column in the current block.
pub fn contains_pseudo(expr: &Expr, pseudo: PseudoColumn) -> bool {
    let mut found = false;
    walk([expr], WalkScope::Block, |e| {
        if matches!(e.kind, ExprKind::Pseudo(p) if p == pseudo) {
            found = true;
        }
        Visit::Continue
    });
    found
}

/// Aggregate calls of the current block, first occurrence per node id, in
/// pre-order.
pub fn collect_aggregates<'a, I>(roots: I) -> Vec<&'a Expr>
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    walk(roots, WalkScope::Block, |expr| {
        if matches!(expr.kind, ExprKind::Aggregate(_)) {
            if seen.insert(expr.id) {
                out.push(expr);
            }
            // Nested aggregates are rejected by the binder.
            return Visit::SkipChildren;
        }
        Visit::Continue
    });
    out
}

/// Specs referenced by name anywhere under `roots`, nested subqueries
/// included.
pub fn referenced_specs<'a, I>(roots: I) -> FxHashSet<SpecId>
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut specs = FxHashSet::default();
    walk(roots, WalkScope::Nested, |expr| {
        if let ExprKind::Name(name) = &expr.kind {
            specs.insert(name.spec);
        }
        Visit::Continue
    });
    specs
}

/// Attribute names of `spec` referenced anywhere in `block` (nested queries
/// included), deduplicated case-insensitively, in first-seen order.
pub fn referenced_names(block: &SelectBlock, spec: SpecId) -> Vec<NameRef> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    walk_block(block, |expr| {
        if let ExprKind::Name(name) = &expr.kind
            && name.spec == spec
            && seen.insert(name.name.to_ascii_lowercase())
        {
            out.push(name.clone());
        }
        Visit::Continue
    });
    out
}

/// Same as [`referenced_names`] over an arbitrary set of roots.
pub fn referenced_names_in<'a, I>(roots: I, spec: SpecId) -> Vec<NameRef>
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    walk(roots, WalkScope::Nested, |expr| {
        if let ExprKind::Name(name) = &expr.kind
            && name.spec == spec
            && seen.insert(name.name.to_ascii_lowercase())
        {
            out.push(name.clone());
        }
        Visit::Continue
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::AstBuilder;
    use crate::expr::{AggregateFunc, CompareOp};
    use crate::statement::SelectItem;
    use xasl_types::{ClassId, Domain};

    #[test]
    fn aggregates_inside_subqueries_belong_to_the_subquery() {
        let mut b = AstBuilder::new();
        let t = b.from_class(ClassId::new(1), "t");
        let inner_arg = b.name(t.spec, "x", Domain::Integer);
        let inner_agg = b.agg(AggregateFunc::Max, inner_arg);
        let mut inner = b.select(vec![inner_agg]);
        inner.from.push(t);
        let sub = b.subquery(inner);

        assert!(!contains_aggregate([&sub]));
    }

    #[test]
    fn referenced_names_follow_correlated_subqueries() {
        let mut b = AstBuilder::new();
        let outer = b.from_class(ClassId::new(1), "o");
        let inner_t = b.from_class(ClassId::new(2), "i");

        let inner_col = b.name(inner_t.spec, "fk", Domain::Integer);
        let outer_col = b.name(outer.spec, "ID", Domain::Integer);
        let corr = b.compare(CompareOp::Eq, inner_col, outer_col);
        let one = b.lit(1);
        let mut inner = b.select(vec![one]);
        inner.from.push(inner_t);
        inner.where_clause.push(crate::expr::Conjunct::single(corr));
        let exists = b.exists(inner);

        let a = b.name(outer.spec, "a", Domain::Integer);
        let a_again = b.name(outer.spec, "A", Domain::Integer);
        let id = b.name(outer.spec, "id", Domain::Integer);
        let mut block = b.select(vec![a, a_again]);
        block.items.push(SelectItem::new(id));
        block.from.push(outer.clone());
        block.where_clause.push(crate::expr::Conjunct::single(exists));

        let names: Vec<String> = referenced_names(&block, outer.spec)
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "id".to_string()]);
    }

    #[test]
    fn deep_or_chain_does_not_recurse() {
        let mut b = AstBuilder::new();
        let t = b.from_class(ClassId::new(1), "t");
        let mut terms = Vec::new();
        for i in 0..2_000 {
            let col = b.name(t.spec, "k", Domain::Integer);
            let lit = b.lit(i);
            terms.push(b.compare(CompareOp::Eq, col, lit));
        }
        let mut chain = terms.pop().expect("terms");
        while let Some(next) = terms.pop() {
            let or = b.or(vec![next, chain]);
            chain = b.not(or);
        }
        let mut count = 0usize;
        walk([&chain], WalkScope::Block, |_| {
            count += 1;
            Visit::Continue
        });
        assert!(count > 6_000);
    }

    #[test]
    fn pseudo_lookup() {
        let mut b = AstBuilder::new();
        let rownum = b.pseudo(PseudoColumn::InstNum);
        let ten = b.lit(10);
        let pred = b.compare(CompareOp::Le, rownum, ten);
        assert!(contains_pseudo(&pred, PseudoColumn::InstNum));
        assert!(!contains_pseudo(&pred, PseudoColumn::OrderByNum));
    }
}
