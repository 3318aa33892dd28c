//! Predicate compiler: CNF conjunct lists to right-associated AND/OR trees.
//!
//! Every builder threads a `continue_scan` flag. It is raised by any term
//! that cannot promise short-circuit order with respect to row-numbering
//! pseudo-columns (OR, NOT, `<>`, LIKE, SOME/ALL); callers that also compile
//! an instance-number or order-number predicate copy it onto the plan node.

use xasl_expr::{CompareOp, Conjunct, Expr, ExprKind, RangeBound, RangeOp};
use xasl_plan::{EvalTerm, PredExpr, ReguVar, UnaryPredOp};
use xasl_result::{Error, Result};

use crate::context::TranslationContext;
use crate::regu::{Unbox, compile_expr};
use crate::select::compile_subquery;

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct CompiledPred {
    pub pred: Option<PredExpr>,
    pub continue_scan: bool,
}

/// Compile CNF conjuncts: each conjunct becomes an OR chain of its terms and
/// the conjuncts are folded into one AND chain.
pub(crate) fn compile_conjuncts<'e>(
    ctx: &mut TranslationContext<'_>,
    conjuncts: impl IntoIterator<Item = &'e Conjunct>,
) -> Result<CompiledPred> {
    let mut continue_scan = false;
    let mut preds = Vec::new();
    for conjunct in conjuncts {
        if conjunct.is_disjunction() {
            continue_scan = true;
        }
        let mut terms = Vec::with_capacity(conjunct.terms.len());
        for term in &conjunct.terms {
            terms.push(compile_predicate(ctx, term, &mut continue_scan)?);
        }
        if let Some(pred) = PredExpr::or_all(terms) {
            preds.push(pred);
        }
    }
    Ok(CompiledPred {
        pred: PredExpr::and_all(preds),
        continue_scan,
    })
}

/// Compile one boolean expression.
pub(crate) fn compile_predicate(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    continue_scan: &mut bool,
) -> Result<PredExpr> {
    match &expr.kind {
        ExprKind::Compare { op, left, right } => {
            compile_compare(ctx, expr, *op, left, right, continue_scan)
        }
        ExprKind::Between {
            negated,
            operand,
            low,
            high,
        } => {
            let x = compile_expr(ctx, operand, Unbox::Value)?;
            expect_pair(ctx, operand, low);
            expect_pair(ctx, operand, high);
            let lo = compile_expr(ctx, low, Unbox::Value)?;
            let hi = compile_expr(ctx, high, Unbox::Value)?;
            let pred = PredExpr::And(
                Box::new(PredExpr::compare(CompareOp::Ge, x.clone(), lo)),
                Box::new(PredExpr::compare(CompareOp::Le, x, hi)),
            );
            if *negated {
                *continue_scan = true;
                return Ok(pred.negate());
            }
            Ok(pred)
        }
        ExprKind::Range { operand, ranges } => {
            let x = compile_expr(ctx, operand, Unbox::Value)?;
            if ranges.len() > 1 {
                *continue_scan = true;
            }
            let mut alternatives = Vec::with_capacity(ranges.len());
            for bound in ranges {
                alternatives.push(compile_range_bound(ctx, expr, operand, &x, bound)?);
            }
            PredExpr::or_all(alternatives)
                .ok_or_else(|| Error::unsupported(expr.id, "RANGE without sub-ranges"))
        }
        ExprKind::Like {
            negated,
            operand,
            pattern,
            escape,
        } => {
            *continue_scan = true;
            let operand = compile_expr(ctx, operand, Unbox::Value)?;
            let pattern = compile_expr(ctx, pattern, Unbox::Value)?;
            let escape = escape
                .as_deref()
                .map(|e| compile_expr(ctx, e, Unbox::Value))
                .transpose()?;
            for side in [&operand, &pattern] {
                let d = side.domain();
                if !(d.is_string() || d.is_variable() || d == xasl_types::Domain::Null) {
                    return Err(Error::unsupported(expr.id, format!("LIKE on {d}")));
                }
            }
            let pred = PredExpr::Term(EvalTerm::Like {
                operand,
                pattern,
                escape,
            });
            Ok(if *negated { pred.negate() } else { pred })
        }
        ExprKind::Quantified {
            op,
            quantifier,
            left,
            right,
        } => {
            *continue_scan = true;
            if let ExprKind::Tuple(items) = &left.kind {
                return compile_tuple_membership(ctx, expr, *op, items, right, continue_scan);
            }
            if let Some(d) = left.static_domain() {
                ctx.expect_domain(right.id, d.clone());
            }
            let lhs = compile_expr(ctx, left, Unbox::Value)?;
            let set = compile_expr(ctx, right, Unbox::Table)?;
            Ok(PredExpr::Term(EvalTerm::Alsm {
                op: *op,
                quantifier: *quantifier,
                lhs,
                set,
            }))
        }
        ExprKind::IsNull { negated, operand } => {
            let operand = compile_expr(ctx, operand, Unbox::Value)?;
            let pred = PredExpr::Term(EvalTerm::Unary {
                op: UnaryPredOp::IsNull,
                operand,
            });
            if *negated {
                *continue_scan = true;
                return Ok(pred.negate());
            }
            Ok(pred)
        }
        ExprKind::Exists(query) => {
            let xasl = compile_subquery(ctx, query)?;
            Ok(PredExpr::Term(EvalTerm::Unary {
                op: UnaryPredOp::Exists,
                operand: ReguVar::ListId { xasl },
            }))
        }
        ExprKind::Not(inner) => {
            *continue_scan = true;
            Ok(compile_predicate(ctx, inner, continue_scan)?.negate())
        }
        ExprKind::And(terms) => {
            let mut preds = Vec::with_capacity(terms.len());
            for term in terms {
                preds.push(compile_predicate(ctx, term, continue_scan)?);
            }
            PredExpr::and_all(preds).ok_or_else(|| Error::unsupported(expr.id, "empty AND"))
        }
        ExprKind::Or(terms) => {
            *continue_scan = true;
            let mut preds = Vec::with_capacity(terms.len());
            for term in terms {
                preds.push(compile_predicate(ctx, term, continue_scan)?);
            }
            PredExpr::or_all(preds).ok_or_else(|| Error::unsupported(expr.id, "empty OR"))
        }
        _ => Err(Error::unsupported(expr.id, "value used as a predicate")),
    }
}

/// Let each side of a comparison expect the other side's static type.
fn expect_pair(ctx: &mut TranslationContext<'_>, left: &Expr, right: &Expr) {
    if let Some(d) = right.static_domain() {
        ctx.expect_domain(left.id, d.clone());
    }
    if let Some(d) = left.static_domain() {
        ctx.expect_domain(right.id, d.clone());
    }
}

fn compile_compare(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    op: CompareOp,
    left: &Expr,
    right: &Expr,
    continue_scan: &mut bool,
) -> Result<PredExpr> {
    if let (ExprKind::Tuple(ls), ExprKind::Tuple(rs)) = (&left.kind, &right.kind) {
        if ls.len() != rs.len() {
            return Err(Error::unsupported(
                expr.id,
                format!("row comparison of {} and {} values", ls.len(), rs.len()),
            ));
        }
        let mut parts = Vec::with_capacity(ls.len());
        for (l, r) in ls.iter().zip(rs) {
            parts.push(compile_compare(ctx, expr, op, l, r, continue_scan)?);
        }
        return match op {
            CompareOp::Eq | CompareOp::NullSafeEq => {
                PredExpr::and_all(parts).ok_or_else(|| Error::unsupported(expr.id, "empty row"))
            }
            CompareOp::Ne => {
                PredExpr::or_all(parts).ok_or_else(|| Error::unsupported(expr.id, "empty row"))
            }
            other => Err(Error::unsupported(
                expr.id,
                format!("row comparison with {}", other.as_str()),
            )),
        };
    }
    if matches!(left.kind, ExprKind::Tuple(_)) || matches!(right.kind, ExprKind::Tuple(_)) {
        return Err(Error::unsupported(expr.id, "row compared with a scalar"));
    }

    expect_pair(ctx, left, right);
    let lhs = compile_expr(ctx, left, Unbox::Value)?;
    let rhs = compile_expr(ctx, right, Unbox::Value)?;
    let (ld, rd) = (lhs.domain(), rhs.domain());
    if !ld.is_comparable_with(&rd) {
        return Err(Error::unsupported(
            expr.id,
            format!("comparison of {ld} with {rd}"),
        ));
    }
    if op == CompareOp::Ne {
        *continue_scan = true;
    }
    Ok(PredExpr::compare(op, lhs, rhs))
}

/// `(a, b) IN ((1, 2), (3, 4))` over a literal row set, expanded into an OR
/// of row equalities.
fn compile_tuple_membership(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    op: CompareOp,
    items: &[Expr],
    right: &Expr,
    continue_scan: &mut bool,
) -> Result<PredExpr> {
    let ExprKind::SetLiteral { elements, .. } = &right.kind else {
        return Err(Error::unsupported(
            expr.id,
            "row membership against a non-literal set",
        ));
    };
    if op != CompareOp::Eq {
        return Err(Error::unsupported(
            expr.id,
            format!("row membership with {}", op.as_str()),
        ));
    }
    let mut rows = Vec::with_capacity(elements.len());
    for element in elements {
        let ExprKind::Tuple(values) = &element.kind else {
            return Err(Error::unsupported(element.id, "scalar in a row set"));
        };
        if values.len() != items.len() {
            return Err(Error::unsupported(
                element.id,
                format!("row of {} values against {}", values.len(), items.len()),
            ));
        }
        let mut parts = Vec::with_capacity(items.len());
        for (l, r) in items.iter().zip(values) {
            parts.push(compile_compare(ctx, expr, CompareOp::Eq, l, r, continue_scan)?);
        }
        if let Some(row) = PredExpr::and_all(parts) {
            rows.push(row);
        }
    }
    PredExpr::or_all(rows).ok_or_else(|| Error::unsupported(expr.id, "empty row set"))
}

/// Bounds of one RANGE sub-range.
#[derive(Clone, Copy, Debug)]
pub(crate) enum BoundShape<'e> {
    Eq(&'e Expr),
    Interval {
        /// `(inclusive, value)`
        lower: Option<(bool, &'e Expr)>,
        upper: Option<(bool, &'e Expr)>,
    },
}

pub(crate) fn bound_shape<'e>(owner: &Expr, bound: &'e RangeBound) -> Result<BoundShape<'e>> {
    let low = bound.low.as_deref();
    let high = bound.high.as_deref();
    let missing = || Error::unsupported(owner.id, "RANGE bound without a value");
    let two = |lo_inc: bool, hi_inc: bool| -> Result<BoundShape<'e>> {
        match (low, high) {
            (Some(l), Some(h)) => Ok(BoundShape::Interval {
                lower: Some((lo_inc, l)),
                upper: Some((hi_inc, h)),
            }),
            _ => Err(missing()),
        }
    };
    match bound.op {
        RangeOp::Eq => low.map(BoundShape::Eq).ok_or_else(missing),
        RangeOp::GeLe => two(true, true),
        RangeOp::GeLt => two(true, false),
        RangeOp::GtLe => two(false, true),
        RangeOp::GtLt => two(false, false),
        RangeOp::Ge | RangeOp::Gt => {
            let value = low.ok_or_else(missing)?;
            Ok(BoundShape::Interval {
                lower: Some((bound.op == RangeOp::Ge, value)),
                upper: None,
            })
        }
        RangeOp::Le | RangeOp::Lt => {
            let value = high.or(low).ok_or_else(missing)?;
            Ok(BoundShape::Interval {
                lower: None,
                upper: Some((bound.op == RangeOp::Le, value)),
            })
        }
    }
}

fn compile_range_bound(
    ctx: &mut TranslationContext<'_>,
    owner: &Expr,
    operand: &Expr,
    x: &ReguVar,
    bound: &RangeBound,
) -> Result<PredExpr> {
    match bound_shape(owner, bound)? {
        BoundShape::Eq(value) => {
            expect_pair(ctx, operand, value);
            let v = compile_expr(ctx, value, Unbox::Value)?;
            Ok(PredExpr::compare(CompareOp::Eq, x.clone(), v))
        }
        BoundShape::Interval { lower, upper } => {
            let mut parts = Vec::with_capacity(2);
            if let Some((inclusive, value)) = lower {
                expect_pair(ctx, operand, value);
                let v = compile_expr(ctx, value, Unbox::Value)?;
                let op = if inclusive { CompareOp::Ge } else { CompareOp::Gt };
                parts.push(PredExpr::compare(op, x.clone(), v));
            }
            if let Some((inclusive, value)) = upper {
                expect_pair(ctx, operand, value);
                let v = compile_expr(ctx, value, Unbox::Value)?;
                let op = if inclusive { CompareOp::Le } else { CompareOp::Lt };
                parts.push(PredExpr::compare(op, x.clone(), v));
            }
            PredExpr::and_all(parts).ok_or_else(|| Error::unsupported(owner.id, "empty RANGE bound"))
        }
    }
}
