//! Scalar expression compiler: parse-tree expression to [`ReguVar`].

use xasl_expr::{ArithOp, Expr, ExprKind, Function, PseudoColumn, Query, UnaryOp};
use xasl_plan::{ArithExpr, ArithKind, FuncCall, FuncKind, PseudoSlot, ReguVar, XaslId};
use xasl_result::{Error, Result};
use xasl_types::{DbValue, Domain};

use crate::connect_by;
use crate::context::TranslationContext;
use crate::select::compile_subquery;

/// How a query-valued expression is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unbox {
    /// First column of the single row.
    Value,
    /// The whole result list.
    Table,
}

pub(crate) fn compile_expr(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    unbox: Unbox,
) -> Result<ReguVar> {
    if let Some(bound) = ctx.forward(expr.id) {
        return Ok(bound.clone());
    }
    if let Ok(scope) = ctx.scope()
        && let Some(group) = &scope.group
        && let Some(slot) = group.lookup(expr)
    {
        return Ok(slot);
    }

    match &expr.kind {
        ExprKind::Literal(value) => Ok(ReguVar::Constant(value.clone())),
        ExprKind::Name(name) => ctx.resolve_name(expr, name),
        ExprKind::Pseudo(pseudo) => compile_pseudo(ctx, expr, *pseudo),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => {
            let operand = compile_expr(ctx, operand, Unbox::Value)?;
            let domain = match operand.domain() {
                d if d.is_numeric() || d == Domain::Null => d,
                d if d.is_variable() => fallback_domain(ctx, expr, "negation")?,
                d => return Err(Error::unsupported(expr.id, format!("negation of {d}"))),
            };
            Ok(ReguVar::Arith(ArithExpr {
                op: ArithKind::Neg,
                operands: vec![operand],
                domain,
            }))
        }
        ExprKind::Arith { op, left, right } => {
            let lhs = compile_expr(ctx, left, Unbox::Value)?;
            let rhs = compile_expr(ctx, right, Unbox::Value)?;
            let domain = arith_domain(ctx, expr, *op, &lhs.domain(), &rhs.domain())?;
            Ok(ReguVar::Arith(ArithExpr {
                op: ArithKind::from(*op),
                operands: vec![lhs, rhs],
                domain,
            }))
        }
        ExprKind::Function { func, args } => {
            let args = compile_exprs(ctx, args)?;
            let domain = function_domain(ctx, expr, *func, &args)?;
            Ok(ReguVar::Func(FuncCall {
                func: FuncKind::Scalar(*func),
                args,
                domain,
            }))
        }
        ExprKind::Cast { operand, target } => {
            let operand = compile_expr(ctx, operand, Unbox::Value)?;
            let source = operand.domain();
            let known = !source.is_variable() && source != Domain::Null;
            if known && source.is_collection() != target.is_collection() {
                return Err(Error::unsupported(
                    expr.id,
                    format!("cast from {source} to {target}"),
                ));
            }
            Ok(ReguVar::Func(FuncCall {
                func: FuncKind::Cast(target.clone()),
                args: vec![operand],
                domain: target.clone(),
            }))
        }
        ExprKind::Aggregate(_) => Err(Error::unsupported(
            expr.id,
            "aggregate function outside an aggregating select list",
        )),
        ExprKind::Subquery(query) => compile_query_value(ctx, expr, query, unbox),
        ExprKind::SetLiteral { kind, elements } => {
            let values = compile_exprs(ctx, elements)?;
            if values.iter().all(|v| matches!(v, ReguVar::Constant(_))) {
                let elements = values
                    .into_iter()
                    .filter_map(|v| match v {
                        ReguVar::Constant(value) => Some(value),
                        _ => None,
                    })
                    .collect();
                return Ok(ReguVar::Constant(DbValue::Collection {
                    kind: *kind,
                    elements,
                }));
            }
            let element = values
                .iter()
                .map(ReguVar::domain)
                .find(|d| !d.is_variable() && *d != Domain::Null)
                .unwrap_or(Domain::Variable);
            Ok(ReguVar::Func(FuncCall {
                func: FuncKind::SetConstructor(*kind),
                args: values,
                domain: Domain::Collection {
                    kind: *kind,
                    element: Box::new(element),
                },
            }))
        }
        ExprKind::Prior(inner) => connect_by::compile_prior(ctx, expr, inner),
        ExprKind::Tuple(_) => Err(Error::unsupported(expr.id, "row value used as a scalar")),
        ExprKind::Compare { .. }
        | ExprKind::Between { .. }
        | ExprKind::Range { .. }
        | ExprKind::Like { .. }
        | ExprKind::Quantified { .. }
        | ExprKind::IsNull { .. }
        | ExprKind::Exists(_)
        | ExprKind::Not(_)
        | ExprKind::And(_)
        | ExprKind::Or(_) => Err(Error::unsupported(expr.id, "predicate used as a value")),
    }
}

pub(crate) fn compile_exprs(
    ctx: &mut TranslationContext<'_>,
    exprs: &[Expr],
) -> Result<Vec<ReguVar>> {
    exprs
        .iter()
        .map(|e| compile_expr(ctx, e, Unbox::Value))
        .collect()
}

fn compile_pseudo(
    ctx: &TranslationContext<'_>,
    expr: &Expr,
    pseudo: PseudoColumn,
) -> Result<ReguVar> {
    match pseudo {
        PseudoColumn::InstNum => Ok(ReguVar::Pseudo(PseudoSlot::InstNum)),
        PseudoColumn::OrderByNum if ctx.block.ordbynum_as_instnum => {
            Ok(ReguVar::Pseudo(PseudoSlot::InstNum))
        }
        PseudoColumn::OrderByNum => Ok(ReguVar::Pseudo(PseudoSlot::OrderByNum)),
        PseudoColumn::GroupByNum => Ok(ReguVar::Pseudo(PseudoSlot::GroupByNum)),
        // Hierarchical pseudo-columns are pre-bound by the CONNECT BY compiler.
        PseudoColumn::Level | PseudoColumn::ConnectByIsLeaf | PseudoColumn::ConnectByIsCycle => {
            Err(Error::unsupported(
                expr.id,
                format!("{} outside a hierarchical query", pseudo.as_str()),
            ))
        }
    }
}

fn compile_query_value(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    query: &Query,
    unbox: Unbox,
) -> Result<ReguVar> {
    let xasl = compile_subquery(ctx, query)?;
    match unbox {
        Unbox::Table => {
            ctx.mark_list_linked(xasl);
            ctx.arena.node_mut(xasl)?.single_tuple = false;
            Ok(ReguVar::ListId { xasl })
        }
        Unbox::Value => {
            let domain = match first_column_domain(ctx, xasl)? {
                d if d.is_variable() => ctx.refine_domain(expr, &d),
                d => d,
            };
            if !ctx.is_list_linked(xasl) {
                ctx.arena.node_mut(xasl)?.single_tuple = true;
            }
            Ok(ReguVar::SubqueryValue { xasl, domain })
        }
    }
}

fn first_column_domain(ctx: &TranslationContext<'_>, xasl: XaslId) -> Result<Domain> {
    let node = ctx.arena.node(xasl)?;
    let Some(list) = node.value_list else {
        return Ok(Domain::Variable);
    };
    Ok(ctx
        .arena
        .value_list(list)?
        .slot(0)
        .map(|s| s.domain.clone())
        .unwrap_or(Domain::Variable))
}

/// Static type, then recorded expected domain, else an unresolved-domain
/// error naming `what`.
fn fallback_domain(ctx: &TranslationContext<'_>, expr: &Expr, what: &str) -> Result<Domain> {
    expr.static_domain()
        .or_else(|| ctx.expected_domain(expr.id))
        .cloned()
        .ok_or_else(|| Error::unresolved_domain(expr.id, what))
}

fn is_stringish(d: &Domain) -> bool {
    d.is_string() || *d == Domain::Null
}

fn is_integral(d: &Domain) -> bool {
    matches!(d, Domain::Integer | Domain::BigInt)
}

fn temporal_shift(op: ArithOp, l: &Domain, r: &Domain) -> Option<Domain> {
    match (op, l, r) {
        (ArithOp::Add | ArithOp::Sub, t, i) if t.is_temporal() && is_integral(i) => Some(t.clone()),
        (ArithOp::Add, i, t) if t.is_temporal() && is_integral(i) => Some(t.clone()),
        (ArithOp::Sub, Domain::Date, Domain::Date) => Some(Domain::Integer),
        (ArithOp::Sub, Domain::Timestamp, Domain::Timestamp) => Some(Domain::BigInt),
        _ => None,
    }
}

pub(crate) fn arith_domain(
    ctx: &TranslationContext<'_>,
    expr: &Expr,
    op: ArithOp,
    l: &Domain,
    r: &Domain,
) -> Result<Domain> {
    if l.is_variable() || r.is_variable() {
        return fallback_domain(ctx, expr, &format!("operator {}", op.as_str()));
    }
    if *l == Domain::Null && *r == Domain::Null {
        return Ok(expr.static_domain().cloned().unwrap_or(Domain::Null));
    }
    let inferred = match op {
        ArithOp::Concat => (is_stringish(l) && is_stringish(r)).then_some(Domain::Varchar),
        ArithOp::Add | ArithOp::Sub => {
            Domain::common_numeric(l, r).or_else(|| temporal_shift(op, l, r))
        }
        ArithOp::Mul | ArithOp::Div | ArithOp::Mod => Domain::common_numeric(l, r),
    };
    match inferred {
        Some(d) => Ok(expr.static_domain().cloned().unwrap_or(d)),
        None => Err(Error::unsupported(
            expr.id,
            format!("operator {} on {l} and {r}", op.as_str()),
        )),
    }
}

fn function_domain(
    ctx: &TranslationContext<'_>,
    expr: &Expr,
    func: Function,
    args: &[ReguVar],
) -> Result<Domain> {
    let (min, max) = match func {
        Function::Abs | Function::Floor | Function::Ceil => (1, 1),
        Function::Upper | Function::Lower | Function::CharLength => (1, 1),
        Function::Round => (1, 2),
        Function::Substring => (2, 3),
        Function::Nvl => (2, 2),
        Function::Coalesce => (1, usize::MAX),
    };
    if args.len() < min || args.len() > max {
        return Err(Error::unsupported(
            expr.id,
            format!("{} with {} arguments", func.as_str(), args.len()),
        ));
    }

    let first = args[0].domain();
    if first.is_variable() && !matches!(func, Function::Coalesce | Function::Nvl) {
        return fallback_domain(ctx, expr, func.as_str());
    }
    let mismatch = || Error::unsupported(expr.id, format!("{} of {first}", func.as_str()));
    match func {
        Function::Abs | Function::Round | Function::Floor | Function::Ceil => {
            if first.is_numeric() || first == Domain::Null {
                Ok(expr.static_domain().cloned().unwrap_or(first.clone()))
            } else {
                Err(mismatch())
            }
        }
        Function::Upper | Function::Lower | Function::Substring => {
            if is_stringish(&first) {
                Ok(Domain::Varchar)
            } else {
                Err(mismatch())
            }
        }
        Function::CharLength => {
            if is_stringish(&first) {
                Ok(Domain::Integer)
            } else {
                Err(mismatch())
            }
        }
        Function::Coalesce | Function::Nvl => {
            let mut acc: Option<Domain> = None;
            for d in args.iter().map(ReguVar::domain) {
                if d.is_variable() || d == Domain::Null {
                    continue;
                }
                acc = Some(match acc {
                    None => d,
                    Some(prev) if prev == d => prev,
                    Some(prev) => Domain::common_numeric(&prev, &d)
                        .or_else(|| (prev.is_string() && d.is_string()).then_some(Domain::Varchar))
                        .ok_or_else(|| {
                            Error::unsupported(
                                expr.id,
                                format!("{} mixing {prev} and {d}", func.as_str()),
                            )
                        })?,
                });
            }
            match acc {
                Some(d) => Ok(expr.static_domain().cloned().unwrap_or(d)),
                None => fallback_domain(ctx, expr, func.as_str()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xasl_expr::AstBuilder;

    use crate::catalog::{AttributeInfo, Catalog};
    use crate::optimizer::NoOptimizer;
    use crate::options::CompilerOptions;
    use xasl_types::{AttrId, ClassId, HeapId, IndexId, NodeId};

    struct NoCatalog;

    impl Catalog for NoCatalog {
        fn attribute_info(&self, class: ClassId, name: &str) -> Result<AttributeInfo> {
            Err(Error::AttributeNotFound {
                class,
                name: name.into(),
            })
        }
        fn class_heap(&self, _: ClassId) -> Result<HeapId> {
            Ok(HeapId::new(0))
        }
        fn class_index(&self, _: ClassId, _: &[AttrId]) -> Option<IndexId> {
            None
        }
        fn attributes(&self, _: ClassId) -> Result<Vec<(String, AttributeInfo)>> {
            Ok(Vec::new())
        }
    }

    fn with_ctx(f: impl FnOnce(&mut TranslationContext<'_>, &mut AstBuilder)) {
        let catalog = NoCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        let mut guard = ctx.push_scope(NodeId::new(0));
        let mut b = AstBuilder::new();
        f(&mut guard, &mut b);
    }

    #[test]
    fn arithmetic_widens_operands() {
        with_ctx(|ctx, b| {
            let one = b.lit(1);
            let big = b.lit(7i64);
            let sum = b.arith(ArithOp::Add, one, big);
            let regu = compile_expr(ctx, &sum, Unbox::Value).unwrap();
            assert_eq!(regu.domain(), Domain::BigInt);
        });
    }

    #[test]
    fn string_arithmetic_is_rejected() {
        with_ctx(|ctx, b| {
            let s = b.lit("x");
            let one = b.lit(1);
            let expr = b.arith(ArithOp::Mod, s, one);
            let err = compile_expr(ctx, &expr, Unbox::Value).unwrap_err();
            assert!(matches!(err, Error::Unsupported { node: Some(n), .. } if n == expr.id));
        });
    }

    #[test]
    fn untyped_operands_fall_back_to_expected_domain() {
        with_ctx(|ctx, b| {
            let null = b.null();
            let cast = b.cast(null, Domain::Variable);
            let one = b.lit(1);
            let mut sum = b.arith(ArithOp::Add, cast, one);
            sum.domain = None;

            let err = compile_expr(ctx, &sum, Unbox::Value).unwrap_err();
            assert!(matches!(err, Error::UnresolvedDomain { .. }));

            ctx.expect_domain(sum.id, Domain::Double);
            let regu = compile_expr(ctx, &sum, Unbox::Value).unwrap();
            assert_eq!(regu.domain(), Domain::Double);
        });
    }

    #[test]
    fn literal_sets_become_constants() {
        with_ctx(|ctx, b| {
            let items = vec![b.lit(1), b.lit(2)];
            let set = b.set_literal(xasl_types::CollectionKind::Set, items);
            let regu = compile_expr(ctx, &set, Unbox::Value).unwrap();
            assert!(matches!(
                regu,
                ReguVar::Constant(DbValue::Collection { ref elements, .. }) if elements.len() == 2
            ));
        });
    }

    #[test]
    fn hierarchical_pseudo_requires_connect_by() {
        with_ctx(|ctx, b| {
            let level = b.pseudo(PseudoColumn::Level);
            assert!(compile_expr(ctx, &level, Unbox::Value).is_err());
        });
    }

    #[test]
    fn forward_binding_wins() {
        with_ctx(|ctx, b| {
            let agg = b.count_star();
            ctx.bind_forward(agg.id, ReguVar::Constant(DbValue::BigInt(3)));
            let regu = compile_expr(ctx, &agg, Unbox::Value).unwrap();
            assert_eq!(regu, ReguVar::Constant(DbValue::BigInt(3)));
        });
    }
}
