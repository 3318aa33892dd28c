//! Query-block compiler and plan-shape selection.
//!
//! A SELECT block becomes a BUILDVALUE node when it provably yields one row
//! (aggregates without GROUP BY) and a BUILDLIST node otherwise. The first
//! scan of the chosen join order sits on the block node; every further table
//! gets an inner SCAN node linked through `scan_ptr`.

use rustc_hash::FxHashSet;
use xasl_expr::visit::{Visit, WalkScope, contains_pseudo, referenced_names, referenced_specs, walk};
use xasl_expr::{
    Conjunct, Expr, ExprKind, FromEntry, FromSource, OrderKey, PseudoColumn, Query, SelectBlock,
    same_expr,
};
use xasl_plan::{
    AccessSpec, BuildListProc, BuildValueProc, PredExpr, ProcKind, ReguVar, SortItem, ValueList,
    XaslId, XaslNode,
};
use xasl_result::{Error, Result};
use xasl_types::{Domain, SpecId};

use crate::access::{SpecTerms, build_access_spec};
use crate::aggregate::{build_group_by, build_value_aggregates};
use crate::catalog::require_attribute;
use crate::connect_by::{build_connect_by, prepare_hierarchy};
use crate::context::TranslationContext;
use crate::optimizer::{AccessPlan, OptimizerRequest, PlannedMethod, TableRef};
use crate::predicate::{CompiledPred, compile_conjuncts};
use crate::regu::{Unbox, compile_expr};
use crate::scope::{PendingSubquery, Scope, TableAttr, TableInfo, TableSource};

/// A compiled query and the correlation level it reports to its user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CompiledQuery {
    pub xasl: XaslId,
    pub level: u32,
}

/// Bookkeeping columns a DML row source prepends to its output.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RowPrefix {
    /// Emit the OID of this spec first.
    pub oid: Option<SpecId>,
    /// Follow it with the class OID (partitioned targets).
    pub class_oid: bool,
}

impl RowPrefix {
    pub fn len(&self) -> usize {
        match self.oid {
            None => 0,
            Some(_) if self.class_oid => 2,
            Some(_) => 1,
        }
    }
}

pub(crate) fn compile_query(ctx: &mut TranslationContext<'_>, query: &Query) -> Result<CompiledQuery> {
    match query {
        Query::Select(block) => compile_select(ctx, block, RowPrefix::default()),
        Query::SetOp(op) => crate::set_op::compile_set_op(ctx, op),
    }
}

/// Compile a nested query and queue it on the current scope. A query node
/// shared by several expression sites is compiled once and its plan reused.
pub(crate) fn compile_subquery(ctx: &mut TranslationContext<'_>, query: &Query) -> Result<XaslId> {
    if let Some(xasl) = ctx.cached_subquery(query.id()) {
        tracing::trace!(query = %query.id(), %xasl, "reusing shared subquery plan");
        return Ok(xasl);
    }
    let compiled = compile_query(ctx, query)?;
    ctx.scope_mut()?.adopt(PendingSubquery {
        xasl: compiled.xasl,
        level: compiled.level,
    });
    ctx.cache_subquery(query.id(), compiled.xasl);
    Ok(compiled.xasl)
}

pub(crate) fn compile_select(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    prefix: RowPrefix,
) -> Result<CompiledQuery> {
    let mut guard = ctx.push_scope(block.id);
    let xasl = build_select(&mut guard, block, prefix)?;
    let scope = guard.finish()?;
    attach_subqueries(ctx, xasl, &scope)?;
    Ok(CompiledQuery {
        xasl,
        level: scope.correlation_level,
    })
}

/// Move the scope's queued subqueries onto `xasl`: correlated ones on the
/// per-row list, the rest on the run-once list.
pub(crate) fn attach_subqueries(
    ctx: &mut TranslationContext<'_>,
    xasl: XaslId,
    scope: &Scope,
) -> Result<()> {
    let node = ctx.arena.node_mut(xasl)?;
    for sub in &scope.subqueries {
        if sub.is_correlated() {
            node.dptr_list.push(sub.xasl);
        } else {
            node.aptr_list.push(sub.xasl);
        }
    }
    node.correlation_level = scope.correlation_level;
    tracing::debug!(
        %xasl,
        level = scope.correlation_level,
        uncorrelated = node.aptr_list.len(),
        correlated = node.dptr_list.len(),
        "closed query block"
    );
    Ok(())
}

/// WHERE conjuncts sorted by where they are evaluated.
#[derive(Default)]
struct WhereSplit<'a> {
    instnum: Vec<&'a Conjunct>,
    /// Row-independent: evaluated once before the scan.
    if_pred: Vec<&'a Conjunct>,
    /// Evaluated on hierarchical rows after CONNECT BY.
    after_connect_by: Vec<&'a Conjunct>,
    /// Handed to the optimizer and placed on scans.
    plan: Vec<&'a Conjunct>,
}

fn local_specs(conjunct: &Conjunct, local: &FxHashSet<SpecId>) -> FxHashSet<SpecId> {
    referenced_specs(conjunct.terms.iter())
        .into_iter()
        .filter(|s| local.contains(s))
        .collect()
}

fn is_hierarchical(conjunct: &Conjunct) -> bool {
    let mut found = false;
    walk(conjunct.terms.iter(), WalkScope::Block, |e| {
        match &e.kind {
            ExprKind::Pseudo(p) if p.is_hierarchical() => found = true,
            ExprKind::Prior(_) => found = true,
            _ => {}
        }
        Visit::Continue
    });
    found
}

fn split_where<'a>(block: &'a SelectBlock, local: &FxHashSet<SpecId>) -> WhereSplit<'a> {
    let mut split = WhereSplit::default();
    for conjunct in &block.where_clause {
        if conjunct
            .terms
            .iter()
            .any(|t| contains_pseudo(t, PseudoColumn::InstNum))
        {
            split.instnum.push(conjunct);
            continue;
        }
        let refs = local_specs(conjunct, local);
        if block.hierarchy.is_some() && is_hierarchical(conjunct) {
            split.after_connect_by.push(conjunct);
        } else if refs.is_empty() {
            split.if_pred.push(conjunct);
        } else if block.hierarchy.is_some() && refs.len() < 2 {
            split.after_connect_by.push(conjunct);
        } else {
            split.plan.push(conjunct);
        }
    }
    split
}

/// Output column names of a query, used to bind derived-table columns.
fn output_names(query: &Query) -> Vec<Option<String>> {
    let mut current = query;
    while let Query::SetOp(op) = current {
        current = &op.left;
    }
    let Query::Select(block) = current else {
        return Vec::new();
    };
    block
        .items
        .iter()
        .map(|item| {
            item.alias
                .clone()
                .or_else(|| item.expr.as_name().map(|n| n.name.clone()))
        })
        .collect()
}

/// Register one table info per FROM entry with the current scope.
fn register_tables(ctx: &mut TranslationContext<'_>, block: &SelectBlock) -> Result<()> {
    for entry in block.all_from_entries() {
        let names = referenced_names(block, entry.spec);
        let (source, attrs) = match &entry.source {
            FromSource::Class { class, .. } => {
                let mut attrs = Vec::with_capacity(names.len());
                for name in &names {
                    let info = require_attribute(ctx.catalog, *class, &name.name)?;
                    attrs.push(TableAttr {
                        name: name.name.to_ascii_lowercase(),
                        attr_id: Some(info.attr_id),
                        domain: info.domain,
                        kind: info.kind,
                        column: None,
                    });
                }
                (TableSource::Class(*class), attrs)
            }
            FromSource::Derived(query) => {
                let xasl = compile_subquery(ctx, query)?;
                let columns = output_names(query);
                let result = ctx.arena.node(xasl)?.value_list;
                let mut attrs = Vec::with_capacity(names.len());
                for name in &names {
                    let column = columns
                        .iter()
                        .position(|c| c.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(&name.name)))
                        .ok_or_else(|| {
                            Error::unsupported(
                                block.id,
                                format!(
                                    "derived table {} has no column '{}'",
                                    entry.display_name(),
                                    name.name
                                ),
                            )
                        })?;
                    let domain = match result {
                        Some(list) => ctx
                            .arena
                            .value_list(list)?
                            .slot(column)
                            .map(|s| s.domain.clone())
                            .unwrap_or(Domain::Variable),
                        None => Domain::Variable,
                    };
                    attrs.push(TableAttr {
                        name: name.name.to_ascii_lowercase(),
                        attr_id: None,
                        domain,
                        kind: xasl_plan::AttrKind::Instance,
                        column: Some(column),
                    });
                }
                (TableSource::Derived(xasl), attrs)
            }
            FromSource::SetExpr(_) | FromSource::Method { .. } => {
                let attrs = names
                    .iter()
                    .map(|name| TableAttr {
                        name: name.name.to_ascii_lowercase(),
                        attr_id: None,
                        domain: Domain::Variable,
                        kind: xasl_plan::AttrKind::Instance,
                        column: None,
                    })
                    .collect();
                let source = if matches!(entry.source, FromSource::SetExpr(_)) {
                    TableSource::SetExpr
                } else {
                    TableSource::Method
                };
                (source, attrs)
            }
        };

        let mut list = ValueList::new();
        for attr in &attrs {
            list.push(attr.domain.clone(), Some(attr.name.clone()));
        }
        let value_list = ctx.alloc_value_list(list)?;
        tracing::trace!(spec = %entry.spec, columns = attrs.len(), "registered table");
        ctx.scope_mut()?.tables.push(TableInfo {
            spec: entry.spec,
            source,
            value_list,
            attrs,
        });
    }
    Ok(())
}

fn propose(ctx: &TranslationContext<'_>, request: &OptimizerRequest<'_>) -> Option<AccessPlan> {
    let plan = ctx.optimizer.propose_plan(request)?;
    match plan.defect(request) {
        None => Some(plan),
        Some(defect) => {
            tracing::warn!(block = %request.block, %defect, "discarding unusable optimizer plan");
            None
        }
    }
}

/// Ask the optimizer for a plan, once with the block's hints and, if that
/// fails and retries are enabled, once more without them. Falls back to FROM
/// order with sequential scans.
pub(crate) fn choose_access_plan(
    ctx: &mut TranslationContext<'_>,
    request: OptimizerRequest<'_>,
) -> AccessPlan {
    if let Some(plan) = propose(ctx, &request) {
        return plan;
    }
    if ctx.options.retry_without_hints && !request.hints.is_empty() {
        let stripped = OptimizerRequest {
            hints: &[],
            ..request.clone()
        };
        if let Some(plan) = propose(ctx, &stripped) {
            ctx.warn(
                Some(request.block),
                format!(
                    "{} optimizer hint(s) ignored to obtain a plan",
                    request.hints.len()
                ),
            );
            return plan;
        }
    }
    ctx.warn(
        Some(request.block),
        "optimizer proposed no plan; scanning in FROM order",
    );
    AccessPlan::naive(request.tables.iter().map(|t| t.spec))
}

/// Place every conjunct on the scan that evaluates it: key and key-filter
/// terms where the plan put them, everything else on the innermost table it
/// references.
fn assign_terms<'a>(
    plan: &AccessPlan,
    conjuncts: &[&'a Conjunct],
    local: &FxHashSet<SpecId>,
) -> Vec<SpecTerms<'a>> {
    let mut placed: Vec<SpecTerms<'a>> = plan.tables.iter().map(|_| SpecTerms::default()).collect();
    let mut consumed = FxHashSet::default();
    for (terms, access) in placed.iter_mut().zip(&plan.tables) {
        if let PlannedMethod::Index { key_terms, .. } = &access.method {
            terms.key = key_terms.iter().map(|&i| conjuncts[i]).collect();
            consumed.extend(key_terms.iter().copied());
        }
        terms.sarg = access.sarg_terms.iter().map(|&i| conjuncts[i]).collect();
        consumed.extend(access.sarg_terms.iter().copied());
    }
    for (i, &conjunct) in conjuncts.iter().enumerate() {
        if consumed.contains(&i) {
            continue;
        }
        let refs = local_specs(conjunct, local);
        let pos = plan
            .tables
            .iter()
            .rposition(|t| refs.contains(&t.spec))
            .unwrap_or(0);
        if let Some(terms) = placed.get_mut(pos) {
            terms.rest.push(conjunct);
        }
    }
    placed
}

/// Build access specs for every table in join order. Returns the specs and
/// the combined continuation flag.
fn render_scans(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    plan: &AccessPlan,
    placed: &[SpecTerms<'_>],
    oid_spec: Option<SpecId>,
) -> Result<(Vec<AccessSpec>, bool)> {
    let mut specs = Vec::with_capacity(plan.tables.len());
    let mut continue_scan = false;
    for (access, terms) in plan.tables.iter().zip(placed) {
        let table = ctx
            .scope()?
            .table(access.spec)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("plan names unknown spec s{}", access.spec.raw())))?;
        let entry: &FromEntry = block
            .find_entry(access.spec)
            .ok_or_else(|| Error::Internal(format!("no FROM entry for s{}", access.spec.raw())))?;
        let (mut spec, cont) = build_access_spec(ctx, &table, entry, &access.method, terms)?;
        spec.fetch_oid = oid_spec == Some(spec.spec);
        continue_scan |= cont;
        specs.push(spec);
    }
    Ok((specs, continue_scan))
}

/// First spec stays with the block; each further spec gets an inner scan
/// node.
fn chain_scans(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    mut specs: Vec<AccessSpec>,
) -> Result<(Vec<AccessSpec>, Option<XaslId>)> {
    let inner: Vec<AccessSpec> = if specs.len() > 1 {
        specs.drain(1..).collect()
    } else {
        Vec::new()
    };
    let mut scan_ptr = None;
    for spec in inner.into_iter().rev() {
        let mut node = XaslNode::new(ProcKind::Scan);
        node.source = Some(block.id);
        node.spec_list = vec![spec];
        node.scan_ptr = scan_ptr;
        scan_ptr = Some(ctx.alloc_node(node)?);
    }
    Ok((specs, scan_ptr))
}

fn and_preds(a: Option<PredExpr>, b: Option<PredExpr>) -> Option<PredExpr> {
    PredExpr::and_all(a.into_iter().chain(b))
}

/// Output columns: the prefix, the select list, then hidden ORDER BY
/// expressions. Returns the out-list, the value list, the sort list and the
/// number of hidden columns.
fn build_output(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    prefix: RowPrefix,
    with_order: bool,
) -> Result<(Vec<ReguVar>, ValueList, Vec<SortItem>, usize)> {
    let mut out_list = Vec::with_capacity(prefix.len() + block.items.len());
    let mut values = ValueList::new();
    if let Some(spec) = prefix.oid {
        out_list.push(ReguVar::Oid(spec));
        values.push(Domain::Object, Some("oid".into()));
        if prefix.class_oid {
            out_list.push(ReguVar::ClassOid(spec));
            values.push(Domain::Object, Some("class_oid".into()));
        }
    }

    let mut exprs: Vec<&Expr> = block.items.iter().map(|i| &i.expr).collect();
    let mut sort_list = Vec::new();
    if with_order {
        for item in &block.order_by {
            let column = match &item.key {
                OrderKey::Position(p) if (1..=block.items.len()).contains(p) => p - 1,
                OrderKey::Position(p) => {
                    return Err(Error::unsupported(
                        block.id,
                        format!("ORDER BY position {p} outside the select list"),
                    ));
                }
                OrderKey::Expr(e) => match exprs.iter().position(|o| same_expr(o, e)) {
                    Some(i) => i,
                    None => {
                        exprs.push(e);
                        exprs.len() - 1
                    }
                },
            };
            sort_list.push(SortItem {
                pos: prefix.len() + column,
                direction: item.direction,
                nulls: item.nulls,
            });
        }
    }
    let hidden = exprs.len() - block.items.len();
    // Duplicate elimination runs over whole rows, hidden columns included.
    if block.distinct && hidden > 0 {
        return Err(Error::unsupported(
            block.id,
            "ORDER BY of a DISTINCT query must name select list columns",
        ));
    }

    for (i, expr) in exprs.iter().enumerate() {
        let regu = compile_expr(ctx, expr, Unbox::Value)?;
        let label = block
            .items
            .get(i)
            .and_then(|item| item.alias.clone())
            .or_else(|| expr.as_name().map(|n| n.name.clone()));
        values.push(regu.domain(), label);
        out_list.push(regu);
    }
    Ok((out_list, values, sort_list, hidden))
}

fn build_select(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    prefix: RowPrefix,
) -> Result<XaslId> {
    register_tables(ctx, block)?;
    let hierarchy = match &block.hierarchy {
        Some(h) => Some((h, prepare_hierarchy(ctx, block)?)),
        None => None,
    };

    let entries = block.all_from_entries();
    let local: FxHashSet<SpecId> = entries.iter().map(|e| e.spec).collect();
    let split = split_where(block, &local);

    let tables = entries
        .iter()
        .map(|e| TableRef {
            spec: e.spec,
            class: e.class_id(),
            name: e.display_name(),
        })
        .collect();
    let plan = choose_access_plan(
        ctx,
        OptimizerRequest {
            block: block.id,
            tables,
            conjuncts: &split.plan,
            order_by: &block.order_by,
            hints: &block.hints,
        },
    );
    let placed = assign_terms(&plan, &split.plan, &local);
    let (specs, mut where_continue) = render_scans(ctx, block, &plan, &placed, prefix.oid)?;
    let (mut spec_list, mut scan_ptr) = chain_scans(ctx, block, specs)?;

    let mut connect_by = None;
    if let Some((h, lists)) = hierarchy {
        let (cb, cont) = build_connect_by(
            ctx,
            block,
            h,
            lists,
            &split.after_connect_by,
            std::mem::take(&mut spec_list),
            scan_ptr.take(),
        )?;
        where_continue |= cont;
        connect_by = Some(cb);
    }

    let if_pred = compile_conjuncts(ctx, split.if_pred.iter().copied())?;
    let mut instnum = compile_conjuncts(ctx, split.instnum.iter().copied())?;
    where_continue |= if_pred.continue_scan;

    let single_row = block.is_single_row();
    let (proc, out_list, values, hidden) = if single_row {
        let (agg_list, agg_value_list) = build_value_aggregates(ctx, block)?;
        let having = compile_conjuncts(ctx, &block.having)?;
        let (out_list, values, _, _) = build_output(ctx, block, prefix, false)?;
        let proc = ProcKind::BuildValue(BuildValueProc {
            agg_list,
            agg_value_list,
            having_pred: having.pred,
        });
        (proc, out_list, values, 0)
    } else {
        let groupby = if block.group_by.is_empty() {
            if !block.having.is_empty() {
                return Err(Error::unsupported(block.id, "HAVING without grouping"));
            }
            None
        } else {
            let (mut groupby, rewrite) = build_group_by(ctx, block)?;
            ctx.scope_mut()?.group = Some(rewrite);
            let (grbynum, having): (Vec<&Conjunct>, Vec<&Conjunct>) =
                block.having.iter().partition(|c| {
                    c.terms
                        .iter()
                        .any(|t| contains_pseudo(t, PseudoColumn::GroupByNum))
                });
            let having = compile_conjuncts(ctx, having)?;
            let grbynum = compile_conjuncts(ctx, grbynum)?;
            groupby.having_pred = having.pred;
            groupby.grbynum_pred = grbynum.pred;
            groupby.grbynum_continue = grbynum.continue_scan || having.continue_scan;
            Some(groupby)
        };

        let (out_list, values, mut sort_list, hidden) = build_output(ctx, block, prefix, true)?;

        let order_satisfied = plan.order_satisfied
            && groupby.is_none()
            && !block.distinct
            && !block.order_by.is_empty()
            && connect_by.is_none();
        let mut ordbynum = CompiledPred::default();
        if order_satisfied {
            tracing::debug!(block = %block.id, "scan order satisfies ORDER BY; sort elided");
            sort_list.clear();
            ctx.block.ordbynum_as_instnum = true;
            let promoted = compile_conjuncts(ctx, &block.orderby_num)?;
            ctx.block.ordbynum_as_instnum = false;
            instnum = CompiledPred {
                pred: and_preds(instnum.pred, promoted.pred),
                continue_scan: instnum.continue_scan || promoted.continue_scan,
            };
        } else {
            ordbynum = compile_conjuncts(ctx, &block.orderby_num)?;
        }

        let proc = ProcKind::BuildList(BuildListProc {
            groupby,
            orderby: sort_list,
            ordbynum_pred: ordbynum.pred,
            ordbynum_continue: ordbynum.continue_scan,
            distinct: block.distinct,
        });
        (proc, out_list, values, hidden)
    };

    let value_list = ctx.alloc_value_list(values)?;
    let mut node = XaslNode::new(proc);
    node.source = Some(block.id);
    node.value_list = Some(value_list);
    node.out_list = out_list;
    node.hidden_columns = hidden;
    node.spec_list = spec_list;
    node.scan_ptr = scan_ptr;
    node.connect_by = connect_by;
    node.if_pred = if_pred.pred;
    node.instnum_continue =
        instnum.pred.is_some() && (instnum.continue_scan || where_continue);
    node.instnum_pred = instnum.pred;
    let xasl = ctx.alloc_node(node)?;
    tracing::debug!(
        block = %block.id,
        %xasl,
        shape = if single_row { "BUILDVALUE" } else { "BUILDLIST" },
        tables = plan.tables.len(),
        "compiled query block"
    );
    Ok(xasl)
}
