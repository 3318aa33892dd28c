//! Aggregate extraction and GROUP BY compilation.
//!
//! Aggregate calls are never compiled in place. Each distinct call gets an
//! accumulator slot and a descriptor; every call site of it is then bound in
//! the context's forward map so the out-list, HAVING and ORDER BY builders
//! pick up the accumulator when they reach the same node.

use rustc_hash::{FxHashMap, FxHashSet};
use xasl_expr::visit::{Visit, WalkScope, collect_aggregates, walk};
use xasl_expr::{
    AggregateCall, AggregateFunc, Expr, ExprKind, FromSource, NameRef, SelectBlock,
    SetQuantifier, same_expr,
};
use xasl_plan::{
    AggregateDesc, GroupBy, IndexAggregateHint, ReguVar, SlotRef, SortItem, ValueList, ValueListId,
};
use xasl_result::{Error, Result};
use xasl_types::{Domain, NodeId, SpecId};

use crate::catalog::require_attribute;
use crate::context::TranslationContext;
use crate::regu::{Unbox, compile_expr};

/// Maps grouped expressions and names onto post-group slots while the
/// block's group-level clauses are compiled.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct GroupRewrite {
    keys: Vec<(Expr, ReguVar)>,
    names: FxHashMap<(SpecId, String), ReguVar>,
}

impl GroupRewrite {
    pub fn lookup(&self, expr: &Expr) -> Option<ReguVar> {
        if expr.is_literal() {
            return None;
        }
        if let Some(name) = expr.as_name()
            && let Some(slot) = self.names.get(&name.key())
        {
            return Some(slot.clone());
        }
        self.keys
            .iter()
            .find(|(key, _)| same_expr(key, expr))
            .map(|(_, slot)| slot.clone())
    }

    /// Post-group slot of a bare name, for nested blocks that read it.
    pub fn lookup_name(&self, name: &NameRef) -> Option<ReguVar> {
        self.names.get(&name.key()).cloned()
    }
}

/// One distinct aggregate call and every site that uses it.
#[derive(Debug)]
struct AggregateUse<'e> {
    expr: &'e Expr,
    call: &'e AggregateCall,
    sites: Vec<NodeId>,
}

fn aggregate_roots(block: &SelectBlock) -> Vec<&Expr> {
    let mut roots: Vec<&Expr> = block.items.iter().map(|i| &i.expr).collect();
    roots.extend(block.having.iter().flat_map(|c| c.terms.iter()));
    roots.extend(block.order_by.iter().filter_map(|o| match &o.key {
        xasl_expr::OrderKey::Expr(e) => Some(e),
        xasl_expr::OrderKey::Position(_) => None,
    }));
    roots
}

fn distinct_aggregates(block: &SelectBlock) -> Vec<AggregateUse<'_>> {
    let mut uses: Vec<AggregateUse<'_>> = Vec::new();
    for expr in collect_aggregates(aggregate_roots(block)) {
        let ExprKind::Aggregate(call) = &expr.kind else {
            continue;
        };
        match uses.iter_mut().find(|u| same_expr(u.expr, expr)) {
            Some(existing) => existing.sites.push(expr.id),
            None => uses.push(AggregateUse {
                expr,
                call,
                sites: vec![expr.id],
            }),
        }
    }
    uses
}

fn aggregate_domain(
    ctx: &TranslationContext<'_>,
    expr: &Expr,
    func: AggregateFunc,
    operand: Option<&ReguVar>,
) -> Result<Domain> {
    let arg = operand.map(ReguVar::domain).unwrap_or(Domain::Null);
    let known = !arg.is_variable();
    if matches!(func, AggregateFunc::CountStar | AggregateFunc::Count) {
        return Ok(Domain::BigInt);
    }
    if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg)
        && known
        && !(arg.is_numeric() || arg == Domain::Null)
    {
        return Err(Error::unsupported(
            expr.id,
            format!("{} of {arg}", func.as_str()),
        ));
    }
    if let Some(declared) = expr.static_domain() {
        return Ok(declared.clone());
    }
    match func {
        AggregateFunc::Avg => Ok(Domain::Double),
        AggregateFunc::Sum if arg == Domain::Integer => Ok(Domain::BigInt),
        _ if known => Ok(arg),
        _ => ctx
            .expected_domain(expr.id)
            .cloned()
            .ok_or_else(|| Error::unresolved_domain(expr.id, func.as_str())),
    }
}

fn compile_operand(
    ctx: &mut TranslationContext<'_>,
    call: &AggregateCall,
) -> Result<Option<ReguVar>> {
    match (&call.func, &call.arg) {
        (AggregateFunc::CountStar, _) => Ok(None),
        (_, Some(arg)) => compile_expr(ctx, arg, Unbox::Value).map(Some),
        (_, None) => Err(Error::Internal(format!(
            "{} call without an argument",
            call.func.as_str()
        ))),
    }
}

/// Advisory index fast path for COUNT/MIN/MAX over a single unfiltered class.
fn index_hint(
    ctx: &TranslationContext<'_>,
    block: &SelectBlock,
    call: &AggregateCall,
) -> Result<Option<IndexAggregateHint>> {
    if !ctx.options.enable_index_aggregate
        || call.quantifier == SetQuantifier::Distinct
        || !matches!(
            call.func,
            AggregateFunc::CountStar | AggregateFunc::Count | AggregateFunc::Min | AggregateFunc::Max
        )
        || block.from.len() != 1
        || !block.from[0].path_entities.is_empty()
        || !block.where_clause.is_empty()
        || block.hierarchy.is_some()
    {
        return Ok(None);
    }
    let entry = &block.from[0];
    let FromSource::Class { class, .. } = &entry.source else {
        return Ok(None);
    };
    let columns = match call.arg.as_deref() {
        None => Vec::new(),
        Some(arg) => match arg.as_name() {
            Some(name) if name.spec == entry.spec => {
                vec![require_attribute(ctx.catalog, *class, &name.name)?.attr_id]
            }
            _ => return Ok(None),
        },
    };
    let Some(index) = ctx.catalog.class_index(*class, &columns) else {
        return Ok(None);
    };
    Ok(Some(IndexAggregateHint {
        class: *class,
        heap: ctx.catalog.class_heap(*class)?,
        index,
    }))
}

/// Aggregates of a single-row block: accumulators live in a dedicated value
/// list.
pub(crate) fn build_value_aggregates(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
) -> Result<(Vec<AggregateDesc>, ValueListId)> {
    let uses = distinct_aggregates(block);
    let mut staged = Vec::with_capacity(uses.len());
    for u in &uses {
        let operand = compile_operand(ctx, u.call)?;
        let domain = aggregate_domain(ctx, u.expr, u.call.func, operand.as_ref())?;
        let hint = index_hint(ctx, block, u.call)?;
        staged.push((operand, domain, hint));
    }

    let list = ctx.alloc_value_list(ValueList::with_domains(
        staged.iter().map(|(_, d, _)| d.clone()),
    ))?;
    let mut descs = Vec::with_capacity(uses.len());
    for (i, (u, (operand, domain, index_hint))) in uses.iter().zip(staged).enumerate() {
        let accumulator = SlotRef {
            list,
            index: i,
            domain: domain.clone(),
        };
        for &site in &u.sites {
            ctx.bind_forward(site, ReguVar::Slot(accumulator.clone()));
        }
        if index_hint.is_some() {
            tracing::debug!(func = u.call.func.as_str(), "index aggregate hint attached");
        }
        descs.push(AggregateDesc {
            func: u.call.func,
            quantifier: u.call.quantifier,
            operand,
            accumulator,
            domain,
            index_hint,
            source: u.expr.id,
        });
    }
    Ok((descs, list))
}

/// Build the GROUP BY stage and the rewrite that maps group-level
/// expressions onto its output list. HAVING is left for the caller, which
/// compiles it with the rewrite installed.
pub(crate) fn build_group_by(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
) -> Result<(GroupBy, GroupRewrite)> {
    let mut input_regu: Vec<ReguVar> = Vec::new();
    let mut input_domains: Vec<Domain> = Vec::new();

    for key in &block.group_by {
        let regu = compile_expr(ctx, key, Unbox::Value)?;
        input_domains.push(regu.domain());
        input_regu.push(regu);
    }

    // Plain names used above the grouping that no key already covers,
    // including this block's names read by subqueries of group-level
    // clauses: those run per group row and see only the post-group list.
    let local: FxHashSet<SpecId> = block.all_from_entries().iter().map(|e| e.spec).collect();
    let is_key = |e: &Expr| block.group_by.iter().any(|k| same_expr(k, e));
    let mut extra_names: Vec<&Expr> = Vec::new();
    let mut seen = FxHashSet::default();
    walk(aggregate_roots(block), WalkScope::Block, |e| {
        if matches!(e.kind, ExprKind::Aggregate(_)) || is_key(e) {
            return Visit::SkipChildren;
        }
        if matches!(e.kind, ExprKind::Subquery(_) | ExprKind::Exists(_)) {
            walk([e], WalkScope::Nested, |inner| {
                if let Some(name) = inner.as_name()
                    && local.contains(&name.spec)
                    && !is_key(inner)
                    && seen.insert(name.key())
                {
                    extra_names.push(inner);
                }
                Visit::Continue
            });
            return Visit::SkipChildren;
        }
        if let Some(name) = e.as_name()
            && seen.insert(name.key())
        {
            extra_names.push(e);
        }
        Visit::Continue
    });
    for name in &extra_names {
        let regu = compile_expr(ctx, name, Unbox::Value)?;
        input_domains.push(regu.domain());
        input_regu.push(regu);
    }
    let copied = input_regu.len();

    let uses = distinct_aggregates(block);
    let mut staged = Vec::with_capacity(uses.len());
    for u in &uses {
        let operand = compile_operand(ctx, u.call)?;
        let domain = aggregate_domain(ctx, u.expr, u.call.func, operand.as_ref())?;
        let input_pos = operand.as_ref().map(|regu| {
            input_domains.push(regu.domain());
            input_regu.push(regu.clone());
            input_regu.len() - 1
        });
        staged.push((input_pos, domain));
    }

    let input_list = ctx.alloc_value_list(ValueList::with_domains(input_domains.iter().cloned()))?;
    let output_list = ctx.alloc_value_list(ValueList::with_domains(
        input_domains[..copied]
            .iter()
            .cloned()
            .chain(staged.iter().map(|(_, d)| d.clone())),
    ))?;

    let output_regu: Vec<ReguVar> = (0..copied)
        .map(|i| ReguVar::slot(input_list, i, input_domains[i].clone()))
        .collect();

    let mut rewrite = GroupRewrite::default();
    for (i, key) in block.group_by.iter().enumerate() {
        let slot = ReguVar::slot(output_list, i, input_domains[i].clone());
        if let Some(name) = key.as_name() {
            rewrite.names.insert(name.key(), slot.clone());
        }
        rewrite.keys.push((key.clone(), slot));
    }
    for (j, name) in extra_names.iter().enumerate() {
        let pos = block.group_by.len() + j;
        if let Some(name_ref) = name.as_name() {
            rewrite.names.insert(
                name_ref.key(),
                ReguVar::slot(output_list, pos, input_domains[pos].clone()),
            );
        }
    }

    let mut agg_list = Vec::with_capacity(uses.len());
    for (a, (u, (input_pos, domain))) in uses.iter().zip(staged).enumerate() {
        let accumulator = SlotRef {
            list: output_list,
            index: copied + a,
            domain: domain.clone(),
        };
        for &site in &u.sites {
            ctx.bind_forward(site, ReguVar::Slot(accumulator.clone()));
        }
        agg_list.push(AggregateDesc {
            func: u.call.func,
            quantifier: u.call.quantifier,
            operand: input_pos.map(|pos| ReguVar::slot(input_list, pos, input_domains[pos].clone())),
            accumulator,
            domain,
            index_hint: None,
            source: u.expr.id,
        });
    }

    let groupby = GroupBy {
        input_list,
        input_regu,
        sort_list: (0..block.group_by.len()).map(SortItem::asc).collect(),
        output_list,
        output_regu,
        agg_list,
        having_pred: None,
        grbynum_pred: None,
        grbynum_continue: false,
    };
    Ok((groupby, rewrite))
}
