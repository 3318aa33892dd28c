//! Hierarchical queries: START WITH / CONNECT BY.
//!
//! The CONNECT BY node runs the block's scans. Its value list is the union
//! of every table's value list followed by the fixed pseudo-column slots
//! ([`PseudoSlot::CONNECT_BY`]); a parallel prior list of the same shape
//! holds the parent row. The block node itself has no scans and reads the
//! hierarchical rows through the tables' value lists and the pseudo slots.

use xasl_expr::visit::{Visit, WalkScope, walk};
use xasl_expr::{Conjunct, Expr, ExprKind, Hierarchy, OrderKey, PseudoColumn, SelectBlock};
use xasl_plan::{
    AccessSpec, ConnectByProc, ProcKind, PseudoSlot, ReguVar, ValueList, ValueListId, XaslId,
    XaslNode,
};
use xasl_result::{Error, Result};
use xasl_types::{NodeId, SpecId};

use crate::context::TranslationContext;
use crate::predicate::compile_conjuncts;
use crate::regu::{Unbox, compile_expr};

/// Where `PRIOR` reads each table's columns.
#[derive(Clone, Debug)]
pub(crate) struct PriorMap {
    list: ValueListId,
    offsets: Vec<(SpecId, usize)>,
}

impl PriorMap {
    fn offset(&self, spec: SpecId) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(s, _)| *s == spec)
            .map(|(_, offset)| *offset)
    }
}

/// Value lists shared by the CONNECT BY node and its block.
#[derive(Debug)]
pub(crate) struct HierarchyLists {
    pub cb_list: ValueListId,
    pub prior_list: ValueListId,
    /// Table slots in union order; the first part of the node's out-list.
    table_slots: Vec<ReguVar>,
}

fn pseudo_index(pseudo: PseudoColumn) -> Option<usize> {
    let slot = match pseudo {
        PseudoColumn::Level => PseudoSlot::Level,
        PseudoColumn::ConnectByIsLeaf => PseudoSlot::IsLeaf,
        PseudoColumn::ConnectByIsCycle => PseudoSlot::IsCycle,
        _ => return None,
    };
    PseudoSlot::CONNECT_BY.iter().position(|p| *p == slot)
}

fn conjuncts(list: &[Conjunct]) -> impl Iterator<Item = &Expr> {
    list.iter().flat_map(|c| c.terms.iter())
}

fn block_exprs(block: &SelectBlock) -> Vec<&Expr> {
    let mut roots: Vec<&Expr> = block.items.iter().map(|i| &i.expr).collect();
    roots.extend(conjuncts(&block.where_clause));
    roots.extend(block.group_by.iter());
    roots.extend(conjuncts(&block.having));
    roots.extend(block.order_by.iter().filter_map(|o| match &o.key {
        OrderKey::Expr(e) => Some(e),
        OrderKey::Position(_) => None,
    }));
    roots.extend(conjuncts(&block.orderby_num));
    if let Some(h) = &block.hierarchy {
        roots.extend(conjuncts(&h.start_with));
        roots.extend(conjuncts(&h.connect_by));
    }
    roots
}

/// Allocate the CONNECT BY value lists and bind the block's hierarchical
/// pseudo-columns and `PRIOR` resolution to them. Must run after the
/// block's tables are registered and before any of its expressions are
/// compiled.
pub(crate) fn prepare_hierarchy(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
) -> Result<HierarchyLists> {
    let tables: Vec<(SpecId, ValueListId)> = ctx
        .scope()?
        .tables
        .iter()
        .map(|t| (t.spec, t.value_list))
        .collect();

    let mut domains = Vec::new();
    let mut offsets = Vec::with_capacity(tables.len());
    let mut table_slots = Vec::new();
    for (spec, list) in tables {
        offsets.push((spec, domains.len()));
        for (i, slot) in ctx.arena.value_list(list)?.slots().iter().enumerate() {
            domains.push(slot.domain.clone());
            table_slots.push(ReguVar::slot(list, i, slot.domain.clone()));
        }
    }
    let pseudo_base = domains.len();
    domains.extend(PseudoSlot::CONNECT_BY.iter().map(|p| p.domain()));

    let cb_list = ctx.alloc_value_list(ValueList::with_domains(domains.iter().cloned()))?;
    let prior_list = ctx.alloc_value_list(ValueList::with_domains(domains))?;

    let mut sites: Vec<(NodeId, usize)> = Vec::new();
    walk(block_exprs(block), WalkScope::Block, |e| {
        if let ExprKind::Pseudo(p) = e.kind
            && let Some(index) = pseudo_index(p)
        {
            sites.push((e.id, index));
        }
        Visit::Continue
    });
    for (node, index) in sites {
        let slot = PseudoSlot::CONNECT_BY[index];
        ctx.bind_forward(node, ReguVar::slot(cb_list, pseudo_base + index, slot.domain()));
    }

    ctx.block.prior = Some(PriorMap {
        list: prior_list,
        offsets,
    });
    tracing::debug!(
        block = %block.id,
        columns = pseudo_base,
        "prepared hierarchical value lists"
    );
    Ok(HierarchyLists {
        cb_list,
        prior_list,
        table_slots,
    })
}

/// `PRIOR inner`: names of the block's tables under `inner` read the
/// parent row.
pub(crate) fn compile_prior(
    ctx: &mut TranslationContext<'_>,
    expr: &Expr,
    inner: &Expr,
) -> Result<ReguVar> {
    let Some(prior) = ctx.block.prior.clone() else {
        return Err(Error::unsupported(expr.id, "PRIOR outside CONNECT BY"));
    };

    let mut names = Vec::new();
    walk([inner], WalkScope::Block, |e| {
        if e.as_name().is_some() {
            names.push(e);
        }
        Visit::Continue
    });

    let mut bindings = Vec::with_capacity(names.len());
    {
        let scope = ctx.scope()?;
        for e in names {
            let Some(name) = e.as_name() else { continue };
            let (Some(offset), Some(table)) = (prior.offset(name.spec), scope.table(name.spec))
            else {
                continue;
            };
            let pos = table.position(&name.name).ok_or_else(|| {
                Error::Internal(format!("PRIOR column '{}' is not registered", name.name))
            })?;
            let domain = ctx.refine_domain(e, &table.attrs[pos].domain);
            bindings.push((e.id, ReguVar::slot(prior.list, offset + pos, domain)));
        }
    }

    let bound: Vec<NodeId> = bindings.iter().map(|(id, _)| *id).collect();
    for (id, slot) in bindings {
        ctx.bind_forward(id, slot);
    }
    let compiled = compile_expr(ctx, inner, Unbox::Value);
    for id in bound {
        ctx.clear_forward(id);
    }
    compiled
}

/// Build the CONNECT BY node. `spec_list`/`scan_ptr` are the block's
/// rendered scans, moved onto this node. Returns the node and the
/// continuation flag of its predicates.
pub(crate) fn build_connect_by(
    ctx: &mut TranslationContext<'_>,
    block: &SelectBlock,
    hierarchy: &Hierarchy,
    lists: HierarchyLists,
    after: &[&Conjunct],
    spec_list: Vec<AccessSpec>,
    scan_ptr: Option<XaslId>,
) -> Result<(XaslId, bool)> {
    let start_with = compile_conjuncts(ctx, &hierarchy.start_with)?;
    let connect_by = compile_conjuncts(ctx, &hierarchy.connect_by)?;
    let after_connect_by = compile_conjuncts(ctx, after.iter().copied())?;

    let domains: Vec<_> = ctx
        .arena
        .value_list(lists.cb_list)?
        .slots()
        .iter()
        .map(|s| s.domain.clone())
        .collect();
    let prior_out_list = domains
        .into_iter()
        .enumerate()
        .map(|(i, d)| ReguVar::slot(lists.cb_list, i, d))
        .collect();

    let mut out_list = lists.table_slots;
    out_list.extend(PseudoSlot::CONNECT_BY.iter().map(|p| ReguVar::Pseudo(*p)));

    let mut node = XaslNode::new(ProcKind::ConnectBy(ConnectByProc {
        start_with: start_with.pred,
        connect_by: connect_by.pred,
        after_connect_by: after_connect_by.pred,
        prior_value_list: lists.prior_list,
        prior_out_list,
        nocycle: hierarchy.nocycle,
    }));
    node.source = Some(block.id);
    node.value_list = Some(lists.cb_list);
    node.out_list = out_list;
    node.spec_list = spec_list;
    node.scan_ptr = scan_ptr;
    let id = ctx.alloc_node(node)?;

    let continue_scan = start_with.continue_scan
        || connect_by.continue_scan
        || after_connect_by.continue_scan;
    Ok((id, continue_scan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_columns_map_onto_fixed_slots() {
        assert_eq!(pseudo_index(PseudoColumn::Level), Some(2));
        assert_eq!(pseudo_index(PseudoColumn::ConnectByIsLeaf), Some(3));
        assert_eq!(pseudo_index(PseudoColumn::ConnectByIsCycle), Some(4));
        assert_eq!(pseudo_index(PseudoColumn::InstNum), None);
    }
}
