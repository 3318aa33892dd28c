#![forbid(unsafe_code)]

//! Structural checks over a finished plan graph.
//!
//! These are the guarantees the execution engine and the plan serializer
//! rely on: output arity matches the out-list, every slot reference lands
//! inside its value list, subquery plans have exactly one owning list, index
//! keys have a storable shape, and ownership edges are acyclic.

use rustc_hash::FxHashMap;
use xasl_result::{Error, Result};

use crate::access::{AccessSpec, AccessTarget, IndexRangeKind, RangeKind};
use crate::arena::{PlanArena, XaslId, XaslPlan};
use crate::node::{BuildListProc, ProcKind, SortItem, XaslNode};
use crate::regu::{ReguVar, SlotRef};
use crate::traversal::plan_postorder;

pub fn validate_plan(plan: &XaslPlan) -> Result<()> {
    validate_from(&plan.arena, plan.root)
}

pub fn validate_from(arena: &PlanArena, root: XaslId) -> Result<()> {
    let reachable = plan_postorder(arena, root)?;

    let mut owners: FxHashMap<XaslId, XaslId> = FxHashMap::default();
    for &id in &reachable {
        let node = arena.node(id)?;
        for &sub in node.aptr_list.iter().chain(node.dptr_list.iter()) {
            if let Some(prev) = owners.insert(sub, id) {
                return Err(Error::InvalidPlan(format!(
                    "subquery plan {sub} is listed by both {prev} and {id}"
                )));
            }
        }
    }

    for &id in &reachable {
        let node = arena.node(id)?;
        check_arity(arena, id, node)?;
        for regu in node.regu_vars() {
            if let ReguVar::Slot(slot) = regu {
                check_slot(arena, id, slot)?;
            }
        }
        for agg in node.proc.agg_list() {
            check_slot(arena, id, &agg.accumulator)?;
        }
        for spec in &node.spec_list {
            check_spec(arena, id, spec)?;
        }
        for referenced in node.referenced_plans() {
            if !owners.contains_key(&referenced) {
                return Err(Error::InvalidPlan(format!(
                    "{id} references subquery plan {referenced} that is on no subquery list"
                )));
            }
        }
    }
    Ok(())
}

fn check_arity(arena: &PlanArena, id: XaslId, node: &XaslNode) -> Result<()> {
    if node.hidden_columns > node.out_list.len() {
        return Err(Error::InvalidPlan(format!(
            "{id} hides {} of {} output columns",
            node.hidden_columns,
            node.out_list.len()
        )));
    }
    if node.proc.projects() {
        let list = node
            .value_list
            .ok_or_else(|| Error::InvalidPlan(format!("{id} has no output value list")))?;
        let arity = arena.value_list(list)?.arity();
        if arity != node.out_list.len() {
            return Err(Error::InvalidPlan(format!(
                "{id} declares {arity} output columns but its out-list has {}",
                node.out_list.len()
            )));
        }
    }
    match &node.proc {
        ProcKind::BuildList(BuildListProc { groupby, orderby, .. }) => {
            if let Some(g) = groupby {
                let input = arena.value_list(g.input_list)?.arity();
                if input != g.input_regu.len() {
                    return Err(Error::InvalidPlan(format!(
                        "{id} group input list has {input} slots for {} values",
                        g.input_regu.len()
                    )));
                }
                check_sort(id, &g.sort_list, input)?;
                let output = arena.value_list(g.output_list)?.arity();
                if output != g.output_regu.len() + g.agg_list.len() {
                    return Err(Error::InvalidPlan(format!(
                        "{id} group output list has {output} slots for {} columns and {} aggregates",
                        g.output_regu.len(),
                        g.agg_list.len()
                    )));
                }
            }
            if let Some(list) = node.value_list {
                check_sort(id, orderby, arena.value_list(list)?.arity())?;
            }
        }
        ProcKind::Union(p) | ProcKind::Difference(p) | ProcKind::Intersection(p) => {
            let left = output_arity(arena, p.left)?;
            let right = output_arity(arena, p.right)?;
            if left != right {
                return Err(Error::InvalidPlan(format!(
                    "{id} combines operands of arity {left} and {right}"
                )));
            }
            if let Some(list) = node.value_list {
                check_sort(id, &p.orderby, arena.value_list(list)?.arity())?;
            }
        }
        ProcKind::ConnectBy(p) => {
            let prior = arena.value_list(p.prior_value_list)?.arity();
            if prior != p.prior_out_list.len() {
                return Err(Error::InvalidPlan(format!(
                    "{id} prior list has {prior} slots for {} values",
                    p.prior_out_list.len()
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Visible columns produced by a node. Set operations have no out-list of
/// their own; their value list is the result shape.
fn output_arity(arena: &PlanArena, id: XaslId) -> Result<usize> {
    let node = arena.node(id)?;
    match (&node.proc.set_op(), node.value_list) {
        (Some(_), Some(list)) => Ok(arena.value_list(list)?.arity()),
        _ => Ok(node.visible_arity()),
    }
}

fn check_sort(id: XaslId, items: &[SortItem], arity: usize) -> Result<()> {
    match items.iter().find(|s| s.pos >= arity) {
        Some(bad) => Err(Error::InvalidPlan(format!(
            "{id} sorts on position {} of a {arity}-column list",
            bad.pos
        ))),
        None => Ok(()),
    }
}

fn check_slot(arena: &PlanArena, id: XaslId, slot: &SlotRef) -> Result<()> {
    let list = arena.value_list(slot.list).map_err(|_| {
        Error::InvalidPlan(format!("{id} references missing value list {}", slot.list))
    })?;
    if slot.index >= list.arity() {
        return Err(Error::InvalidPlan(format!(
            "{id} references slot {} of {} which has {} slots",
            slot.index,
            slot.list,
            list.arity()
        )));
    }
    Ok(())
}

fn check_spec(arena: &PlanArena, id: XaslId, spec: &AccessSpec) -> Result<()> {
    let arity = arena.value_list(spec.value_list)?.arity();
    for proj in spec.projections() {
        if proj.slots.len() != proj.regu_list.len()
            || (!proj.attr_ids.is_empty() && proj.attr_ids.len() != proj.regu_list.len())
        {
            return Err(Error::InvalidPlan(format!(
                "{id} spec s{} has a ragged attribute projection",
                spec.spec.raw()
            )));
        }
        if let Some(&bad) = proj.slots.iter().find(|&&s| s >= arity) {
            return Err(Error::InvalidPlan(format!(
                "{id} spec s{} fetches into slot {bad} of a {arity}-slot list",
                spec.spec.raw()
            )));
        }
    }

    let AccessTarget::Index { range, .. } = &spec.target else {
        return Ok(());
    };
    if range.ranges.is_empty() {
        return Err(Error::InvalidPlan(format!(
            "{id} spec s{} has an index scan without key ranges",
            spec.spec.raw()
        )));
    }
    for key_range in &range.ranges {
        if !key_range.is_well_formed() {
            return Err(Error::InvalidPlan(format!(
                "{id} spec s{} has a {} range with mismatched bounds",
                spec.spec.raw(),
                key_range.kind.as_str()
            )));
        }
        for key in key_range.key1.iter().chain(key_range.key2.iter()) {
            if !key.is_key_shape() {
                return Err(Error::InvalidPlan(format!(
                    "{id} spec s{} has an index key that is not a constant, slot or composite key",
                    spec.spec.raw()
                )));
            }
        }
    }
    let all_eq = range.ranges.iter().all(|r| r.kind == RangeKind::EqNa);
    let shape_ok = match range.kind {
        IndexRangeKind::Key => range.ranges.len() == 1 && all_eq,
        IndexRangeKind::List => all_eq,
        IndexRangeKind::Range => range.ranges.len() == 1,
        IndexRangeKind::RangeList => true,
    };
    if !shape_ok {
        return Err(Error::InvalidPlan(format!(
            "{id} spec s{} has a malformed {} index range",
            spec.spec.raw(),
            range.kind.as_str()
        )));
    }
    Ok(())
}
