//! Indented textual rendering of a plan graph.
//!
//! Each node is printed once at its owner; other places that use a shared
//! subplan print its handle (`x4`) instead of repeating it.

use std::fmt::Write as _;

use xasl_expr::Quantifier;
use xasl_result::{Error, Result};

use crate::access::{AccessSpec, AccessTarget, AttrProjection};
use crate::arena::{PlanArena, XaslId, XaslPlan};
use crate::node::{ProcKind, SortItem, XaslNode};
use crate::predicate::{EvalTerm, PredExpr, UnaryPredOp};
use crate::regu::{FuncKind, ReguVar};
use crate::traversal::{plan_preorder, traverse_postorder};

pub fn render_regu(regu: &ReguVar) -> String {
    match regu {
        ReguVar::Constant(value) => value.to_string(),
        ReguVar::Slot(slot) => format!("{}[{}]", slot.list, slot.index),
        ReguVar::Attribute(attr) => format!("s{}.{}", attr.spec.raw(), attr.attr),
        ReguVar::Arith(expr) => {
            let args: Vec<String> = expr.operands.iter().map(render_regu).collect();
            match args.as_slice() {
                [l, r] => format!("({l} {} {r})", expr.op.as_str()),
                _ => format!("{}({})", expr.op.as_str(), args.join(", ")),
            }
        }
        ReguVar::Func(call) => {
            let args: Vec<String> = call.args.iter().map(render_regu).collect();
            let name = match &call.func {
                FuncKind::Scalar(f) => f.as_str().to_string(),
                FuncKind::Cast(d) => format!("CAST<{d}>"),
                FuncKind::SetConstructor(kind) => kind.name().to_string(),
                FuncKind::CompositeKey { .. } => "KEY".to_string(),
            };
            format!("{name}({})", args.join(", "))
        }
        ReguVar::SubqueryValue { xasl, .. } => format!("value({xasl})"),
        ReguVar::ListId { xasl } => format!("list({xasl})"),
        ReguVar::Pseudo(p) => p.as_str().to_string(),
        ReguVar::Oid(spec) => format!("oid(s{})", spec.raw()),
        ReguVar::ClassOid(spec) => format!("class_oid(s{})", spec.raw()),
    }
}

pub fn render_term(term: &EvalTerm) -> String {
    match term {
        EvalTerm::Compare { op, lhs, rhs } => {
            format!("{} {} {}", render_regu(lhs), op.as_str(), render_regu(rhs))
        }
        EvalTerm::Unary {
            op: UnaryPredOp::IsNull,
            operand,
        } => format!("{} IS NULL", render_regu(operand)),
        EvalTerm::Unary {
            op: UnaryPredOp::Exists,
            operand,
        } => format!("EXISTS {}", render_regu(operand)),
        EvalTerm::Like {
            operand,
            pattern,
            escape,
        } => {
            let mut out = format!("{} LIKE {}", render_regu(operand), render_regu(pattern));
            if let Some(escape) = escape {
                let _ = write!(out, " ESCAPE {}", render_regu(escape));
            }
            out
        }
        EvalTerm::Alsm {
            op,
            quantifier,
            lhs,
            set,
        } => {
            let q = match quantifier {
                Quantifier::Some => "SOME",
                Quantifier::All => "ALL",
            };
            format!("{} {} {q} {}", render_regu(lhs), op.as_str(), render_regu(set))
        }
    }
}

pub fn render_pred(pred: &PredExpr) -> String {
    traverse_postorder(pred).unwrap_or_else(|e| format!("<{e}>"))
}

fn render_list(regus: &[ReguVar]) -> String {
    let items: Vec<String> = regus.iter().map(render_regu).collect();
    format!("[{}]", items.join(", "))
}

fn render_sort(items: &[SortItem]) -> String {
    let items: Vec<String> = items
        .iter()
        .map(|s| {
            let dir = match s.direction {
                xasl_expr::SortDirection::Asc => "asc",
                xasl_expr::SortDirection::Desc => "desc",
            };
            format!("{} {dir}", s.pos)
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn render_projection(label: &str, proj: &AttrProjection) -> Option<String> {
    if proj.is_empty() {
        return None;
    }
    let attrs: Vec<String> = proj.attr_ids.iter().map(|a| a.to_string()).collect();
    Some(format!(
        "{label}={} -> {:?}",
        if attrs.is_empty() {
            render_list(&proj.regu_list)
        } else {
            format!("[{}]", attrs.join(", "))
        },
        proj.slots
    ))
}

fn render_spec(out: &mut String, pad: &str, spec: &AccessSpec) {
    let target = match &spec.target {
        AccessTarget::Class { class, heap } => format!("{class} {heap}"),
        AccessTarget::Index {
            class,
            index,
            range,
            ..
        } => {
            let ranges: Vec<String> = range
                .ranges
                .iter()
                .map(|r| {
                    let k1 = r.key1.as_ref().map(render_regu).unwrap_or_else(|| "-".into());
                    let k2 = r.key2.as_ref().map(render_regu).unwrap_or_else(|| "-".into());
                    format!("{} {k1}..{k2}", r.kind.as_str())
                })
                .collect();
            format!(
                "{class} {index} {} {{{}}}",
                range.kind.as_str(),
                ranges.join("; ")
            )
        }
        AccessTarget::ListFile { xasl } => format!("list {xasl}"),
        AccessTarget::SetExpr { set } => format!("set {}", render_regu(set)),
        AccessTarget::Method { name, args } => format!("{name}{}", render_list(args)),
    };
    let _ = writeln!(
        out,
        "{pad}  spec s{} {} {target} into {}",
        spec.spec.raw(),
        spec.method.as_str(),
        spec.value_list
    );
    if let Some(pred) = &spec.key_pred {
        let _ = writeln!(out, "{pad}    key_pred: {}", render_pred(pred));
    }
    if let Some(pred) = &spec.pred {
        let _ = writeln!(out, "{pad}    pred: {}", render_pred(pred));
    }
    for (label, proj) in [
        ("key", &spec.key_attrs),
        ("pred", &spec.pred_attrs),
        ("rest", &spec.rest_attrs),
    ] {
        if let Some(line) = render_projection(label, proj) {
            let _ = writeln!(out, "{pad}    {line}");
        }
    }
}

fn render_node(out: &mut String, arena: &PlanArena, id: XaslId, node: &XaslNode, depth: usize) -> Result<()> {
    let pad = "  ".repeat(depth);
    let shape = match node.value_list {
        Some(list) => format!(" {list}/{}", arena.value_list(list)?.arity()),
        None => String::new(),
    };
    let _ = writeln!(out, "{pad}{id} {}{shape}", node.proc.name());
    if !node.out_list.is_empty() {
        let _ = write!(out, "{pad}  out: {}", render_list(&node.out_list));
        if node.hidden_columns > 0 {
            let _ = write!(out, " hidden={}", node.hidden_columns);
        }
        out.push('\n');
    }
    if let Some(pred) = &node.if_pred {
        let _ = writeln!(out, "{pad}  if: {}", render_pred(pred));
    }
    if let Some(pred) = &node.instnum_pred {
        let cont = if node.instnum_continue { " (continue)" } else { "" };
        let _ = writeln!(out, "{pad}  instnum: {}{cont}", render_pred(pred));
    }
    for spec in &node.spec_list {
        render_spec(out, &pad, spec);
    }
    match &node.proc {
        ProcKind::BuildList(p) => {
            if let Some(g) = &p.groupby {
                let _ = writeln!(
                    out,
                    "{pad}  group: in={} {} sort={} out={} {}",
                    g.input_list,
                    render_list(&g.input_regu),
                    render_sort(&g.sort_list),
                    g.output_list,
                    render_list(&g.output_regu)
                );
                for agg in &g.agg_list {
                    let _ = writeln!(
                        out,
                        "{pad}  agg: {}({}) -> {}[{}]",
                        agg.func.as_str(),
                        agg.operand.as_ref().map(render_regu).unwrap_or_else(|| "*".into()),
                        agg.accumulator.list,
                        agg.accumulator.index
                    );
                }
                if let Some(pred) = &g.having_pred {
                    let _ = writeln!(out, "{pad}  having: {}", render_pred(pred));
                }
                if let Some(pred) = &g.grbynum_pred {
                    let _ = writeln!(out, "{pad}  grbynum: {}", render_pred(pred));
                }
            }
            if !p.orderby.is_empty() {
                let _ = writeln!(out, "{pad}  order: {}", render_sort(&p.orderby));
            }
            if let Some(pred) = &p.ordbynum_pred {
                let _ = writeln!(out, "{pad}  ordbynum: {}", render_pred(pred));
            }
            if p.distinct {
                let _ = writeln!(out, "{pad}  distinct");
            }
        }
        ProcKind::BuildValue(p) => {
            for agg in &p.agg_list {
                let _ = writeln!(
                    out,
                    "{pad}  agg: {}({}) -> {}[{}]",
                    agg.func.as_str(),
                    agg.operand.as_ref().map(render_regu).unwrap_or_else(|| "*".into()),
                    agg.accumulator.list,
                    agg.accumulator.index
                );
            }
            if let Some(pred) = &p.having_pred {
                let _ = writeln!(out, "{pad}  having: {}", render_pred(pred));
            }
        }
        ProcKind::Union(p) | ProcKind::Difference(p) | ProcKind::Intersection(p) => {
            let all = if p.all { " all" } else { "" };
            let _ = writeln!(out, "{pad}  operands: {} {}{all}", p.left, p.right);
        }
        ProcKind::ConnectBy(p) => {
            for (label, pred) in [
                ("start_with", &p.start_with),
                ("connect_by", &p.connect_by),
                ("after", &p.after_connect_by),
            ] {
                if let Some(pred) = pred {
                    let _ = writeln!(out, "{pad}  {label}: {}", render_pred(pred));
                }
            }
            let _ = writeln!(
                out,
                "{pad}  prior: {} {}",
                p.prior_value_list,
                render_list(&p.prior_out_list)
            );
        }
        ProcKind::Insert(p) => {
            let _ = writeln!(out, "{pad}  targets: {} attrs: {:?}", p.targets.len(), p.attr_ids);
            if let Some(pred) = &p.cons_pred {
                let _ = writeln!(out, "{pad}  constraint: {}", render_pred(pred));
            }
        }
        ProcKind::Update(p) => {
            let _ = writeln!(
                out,
                "{pad}  targets: {} attrs: {:?} apply: {}",
                p.targets.len(),
                p.attr_ids,
                p.apply
            );
            if let Some(pred) = &p.cons_pred {
                let _ = writeln!(out, "{pad}  constraint: {}", render_pred(pred));
            }
        }
        ProcKind::Delete(p) => {
            let _ = writeln!(out, "{pad}  targets: {} apply: {}", p.targets.len(), p.apply);
        }
        ProcKind::Scan | ProcKind::Do => {}
    }
    for (label, list) in [("aptr", &node.aptr_list), ("dptr", &node.dptr_list)] {
        if !list.is_empty() {
            let ids: Vec<String> = list.iter().map(|x| x.to_string()).collect();
            let _ = writeln!(out, "{pad}  {label}: {}", ids.join(", "));
        }
    }
    Ok(())
}

/// Render every node reachable from `root`.
pub fn explain_from(arena: &PlanArena, root: XaslId) -> Result<String> {
    let mut out = String::new();
    for (id, depth) in plan_preorder(arena, root)? {
        let node = arena.node(id)?;
        render_node(&mut out, arena, id, node, depth)?;
    }
    Ok(out)
}

pub fn explain(plan: &XaslPlan) -> Result<String> {
    explain_from(&plan.arena, plan.root).map_err(|e| match e {
        Error::InvalidPlan(msg) => Error::InvalidPlan(format!("cannot explain: {msg}")),
        other => other,
    })
}
