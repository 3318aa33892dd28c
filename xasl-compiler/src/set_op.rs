//! UNION / DIFFERENCE / INTERSECTION.

use xasl_expr::{OrderKey, SetOpKind, SetOperation};
use xasl_plan::{ProcKind, SetOpProc, SortItem, ValueList, ValueListId, XaslId, XaslNode};
use xasl_result::{Error, Result};
use xasl_types::Domain;

use crate::context::TranslationContext;
use crate::select::{CompiledQuery, attach_subqueries, compile_query};

/// Column domains of a set operation: the left operand's, widened to the
/// common numeric domain where both sides are numeric.
fn merge_domains(left: &ValueList, right: &ValueList) -> Vec<(Domain, Option<String>)> {
    left.slots()
        .iter()
        .zip(right.slots())
        .map(|(l, r)| {
            let domain = if l.domain == r.domain {
                l.domain.clone()
            } else {
                Domain::common_numeric(&l.domain, &r.domain).unwrap_or_else(|| l.domain.clone())
            };
            (domain, l.label.clone())
        })
        .collect()
}

/// Result list and visible width of an operand. Nested set operations have
/// no out-list; their value list is the whole result.
pub(crate) fn result_shape(ctx: &TranslationContext<'_>, xasl: XaslId) -> Result<(ValueListId, usize)> {
    let node = ctx.arena.node(xasl)?;
    let list = node
        .value_list
        .ok_or_else(|| Error::Internal(format!("set operation operand {xasl} has no result list")))?;
    let arity = match node.proc.set_op() {
        Some(_) => ctx.arena.value_list(list)?.arity(),
        None => node.visible_arity(),
    };
    Ok((list, arity))
}

pub(crate) fn compile_set_op(
    ctx: &mut TranslationContext<'_>,
    op: &SetOperation,
) -> Result<CompiledQuery> {
    let mut guard = ctx.push_scope(op.id);
    let left = compile_query(&mut guard, &op.left)?;
    let right = compile_query(&mut guard, &op.right)?;

    let (left_list, left_arity) = result_shape(&guard, left.xasl)?;
    let (right_list, right_arity) = result_shape(&guard, right.xasl)?;
    if left_arity != right_arity {
        return Err(Error::unsupported(
            op.id,
            format!("set operation operands have {left_arity} and {right_arity} columns"),
        ));
    }
    let columns = merge_domains(
        guard.arena.value_list(left_list)?,
        guard.arena.value_list(right_list)?,
    );

    let mut orderby = Vec::with_capacity(op.order_by.len());
    for item in &op.order_by {
        let pos = match item.key {
            OrderKey::Position(p) if (1..=left_arity).contains(&p) => p - 1,
            OrderKey::Position(p) => {
                return Err(Error::unsupported(
                    op.id,
                    format!("ORDER BY position {p} outside the select list"),
                ));
            }
            OrderKey::Expr(_) => {
                return Err(Error::unsupported(
                    op.id,
                    "set operation ORDER BY must name output positions",
                ));
            }
        };
        orderby.push(SortItem {
            pos,
            direction: item.direction,
            nulls: item.nulls,
        });
    }

    let mut values = ValueList::new();
    for (domain, label) in columns.into_iter().take(left_arity) {
        values.push(domain, label);
    }
    let value_list = guard.alloc_value_list(values)?;

    let payload = SetOpProc {
        left: left.xasl,
        right: right.xasl,
        all: op.all,
        orderby,
    };
    let proc = match op.op {
        SetOpKind::Union => ProcKind::Union(payload),
        SetOpKind::Difference => ProcKind::Difference(payload),
        SetOpKind::Intersection => ProcKind::Intersection(payload),
    };
    let mut node = XaslNode::new(proc);
    node.source = Some(op.id);
    node.value_list = Some(value_list);
    let xasl = guard.alloc_node(node)?;

    let scope = guard.finish()?;
    attach_subqueries(ctx, xasl, &scope)?;

    // Operands report their correlation relative to themselves; seen from
    // the set node's user they are one block further out.
    let level = [left.level, right.level]
        .into_iter()
        .map(|l| l.saturating_sub(1))
        .chain([scope.correlation_level])
        .max()
        .unwrap_or(0);
    ctx.arena.node_mut(xasl)?.correlation_level = level;
    tracing::debug!(
        %xasl,
        op = ctx.arena.node(xasl)?.proc.name(),
        all = op.all,
        level,
        "compiled set operation"
    );
    Ok(CompiledQuery { xasl, level })
}
