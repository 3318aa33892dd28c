//! INSERT, UPDATE, DELETE and DO.
//!
//! UPDATE and DELETE read their rows through an "apply" query: a select over
//! the target whose output starts with the row OID (and the class OID for
//! partitioned targets) followed by the new values. INSERT ... SELECT uses
//! the compiled query as its apply plan directly.

use xasl_expr::{
    Conjunct, DeleteStatement, DoStatement, Expr, ExprKind, FromEntry, Hint,
    InsertSource as AstInsertSource, InsertStatement, NameRef, SelectBlock, SelectItem,
    UpdateStatement,
};
use xasl_plan::{
    DeleteProc, DmlTarget, InsertProc, InsertSource, PredExpr, ProcKind, ReguVar, UpdateProc,
    ValueList, ValueListId, XaslId, XaslNode,
};
use xasl_result::{Error, Result};
use xasl_types::{AttrId, ClassId, DbValue, NodeId, SpecId};

use crate::catalog::{AttributeInfo, require_attribute};
use crate::context::TranslationContext;
use crate::predicate::compile_conjuncts;
use crate::regu::{Unbox, compile_expr};
use crate::select::{RowPrefix, attach_subqueries, compile_query, compile_select};
use crate::scope::{TableAttr, TableInfo, TableSource};
use crate::set_op::result_shape;

fn target_class(entry: &FromEntry, statement: NodeId, verb: &str) -> Result<ClassId> {
    entry.class_id().ok_or_else(|| {
        Error::unsupported(
            statement,
            format!("{verb} target {} is not a class", entry.display_name()),
        )
    })
}

/// Heaps written by a DML statement: every partition of a partitioned
/// class, the class itself otherwise. The flag reports partitioning.
fn dml_targets(ctx: &TranslationContext<'_>, class: ClassId) -> Result<(Vec<DmlTarget>, bool)> {
    let partitions = ctx.catalog.partitions(class)?;
    let partitioned = !partitions.is_empty();
    let classes = if partitioned { partitions } else { vec![class] };
    let targets = classes
        .into_iter()
        .map(|class| {
            Ok(DmlTarget {
                class,
                heap: ctx.catalog.class_heap(class)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((targets, partitioned))
}

fn resolve_columns(
    ctx: &TranslationContext<'_>,
    class: ClassId,
    columns: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<Vec<(String, AttributeInfo)>> {
    columns
        .into_iter()
        .map(|name| {
            let name = name.as_ref();
            Ok((name.to_string(), require_attribute(ctx.catalog, class, name)?))
        })
        .collect()
}

/// `IS NOT NULL` over every NOT NULL column. `columns[i]` is read from
/// slot `offset + i` of `list`. The names are resolved in a scope that lives
/// only as long as this predicate.
fn not_null_check(
    ctx: &mut TranslationContext<'_>,
    statement: NodeId,
    spec: SpecId,
    list: ValueListId,
    offset: usize,
    columns: &[(String, AttributeInfo)],
) -> Result<Option<PredExpr>> {
    if !columns.iter().any(|(_, info)| info.not_null) {
        return Ok(None);
    }
    let mut guard = ctx.push_scope(statement);
    guard.scope_mut()?.tables.push(TableInfo {
        spec,
        source: TableSource::List,
        value_list: list,
        attrs: columns
            .iter()
            .map(|(name, info)| TableAttr {
                name: name.to_ascii_lowercase(),
                attr_id: Some(info.attr_id),
                domain: info.domain.clone(),
                kind: info.kind,
                column: None,
            })
            .collect(),
    });
    guard.block.slot_offset = offset;

    let mut conjuncts = Vec::new();
    for (name, info) in columns.iter().filter(|(_, info)| info.not_null) {
        let operand = Expr::new(guard.synthetic_node(), ExprKind::Name(NameRef::new(spec, name)))
            .with_domain(info.domain.clone());
        let check = Expr::new(
            guard.synthetic_node(),
            ExprKind::IsNull {
                negated: true,
                operand: Box::new(operand),
            },
        );
        conjuncts.push(Conjunct::single(check));
    }
    let compiled = compile_conjuncts(&mut guard, &conjuncts)?;
    guard.finish()?;
    Ok(compiled.pred)
}

/// Reject an INSERT that leaves a NOT NULL attribute without a value or a
/// default.
fn check_omitted_columns(
    ctx: &TranslationContext<'_>,
    class: ClassId,
    columns: &[(String, AttributeInfo)],
) -> Result<()> {
    for (name, info) in ctx.catalog.not_null_attributes(class)? {
        let listed = columns.iter().any(|(c, _)| c.eq_ignore_ascii_case(&name));
        if !listed && !info.has_default {
            return Err(Error::Constraint(format!(
                "NOT NULL attribute '{name}' has no value and no default"
            )));
        }
    }
    Ok(())
}

pub(crate) fn compile_insert(
    ctx: &mut TranslationContext<'_>,
    stmt: &InsertStatement,
) -> Result<XaslId> {
    let class = target_class(&stmt.target, stmt.id, "INSERT")?;
    let (targets, _) = dml_targets(ctx, class)?;
    let columns = match &stmt.source {
        AstInsertSource::DefaultValues => Vec::new(),
        _ => resolve_columns(ctx, class, &stmt.columns)?,
    };
    check_omitted_columns(ctx, class, &columns)?;
    let attr_ids: Vec<AttrId> = columns.iter().map(|(_, info)| info.attr_id).collect();

    let mut guard = ctx.push_scope(stmt.id);
    let (source, cons_pred) = match &stmt.source {
        AstInsertSource::Values(rows) => {
            let value_list = guard.alloc_value_list(ValueList::with_domains(
                columns.iter().map(|(_, info)| info.domain.clone()),
            ))?;
            let mut compiled = Vec::with_capacity(rows.len());
            for row in rows {
                compiled.push(compile_row(&mut guard, stmt.id, &columns, row)?);
            }
            (
                InsertSource::Values {
                    rows: compiled,
                    value_list,
                },
                not_null_check(&mut guard, stmt.id, stmt.target.spec, value_list, 0, &columns)?,
            )
        }
        AstInsertSource::Query(query) => {
            let apply = compile_query(&mut guard, query)?;
            let (list, arity) = result_shape(&guard, apply.xasl)?;
            if arity != columns.len() {
                return Err(Error::unsupported(
                    stmt.id,
                    format!("INSERT lists {} columns but the query yields {arity}", columns.len()),
                ));
            }
            (
                InsertSource::Select { apply: apply.xasl },
                not_null_check(&mut guard, stmt.id, stmt.target.spec, list, 0, &columns)?,
            )
        }
        AstInsertSource::DefaultValues => (InsertSource::Defaults, None),
    };

    let node = XaslNode {
        source: Some(stmt.id),
        ..XaslNode::new(ProcKind::Insert(InsertProc {
            targets,
            attr_ids,
            cons_pred,
            source,
        }))
    };
    let xasl = guard.alloc_node(node)?;
    let scope = guard.finish()?;
    attach_subqueries(ctx, xasl, &scope)?;
    tracing::debug!(%xasl, class = %class, columns = columns.len(), "compiled INSERT");
    Ok(xasl)
}

fn compile_row(
    ctx: &mut TranslationContext<'_>,
    statement: NodeId,
    columns: &[(String, AttributeInfo)],
    row: &[Expr],
) -> Result<Vec<ReguVar>> {
    if row.len() != columns.len() {
        return Err(Error::unsupported(
            statement,
            format!("VALUES row has {} values for {} columns", row.len(), columns.len()),
        ));
    }
    let mut out = Vec::with_capacity(row.len());
    for (expr, (name, info)) in row.iter().zip(columns) {
        ctx.expect_domain(expr.id, info.domain.clone());
        let regu = compile_expr(ctx, expr, Unbox::Value)?;
        if info.not_null && matches!(regu, ReguVar::Constant(DbValue::Null)) {
            return Err(Error::Constraint(format!(
                "NULL inserted into NOT NULL attribute '{name}'"
            )));
        }
        let regu = match regu {
            ReguVar::Constant(value) => ReguVar::Constant(
                value.coerce_to(&info.domain).unwrap_or(value),
            ),
            other => other,
        };
        out.push(regu);
    }
    Ok(out)
}

/// Select block that reads the rows a DML statement touches.
fn apply_block(
    id: NodeId,
    target: &FromEntry,
    items: Vec<SelectItem>,
    where_clause: &[Conjunct],
    hints: &[Hint],
) -> SelectBlock {
    SelectBlock {
        items,
        from: vec![target.clone()],
        where_clause: where_clause.to_vec(),
        hints: hints.to_vec(),
        ..SelectBlock::new(id)
    }
}

pub(crate) fn compile_update(
    ctx: &mut TranslationContext<'_>,
    stmt: &UpdateStatement,
) -> Result<XaslId> {
    let class = target_class(&stmt.target, stmt.id, "UPDATE")?;
    let (targets, partitioned) = dml_targets(ctx, class)?;
    let columns = resolve_columns(ctx, class, stmt.assignments.iter().map(|a| &a.column))?;
    for (assignment, (_, info)) in stmt.assignments.iter().zip(&columns) {
        ctx.expect_domain(assignment.value.id, info.domain.clone());
    }

    let block = apply_block(
        stmt.id,
        &stmt.target,
        stmt.assignments
            .iter()
            .map(|a| SelectItem::new(a.value.clone()))
            .collect(),
        &stmt.where_clause,
        &stmt.hints,
    );
    if block.has_aggregates() {
        return Err(Error::unsupported(stmt.id, "aggregate in UPDATE assignment"));
    }
    let prefix = RowPrefix {
        oid: Some(stmt.target.spec),
        class_oid: partitioned,
    };
    let apply = compile_select(ctx, &block, prefix)?;
    let list = ctx
        .arena
        .node(apply.xasl)?
        .value_list
        .ok_or_else(|| Error::Internal("UPDATE apply plan has no result list".into()))?;

    let cons_pred = not_null_check(ctx, stmt.id, stmt.target.spec, list, prefix.len(), &columns)?;

    let node = XaslNode {
        source: Some(stmt.id),
        ..XaslNode::new(ProcKind::Update(UpdateProc {
            targets,
            attr_ids: columns.iter().map(|(_, info)| info.attr_id).collect(),
            cons_pred,
            apply: apply.xasl,
            bookkeeping: prefix.len(),
        }))
    };
    let xasl = ctx.alloc_node(node)?;
    tracing::debug!(%xasl, class = %class, partitioned, "compiled UPDATE");
    Ok(xasl)
}

pub(crate) fn compile_delete(
    ctx: &mut TranslationContext<'_>,
    stmt: &DeleteStatement,
) -> Result<XaslId> {
    let class = target_class(&stmt.target, stmt.id, "DELETE")?;
    let (targets, partitioned) = dml_targets(ctx, class)?;
    let block = apply_block(
        stmt.id,
        &stmt.target,
        Vec::new(),
        &stmt.where_clause,
        &stmt.hints,
    );
    let prefix = RowPrefix {
        oid: Some(stmt.target.spec),
        class_oid: partitioned,
    };
    let apply = compile_select(ctx, &block, prefix)?;

    let node = XaslNode {
        source: Some(stmt.id),
        ..XaslNode::new(ProcKind::Delete(DeleteProc {
            targets,
            apply: apply.xasl,
            bookkeeping: prefix.len(),
        }))
    };
    let xasl = ctx.alloc_node(node)?;
    tracing::debug!(%xasl, class = %class, partitioned, "compiled DELETE");
    Ok(xasl)
}

pub(crate) fn compile_do(ctx: &mut TranslationContext<'_>, stmt: &DoStatement) -> Result<XaslId> {
    let mut guard = ctx.push_scope(stmt.id);
    let value = compile_expr(&mut guard, &stmt.expr, Unbox::Value)?;
    let value_list = guard.alloc_value_list(ValueList::with_domains([value.domain()]))?;
    let node = XaslNode {
        source: Some(stmt.id),
        value_list: Some(value_list),
        out_list: vec![value],
        ..XaslNode::new(ProcKind::Do)
    };
    let xasl = guard.alloc_node(node)?;
    let scope = guard.finish()?;
    attach_subqueries(ctx, xasl, &scope)?;
    Ok(xasl)
}
