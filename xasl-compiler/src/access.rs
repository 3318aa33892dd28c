//! Access-spec construction: one scan descriptor per FROM entry.

use rustc_hash::FxHashSet;
use xasl_expr::visit::referenced_names_in;
use xasl_expr::{Conjunct, FromEntry, FromSource};
use xasl_plan::{AccessMethod, AccessSpec, AccessTarget, AttrProjection, AttrRef, ReguVar, XaslId};
use xasl_result::{Error, Result};
use xasl_types::SpecId;

use crate::context::TranslationContext;
use crate::index_range::build_index_range;
use crate::optimizer::PlannedMethod;
use crate::predicate::compile_conjuncts;
use crate::regu::{Unbox, compile_expr, compile_exprs};
use crate::scope::{TableInfo, TableSource};

/// Conjuncts placed on one table by the plan renderer.
#[derive(Debug, Default)]
pub(crate) struct SpecTerms<'a> {
    /// Terms that drive the index range. Consumed by the range; they are not
    /// re-evaluated.
    pub key: Vec<&'a Conjunct>,
    /// Filters over index key columns.
    pub sarg: Vec<&'a Conjunct>,
    /// Filters over the fetched row.
    pub rest: Vec<&'a Conjunct>,
}

/// Build the access spec for `table`. Returns the spec and whether any of
/// its predicates raised the continuation flag.
pub(crate) fn build_access_spec(
    ctx: &mut TranslationContext<'_>,
    table: &TableInfo,
    entry: &FromEntry,
    method: &PlannedMethod,
    terms: &SpecTerms<'_>,
) -> Result<(AccessSpec, bool)> {
    let spec = table.spec;
    let (access_method, target) = match (&table.source, &entry.source, method) {
        (TableSource::Class(class), _, PlannedMethod::Sequential) => (
            AccessMethod::Sequential,
            AccessTarget::Class {
                class: *class,
                heap: ctx.catalog.class_heap(*class)?,
            },
        ),
        (TableSource::Class(class), _, PlannedMethod::Index { index, columns, .. }) => {
            let heap = ctx.catalog.class_heap(*class)?;
            let range = build_index_range(ctx, spec, *class, columns, &terms.key)?;
            (
                AccessMethod::Index,
                AccessTarget::Index {
                    class: *class,
                    heap,
                    index: *index,
                    range,
                },
            )
        }
        (_, _, PlannedMethod::Index { .. }) => {
            return Err(Error::InvalidPlan(format!(
                "index scan requested for non-class table s{}",
                spec.raw()
            )));
        }
        (TableSource::Derived(xasl), _, _) => {
            (AccessMethod::ListScan, AccessTarget::ListFile { xasl: *xasl })
        }
        (TableSource::SetExpr, FromSource::SetExpr(expr), _) => {
            let set = compile_expr(ctx, expr, Unbox::Table)?;
            (AccessMethod::SetScan, AccessTarget::SetExpr { set })
        }
        (TableSource::Method, FromSource::Method { name, args }, _) => {
            let args = compile_exprs(ctx, args)?;
            (
                AccessMethod::MethodScan,
                AccessTarget::Method {
                    name: name.clone(),
                    args,
                },
            )
        }
        (source, _, _) => {
            return Err(Error::Internal(format!(
                "FROM entry s{} does not match its table source {source:?}",
                spec.raw()
            )));
        }
    };

    let is_class = table.class_id().is_some();
    let saved = ctx.block.current_class;
    if is_class {
        ctx.block.current_class = Some(spec);
    }
    let compiled = compile_conjuncts(ctx, terms.sarg.iter().copied()).and_then(|key| {
        compile_conjuncts(ctx, terms.rest.iter().copied()).map(|pred| (key, pred))
    });
    ctx.block.current_class = saved;
    let (key_pred, pred) = compiled?;

    let (key_attrs, pred_attrs, rest_attrs) = if is_class {
        partition_attributes(ctx, table, terms)
    } else if let TableSource::Derived(xasl) = table.source {
        (
            AttrProjection::default(),
            AttrProjection::default(),
            list_columns(ctx, table, xasl)?,
        )
    } else {
        Default::default()
    };

    let access = AccessSpec {
        spec,
        method: access_method,
        target,
        value_list: table.value_list,
        key_pred: key_pred.pred,
        pred: pred.pred,
        key_attrs,
        pred_attrs,
        rest_attrs,
        fetch_oid: false,
    };
    tracing::trace!(
        spec = %spec,
        method = access_method.as_str(),
        key = access.key_attrs.len(),
        pred = access.pred_attrs.len(),
        rest = access.rest_attrs.len(),
        "built access spec"
    );
    Ok((access, key_pred.continue_scan || pred.continue_scan))
}

fn names_of(spec: SpecId, conjuncts: &[&Conjunct]) -> FxHashSet<String> {
    let roots = conjuncts.iter().flat_map(|c| c.terms.iter());
    referenced_names_in(roots, spec)
        .into_iter()
        .map(|n| n.name.to_ascii_lowercase())
        .collect()
}

/// Split the table's attributes into the disjoint key, predicate and
/// projection-only fetch sets.
fn partition_attributes(
    ctx: &mut TranslationContext<'_>,
    table: &TableInfo,
    terms: &SpecTerms<'_>,
) -> (AttrProjection, AttrProjection, AttrProjection) {
    let key_names = names_of(table.spec, &terms.sarg);
    let mut pred_names = names_of(table.spec, &terms.rest);
    pred_names.retain(|n| !key_names.contains(n));

    let mut key = AttrProjection::default();
    let mut pred = AttrProjection::default();
    let mut rest = AttrProjection::default();
    for (pos, attr) in table.attrs.iter().enumerate() {
        let Some(attr_id) = attr.attr_id else {
            continue;
        };
        let target = if key_names.contains(&attr.name) {
            &mut key
        } else if pred_names.contains(&attr.name) {
            &mut pred
        } else {
            &mut rest
        };
        target.attr_ids.push(attr_id);
        target.regu_list.push(ReguVar::Attribute(AttrRef {
            spec: table.spec,
            attr: attr_id,
            kind: attr.kind,
            domain: attr.domain.clone(),
        }));
        target.slots.push(pos);
    }
    for proj in [&mut key, &mut pred, &mut rest] {
        if !proj.is_empty() {
            proj.cache = Some(ctx.arena.alloc_cache());
        }
    }
    (key, pred, rest)
}

/// Columns a list scan copies out of the derived table's result.
fn list_columns(
    ctx: &TranslationContext<'_>,
    table: &TableInfo,
    xasl: XaslId,
) -> Result<AttrProjection> {
    let source = ctx.arena.node(xasl)?.value_list.ok_or_else(|| {
        Error::Internal(format!("derived table s{} has no result list", table.spec.raw()))
    })?;
    let mut proj = AttrProjection::default();
    for (pos, attr) in table.attrs.iter().enumerate() {
        if let Some(column) = attr.column {
            proj.regu_list
                .push(ReguVar::slot(source, column, attr.domain.clone()));
            proj.slots.push(pos);
        }
    }
    Ok(proj)
}
