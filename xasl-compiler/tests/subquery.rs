mod common;

use common::*;
use xasl_compiler::{CompilerOptions, NoOptimizer, TranslationContext, compile_in};
use xasl_expr::{AggregateFunc, AstBuilder, CompareOp, Conjunct};
use xasl_plan::{EvalTerm, GroupBy, PredExpr, ProcKind, ReguVar, UnaryPredOp, XaslNode, XaslPlan};
use xasl_result::Error;
use xasl_types::Domain;

/// Every subquery link in the root's scan predicate.
fn linked_plans(plan: &XaslPlan) -> Vec<xasl_plan::XaslId> {
    let spec = first_spec(plan);
    spec.pred
        .iter()
        .flat_map(PredExpr::regu_vars)
        .filter_map(ReguVar::linked_plan)
        .collect()
}

fn group_stage(node: &XaslNode) -> &GroupBy {
    match &node.proc {
        ProcKind::BuildList(p) => p.groupby.as_ref().expect("group stage"),
        other => panic!("expected BUILDLIST, got {}", other.name()),
    }
}

/// `SELECT t.a, (SELECT MAX(u.x) FROM u WHERE u.z = t.<column>) FROM t
/// GROUP BY t.a`, returning the compiled plan.
fn grouped_with_correlated_column(column: &str) -> XaslPlan {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let x = b.name(u.spec, "x", Domain::Integer);
    let max = b.agg(AggregateFunc::Max, x);
    let mut inner = b.select(vec![max]);
    let z = b.name(u.spec, "z", Domain::Integer);
    let outer = b.name(t.spec, column, Domain::Integer);
    let corr = b.eq(z, outer);
    inner.where_clause.push(Conjunct::single(corr));
    inner.from.push(u);
    let sub = b.subquery(inner);

    let a = b.name(t.spec, "a", Domain::Integer);
    let mut block = b.select(vec![a, sub]);
    let key = b.name(t.spec, "a", Domain::Integer);
    block.group_by.push(key);
    block.from.push(t);
    compile(&catalog, &select_stmt(block)).unwrap().plan
}

/// Slots of the outer block that the subquery's scan predicate reads.
fn outer_reads(plan: &XaslPlan, sub_id: xasl_plan::XaslId) -> Vec<xasl_plan::SlotRef> {
    let sub_node = plan.node(sub_id).unwrap();
    let pred = sub_node.spec_list[0].pred.as_ref().unwrap();
    let inner_list = sub_node.spec_list[0].value_list;
    pred.regu_vars()
        .iter()
        .filter_map(|r| r.as_slot())
        .filter(|s| s.list != inner_list)
        .cloned()
        .collect()
}

#[test]
fn correlated_subquery_over_grouped_key_reads_the_group_row() {
    let plan = grouped_with_correlated_column("a");
    let node = root(&plan);
    let group = group_stage(node);
    let sub_id = node.out_list[1].linked_plan().expect("subquery column");
    assert_eq!(node.dptr_list, vec![sub_id]);

    let reads = outer_reads(&plan, sub_id);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].list, group.output_list);
    assert_eq!(reads[0].index, 0);
    assert_ne!(reads[0].list, node.spec_list[0].value_list);
}

#[test]
fn correlated_subquery_over_ungrouped_column_copies_it_through_grouping() {
    let plan = grouped_with_correlated_column("k");
    let node = root(&plan);
    let group = group_stage(node);
    let sub_id = node.out_list[1].linked_plan().expect("subquery column");

    // t.k rides along after the key so the group row carries it.
    assert_eq!(group.input_regu.len(), 2);
    let copied = group.input_regu[1].as_slot().expect("scan slot");
    assert_eq!(copied.list, node.spec_list[0].value_list);
    assert_eq!(group.output_regu.len(), 2);

    let reads = outer_reads(&plan, sub_id);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].list, group.output_list);
    assert_eq!(reads[0].index, 1);
}

#[test]
fn shared_subquery_read_as_list_keeps_every_row() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let x = b.name(u.spec, "x", Domain::Integer);
    let mut inner = b.select(vec![x]);
    inner.from.push(u);
    let scalar = b.subquery(inner.clone());

    let pk = b.name(t.spec, "pk", Domain::Integer);
    let mut block = b.select(vec![pk]);
    let a = b.name(t.spec, "a", Domain::Integer);
    let above = b.compare(CompareOp::Gt, a, scalar);
    let k = b.name(t.spec, "k", Domain::Integer);
    let member = b.in_query(k, inner);
    block.where_clause.push(Conjunct::single(above));
    block.where_clause.push(Conjunct::single(member));
    block.from.push(t);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert_eq!(node.aptr_list.len(), 1);
    let shared = node.aptr_list[0];
    assert_eq!(linked_plans(&compiled.plan), vec![shared, shared]);
    assert!(!compiled.plan.node(shared).unwrap().single_tuple);
}

#[test]
fn correlated_scalar_subquery_is_rerun_per_row() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let x = b.name(u.spec, "x", Domain::Integer);
    let max = b.agg(AggregateFunc::Max, x);
    let mut inner = b.select(vec![max]);
    let z = b.name(u.spec, "z", Domain::Integer);
    let outer_k = b.name(t.spec, "k", Domain::Integer);
    let corr = b.eq(z, outer_k);
    inner.where_clause.push(Conjunct::single(corr));
    inner.from.push(u);
    let sub = b.subquery(inner);

    let pk = b.name(t.spec, "pk", Domain::Integer);
    let mut block = b.select(vec![pk]);
    let a = b.name(t.spec, "a", Domain::Integer);
    let cond = b.compare(CompareOp::Gt, a, sub);
    block.where_clause.push(Conjunct::single(cond));
    block.from.push(t);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert!(node.aptr_list.is_empty());
    assert_eq!(node.dptr_list.len(), 1);
    let sub_id = node.dptr_list[0];
    assert_eq!(linked_plans(&compiled.plan), vec![sub_id]);

    let sub_node = compiled.plan.node(sub_id).unwrap();
    assert_eq!(sub_node.correlation_level, 1);
    assert!(sub_node.single_tuple);
    // The outer column is read from the outer block's value list.
    let pred = sub_node.spec_list[0].pred.as_ref().unwrap();
    let outer_list = node.spec_list[0].value_list;
    assert!(
        pred.regu_vars()
            .iter()
            .any(|r| r.as_slot().is_some_and(|s| s.list == outer_list))
    );
    // A WHERE on the inner block disables the index fast path.
    let xasl_plan::ProcKind::BuildValue(proc) = &sub_node.proc else {
        panic!("expected BUILDVALUE");
    };
    assert!(proc.agg_list[0].index_hint.is_none());
}

#[test]
fn shared_uncorrelated_subquery_is_compiled_once() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let x = b.name(u.spec, "x", Domain::Integer);
    let max = b.agg(AggregateFunc::Max, x);
    let mut inner = b.select(vec![max]);
    inner.from.push(u);
    let sub = b.subquery(inner);
    let same_sub = sub.clone();

    let pk = b.name(t.spec, "pk", Domain::Integer);
    let mut block = b.select(vec![pk]);
    let a = b.name(t.spec, "a", Domain::Integer);
    let above = b.compare(CompareOp::Gt, a, sub);
    let k = b.name(t.spec, "k", Domain::Integer);
    let below = b.compare(CompareOp::Lt, k, same_sub);
    block.where_clause.push(Conjunct::single(above));
    block.where_clause.push(Conjunct::single(below));
    block.from.push(t);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert!(node.dptr_list.is_empty());
    assert_eq!(node.aptr_list.len(), 1);
    let links = linked_plans(&compiled.plan);
    assert_eq!(links, vec![node.aptr_list[0], node.aptr_list[0]]);
    assert_eq!(
        compiled.plan.node(node.aptr_list[0]).unwrap().correlation_level,
        0
    );
}

#[test]
fn in_subquery_links_the_whole_result_list() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let x = b.name(u.spec, "x", Domain::Integer);
    let mut inner = b.select(vec![x]);
    inner.from.push(u);
    let pk = b.name(t.spec, "pk", Domain::Integer);
    let member = b.in_query(pk, inner);

    let b_col = b.name(t.spec, "b", Domain::Varchar);
    let mut block = b.select(vec![b_col]);
    block.where_clause.push(Conjunct::single(member));
    block.from.push(t);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert_eq!(node.aptr_list.len(), 1);
    let pred = node.spec_list[0].pred.as_ref().unwrap();
    let PredExpr::Term(EvalTerm::Alsm { op, set, .. }) = pred else {
        panic!("expected a quantified comparison, got {pred:?}");
    };
    assert_eq!(*op, CompareOp::Eq);
    assert_eq!(
        *set,
        ReguVar::ListId {
            xasl: node.aptr_list[0]
        }
    );
}

#[test]
fn two_level_reference_hoists_to_the_middle_block() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");
    let emp = b.from_class(EMP, "emp");

    // SELECT MAX(id) FROM emp WHERE emp.mgr = t.k
    let id = b.name(emp.spec, "id", Domain::Integer);
    let max = b.agg(AggregateFunc::Max, id);
    let mut innermost = b.select(vec![max]);
    let mgr = b.name(emp.spec, "mgr", Domain::Integer);
    let t_k = b.name(t.spec, "k", Domain::Integer);
    let corr = b.eq(mgr, t_k);
    innermost.where_clause.push(Conjunct::single(corr));
    innermost.from.push(emp);
    let innermost = b.subquery(innermost);

    // EXISTS (SELECT x FROM u WHERE u.z = <innermost>)
    let x = b.name(u.spec, "x", Domain::Integer);
    let mut middle = b.select(vec![x]);
    let z = b.name(u.spec, "z", Domain::Integer);
    let cond = b.eq(z, innermost);
    middle.where_clause.push(Conjunct::single(cond));
    middle.from.push(u);
    let exists = b.exists(middle);

    let pk = b.name(t.spec, "pk", Domain::Integer);
    let mut block = b.select(vec![pk]);
    block.where_clause.push(Conjunct::single(exists));
    block.from.push(t);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert_eq!(node.dptr_list.len(), 1, "the middle block reads t's row");
    let middle_node = compiled.plan.node(node.dptr_list[0]).unwrap();
    assert_eq!(middle_node.correlation_level, 1);
    assert!(middle_node.dptr_list.is_empty());
    assert_eq!(middle_node.aptr_list.len(), 1);
    let innermost_node = compiled.plan.node(middle_node.aptr_list[0]).unwrap();
    assert_eq!(innermost_node.correlation_level, 2);

    let pred = node.spec_list[0].pred.as_ref().unwrap();
    assert_eq!(
        *pred,
        PredExpr::Term(EvalTerm::Unary {
            op: UnaryPredOp::Exists,
            operand: ReguVar::ListId {
                xasl: node.dptr_list[0]
            },
        })
    );
}

#[test]
fn failed_nested_block_leaves_no_scope_behind() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let u = b.from_class(U, "u");

    let missing = b.name(u.spec, "nope", Domain::Integer);
    let max = b.agg(AggregateFunc::Max, missing);
    let mut inner = b.select(vec![max]);
    inner.from.push(u);
    let sub = b.subquery(inner);

    let pk = b.name(t.spec, "pk", Domain::Integer);
    let mut block = b.select(vec![pk]);
    let a = b.name(t.spec, "a", Domain::Integer);
    let cond = b.compare(CompareOp::Gt, a, sub);
    block.where_clause.push(Conjunct::single(cond));
    block.from.push(t);
    let stmt = select_stmt(block);

    let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
    let err = compile_in(&mut ctx, &stmt).unwrap_err();
    assert!(
        matches!(&err, Error::AttributeNotFound { class, name } if *class == U && name == "nope"),
        "{err}"
    );
    assert_eq!(ctx.scope_depth(), 0);
    assert_eq!(ctx.diagnostics().len(), 1);
}
