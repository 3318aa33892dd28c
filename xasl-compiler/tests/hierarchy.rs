mod common;

use common::*;
use xasl_expr::{AstBuilder, CompareOp, Conjunct, Hierarchy, PseudoColumn, SelectBlock};
use xasl_plan::{
    ConnectByProc, EvalTerm, PredExpr, ProcKind, PseudoSlot, ReguVar, UnaryPredOp, XaslNode,
};
use xasl_result::Error;
use xasl_types::{DbValue, Domain, SpecId};

/// `SELECT id, LEVEL FROM emp START WITH mgr IS NULL CONNECT BY PRIOR id = mgr`
fn org_chart(b: &mut AstBuilder, nocycle: bool) -> (SelectBlock, SpecId) {
    let emp = b.from_class(EMP, "emp");
    let spec = emp.spec;
    let id = b.name(spec, "id", Domain::Integer);
    let level = b.pseudo(PseudoColumn::Level);
    let mut block = b.select(vec![id, level]);

    let mgr = b.name(spec, "mgr", Domain::Integer);
    let is_root = b.is_null(mgr);
    let parent_id = b.name(spec, "id", Domain::Integer);
    let prior_id = b.prior(parent_id);
    let child_mgr = b.name(spec, "mgr", Domain::Integer);
    let link = b.eq(prior_id, child_mgr);
    block.hierarchy = Some(Hierarchy {
        start_with: vec![Conjunct::single(is_root)],
        connect_by: vec![Conjunct::single(link)],
        nocycle,
    });
    block.from.push(emp);
    (block, spec)
}

fn connect_by_node<'p>(plan: &'p xasl_plan::XaslPlan) -> (&'p XaslNode, &'p ConnectByProc) {
    let cb = root(plan).connect_by.expect("CONNECT BY node");
    let node = plan.node(cb).unwrap();
    let ProcKind::ConnectBy(proc) = &node.proc else {
        panic!("expected CONNECTBY, got {}", node.proc.name());
    };
    (node, proc)
}

#[test]
fn connect_by_node_runs_the_scans() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let (block, spec) = org_chart(&mut b, false);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let node = root(&compiled.plan);
    assert!(node.spec_list.is_empty());
    let (cb, proc) = connect_by_node(&compiled.plan);
    assert_eq!(cb.spec_list.len(), 1);
    assert_eq!(cb.spec_list[0].spec, spec);
    assert!(!proc.nocycle);

    // Two table columns (id, mgr) followed by the five pseudo slots.
    let cb_list = cb.value_list.unwrap();
    assert_eq!(compiled.plan.arena.value_list(cb_list).unwrap().arity(), 7);
    assert_eq!(proc.prior_out_list.len(), 7);
    assert_eq!(
        &cb.out_list[2..],
        &PseudoSlot::CONNECT_BY.map(ReguVar::Pseudo)[..]
    );

    let emp_list = cb.spec_list[0].value_list;
    assert_eq!(
        proc.start_with,
        Some(PredExpr::Term(EvalTerm::Unary {
            op: UnaryPredOp::IsNull,
            operand: ReguVar::slot(emp_list, 1, Domain::Integer),
        }))
    );
    assert_eq!(
        proc.connect_by,
        Some(PredExpr::compare(
            CompareOp::Eq,
            ReguVar::slot(proc.prior_value_list, 0, Domain::Integer),
            ReguVar::slot(emp_list, 1, Domain::Integer),
        ))
    );
    assert_eq!(
        node.out_list,
        vec![
            ReguVar::slot(emp_list, 0, Domain::Integer),
            ReguVar::slot(cb_list, 4, Domain::Integer),
        ]
    );
}

#[test]
fn prior_on_the_right_reads_the_parent_row() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let emp = b.from_class(EMP, "emp");
    let spec = emp.spec;
    // SELECT id, CONNECT_BY_ISLEAF, CONNECT_BY_ISCYCLE, LEVEL FROM emp
    //   START WITH id = 7 CONNECT BY NOCYCLE id = PRIOR mgr
    let id = b.name(spec, "id", Domain::Integer);
    let leaf = b.pseudo(PseudoColumn::ConnectByIsLeaf);
    let cycle = b.pseudo(PseudoColumn::ConnectByIsCycle);
    let level = b.pseudo(PseudoColumn::Level);
    let mut block = b.select(vec![id, leaf, cycle, level]);

    let start_id = b.name(spec, "id", Domain::Integer);
    let seven = b.lit(7);
    let start = b.eq(start_id, seven);
    let child_id = b.name(spec, "id", Domain::Integer);
    let parent_mgr = b.name(spec, "mgr", Domain::Integer);
    let prior_mgr = b.prior(parent_mgr);
    let link = b.eq(child_id, prior_mgr);
    block.hierarchy = Some(Hierarchy {
        start_with: vec![Conjunct::single(start)],
        connect_by: vec![Conjunct::single(link)],
        nocycle: true,
    });
    block.from.push(emp);

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let (cb, proc) = connect_by_node(&compiled.plan);
    let emp_list = cb.spec_list[0].value_list;
    let cb_list = cb.value_list.unwrap();
    assert_eq!(
        proc.connect_by,
        Some(PredExpr::compare(
            CompareOp::Eq,
            ReguVar::slot(emp_list, 0, Domain::Integer),
            ReguVar::slot(proc.prior_value_list, 1, Domain::Integer),
        ))
    );
    // Pseudo slots follow the two table columns: link, path, level, leaf, cycle.
    assert_eq!(
        root(&compiled.plan).out_list,
        vec![
            ReguVar::slot(emp_list, 0, Domain::Integer),
            ReguVar::slot(cb_list, 5, Domain::Integer),
            ReguVar::slot(cb_list, 6, Domain::Integer),
            ReguVar::slot(cb_list, 4, Domain::Integer),
        ]
    );
}

#[test]
fn level_filter_in_where_runs_after_expansion() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let (mut block, _) = org_chart(&mut b, true);
    let level = b.pseudo(PseudoColumn::Level);
    let two = b.lit(2);
    let shallow = b.compare(CompareOp::Le, level, two);
    block.where_clause.push(Conjunct::single(shallow));

    let compiled = compile(&catalog, &select_stmt(block)).unwrap();
    let (cb, proc) = connect_by_node(&compiled.plan);
    assert!(proc.nocycle);
    assert!(root(&compiled.plan).if_pred.is_none());
    assert!(cb.spec_list[0].pred.is_none());
    assert_eq!(
        proc.after_connect_by,
        Some(PredExpr::compare(
            CompareOp::Le,
            ReguVar::slot(cb.value_list.unwrap(), 4, Domain::Integer),
            ReguVar::Constant(DbValue::Integer(2)),
        ))
    );
}

#[test]
fn level_outside_a_hierarchy_is_rejected() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let level = b.pseudo(PseudoColumn::Level);
    let mut block = b.select(vec![level]);
    block.from.push(t);

    let err = compile(&catalog, &select_stmt(block)).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }), "{err}");
}

#[test]
fn prior_outside_a_hierarchy_is_rejected() {
    let catalog = fixture_catalog();
    let mut b = AstBuilder::new();
    let t = b.from_class(T, "t");
    let pk = b.name(t.spec, "pk", Domain::Integer);
    let prior = b.prior(pk);
    let mut block = b.select(vec![prior]);
    block.from.push(t);

    let err = compile(&catalog, &select_stmt(block)).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }), "{err}");
}
