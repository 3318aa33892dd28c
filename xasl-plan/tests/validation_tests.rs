use xasl_expr::CompareOp;
use xasl_plan::{
    AccessMethod, AccessSpec, AccessTarget, ArithExpr, ArithKind, AttrProjection, BuildListProc,
    IndexRange, IndexRangeKind, KeyRange, PlanArena, PredExpr, ProcKind, RangeKind, ReguVar,
    ValueList, XaslId, XaslNode, XaslPlan, validate_plan,
};
use xasl_result::Error;
use xasl_types::{ClassId, DbValue, Domain, HeapId, IndexId, SpecId};

fn build_list(arena: &mut PlanArena, out: Vec<ReguVar>) -> XaslNode {
    let list = arena
        .alloc_value_list(ValueList::with_domains(out.iter().map(ReguVar::domain)))
        .expect("value list");
    let mut node = XaslNode::new(ProcKind::BuildList(BuildListProc::default()));
    node.value_list = Some(list);
    node.out_list = out;
    node
}

fn index_spec(arena: &mut PlanArena, key: ReguVar) -> AccessSpec {
    let list = arena
        .alloc_value_list(ValueList::with_domains([Domain::Integer]))
        .expect("value list");
    AccessSpec {
        spec: SpecId::new(0),
        method: AccessMethod::Index,
        target: AccessTarget::Index {
            class: ClassId::new(1),
            heap: HeapId::new(10),
            index: IndexId::new(3),
            range: IndexRange {
                kind: IndexRangeKind::Key,
                ranges: vec![KeyRange::eq(key)],
            },
        },
        value_list: list,
        key_pred: None,
        pred: None,
        key_attrs: AttrProjection::default(),
        pred_attrs: AttrProjection::default(),
        rest_attrs: AttrProjection::default(),
        fetch_oid: false,
    }
}

fn finish(arena: PlanArena, root: XaslId) -> XaslPlan {
    XaslPlan { arena, root }
}

fn expect_invalid(plan: &XaslPlan, needle: &str) {
    match validate_plan(plan) {
        Err(Error::InvalidPlan(msg)) => assert!(
            msg.contains(needle),
            "expected message containing {needle:?}, got {msg:?}"
        ),
        other => panic!("expected InvalidPlan, got {other:?}"),
    }
}

#[test]
fn well_formed_plan_passes() {
    let mut arena = PlanArena::default();
    let mut node = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    node.spec_list
        .push(index_spec(&mut arena, ReguVar::Constant(DbValue::Integer(5))));
    let root = arena.alloc_node(node).expect("node");
    validate_plan(&finish(arena, root)).expect("valid plan");
}

#[test]
fn arity_mismatch_is_reported() {
    let mut arena = PlanArena::default();
    let mut node = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    node.out_list.push(ReguVar::Constant(DbValue::Integer(2)));
    let root = arena.alloc_node(node).expect("node");
    expect_invalid(&finish(arena, root), "output columns");
}

#[test]
fn slot_past_end_is_reported() {
    let mut arena = PlanArena::default();
    let short = arena
        .alloc_value_list(ValueList::with_domains([Domain::Integer]))
        .expect("list");
    let node = build_list(&mut arena, vec![ReguVar::slot(short, 1, Domain::Integer)]);
    let root = arena.alloc_node(node).expect("node");
    expect_invalid(&finish(arena, root), "slot 1");
}

#[test]
fn subquery_on_two_lists_is_reported() {
    let mut arena = PlanArena::default();
    let sub = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    let sub = arena.alloc_node(sub).expect("sub");

    let mut inner = XaslNode::new(ProcKind::Scan);
    inner.aptr_list.push(sub);
    let inner = arena.alloc_node(inner).expect("inner");

    let mut root = build_list(&mut arena, vec![ReguVar::ListId { xasl: sub }]);
    root.dptr_list.push(sub);
    root.scan_ptr = Some(inner);
    let root = arena.alloc_node(root).expect("root");
    expect_invalid(&finish(arena, root), "listed by both");
}

#[test]
fn unowned_subquery_reference_is_reported() {
    let mut arena = PlanArena::default();
    let sub = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    let sub = arena.alloc_node(sub).expect("sub");
    let root = build_list(
        &mut arena,
        vec![ReguVar::SubqueryValue {
            xasl: sub,
            domain: Domain::Integer,
        }],
    );
    let root = arena.alloc_node(root).expect("root");
    expect_invalid(&finish(arena, root), "on no subquery list");
}

#[test]
fn computed_index_key_is_reported() {
    let mut arena = PlanArena::default();
    let computed = ReguVar::Arith(ArithExpr {
        op: ArithKind::Add,
        operands: vec![
            ReguVar::Constant(DbValue::Integer(1)),
            ReguVar::Constant(DbValue::Integer(2)),
        ],
        domain: Domain::Integer,
    });
    let mut node = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    node.spec_list.push(index_spec(&mut arena, computed));
    let root = arena.alloc_node(node).expect("node");
    expect_invalid(&finish(arena, root), "not a constant");
}

#[test]
fn key_index_range_with_two_ranges_is_reported() {
    let mut arena = PlanArena::default();
    let mut spec = index_spec(&mut arena, ReguVar::Constant(DbValue::Integer(5)));
    if let AccessTarget::Index { range, .. } = &mut spec.target {
        range.ranges.push(KeyRange {
            kind: RangeKind::GeInf,
            key1: Some(ReguVar::Constant(DbValue::Integer(9))),
            key2: None,
        });
    }
    let mut node = build_list(&mut arena, vec![ReguVar::Constant(DbValue::Integer(1))]);
    node.spec_list.push(spec);
    node.if_pred = Some(PredExpr::compare(
        CompareOp::Eq,
        ReguVar::Constant(DbValue::Integer(1)),
        ReguVar::Constant(DbValue::Integer(1)),
    ));
    let root = arena.alloc_node(node).expect("node");
    expect_invalid(&finish(arena, root), "malformed KEY");
}
