//! Plan nodes and their proc-specific payloads.

use xasl_expr::{AggregateFunc, NullsOrder, SetQuantifier, SortDirection};
use xasl_types::{AttrId, ClassId, Domain, HeapId, IndexId, NodeId};

use crate::access::AccessSpec;
use crate::arena::{ValueListId, XaslId};
use crate::predicate::PredExpr;
use crate::regu::{ReguVar, SlotRef};

#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    /// Position in the value list being sorted.
    pub pos: usize,
    pub direction: SortDirection,
    pub nulls: NullsOrder,
}

impl SortItem {
    pub fn asc(pos: usize) -> Self {
        Self {
            pos,
            direction: SortDirection::Asc,
            nulls: NullsOrder::First,
        }
    }
}

/// Advisory hint that an aggregate can be answered from an index.
///
/// The descriptor is immutable; the execution engine decides whether to use
/// it and keeps any scan state of its own.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexAggregateHint {
    pub class: ClassId,
    pub heap: HeapId,
    pub index: IndexId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateDesc {
    pub func: AggregateFunc,
    pub quantifier: SetQuantifier,
    /// `None` for `COUNT(*)`.
    pub operand: Option<ReguVar>,
    /// Where the running value lives.
    pub accumulator: SlotRef,
    pub domain: Domain,
    pub index_hint: Option<IndexAggregateHint>,
    /// The aggregate call this descriptor was extracted from.
    pub source: NodeId,
}

/// GROUP BY stage of a build-list node.
///
/// Input rows are projected through `input_regu` into `input_list`, sorted by
/// `sort_list`, and grouped. Each group produces one `output_list` tuple: the
/// first `output_regu.len()` slots are copied from the input tuple, the
/// remaining slots are the accumulators of `agg_list`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupBy {
    pub input_list: ValueListId,
    pub input_regu: Vec<ReguVar>,
    pub sort_list: Vec<SortItem>,
    pub output_list: ValueListId,
    pub output_regu: Vec<ReguVar>,
    pub agg_list: Vec<AggregateDesc>,
    pub having_pred: Option<PredExpr>,
    pub grbynum_pred: Option<PredExpr>,
    pub grbynum_continue: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildListProc {
    pub groupby: Option<GroupBy>,
    pub orderby: Vec<SortItem>,
    pub ordbynum_pred: Option<PredExpr>,
    pub ordbynum_continue: bool,
    pub distinct: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuildValueProc {
    pub agg_list: Vec<AggregateDesc>,
    pub agg_value_list: ValueListId,
    pub having_pred: Option<PredExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SetOpProc {
    pub left: XaslId,
    pub right: XaslId,
    pub all: bool,
    pub orderby: Vec<SortItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectByProc {
    pub start_with: Option<PredExpr>,
    pub connect_by: Option<PredExpr>,
    /// Evaluated once the hierarchy has been expanded (the WHERE clause).
    pub after_connect_by: Option<PredExpr>,
    /// Parent-row tuple used to evaluate `PRIOR` expressions.
    pub prior_value_list: ValueListId,
    pub prior_out_list: Vec<ReguVar>,
    pub nocycle: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DmlTarget {
    pub class: ClassId,
    pub heap: HeapId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
    /// Literal rows; each row has one entry per target attribute.
    Values {
        rows: Vec<Vec<ReguVar>>,
        value_list: ValueListId,
    },
    Select {
        apply: XaslId,
    },
    Defaults,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertProc {
    pub targets: Vec<DmlTarget>,
    pub attr_ids: Vec<AttrId>,
    pub cons_pred: Option<PredExpr>,
    pub source: InsertSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateProc {
    pub targets: Vec<DmlTarget>,
    /// `attr_ids[i]` receives position `bookkeeping + i` of the apply list.
    pub attr_ids: Vec<AttrId>,
    pub cons_pred: Option<PredExpr>,
    pub apply: XaslId,
    /// Leading OID / class-OID columns of the apply list.
    pub bookkeeping: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteProc {
    pub targets: Vec<DmlTarget>,
    pub apply: XaslId,
    pub bookkeeping: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProcKind {
    /// Inner scan of a join chain.
    Scan,
    BuildList(BuildListProc),
    BuildValue(BuildValueProc),
    Union(SetOpProc),
    Difference(SetOpProc),
    Intersection(SetOpProc),
    ConnectBy(ConnectByProc),
    Insert(InsertProc),
    Update(UpdateProc),
    Delete(DeleteProc),
    Do,
}

impl ProcKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcKind::Scan => "SCAN",
            ProcKind::BuildList(_) => "BUILDLIST",
            ProcKind::BuildValue(_) => "BUILDVALUE",
            ProcKind::Union(_) => "UNION",
            ProcKind::Difference(_) => "DIFFERENCE",
            ProcKind::Intersection(_) => "INTERSECTION",
            ProcKind::ConnectBy(_) => "CONNECTBY",
            ProcKind::Insert(_) => "INSERT",
            ProcKind::Update(_) => "UPDATE",
            ProcKind::Delete(_) => "DELETE",
            ProcKind::Do => "DO",
        }
    }

    pub fn set_op(&self) -> Option<&SetOpProc> {
        match self {
            ProcKind::Union(p) | ProcKind::Difference(p) | ProcKind::Intersection(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the node's output tuple is produced by its out-list.
    pub fn projects(&self) -> bool {
        matches!(
            self,
            ProcKind::BuildList(_) | ProcKind::BuildValue(_) | ProcKind::ConnectBy(_) | ProcKind::Do
        )
    }

    pub fn agg_list(&self) -> &[AggregateDesc] {
        match self {
            ProcKind::BuildValue(p) => &p.agg_list,
            ProcKind::BuildList(BuildListProc {
                groupby: Some(g), ..
            }) => &g.agg_list,
            _ => &[],
        }
    }
}

fn push_all<'a>(out: &mut Vec<&'a ReguVar>, list: &'a [ReguVar]) {
    for regu in list {
        regu.for_each(|r| out.push(r));
    }
}

/// One plan node.
#[derive(Clone, Debug, PartialEq)]
pub struct XaslNode {
    pub proc: ProcKind,
    /// Parse-tree node this plan was compiled from.
    pub source: Option<NodeId>,
    pub value_list: Option<ValueListId>,
    pub out_list: Vec<ReguVar>,
    /// Trailing out-list entries that are not part of the visible result.
    pub hidden_columns: usize,
    pub spec_list: Vec<AccessSpec>,
    pub scan_ptr: Option<XaslId>,
    /// Uncorrelated subqueries: run once, result cached.
    pub aptr_list: Vec<XaslId>,
    /// Correlated subqueries: re-run per row of this node.
    pub dptr_list: Vec<XaslId>,
    pub connect_by: Option<XaslId>,
    /// Row-independent predicate evaluated once before scanning.
    pub if_pred: Option<PredExpr>,
    pub instnum_pred: Option<PredExpr>,
    /// The scan may not stop early once `instnum_pred` turns false.
    pub instnum_continue: bool,
    /// Result is used as a single value.
    pub single_tuple: bool,
    pub correlation_level: u32,
}

impl XaslNode {
    pub fn new(proc: ProcKind) -> Self {
        Self {
            proc,
            source: None,
            value_list: None,
            out_list: Vec::new(),
            hidden_columns: 0,
            spec_list: Vec::new(),
            scan_ptr: None,
            aptr_list: Vec::new(),
            dptr_list: Vec::new(),
            connect_by: None,
            if_pred: None,
            instnum_pred: None,
            instnum_continue: false,
            single_tuple: false,
            correlation_level: 0,
        }
    }

    /// Visible output columns.
    pub fn visible_arity(&self) -> usize {
        self.out_list.len().saturating_sub(self.hidden_columns)
    }

    /// Nodes owned by this one: subquery lists, inner scan, CONNECT BY node,
    /// set-operation operands and DML row sources.
    pub fn owned_children(&self) -> Vec<XaslId> {
        let mut out = Vec::new();
        out.extend(self.aptr_list.iter().copied());
        out.extend(self.dptr_list.iter().copied());
        out.extend(self.scan_ptr);
        out.extend(self.connect_by);
        match &self.proc {
            ProcKind::Union(p) | ProcKind::Difference(p) | ProcKind::Intersection(p) => {
                out.push(p.left);
                out.push(p.right);
            }
            ProcKind::Insert(InsertProc {
                source: InsertSource::Select { apply },
                ..
            }) => out.push(*apply),
            ProcKind::Update(p) => out.push(p.apply),
            ProcKind::Delete(p) => out.push(p.apply),
            _ => {}
        }
        out
    }

    /// Every regu variable held directly by this node (not its children).
    pub fn regu_vars(&self) -> Vec<&ReguVar> {
        let mut out = Vec::new();
        push_all(&mut out, &self.out_list);
        for spec in &self.spec_list {
            out.extend(spec.regu_vars());
        }
        for pred in [&self.if_pred, &self.instnum_pred].into_iter().flatten() {
            out.extend(pred.regu_vars());
        }
        let mut preds: Vec<&PredExpr> = Vec::new();
        match &self.proc {
            ProcKind::BuildList(p) => {
                if let Some(g) = &p.groupby {
                    push_all(&mut out, &g.input_regu);
                    push_all(&mut out, &g.output_regu);
                    for agg in &g.agg_list {
                        push_all(&mut out, agg.operand.as_slice());
                    }
                    preds.extend(g.having_pred.iter());
                    preds.extend(g.grbynum_pred.iter());
                }
                preds.extend(p.ordbynum_pred.iter());
            }
            ProcKind::BuildValue(p) => {
                for agg in &p.agg_list {
                    push_all(&mut out, agg.operand.as_slice());
                }
                preds.extend(p.having_pred.iter());
            }
            ProcKind::ConnectBy(p) => {
                push_all(&mut out, &p.prior_out_list);
                preds.extend(p.start_with.iter());
                preds.extend(p.connect_by.iter());
                preds.extend(p.after_connect_by.iter());
            }
            ProcKind::Insert(p) => {
                if let InsertSource::Values { rows, .. } = &p.source {
                    for row in rows {
                        push_all(&mut out, row);
                    }
                }
                preds.extend(p.cons_pred.iter());
            }
            ProcKind::Update(p) => preds.extend(p.cons_pred.iter()),
            _ => {}
        }
        for pred in preds {
            out.extend(pred.regu_vars());
        }
        out
    }

    /// Subquery plans this node references without owning them.
    pub fn referenced_plans(&self) -> Vec<XaslId> {
        let mut out: Vec<XaslId> = self
            .regu_vars()
            .into_iter()
            .filter_map(ReguVar::linked_plan)
            .collect();
        for spec in &self.spec_list {
            if let crate::access::AccessTarget::ListFile { xasl } = &spec.target {
                out.push(*xasl);
            }
        }
        out
    }
}
