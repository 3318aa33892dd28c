//! Regu variables: descriptions of how to obtain one runtime value.
//!
//! A regu variable never owns the slot it reads. Slot references name a
//! value list by handle and a position inside it; subquery links name a plan
//! node that lives on some ancestor's subquery list.

use xasl_expr::{ArithOp, Function};
use xasl_types::{AttrId, CollectionKind, DbValue, Domain, SpecId};

use crate::arena::{ValueListId, XaslId};

/// Reference to position `index` of value list `list`.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotRef {
    pub list: ValueListId,
    pub index: usize,
    pub domain: Domain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Instance,
    Shared,
    Class,
}

/// Attribute `attr` of the row currently fetched by access spec `spec`.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrRef {
    pub spec: SpecId,
    pub attr: AttrId,
    pub kind: AttrKind,
    pub domain: Domain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Neg,
}

impl From<ArithOp> for ArithKind {
    fn from(op: ArithOp) -> Self {
        match op {
            ArithOp::Add => ArithKind::Add,
            ArithOp::Sub => ArithKind::Sub,
            ArithOp::Mul => ArithKind::Mul,
            ArithOp::Div => ArithKind::Div,
            ArithOp::Mod => ArithKind::Mod,
            ArithOp::Concat => ArithKind::Concat,
        }
    }
}

impl ArithKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithKind::Add => "+",
            ArithKind::Sub => "-",
            ArithKind::Mul => "*",
            ArithKind::Div => "/",
            ArithKind::Mod => "%",
            ArithKind::Concat => "||",
            ArithKind::Neg => "neg",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArithExpr {
    pub op: ArithKind,
    pub operands: Vec<ReguVar>,
    pub domain: Domain,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FuncKind {
    Scalar(Function),
    Cast(Domain),
    /// Builds a collection value from the arguments.
    SetConstructor(CollectionKind),
    /// Multi-column index key: one argument per key column, in index order.
    /// A partial key carries fewer arguments than the index has columns.
    CompositeKey { domains: Vec<Domain> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncCall {
    pub func: FuncKind,
    pub args: Vec<ReguVar>,
    pub domain: Domain,
}

/// Runtime counters and hierarchical placeholders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoSlot {
    InstNum,
    OrderByNum,
    GroupByNum,
    ParentLink,
    Path,
    Level,
    IsLeaf,
    IsCycle,
}

impl PseudoSlot {
    /// Placeholders a CONNECT BY node appends to its value lists, in order.
    pub const CONNECT_BY: [PseudoSlot; 5] = [
        PseudoSlot::ParentLink,
        PseudoSlot::Path,
        PseudoSlot::Level,
        PseudoSlot::IsLeaf,
        PseudoSlot::IsCycle,
    ];

    pub fn domain(self) -> Domain {
        match self {
            PseudoSlot::InstNum | PseudoSlot::OrderByNum | PseudoSlot::GroupByNum => Domain::BigInt,
            PseudoSlot::ParentLink => Domain::Object,
            PseudoSlot::Path => Domain::Varchar,
            PseudoSlot::Level | PseudoSlot::IsLeaf | PseudoSlot::IsCycle => Domain::Integer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PseudoSlot::InstNum => "inst_num",
            PseudoSlot::OrderByNum => "orderby_num",
            PseudoSlot::GroupByNum => "groupby_num",
            PseudoSlot::ParentLink => "parent",
            PseudoSlot::Path => "path",
            PseudoSlot::Level => "level",
            PseudoSlot::IsLeaf => "isleaf",
            PseudoSlot::IsCycle => "iscycle",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReguVar {
    Constant(DbValue),
    Slot(SlotRef),
    Attribute(AttrRef),
    Arith(ArithExpr),
    Func(FuncCall),
    /// First column of the single row produced by a subquery plan.
    SubqueryValue { xasl: XaslId, domain: Domain },
    /// The whole result list of a subquery plan.
    ListId { xasl: XaslId },
    Pseudo(PseudoSlot),
    /// Object identifier of the row fetched by `spec`.
    Oid(SpecId),
    /// Class identifier of the row fetched by `spec` (partition routing).
    ClassOid(SpecId),
}

impl ReguVar {
    pub fn slot(list: ValueListId, index: usize, domain: Domain) -> Self {
        ReguVar::Slot(SlotRef {
            list,
            index,
            domain,
        })
    }

    pub fn domain(&self) -> Domain {
        match self {
            ReguVar::Constant(value) => value.domain(),
            ReguVar::Slot(slot) => slot.domain.clone(),
            ReguVar::Attribute(attr) => attr.domain.clone(),
            ReguVar::Arith(expr) => expr.domain.clone(),
            ReguVar::Func(call) => call.domain.clone(),
            ReguVar::SubqueryValue { domain, .. } => domain.clone(),
            ReguVar::ListId { .. } => Domain::Variable,
            ReguVar::Pseudo(p) => p.domain(),
            ReguVar::Oid(_) | ReguVar::ClassOid(_) => Domain::Object,
        }
    }

    pub fn as_slot(&self) -> Option<&SlotRef> {
        match self {
            ReguVar::Slot(slot) => Some(slot),
            _ => None,
        }
    }

    /// Whether this value is fixed for the duration of one scan, which is
    /// what an index key needs.
    pub fn is_scan_constant(&self) -> bool {
        matches!(
            self,
            ReguVar::Constant(_) | ReguVar::Slot(_) | ReguVar::SubqueryValue { .. }
        )
    }

    /// Whether this is a legal index-range bound: a constant, a slot, a
    /// scalar subquery value, or a composite key of those. A subquery bound's
    /// plan must run before the scan opens, from the run-once or per-row list
    /// of the node that owns the scan.
    pub fn is_key_shape(&self) -> bool {
        match self {
            ReguVar::Func(FuncCall {
                func: FuncKind::CompositeKey { .. },
                args,
                ..
            }) => args.iter().all(ReguVar::is_scan_constant),
            other => other.is_scan_constant(),
        }
    }

    /// Direct children, for walkers.
    pub fn operands(&self) -> &[ReguVar] {
        match self {
            ReguVar::Arith(expr) => &expr.operands,
            ReguVar::Func(call) => &call.args,
            _ => &[],
        }
    }

    /// Subquery plan linked by this variable, if any.
    pub fn linked_plan(&self) -> Option<XaslId> {
        match self {
            ReguVar::SubqueryValue { xasl, .. } | ReguVar::ListId { xasl } => Some(*xasl),
            _ => None,
        }
    }

    /// Visit this variable and all nested operands without recursion.
    pub fn for_each<'a>(&'a self, mut f: impl FnMut(&'a ReguVar)) {
        let mut stack = vec![self];
        while let Some(regu) = stack.pop() {
            f(regu);
            stack.extend(regu.operands().iter().rev());
        }
    }
}
