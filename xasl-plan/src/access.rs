//! Access specs: how one FROM entry is scanned.

use xasl_types::{AttrId, ClassId, HeapId, IndexId, SpecId};

use crate::arena::{AttrCacheId, ValueListId, XaslId};
use crate::predicate::PredExpr;
use crate::regu::ReguVar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMethod {
    Sequential,
    Index,
    ListScan,
    SetScan,
    MethodScan,
}

impl AccessMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMethod::Sequential => "SEQUENTIAL",
            AccessMethod::Index => "INDEX",
            AccessMethod::ListScan => "LIST",
            AccessMethod::SetScan => "SET",
            AccessMethod::MethodScan => "METHOD",
        }
    }
}

/// Bound shape of one key range. `Inf` sides have no key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// Point lookup: `key1` only.
    EqNa,
    GeLe,
    GeLt,
    GtLe,
    GtLt,
    GeInf,
    GtInf,
    InfLe,
    InfLt,
    InfInf,
}

impl RangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeKind::EqNa => "EQ_NA",
            RangeKind::GeLe => "GE_LE",
            RangeKind::GeLt => "GE_LT",
            RangeKind::GtLe => "GT_LE",
            RangeKind::GtLt => "GT_LT",
            RangeKind::GeInf => "GE_INF",
            RangeKind::GtInf => "GT_INF",
            RangeKind::InfLe => "INF_LE",
            RangeKind::InfLt => "INF_LT",
            RangeKind::InfInf => "INF_INF",
        }
    }

    pub fn has_lower(self) -> bool {
        !matches!(self, RangeKind::InfLe | RangeKind::InfLt | RangeKind::InfInf)
    }

    pub fn has_upper(self) -> bool {
        matches!(
            self,
            RangeKind::GeLe
                | RangeKind::GeLt
                | RangeKind::GtLe
                | RangeKind::GtLt
                | RangeKind::InfLe
                | RangeKind::InfLt
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyRange {
    pub kind: RangeKind,
    pub key1: Option<ReguVar>,
    pub key2: Option<ReguVar>,
}

impl KeyRange {
    pub fn eq(key: ReguVar) -> Self {
        Self {
            kind: RangeKind::EqNa,
            key1: Some(key),
            key2: None,
        }
    }

    /// Whether the bounds present match what `kind` requires.
    pub fn is_well_formed(&self) -> bool {
        let lower_ok = self.key1.is_some() == self.kind.has_lower();
        let upper_ok = self.key2.is_some() == self.kind.has_upper();
        lower_ok && upper_ok
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexRangeKind {
    /// A single equality key.
    Key,
    Range,
    /// One equality key per IN-list element.
    List,
    /// Several OR-ed ranges.
    RangeList,
}

impl IndexRangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexRangeKind::Key => "KEY",
            IndexRangeKind::Range => "RANGE",
            IndexRangeKind::List => "LIST",
            IndexRangeKind::RangeList => "RANGE_LIST",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexRange {
    pub kind: IndexRangeKind,
    pub ranges: Vec<KeyRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AccessTarget {
    Class {
        class: ClassId,
        heap: HeapId,
    },
    Index {
        class: ClassId,
        heap: HeapId,
        index: IndexId,
        range: IndexRange,
    },
    /// Result list of another plan node (derived table).
    ListFile {
        xasl: XaslId,
    },
    SetExpr {
        set: ReguVar,
    },
    Method {
        name: String,
        args: Vec<ReguVar>,
    },
}

/// Attributes fetched at one stage of a scan and where they land.
///
/// `regu_list[i]` reads attribute `attr_ids[i]` (or list column, for list
/// scans) and stores it in position `slots[i]` of the spec's value list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttrProjection {
    pub attr_ids: Vec<AttrId>,
    pub regu_list: Vec<ReguVar>,
    pub slots: Vec<usize>,
    pub cache: Option<AttrCacheId>,
}

impl AttrProjection {
    pub fn len(&self) -> usize {
        self.regu_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regu_list.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccessSpec {
    pub spec: SpecId,
    pub method: AccessMethod,
    pub target: AccessTarget,
    /// The scope's table-info value list this spec fills.
    pub value_list: ValueListId,
    /// Filter over index key columns, evaluated before fetching the row.
    pub key_pred: Option<PredExpr>,
    /// Filter over the fetched row.
    pub pred: Option<PredExpr>,
    pub key_attrs: AttrProjection,
    pub pred_attrs: AttrProjection,
    pub rest_attrs: AttrProjection,
    /// The scan must expose the row OID (DML targets).
    pub fetch_oid: bool,
}

impl AccessSpec {
    pub fn index_range(&self) -> Option<&IndexRange> {
        match &self.target {
            AccessTarget::Index { range, .. } => Some(range),
            _ => None,
        }
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match &self.target {
            AccessTarget::Class { class, .. } | AccessTarget::Index { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// All attribute projections in fetch order.
    pub fn projections(&self) -> [&AttrProjection; 3] {
        [&self.key_attrs, &self.pred_attrs, &self.rest_attrs]
    }

    /// Every regu variable owned by the spec: predicates, projections and
    /// target arguments.
    pub fn regu_vars(&self) -> Vec<&ReguVar> {
        let mut out = Vec::new();
        for pred in [&self.key_pred, &self.pred].into_iter().flatten() {
            out.extend(pred.regu_vars());
        }
        for proj in self.projections() {
            for regu in &proj.regu_list {
                regu.for_each(|r| out.push(r));
            }
        }
        match &self.target {
            AccessTarget::Index { range, .. } => {
                for key in range
                    .ranges
                    .iter()
                    .flat_map(|r| r.key1.iter().chain(r.key2.iter()))
                {
                    key.for_each(|r| out.push(r));
                }
            }
            AccessTarget::SetExpr { set } => set.for_each(|r| out.push(r)),
            AccessTarget::Method { args, .. } => {
                for arg in args {
                    arg.for_each(|r| out.push(r));
                }
            }
            AccessTarget::Class { .. } | AccessTarget::ListFile { .. } => {}
        }
        out
    }
}
