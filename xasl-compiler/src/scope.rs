//! Per-block symbol scopes ("table infos").
//!
//! A scope lists the FROM entries of one query block, each with the value
//! list its scan fills and the attributes that list holds. Scopes are pushed
//! and popped only through [`crate::context::ScopeGuard`].

use xasl_plan::{AttrKind, ValueListId, XaslId};
use xasl_types::{AttrId, ClassId, Domain, NodeId, SpecId};

use crate::aggregate::GroupRewrite;

#[derive(Clone, Debug, PartialEq)]
pub enum TableSource {
    Class(ClassId),
    Derived(XaslId),
    SetExpr,
    Method,
    /// A list produced elsewhere in the statement (DML row sources).
    List,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableAttr {
    /// Lower-cased attribute name.
    pub name: String,
    pub attr_id: Option<AttrId>,
    pub domain: Domain,
    pub kind: AttrKind,
    /// Column of the source list for derived tables.
    pub column: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    pub spec: SpecId,
    pub source: TableSource,
    pub value_list: ValueListId,
    pub attrs: Vec<TableAttr>,
}

impl TableInfo {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn attr(&self, name: &str) -> Option<&TableAttr> {
        self.position(name).map(|i| &self.attrs[i])
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match self.source {
            TableSource::Class(class) => Some(class),
            _ => None,
        }
    }
}

/// A subquery plan waiting to be attached to the block that uses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingSubquery {
    pub xasl: XaslId,
    /// Correlation level of the subquery relative to itself.
    pub level: u32,
}

impl PendingSubquery {
    /// Whether the subquery reads the current row of the block it is
    /// attached to.
    pub fn is_correlated(&self) -> bool {
        self.level == 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    pub block: NodeId,
    pub tables: Vec<TableInfo>,
    /// Furthest outer scope referenced from this block, in block hops.
    pub correlation_level: u32,
    pub subqueries: Vec<PendingSubquery>,
    /// Post-group slots of a grouped block, installed once its GROUP BY
    /// stage is built. Nested blocks read this block's names through it.
    pub(crate) group: Option<GroupRewrite>,
}

impl Scope {
    pub fn new(block: NodeId) -> Self {
        Self {
            block,
            tables: Vec::new(),
            correlation_level: 0,
            subqueries: Vec::new(),
            group: None,
        }
    }

    pub fn table(&self, spec: SpecId) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.spec == spec)
    }

    pub fn table_mut(&mut self, spec: SpecId) -> Option<&mut TableInfo> {
        self.tables.iter_mut().find(|t| t.spec == spec)
    }

    pub fn has_spec(&self, spec: SpecId) -> bool {
        self.table(spec).is_some()
    }

    pub fn specs(&self) -> Vec<SpecId> {
        self.tables.iter().map(|t| t.spec).collect()
    }

    pub fn note_reference(&mut self, level: u32) {
        self.correlation_level = self.correlation_level.max(level);
    }

    /// Queue a subquery plan, folding its correlation into this block's.
    pub fn adopt(&mut self, pending: PendingSubquery) {
        if pending.level >= 2 {
            self.note_reference(pending.level - 1);
        }
        self.subqueries.push(pending);
    }
}
