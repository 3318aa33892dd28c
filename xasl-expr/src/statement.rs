//! Statement and query-block shapes handed over by the binder.

use xasl_types::{ClassId, IndexId, NodeId, SpecId};

use crate::expr::{Conjunct, Expr};

/// One statement to compile.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Query(Query),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Do(DoStatement),
}

impl Statement {
    pub fn id(&self) -> NodeId {
        match self {
            Statement::Query(query) => query.id(),
            Statement::Insert(stmt) => stmt.id,
            Statement::Update(stmt) => stmt.id,
            Statement::Delete(stmt) => stmt.id,
            Statement::Do(stmt) => stmt.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Query(Query::Select(_)) => "SELECT",
            Statement::Query(Query::SetOp(op)) => op.op.as_str(),
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Do(_) => "DO",
        }
    }
}

/// A query block: either a single SELECT or a set operation over two queries.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    Select(Box<SelectBlock>),
    SetOp(Box<SetOperation>),
}

impl Query {
    pub fn id(&self) -> NodeId {
        match self {
            Query::Select(block) => block.id,
            Query::SetOp(op) => op.id,
        }
    }

    /// Number of visible output columns.
    pub fn arity(&self) -> usize {
        match self {
            Query::Select(block) => block.items.len(),
            Query::SetOp(op) => op.left.arity(),
        }
    }

    /// Whether the query provably yields at most one row.
    ///
    /// Only the aggregate-without-GROUP-BY shape is recognised.
    pub fn is_single_row(&self) -> bool {
        match self {
            Query::Select(block) => block.is_single_row(),
            Query::SetOp(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectBlock {
    pub id: NodeId,
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Vec<FromEntry>,
    pub where_clause: Vec<Conjunct>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Conjunct>,
    pub order_by: Vec<OrderItem>,
    /// Predicate over the ORDERBY_NUM() pseudo-column, applied after sorting.
    pub orderby_num: Vec<Conjunct>,
    pub hierarchy: Option<Hierarchy>,
    pub hints: Vec<Hint>,
}

impl SelectBlock {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            distinct: false,
            items: Vec::new(),
            from: Vec::new(),
            where_clause: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            orderby_num: Vec::new(),
            hierarchy: None,
            hints: Vec::new(),
        }
    }

    pub fn has_aggregates(&self) -> bool {
        let roots = self
            .items
            .iter()
            .map(|item| &item.expr)
            .chain(self.having.iter().flat_map(|c| c.terms.iter()));
        crate::visit::contains_aggregate(roots)
    }

    pub fn is_single_row(&self) -> bool {
        self.group_by.is_empty() && self.has_aggregates()
    }

    /// Every FROM entry of the block, path entities included, in
    /// declaration order.
    pub fn all_from_entries(&self) -> Vec<&FromEntry> {
        let mut out = Vec::new();
        let mut stack: Vec<&FromEntry> = self.from.iter().rev().collect();
        while let Some(entry) = stack.pop() {
            out.push(entry);
            stack.extend(entry.path_entities.iter().rev());
        }
        out
    }

    pub fn find_entry(&self, spec: SpecId) -> Option<&FromEntry> {
        self.all_from_entries().into_iter().find(|e| e.spec == spec)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// One FROM-clause entry with its binder-assigned identity.
#[derive(Clone, Debug, PartialEq)]
pub struct FromEntry {
    pub spec: SpecId,
    pub source: FromSource,
    pub alias: Option<String>,
    /// Entities reached through path expressions rooted at this entry.
    pub path_entities: Vec<FromEntry>,
}

impl FromEntry {
    pub fn class_id(&self) -> Option<ClassId> {
        match &self.source {
            FromSource::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.source {
            FromSource::Class { name, .. } => name.clone(),
            FromSource::Derived(_) => format!("derived_{}", self.spec.raw()),
            FromSource::SetExpr(_) => format!("set_{}", self.spec.raw()),
            FromSource::Method { name, .. } => name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FromSource {
    Class { class: ClassId, name: String },
    /// Subquery in FROM.
    Derived(Query),
    /// `TABLE(set_expr)`.
    SetExpr(Expr),
    /// Method (stored procedure) returning rows.
    Method { name: String, args: Vec<Expr> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NullsOrder {
    #[default]
    First,
    Last,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderKey {
    /// 1-based select-list position.
    Position(usize),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub key: OrderKey,
    pub direction: SortDirection,
    pub nulls: NullsOrder,
}

impl OrderItem {
    pub fn asc(key: OrderKey) -> Self {
        Self {
            key,
            direction: SortDirection::Asc,
            nulls: NullsOrder::First,
        }
    }

    pub fn desc(key: OrderKey) -> Self {
        Self {
            key,
            direction: SortDirection::Desc,
            nulls: NullsOrder::Last,
        }
    }
}

/// `START WITH ... CONNECT BY [NOCYCLE] ...`
#[derive(Clone, Debug, PartialEq)]
pub struct Hierarchy {
    pub start_with: Vec<Conjunct>,
    pub connect_by: Vec<Conjunct>,
    pub nocycle: bool,
}

/// Optimizer hints attached to a query block or DML statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Hint {
    /// Join in FROM-clause order.
    Ordered,
    UseNestedLoop,
    UseMerge,
    UseIndex { spec: SpecId, index: IndexId },
    NoIndex(SpecId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetOpKind {
    Union,
    Difference,
    Intersection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SetOperation {
    pub id: NodeId,
    pub op: SetOpKind,
    pub all: bool,
    pub left: Query,
    pub right: Query,
    pub order_by: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub id: NodeId,
    pub target: FromEntry,
    /// Target attribute names in value order. The binder expands an omitted
    /// column list before handing the statement over.
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Query),
    DefaultValues,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub id: NodeId,
    pub target: FromEntry,
    pub assignments: Vec<Assignment>,
    pub where_clause: Vec<Conjunct>,
    pub hints: Vec<Hint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub id: NodeId,
    pub target: FromEntry,
    pub where_clause: Vec<Conjunct>,
    pub hints: Vec<Hint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoStatement {
    pub id: NodeId,
    pub expr: Expr,
}

/// Borrowed view of everything a query block evaluates directly, used by the
/// tree walkers. Derived tables are reported separately because they are
/// queries rather than expressions.
pub(crate) fn block_roots(block: &SelectBlock) -> (Vec<&Expr>, Vec<&Query>) {
    let mut exprs: Vec<&Expr> = Vec::new();
    let mut queries: Vec<&Query> = Vec::new();

    exprs.extend(block.items.iter().map(|item| &item.expr));
    for entry in block.all_from_entries() {
        match &entry.source {
            FromSource::Class { .. } => {}
            FromSource::Derived(query) => queries.push(query),
            FromSource::SetExpr(expr) => exprs.push(expr),
            FromSource::Method { args, .. } => exprs.extend(args.iter()),
        }
    }
    exprs.extend(conjunct_terms(&block.where_clause));
    exprs.extend(block.group_by.iter());
    exprs.extend(conjunct_terms(&block.having));
    exprs.extend(order_exprs(&block.order_by));
    exprs.extend(conjunct_terms(&block.orderby_num));
    if let Some(h) = &block.hierarchy {
        exprs.extend(conjunct_terms(&h.start_with));
        exprs.extend(conjunct_terms(&h.connect_by));
    }
    (exprs, queries)
}

pub(crate) fn conjunct_terms(conjuncts: &[Conjunct]) -> impl Iterator<Item = &Expr> {
    conjuncts.iter().flat_map(|c| c.terms.iter())
}

pub(crate) fn order_exprs(items: &[OrderItem]) -> impl Iterator<Item = &Expr> {
    items.iter().filter_map(|item| match &item.key {
        OrderKey::Expr(expr) => Some(expr),
        OrderKey::Position(_) => None,
    })
}
