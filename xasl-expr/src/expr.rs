//! Resolved scalar and predicate expressions.

use xasl_types::{CollectionKind, DbValue, Domain, NodeId, SpecId};

use crate::statement::Query;

/// One parse-tree expression node.
///
/// `domain` is the binder's best-effort static type; `None` (or
/// `Some(Domain::Variable)`) means static typing did not settle it.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub domain: Option<Domain>,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind) -> Self {
        Self {
            id,
            domain: None,
            kind,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// The static domain, if the binder settled one.
    pub fn static_domain(&self) -> Option<&Domain> {
        self.domain.as_ref().filter(|d| !d.is_variable())
    }

    pub fn as_name(&self) -> Option<&NameRef> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(DbValue),
    /// A name already bound by the binder to one FROM-clause entry.
    Name(NameRef),
    Pseudo(PseudoColumn),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        func: Function,
        args: Vec<Expr>,
    },
    Cast {
        operand: Box<Expr>,
        target: Domain,
    },
    Aggregate(AggregateCall),
    Subquery(Box<Query>),
    SetLiteral {
        kind: CollectionKind,
        elements: Vec<Expr>,
    },
    /// Row constructor, e.g. the left side of `(a, b) IN ((1, 2), (3, 4))`.
    Tuple(Vec<Expr>),
    /// `PRIOR expr` inside a CONNECT BY condition.
    Prior(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Between {
        negated: bool,
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// Disjunction of ranges over one operand, as produced by the binder's
    /// range-merging rewrite.
    Range {
        operand: Box<Expr>,
        ranges: Vec<RangeBound>,
    },
    Like {
        negated: bool,
        operand: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
    },
    /// `left op SOME (right)` / `left op ALL (right)`; IN is `= SOME`.
    Quantified {
        op: CompareOp,
        quantifier: Quantifier,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        negated: bool,
        operand: Box<Expr>,
    },
    Exists(Box<Query>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// A bound attribute reference: attribute `name` of FROM entry `spec`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NameRef {
    pub spec: SpecId,
    pub name: String,
}

impl NameRef {
    pub fn new(spec: SpecId, name: impl Into<String>) -> Self {
        Self {
            spec,
            name: name.into(),
        }
    }

    /// Case-insensitive identity used for de-duplication.
    pub fn key(&self) -> (SpecId, String) {
        (self.spec, self.name.to_ascii_lowercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoColumn {
    /// `ROWNUM` / `INST_NUM()`.
    InstNum,
    OrderByNum,
    GroupByNum,
    Level,
    ConnectByIsLeaf,
    ConnectByIsCycle,
}

impl PseudoColumn {
    pub fn is_hierarchical(self) -> bool {
        matches!(
            self,
            PseudoColumn::Level | PseudoColumn::ConnectByIsLeaf | PseudoColumn::ConnectByIsCycle
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Abs,
    Round,
    Floor,
    Ceil,
    Upper,
    Lower,
    CharLength,
    Substring,
    Coalesce,
    Nvl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    NullSafeEq,
}

impl CompareOp {
    /// The operator obtained by swapping the operands: `a < b` is `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    All,
}

/// Bound shape of one sub-range inside [`ExprKind::Range`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Eq,
    GeLe,
    GeLt,
    GtLe,
    GtLt,
    Ge,
    Gt,
    Le,
    Lt,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RangeBound {
    pub op: RangeOp,
    /// Lower bound, or the value for `RangeOp::Eq`.
    pub low: Option<Box<Expr>>,
    pub high: Option<Box<Expr>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SetQuantifier {
    #[default]
    All,
    Distinct,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    pub quantifier: SetQuantifier,
    pub arg: Option<Box<Expr>>,
}

/// One CNF conjunct: its terms are OR-linked.
#[derive(Clone, Debug, PartialEq)]
pub struct Conjunct {
    pub terms: Vec<Expr>,
}

impl Conjunct {
    pub fn single(term: Expr) -> Self {
        Self { terms: vec![term] }
    }

    pub fn any_of(terms: Vec<Expr>) -> Self {
        Self { terms }
    }

    pub fn is_disjunction(&self) -> bool {
        self.terms.len() > 1
    }
}

/// Structural equality ignoring node ids and binder domains.
///
/// Used to match GROUP BY and ORDER BY expressions against select-list
/// entries the way the binder would.
pub fn same_expr(a: &Expr, b: &Expr) -> bool {
    use ExprKind::*;
    match (&a.kind, &b.kind) {
        (Literal(x), Literal(y)) => x == y,
        (Name(x), Name(y)) => x.key() == y.key(),
        (Pseudo(x), Pseudo(y)) => x == y,
        (Unary { op: o1, operand: x }, Unary { op: o2, operand: y }) => {
            o1 == o2 && same_expr(x, y)
        }
        (
            Arith {
                op: o1,
                left: l1,
                right: r1,
            },
            Arith {
                op: o2,
                left: l2,
                right: r2,
            },
        ) => o1 == o2 && same_expr(l1, l2) && same_expr(r1, r2),
        (Function { func: f1, args: a1 }, Function { func: f2, args: a2 }) => {
            f1 == f2 && same_list(a1, a2)
        }
        (
            Cast {
                operand: x,
                target: t1,
            },
            Cast {
                operand: y,
                target: t2,
            },
        ) => t1 == t2 && same_expr(x, y),
        (Aggregate(x), Aggregate(y)) => {
            x.func == y.func
                && x.quantifier == y.quantifier
                && match (&x.arg, &y.arg) {
                    (Some(p), Some(q)) => same_expr(p, q),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Tuple(x), Tuple(y)) => same_list(x, y),
        (Prior(x), Prior(y)) => same_expr(x, y),
        // Subqueries and predicates are matched by identity only.
        _ => a.id == b.id,
    }
}

fn same_list(a: &[Expr], b: &[Expr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_expr(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(id: u32, spec: u32, attr: &str) -> Expr {
        Expr::new(
            NodeId::new(id),
            ExprKind::Name(NameRef::new(SpecId::new(spec), attr)),
        )
    }

    #[test]
    fn same_expr_ignores_ids_and_case() {
        let a = name(1, 0, "price");
        let b = name(9, 0, "PRICE");
        assert!(same_expr(&a, &b));

        let sum_a = Expr::new(
            NodeId::new(2),
            ExprKind::Arith {
                op: ArithOp::Add,
                left: Box::new(a.clone()),
                right: Box::new(Expr::new(NodeId::new(3), ExprKind::Literal(DbValue::Integer(1)))),
            },
        );
        let mut sum_b = sum_a.clone();
        sum_b.id = NodeId::new(40);
        assert!(same_expr(&sum_a, &sum_b));
        assert!(!same_expr(&sum_a, &a));
    }

    #[test]
    fn different_specs_are_different_names() {
        assert!(!same_expr(&name(1, 0, "a"), &name(2, 1, "a")));
    }

    #[test]
    fn flip_mirrors_inequalities() {
        assert_eq!(CompareOp::Lt.flip(), CompareOp::Gt);
        assert_eq!(CompareOp::Ge.flip(), CompareOp::Le);
        assert_eq!(CompareOp::Eq.flip(), CompareOp::Eq);
    }

    #[test]
    fn static_domain_hides_variable() {
        let e = name(1, 0, "x").with_domain(Domain::Variable);
        assert!(e.static_domain().is_none());
        let e = name(1, 0, "x").with_domain(Domain::Integer);
        assert_eq!(e.static_domain(), Some(&Domain::Integer));
    }
}
