//! Programmatic construction of bound input trees.
//!
//! The binder normally produces these trees; `AstBuilder` hands out node and
//! spec identifiers the same way so that tools and tests can build
//! statements directly.

use xasl_types::{ClassId, CollectionKind, DbValue, Domain, NodeId, SpecId};

use crate::expr::{
    AggregateCall, AggregateFunc, ArithOp, CompareOp, Expr, ExprKind, Function, NameRef,
    PseudoColumn, Quantifier, RangeBound, SetQuantifier,
};
use crate::statement::{FromEntry, FromSource, Query, SelectBlock, SelectItem};

#[derive(Debug, Default)]
pub struct AstBuilder {
    next_node: u32,
    next_spec: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn spec_id(&mut self) -> SpecId {
        let id = SpecId::new(self.next_spec);
        self.next_spec += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let id = self.node_id();
        Expr::new(id, kind)
    }

    pub fn lit(&mut self, value: impl Into<DbValue>) -> Expr {
        let value = value.into();
        let domain = value.domain();
        self.expr(ExprKind::Literal(value)).with_domain(domain)
    }

    pub fn null(&mut self) -> Expr {
        self.expr(ExprKind::Literal(DbValue::Null))
    }

    pub fn name(&mut self, spec: SpecId, name: &str, domain: Domain) -> Expr {
        self.expr(ExprKind::Name(NameRef::new(spec, name)))
            .with_domain(domain)
    }

    /// A name whose static type the binder left unresolved.
    pub fn untyped_name(&mut self, spec: SpecId, name: &str) -> Expr {
        self.expr(ExprKind::Name(NameRef::new(spec, name)))
    }

    pub fn pseudo(&mut self, pseudo: PseudoColumn) -> Expr {
        let domain = match pseudo {
            PseudoColumn::InstNum | PseudoColumn::OrderByNum | PseudoColumn::GroupByNum => {
                Domain::BigInt
            }
            _ => Domain::Integer,
        };
        self.expr(ExprKind::Pseudo(pseudo)).with_domain(domain)
    }

    pub fn arith(&mut self, op: ArithOp, left: Expr, right: Expr) -> Expr {
        let domain = match (left.static_domain(), right.static_domain()) {
            (Some(l), Some(r)) if op == ArithOp::Concat && l.is_string() && r.is_string() => {
                Some(Domain::Varchar)
            }
            (Some(l), Some(r)) => Domain::common_numeric(l, r),
            _ => None,
        };
        let expr = self.expr(ExprKind::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
        match domain {
            Some(domain) => expr.with_domain(domain),
            None => expr,
        }
    }

    pub fn func(&mut self, func: Function, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Function { func, args })
    }

    pub fn cast(&mut self, operand: Expr, target: Domain) -> Expr {
        self.expr(ExprKind::Cast {
            operand: Box::new(operand),
            target: target.clone(),
        })
        .with_domain(target)
    }

    pub fn prior(&mut self, operand: Expr) -> Expr {
        let domain = operand.domain.clone();
        let mut expr = self.expr(ExprKind::Prior(Box::new(operand)));
        expr.domain = domain;
        expr
    }

    pub fn compare(&mut self, op: CompareOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn eq(&mut self, left: Expr, right: Expr) -> Expr {
        self.compare(CompareOp::Eq, left, right)
    }

    pub fn between(&mut self, operand: Expr, low: Expr, high: Expr) -> Expr {
        self.expr(ExprKind::Between {
            negated: false,
            operand: Box::new(operand),
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    pub fn not_between(&mut self, operand: Expr, low: Expr, high: Expr) -> Expr {
        self.expr(ExprKind::Between {
            negated: true,
            operand: Box::new(operand),
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    pub fn range(&mut self, operand: Expr, ranges: Vec<RangeBound>) -> Expr {
        self.expr(ExprKind::Range {
            operand: Box::new(operand),
            ranges,
        })
    }

    pub fn like(&mut self, operand: Expr, pattern: Expr) -> Expr {
        self.expr(ExprKind::Like {
            negated: false,
            operand: Box::new(operand),
            pattern: Box::new(pattern),
            escape: None,
        })
    }

    /// `operand IN (elements...)`, bound as `= SOME {elements}`.
    pub fn in_list(&mut self, operand: Expr, elements: Vec<Expr>) -> Expr {
        let set = self.set_literal(CollectionKind::Sequence, elements);
        self.quantified(CompareOp::Eq, Quantifier::Some, operand, set)
    }

    pub fn in_query(&mut self, operand: Expr, query: SelectBlock) -> Expr {
        let sub = self.subquery(query);
        self.quantified(CompareOp::Eq, Quantifier::Some, operand, sub)
    }

    pub fn quantified(
        &mut self,
        op: CompareOp,
        quantifier: Quantifier,
        left: Expr,
        right: Expr,
    ) -> Expr {
        self.expr(ExprKind::Quantified {
            op,
            quantifier,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn set_literal(&mut self, kind: CollectionKind, elements: Vec<Expr>) -> Expr {
        self.expr(ExprKind::SetLiteral { kind, elements })
    }

    pub fn tuple(&mut self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Tuple(items))
    }

    pub fn is_null(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::IsNull {
            negated: false,
            operand: Box::new(operand),
        })
    }

    pub fn is_not_null(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::IsNull {
            negated: true,
            operand: Box::new(operand),
        })
    }

    pub fn exists(&mut self, query: SelectBlock) -> Expr {
        self.expr(ExprKind::Exists(Box::new(Query::Select(Box::new(query)))))
    }

    pub fn not(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::Not(Box::new(operand)))
    }

    pub fn and(&mut self, terms: Vec<Expr>) -> Expr {
        self.expr(ExprKind::And(terms))
    }

    pub fn or(&mut self, terms: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Or(terms))
    }

    pub fn count_star(&mut self) -> Expr {
        self.expr(ExprKind::Aggregate(AggregateCall {
            func: AggregateFunc::CountStar,
            quantifier: SetQuantifier::All,
            arg: None,
        }))
        .with_domain(Domain::BigInt)
    }

    pub fn agg(&mut self, func: AggregateFunc, arg: Expr) -> Expr {
        self.agg_with(func, SetQuantifier::All, arg)
    }

    pub fn agg_distinct(&mut self, func: AggregateFunc, arg: Expr) -> Expr {
        self.agg_with(func, SetQuantifier::Distinct, arg)
    }

    fn agg_with(&mut self, func: AggregateFunc, quantifier: SetQuantifier, arg: Expr) -> Expr {
        let domain = match func {
            AggregateFunc::CountStar | AggregateFunc::Count => Some(Domain::BigInt),
            AggregateFunc::Avg => Some(Domain::Double),
            AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max => arg.domain.clone(),
        };
        let mut expr = self.expr(ExprKind::Aggregate(AggregateCall {
            func,
            quantifier,
            arg: Some(Box::new(arg)),
        }));
        expr.domain = domain;
        expr
    }

    /// Scalar subquery; the result domain is that of the first select item.
    pub fn subquery(&mut self, query: SelectBlock) -> Expr {
        let domain = query.items.first().and_then(|i| i.expr.domain.clone());
        let mut expr = self.expr(ExprKind::Subquery(Box::new(Query::Select(Box::new(query)))));
        expr.domain = domain;
        expr
    }

    pub fn from_class(&mut self, class: ClassId, name: &str) -> FromEntry {
        FromEntry {
            spec: self.spec_id(),
            source: FromSource::Class {
                class,
                name: name.to_string(),
            },
            alias: None,
            path_entities: Vec::new(),
        }
    }

    pub fn from_derived(&mut self, query: Query, alias: &str) -> FromEntry {
        FromEntry {
            spec: self.spec_id(),
            source: FromSource::Derived(query),
            alias: Some(alias.to_string()),
            path_entities: Vec::new(),
        }
    }

    pub fn from_set(&mut self, expr: Expr, alias: &str) -> FromEntry {
        FromEntry {
            spec: self.spec_id(),
            source: FromSource::SetExpr(expr),
            alias: Some(alias.to_string()),
            path_entities: Vec::new(),
        }
    }

    pub fn from_method(&mut self, name: &str, args: Vec<Expr>) -> FromEntry {
        FromEntry {
            spec: self.spec_id(),
            source: FromSource::Method {
                name: name.to_string(),
                args,
            },
            alias: None,
            path_entities: Vec::new(),
        }
    }

    /// A SELECT block with the given items and no other clauses.
    pub fn select(&mut self, items: Vec<Expr>) -> SelectBlock {
        let mut block = SelectBlock::new(self.node_id());
        block.items = items.into_iter().map(SelectItem::new).collect();
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_builder() {
        let mut b = AstBuilder::new();
        let x = b.lit(1);
        let y = b.lit(2);
        assert_ne!(x.id, y.id);
        let t1 = b.from_class(ClassId::new(1), "t1");
        let t2 = b.from_class(ClassId::new(1), "t2");
        assert_ne!(t1.spec, t2.spec);
    }

    #[test]
    fn arith_infers_common_domain() {
        let mut b = AstBuilder::new();
        let t = b.from_class(ClassId::new(1), "t");
        let a = b.name(t.spec, "a", Domain::Integer);
        let c = b.name(t.spec, "c", Domain::Double);
        let sum = b.arith(ArithOp::Add, a, c);
        assert_eq!(sum.domain, Some(Domain::Double));

        let u = b.untyped_name(t.spec, "u");
        let one = b.lit(1);
        assert_eq!(b.arith(ArithOp::Add, u, one).domain, None);
    }

    #[test]
    fn in_list_is_eq_some() {
        let mut b = AstBuilder::new();
        let t = b.from_class(ClassId::new(1), "t");
        let k = b.name(t.spec, "k", Domain::Integer);
        let elems = vec![b.lit(1), b.lit(2)];
        let pred = b.in_list(k, elems);
        assert!(matches!(
            pred.kind,
            ExprKind::Quantified {
                op: CompareOp::Eq,
                quantifier: Quantifier::Some,
                ..
            }
        ));
    }
}
