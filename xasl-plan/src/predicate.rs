//! Boolean plan expressions.

use xasl_expr::{CompareOp, Quantifier};

use crate::regu::ReguVar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryPredOp {
    IsNull,
    /// True when the linked list is non-empty.
    Exists,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EvalTerm {
    Compare {
        op: CompareOp,
        lhs: ReguVar,
        rhs: ReguVar,
    },
    Unary {
        op: UnaryPredOp,
        operand: ReguVar,
    },
    Like {
        operand: ReguVar,
        pattern: ReguVar,
        escape: Option<ReguVar>,
    },
    /// `lhs op SOME/ALL set`, where `set` is a list link or a collection.
    Alsm {
        op: CompareOp,
        quantifier: Quantifier,
        lhs: ReguVar,
        set: ReguVar,
    },
}

impl EvalTerm {
    pub fn operands(&self) -> Vec<&ReguVar> {
        match self {
            EvalTerm::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            EvalTerm::Unary { operand, .. } => vec![operand],
            EvalTerm::Like {
                operand,
                pattern,
                escape,
            } => {
                let mut out = vec![operand, pattern];
                out.extend(escape.iter());
                out
            }
            EvalTerm::Alsm { lhs, set, .. } => vec![lhs, set],
        }
    }
}

/// Predicate tree. `And`/`Or` chains are right-associated: `a AND (b AND c)`.
#[derive(Clone, Debug, PartialEq)]
pub enum PredExpr {
    And(Box<PredExpr>, Box<PredExpr>),
    Or(Box<PredExpr>, Box<PredExpr>),
    Not(Box<PredExpr>),
    Term(EvalTerm),
}

impl PredExpr {
    pub fn compare(op: CompareOp, lhs: ReguVar, rhs: ReguVar) -> Self {
        PredExpr::Term(EvalTerm::Compare { op, lhs, rhs })
    }

    pub fn negate(self) -> Self {
        PredExpr::Not(Box::new(self))
    }

    /// Fold into a right-associated AND chain. `None` when empty.
    pub fn and_all(preds: impl IntoIterator<Item = PredExpr>) -> Option<PredExpr> {
        fold_right(preds, PredExpr::And)
    }

    /// Fold into a right-associated OR chain. `None` when empty.
    pub fn or_all(preds: impl IntoIterator<Item = PredExpr>) -> Option<PredExpr> {
        fold_right(preds, PredExpr::Or)
    }

    /// Split a right-associated AND chain into its conjuncts.
    pub fn conjuncts(&self) -> Vec<&PredExpr> {
        let mut out = Vec::new();
        let mut cur = self;
        while let PredExpr::And(left, right) = cur {
            out.push(left.as_ref());
            cur = right;
        }
        out.push(cur);
        out
    }

    /// Every evaluation term in the tree, left to right.
    pub fn terms(&self) -> Vec<&EvalTerm> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(pred) = stack.pop() {
            match pred {
                PredExpr::And(l, r) | PredExpr::Or(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
                PredExpr::Not(inner) => stack.push(inner),
                PredExpr::Term(term) => out.push(term),
            }
        }
        out
    }

    /// Every regu variable reachable from the tree, nested operands included.
    pub fn regu_vars(&self) -> Vec<&ReguVar> {
        let mut out = Vec::new();
        for term in self.terms() {
            for operand in term.operands() {
                operand.for_each(|r| out.push(r));
            }
        }
        out
    }
}

fn fold_right(
    preds: impl IntoIterator<Item = PredExpr>,
    join: fn(Box<PredExpr>, Box<PredExpr>) -> PredExpr,
) -> Option<PredExpr> {
    let mut items: Vec<PredExpr> = preds.into_iter().collect();
    let mut acc = items.pop()?;
    while let Some(prev) = items.pop() {
        acc = join(Box::new(prev), Box::new(acc));
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xasl_types::DbValue;

    fn term(v: i32) -> PredExpr {
        PredExpr::compare(
            CompareOp::Eq,
            ReguVar::Constant(DbValue::Integer(v)),
            ReguVar::Constant(DbValue::Integer(v)),
        )
    }

    #[test]
    fn and_all_is_right_associated() {
        let pred = PredExpr::and_all([term(1), term(2), term(3)]).unwrap();
        let PredExpr::And(first, rest) = &pred else {
            panic!("expected AND");
        };
        assert_eq!(**first, term(1));
        assert!(matches!(**rest, PredExpr::And(_, _)));
        assert_eq!(pred.conjuncts().len(), 3);
        assert_eq!(pred.terms().len(), 3);
    }

    #[test]
    fn empty_fold_is_none() {
        assert!(PredExpr::or_all(Vec::new()).is_none());
        assert_eq!(PredExpr::or_all([term(7)]), Some(term(7)));
    }
}
