//! Optimizer collaborator interface and the proposal checks applied to its
//! answers.

use rustc_hash::FxHashSet;
use xasl_expr::{Conjunct, Hint, OrderItem};
use xasl_types::{ClassId, IndexId, NodeId, SpecId};

/// One FROM entry as the optimizer sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub spec: SpecId,
    /// `None` for derived tables, set expressions and methods.
    pub class: Option<ClassId>,
    pub name: String,
}

/// Everything the optimizer gets for one query block.
///
/// Term indices in an [`AccessPlan`] refer to positions in `conjuncts`.
#[derive(Clone, Debug)]
pub struct OptimizerRequest<'a> {
    pub block: NodeId,
    pub tables: Vec<TableRef>,
    pub conjuncts: &'a [&'a Conjunct],
    pub order_by: &'a [OrderItem],
    pub hints: &'a [Hint],
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlannedMethod {
    Sequential,
    Index {
        index: IndexId,
        /// Key column names in index order.
        columns: Vec<String>,
        /// Conjuncts that drive the key range, in key-column order.
        key_terms: Vec<usize>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableAccess {
    pub spec: SpecId,
    pub method: PlannedMethod,
    /// Conjuncts evaluable on index key columns alone.
    pub sarg_terms: Vec<usize>,
}

impl TableAccess {
    pub fn sequential(spec: SpecId) -> Self {
        Self {
            spec,
            method: PlannedMethod::Sequential,
            sarg_terms: Vec::new(),
        }
    }

    pub fn index(spec: SpecId, index: IndexId, columns: &[&str], key_terms: Vec<usize>) -> Self {
        Self {
            spec,
            method: PlannedMethod::Index {
                index,
                columns: columns.iter().map(|c| c.to_string()).collect(),
                key_terms,
            },
            sarg_terms: Vec::new(),
        }
    }

    fn terms(&self) -> impl Iterator<Item = usize> + '_ {
        let keys: &[usize] = match &self.method {
            PlannedMethod::Index { key_terms, .. } => key_terms,
            PlannedMethod::Sequential => &[],
        };
        keys.iter().chain(self.sarg_terms.iter()).copied()
    }
}

/// A proposed join order with per-table access methods.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessPlan {
    /// Outermost table first.
    pub tables: Vec<TableAccess>,
    /// The join order already produces rows in ORDER BY order.
    pub order_satisfied: bool,
}

impl AccessPlan {
    /// FROM order with sequential scans everywhere.
    pub fn naive(specs: impl IntoIterator<Item = SpecId>) -> Self {
        Self {
            tables: specs.into_iter().map(TableAccess::sequential).collect(),
            order_satisfied: false,
        }
    }

    /// Describe why this proposal cannot be rendered for `request`, if it
    /// cannot.
    pub fn defect(&self, request: &OptimizerRequest<'_>) -> Option<String> {
        let expected: FxHashSet<SpecId> = request.tables.iter().map(|t| t.spec).collect();
        let mut seen = FxHashSet::default();
        for access in &self.tables {
            if !expected.contains(&access.spec) {
                return Some(format!("unknown spec s{}", access.spec.raw()));
            }
            if !seen.insert(access.spec) {
                return Some(format!("spec s{} scanned twice", access.spec.raw()));
            }
        }
        if seen.len() != expected.len() {
            return Some(format!(
                "{} of {} tables placed",
                seen.len(),
                expected.len()
            ));
        }

        let mut used = FxHashSet::default();
        for access in &self.tables {
            if let PlannedMethod::Index {
                columns, key_terms, ..
            } = &access.method
            {
                if key_terms.is_empty() || columns.is_empty() {
                    return Some(format!(
                        "index scan on s{} without key terms",
                        access.spec.raw()
                    ));
                }
                let class = request
                    .tables
                    .iter()
                    .find(|t| t.spec == access.spec)
                    .and_then(|t| t.class);
                if class.is_none() {
                    return Some(format!("index scan on non-class s{}", access.spec.raw()));
                }
            } else if !access.sarg_terms.is_empty() {
                return Some(format!(
                    "key filter on sequential scan of s{}",
                    access.spec.raw()
                ));
            }
            for term in access.terms() {
                if term >= request.conjuncts.len() {
                    return Some(format!("term {term} out of range"));
                }
                if !used.insert(term) {
                    return Some(format!("term {term} used twice"));
                }
            }
        }
        None
    }
}

/// The cost-based optimizer, seen from the compiler.
pub trait PlanOptimizer {
    /// `None` means no plan could be proposed for this request.
    fn propose_plan(&self, request: &OptimizerRequest<'_>) -> Option<AccessPlan>;
}

/// Optimizer without a cost model: every block is scanned sequentially in
/// FROM order.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOptimizer;

impl PlanOptimizer for NoOptimizer {
    fn propose_plan(&self, request: &OptimizerRequest<'_>) -> Option<AccessPlan> {
        Some(AccessPlan::naive(request.tables.iter().map(|t| t.spec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(conjuncts: &'a [&'a Conjunct]) -> OptimizerRequest<'a> {
        OptimizerRequest {
            block: NodeId::new(0),
            tables: vec![
                TableRef {
                    spec: SpecId::new(0),
                    class: Some(ClassId::new(1)),
                    name: "t".into(),
                },
                TableRef {
                    spec: SpecId::new(1),
                    class: None,
                    name: "d".into(),
                },
            ],
            conjuncts,
            order_by: &[],
            hints: &[],
        }
    }

    #[test]
    fn naive_plan_is_valid() {
        let req = request(&[]);
        let plan = AccessPlan::naive([SpecId::new(1), SpecId::new(0)]);
        assert_eq!(plan.defect(&req), None);
    }

    #[test]
    fn missing_table_is_a_defect() {
        let req = request(&[]);
        let plan = AccessPlan::naive([SpecId::new(0)]);
        assert!(plan.defect(&req).is_some());
    }

    #[test]
    fn index_on_derived_table_is_a_defect() {
        let mut b = xasl_expr::AstBuilder::new();
        let lit = b.lit(1);
        let conjunct = Conjunct::single(lit);
        let conjuncts = [&conjunct];
        let req = request(&conjuncts);
        let plan = AccessPlan {
            tables: vec![
                TableAccess::sequential(SpecId::new(0)),
                TableAccess::index(SpecId::new(1), IndexId::new(1), &["a"], vec![0]),
            ],
            order_satisfied: false,
        };
        assert!(plan.defect(&req).unwrap().contains("non-class"));
    }
}
