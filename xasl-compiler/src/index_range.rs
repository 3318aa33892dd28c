//! Index key construction for index-driven access specs.
//!
//! The optimizer hands over the key conjuncts in key-column order. All but
//! the last must be equalities; they become the shared prefix of every
//! composite key. The last term decides the range kind.

use xasl_expr::visit::referenced_specs;
use xasl_expr::{CompareOp, Conjunct, Expr, ExprKind, Quantifier};
use xasl_plan::{FuncCall, FuncKind, IndexRange, IndexRangeKind, KeyRange, RangeKind, ReguVar};
use xasl_result::{Error, Result};
use xasl_types::{ClassId, Domain, SpecId};

use crate::catalog::require_attribute;
use crate::context::TranslationContext;
use crate::predicate::{BoundShape, bound_shape};
use crate::regu::{Unbox, compile_expr};

type Bound = Option<(bool, ReguVar)>;

/// Compiled restriction of one key column.
#[derive(Debug)]
enum KeyTerm {
    Eq(ReguVar),
    Interval { lower: Bound, upper: Bound },
    List(Vec<ReguVar>),
    Ranges(Vec<KeyTerm>),
}

struct KeyColumn<'a> {
    spec: SpecId,
    name: &'a str,
    domain: Domain,
}

impl KeyColumn<'_> {
    fn is(&self, expr: &Expr) -> bool {
        expr.as_name()
            .is_some_and(|n| n.spec == self.spec && n.name.eq_ignore_ascii_case(self.name))
    }
}

/// Build the index range for `key_terms`, one conjunct per leading column of
/// the index `columns`.
pub(crate) fn build_index_range(
    ctx: &mut TranslationContext<'_>,
    spec: SpecId,
    class: ClassId,
    columns: &[String],
    key_terms: &[&Conjunct],
) -> Result<IndexRange> {
    if key_terms.is_empty() || key_terms.len() > columns.len() {
        return Err(Error::InvalidPlan(format!(
            "{} key terms for an index of {} columns",
            key_terms.len(),
            columns.len()
        )));
    }

    let mut compiled = Vec::with_capacity(key_terms.len());
    let mut domains = Vec::with_capacity(key_terms.len());
    for (conjunct, name) in key_terms.iter().zip(columns) {
        let [term] = conjunct.terms.as_slice() else {
            return Err(Error::unsupported(
                conjunct.terms.first().map(|t| t.id),
                "OR-linked index key term",
            ));
        };
        let column = KeyColumn {
            spec,
            name,
            domain: require_attribute(ctx.catalog, class, name)?.domain,
        };
        compiled.push(compile_key_term(ctx, &column, term)?);
        domains.push(column.domain);
    }

    let composite = columns.len() > 1;
    let last = compiled.pop().ok_or_else(|| Error::internal("no key terms"))?;
    let mut prefix = Vec::with_capacity(compiled.len());
    for (term, conjunct) in compiled.into_iter().zip(key_terms) {
        match term {
            KeyTerm::Eq(value) => prefix.push(value),
            _ => {
                return Err(Error::unsupported(
                    conjunct.terms.first().map(|t| t.id),
                    "only equality terms may precede the last index key column",
                ));
            }
        }
    }
    let keys = KeyBuilder {
        prefix,
        domains,
        composite,
    };

    let range = match last {
        KeyTerm::Eq(value) => IndexRange {
            kind: IndexRangeKind::Key,
            ranges: vec![KeyRange::eq(keys.with(value))],
        },
        KeyTerm::List(values) => IndexRange {
            kind: IndexRangeKind::List,
            ranges: values.into_iter().map(|v| KeyRange::eq(keys.with(v))).collect(),
        },
        KeyTerm::Ranges(parts) => IndexRange {
            kind: IndexRangeKind::RangeList,
            ranges: parts
                .into_iter()
                .map(|part| keys.range(part))
                .collect::<Result<_>>()?,
        },
        interval @ KeyTerm::Interval { .. } => IndexRange {
            kind: IndexRangeKind::Range,
            ranges: vec![keys.range(interval)?],
        },
    };

    tracing::trace!(
        spec = %spec,
        kind = range.kind.as_str(),
        ranges = range.ranges.len(),
        "built index range"
    );
    Ok(range)
}

struct KeyBuilder {
    prefix: Vec<ReguVar>,
    /// Domains of the key columns in use, prefix first.
    domains: Vec<Domain>,
    composite: bool,
}

impl KeyBuilder {
    /// Prefix extended by `last`.
    fn with(&self, last: ReguVar) -> ReguVar {
        if !self.composite {
            return last;
        }
        let mut args = self.prefix.clone();
        args.push(last);
        self.composite_key(args)
    }

    /// The bare equality prefix, as an inclusive bound on the remaining
    /// columns.
    fn prefix_only(&self) -> ReguVar {
        self.composite_key(self.prefix.clone())
    }

    fn composite_key(&self, args: Vec<ReguVar>) -> ReguVar {
        ReguVar::Func(FuncCall {
            func: FuncKind::CompositeKey {
                domains: self.domains[..args.len()].to_vec(),
            },
            args,
            domain: Domain::Variable,
        })
    }

    fn range(&self, term: KeyTerm) -> Result<KeyRange> {
        let (lower, upper) = match term {
            KeyTerm::Eq(value) => return Ok(KeyRange::eq(self.with(value))),
            KeyTerm::Interval { lower, upper } => (lower, upper),
            KeyTerm::List(_) | KeyTerm::Ranges(_) => {
                return Err(Error::internal("nested key list inside a range list"));
            }
        };
        let has_prefix = !self.prefix.is_empty();
        let range = match (lower, upper) {
            (Some((lo_inc, lo)), Some((hi_inc, hi))) => KeyRange {
                kind: match (lo_inc, hi_inc) {
                    (true, true) => RangeKind::GeLe,
                    (true, false) => RangeKind::GeLt,
                    (false, true) => RangeKind::GtLe,
                    (false, false) => RangeKind::GtLt,
                },
                key1: Some(self.with(lo)),
                key2: Some(self.with(hi)),
            },
            // Open sides close over the equality prefix when there is one.
            (Some((inclusive, lo)), None) if has_prefix => KeyRange {
                kind: if inclusive {
                    RangeKind::GeLe
                } else {
                    RangeKind::GtLe
                },
                key1: Some(self.with(lo)),
                key2: Some(self.prefix_only()),
            },
            (Some((inclusive, lo)), None) => KeyRange {
                kind: if inclusive {
                    RangeKind::GeInf
                } else {
                    RangeKind::GtInf
                },
                key1: Some(self.with(lo)),
                key2: None,
            },
            (None, Some((inclusive, hi))) if has_prefix => KeyRange {
                kind: if inclusive {
                    RangeKind::GeLe
                } else {
                    RangeKind::GeLt
                },
                key1: Some(self.prefix_only()),
                key2: Some(self.with(hi)),
            },
            (None, Some((inclusive, hi))) => KeyRange {
                kind: if inclusive {
                    RangeKind::InfLe
                } else {
                    RangeKind::InfLt
                },
                key1: None,
                key2: Some(self.with(hi)),
            },
            (None, None) => KeyRange {
                kind: RangeKind::InfInf,
                key1: None,
                key2: None,
            },
        };
        Ok(range)
    }
}

fn compile_key_term(
    ctx: &mut TranslationContext<'_>,
    column: &KeyColumn<'_>,
    term: &Expr,
) -> Result<KeyTerm> {
    match &term.kind {
        ExprKind::Compare { op, left, right } => {
            let (op, value) = if column.is(left) {
                (*op, right.as_ref())
            } else if column.is(right) {
                (op.flip(), left.as_ref())
            } else {
                return Err(not_on_column(term, column));
            };
            if !matches!(
                op,
                CompareOp::Eq | CompareOp::Ge | CompareOp::Gt | CompareOp::Le | CompareOp::Lt
            ) {
                return Err(Error::unsupported(
                    term.id,
                    format!("operator {} on an index key", op.as_str()),
                ));
            }
            let value = key_value(ctx, column, term, value)?;
            Ok(match op {
                CompareOp::Eq => KeyTerm::Eq(value),
                CompareOp::Ge | CompareOp::Gt => KeyTerm::Interval {
                    lower: Some((op == CompareOp::Ge, value)),
                    upper: None,
                },
                _ => KeyTerm::Interval {
                    lower: None,
                    upper: Some((op == CompareOp::Le, value)),
                },
            })
        }
        ExprKind::Between {
            negated: false,
            operand,
            low,
            high,
        } if column.is(operand) => Ok(KeyTerm::Interval {
            lower: Some((true, key_value(ctx, column, term, low)?)),
            upper: Some((true, key_value(ctx, column, term, high)?)),
        }),
        ExprKind::Quantified {
            op: CompareOp::Eq,
            quantifier: Quantifier::Some,
            left,
            right,
        } if column.is(left) => {
            let ExprKind::SetLiteral { elements, .. } = &right.kind else {
                return Err(Error::unsupported(
                    term.id,
                    "IN over a non-literal set on an index key",
                ));
            };
            let values = elements
                .iter()
                .map(|e| key_value(ctx, column, term, e))
                .collect::<Result<Vec<_>>>()?;
            Ok(KeyTerm::List(values))
        }
        ExprKind::Range { operand, ranges } if column.is(operand) => {
            let mut parts = Vec::with_capacity(ranges.len());
            for bound in ranges {
                parts.push(match bound_shape(term, bound)? {
                    BoundShape::Eq(value) => KeyTerm::Eq(key_value(ctx, column, term, value)?),
                    BoundShape::Interval { lower, upper } => KeyTerm::Interval {
                        lower: match lower {
                            Some((inc, v)) => Some((inc, key_value(ctx, column, term, v)?)),
                            None => None,
                        },
                        upper: match upper {
                            Some((inc, v)) => Some((inc, key_value(ctx, column, term, v)?)),
                            None => None,
                        },
                    },
                });
            }
            match parts.len() {
                0 => Err(Error::unsupported(term.id, "empty RANGE")),
                1 => Ok(parts.remove(0)),
                _ => Ok(KeyTerm::Ranges(parts)),
            }
        }
        _ => Err(not_on_column(term, column)),
    }
}

fn not_on_column(term: &Expr, column: &KeyColumn<'_>) -> Error {
    Error::unsupported(
        term.id,
        format!("term cannot drive index column '{}'", column.name),
    )
}

/// Compile one key operand, coerced to the column domain when it is a
/// constant.
fn key_value(
    ctx: &mut TranslationContext<'_>,
    column: &KeyColumn<'_>,
    term: &Expr,
    value: &Expr,
) -> Result<ReguVar> {
    if referenced_specs([value]).contains(&column.spec) {
        return Err(Error::unsupported(
            term.id,
            "index key depends on the indexed table itself",
        ));
    }
    ctx.expect_domain(value.id, column.domain.clone());
    let regu = match compile_expr(ctx, value, Unbox::Value)? {
        ReguVar::Constant(v) => match v.coerce_to(&column.domain) {
            Some(coerced) => ReguVar::Constant(coerced),
            None => ReguVar::Constant(v),
        },
        other => other,
    };
    if !regu.is_key_shape() {
        return Err(Error::unsupported(
            value.id,
            "index key must be a constant, a slot or a subquery value",
        ));
    }
    Ok(regu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeInfo, Catalog};
    use crate::optimizer::NoOptimizer;
    use crate::options::CompilerOptions;
    use crate::scope::{TableAttr, TableInfo, TableSource};
    use xasl_expr::{AstBuilder, RangeBound, RangeOp};
    use xasl_plan::{AttrKind, ValueList};
    use xasl_types::{AttrId, DbValue, HeapId, IndexId, NodeId};

    struct KeyCatalog;

    impl Catalog for KeyCatalog {
        fn attribute_info(&self, class: ClassId, name: &str) -> Result<AttributeInfo> {
            match name {
                "a" => Ok(AttributeInfo::new(AttrId::new(1), Domain::Integer)),
                "b" => Ok(AttributeInfo::new(AttrId::new(2), Domain::BigInt)),
                _ => Err(Error::AttributeNotFound {
                    class,
                    name: name.into(),
                }),
            }
        }
        fn class_heap(&self, _: ClassId) -> Result<HeapId> {
            Ok(HeapId::new(9))
        }
        fn class_index(&self, _: ClassId, _: &[AttrId]) -> Option<IndexId> {
            Some(IndexId::new(3))
        }
        fn attributes(&self, _: ClassId) -> Result<Vec<(String, AttributeInfo)>> {
            Ok(Vec::new())
        }
    }

    const CLASS: ClassId = ClassId::new(5);

    fn build(
        columns: &[&str],
        make: impl FnOnce(&mut AstBuilder, SpecId) -> Vec<Conjunct>,
    ) -> Result<IndexRange> {
        let catalog = KeyCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        let mut guard = ctx.push_scope(NodeId::new(0));
        let mut b = AstBuilder::new();
        let spec = b.spec_id();
        let list = guard.alloc_value_list(ValueList::with_domains([Domain::Integer, Domain::BigInt]))?;
        guard.scope_mut()?.tables.push(TableInfo {
            spec,
            source: TableSource::Class(CLASS),
            value_list: list,
            attrs: ["a", "b"]
                .iter()
                .zip([Domain::Integer, Domain::BigInt])
                .enumerate()
                .map(|(i, (name, domain))| TableAttr {
                    name: name.to_string(),
                    attr_id: Some(AttrId::new(i as u32 + 1)),
                    domain,
                    kind: AttrKind::Instance,
                    column: None,
                })
                .collect(),
        });
        let conjuncts = make(&mut b, spec);
        let terms: Vec<&Conjunct> = conjuncts.iter().collect();
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        build_index_range(&mut guard, spec, CLASS, &columns, &terms)
    }

    fn int(v: i32) -> ReguVar {
        ReguVar::Constant(DbValue::Integer(v))
    }

    #[test]
    fn equality_on_single_column_is_a_point_key() {
        let range = build(&["a"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let five = b.lit(5);
            vec![Conjunct::single(b.eq(a, five))]
        })
        .unwrap();
        assert_eq!(range.kind, IndexRangeKind::Key);
        assert_eq!(range.ranges, vec![KeyRange::eq(int(5))]);
    }

    #[test]
    fn constant_on_the_left_flips_the_operator() {
        let range = build(&["a"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let ten = b.lit(10);
            vec![Conjunct::single(b.compare(CompareOp::Gt, ten, a))]
        })
        .unwrap();
        assert_eq!(range.kind, IndexRangeKind::Range);
        assert_eq!(range.ranges[0].kind, RangeKind::InfLt);
        assert_eq!(range.ranges[0].key2, Some(int(10)));
    }

    #[test]
    fn prefix_with_open_bound_closes_on_the_prefix() {
        let range = build(&["a", "b"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let one = b.lit(1);
            let first = b.eq(a, one);
            let col_b = b.name(s, "b", Domain::BigInt);
            let seven = b.lit(7);
            let second = b.compare(CompareOp::Gt, col_b, seven);
            vec![Conjunct::single(first), Conjunct::single(second)]
        })
        .unwrap();
        let key = &range.ranges[0];
        assert_eq!(key.kind, RangeKind::GtLe);
        assert!(key.is_well_formed());
        let Some(ReguVar::Func(lower)) = &key.key1 else {
            panic!("expected a composite lower key, got {:?}", key.key1);
        };
        assert_eq!(
            lower.func,
            FuncKind::CompositeKey {
                domains: vec![Domain::Integer, Domain::BigInt]
            }
        );
        // The constant is coerced to the BIGINT column.
        assert_eq!(lower.args[1], ReguVar::Constant(DbValue::BigInt(7)));
        let Some(ReguVar::Func(upper)) = &key.key2 else {
            panic!("expected a composite upper key");
        };
        assert_eq!(upper.args, vec![int(1)]);
    }

    #[test]
    fn in_list_builds_one_key_per_element() {
        let range = build(&["a"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let elements = vec![b.lit(1), b.lit(2), b.lit(3)];
            vec![Conjunct::single(b.in_list(a, elements))]
        })
        .unwrap();
        assert_eq!(range.kind, IndexRangeKind::List);
        assert_eq!(range.ranges.len(), 3);
        assert!(range.ranges.iter().all(|r| r.kind == RangeKind::EqNa));
    }

    #[test]
    fn multi_bound_range_is_a_range_list() {
        let range = build(&["a"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let one = b.lit(1);
            let five = b.lit(5);
            let nine = b.lit(9);
            let bounds = vec![
                RangeBound {
                    op: RangeOp::GeLt,
                    low: Some(Box::new(one)),
                    high: Some(Box::new(five)),
                },
                RangeBound {
                    op: RangeOp::Eq,
                    low: Some(Box::new(nine)),
                    high: None,
                },
            ];
            vec![Conjunct::single(b.range(a, bounds))]
        })
        .unwrap();
        assert_eq!(range.kind, IndexRangeKind::RangeList);
        assert_eq!(range.ranges[0].kind, RangeKind::GeLt);
        assert_eq!(range.ranges[1], KeyRange::eq(int(9)));
    }

    #[test]
    fn self_referencing_key_is_rejected() {
        let err = build(&["a"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let other = b.name(s, "b", Domain::BigInt);
            vec![Conjunct::single(b.eq(a, other))]
        })
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn range_before_last_column_is_rejected() {
        let err = build(&["a", "b"], |b, s| {
            let a = b.name(s, "a", Domain::Integer);
            let one = b.lit(1);
            let first = b.compare(CompareOp::Ge, a, one);
            let col_b = b.name(s, "b", Domain::BigInt);
            let two = b.lit(2);
            let second = b.eq(col_b, two);
            vec![Conjunct::single(first), Conjunct::single(second)]
        })
        .unwrap_err();
        assert!(err.to_string().contains("equality"));
    }
}
