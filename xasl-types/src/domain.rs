use std::fmt;

/// Collection flavour of a set-valued domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Set,
    Multiset,
    Sequence,
}

impl CollectionKind {
    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Set => "SET",
            CollectionKind::Multiset => "MULTISET",
            CollectionKind::Sequence => "SEQUENCE",
        }
    }
}

/// The static type of a value slot, expression result or attribute.
///
/// `Variable` marks a domain that the binder could not determine statically;
/// the compiler refines it from operand types or a recorded expected domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    Null,
    Integer,
    BigInt,
    Numeric { precision: u8, scale: u8 },
    Double,
    Char,
    Varchar,
    Date,
    Time,
    Timestamp,
    /// Object identifier of a class instance.
    Object,
    Collection {
        kind: CollectionKind,
        element: Box<Domain>,
    },
    Variable,
}

impl Domain {
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Domain::Char | Domain::Varchar)
    }

    #[inline]
    pub fn is_temporal(&self) -> bool {
        matches!(self, Domain::Date | Domain::Time | Domain::Timestamp)
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        matches!(self, Domain::Collection { .. })
    }

    /// True when the domain is not statically known.
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self, Domain::Variable)
    }

    fn numeric_rank(&self) -> Option<u8> {
        match self {
            Domain::Integer => Some(0),
            Domain::BigInt => Some(1),
            Domain::Numeric { .. } => Some(2),
            Domain::Double => Some(3),
            _ => None,
        }
    }

    /// The narrowest numeric domain able to hold both operands.
    ///
    /// `Null` defers to the other side. Returns `None` when either side is not
    /// numeric.
    pub fn common_numeric(left: &Domain, right: &Domain) -> Option<Domain> {
        match (left, right) {
            (Domain::Null, other) | (other, Domain::Null) if other.is_numeric() => {
                Some(other.clone())
            }
            (
                Domain::Numeric {
                    precision: lp,
                    scale: ls,
                },
                Domain::Numeric {
                    precision: rp,
                    scale: rs,
                },
            ) => {
                let scale = (*ls).max(*rs);
                let integral = lp.saturating_sub(*ls).max(rp.saturating_sub(*rs));
                Some(Domain::Numeric {
                    precision: integral.saturating_add(scale).min(38),
                    scale,
                })
            }
            _ => {
                let l = left.numeric_rank()?;
                let r = right.numeric_rank()?;
                Some(if l >= r { left.clone() } else { right.clone() })
            }
        }
    }

    /// Whether a value of `self` can be compared against a value of `other`
    /// without an explicit cast.
    pub fn is_comparable_with(&self, other: &Domain) -> bool {
        match (self, other) {
            (Domain::Null, _) | (_, Domain::Null) => true,
            (Domain::Variable, _) | (_, Domain::Variable) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (a, b) if a.is_string() && b.is_string() => true,
            (Domain::Collection { .. }, Domain::Collection { .. }) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Null => f.write_str("NULL"),
            Domain::Integer => f.write_str("INTEGER"),
            Domain::BigInt => f.write_str("BIGINT"),
            Domain::Numeric { precision, scale } => write!(f, "NUMERIC({precision},{scale})"),
            Domain::Double => f.write_str("DOUBLE"),
            Domain::Char => f.write_str("CHAR"),
            Domain::Varchar => f.write_str("VARCHAR"),
            Domain::Date => f.write_str("DATE"),
            Domain::Time => f.write_str("TIME"),
            Domain::Timestamp => f.write_str("TIMESTAMP"),
            Domain::Object => f.write_str("OBJECT"),
            Domain::Collection { kind, element } => write!(f, "{}({element})", kind.name()),
            Domain::Variable => f.write_str("?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_numeric_widens() {
        assert_eq!(
            Domain::common_numeric(&Domain::Integer, &Domain::BigInt),
            Some(Domain::BigInt)
        );
        assert_eq!(
            Domain::common_numeric(&Domain::Double, &Domain::Integer),
            Some(Domain::Double)
        );
        assert_eq!(
            Domain::common_numeric(&Domain::Null, &Domain::Integer),
            Some(Domain::Integer)
        );
        assert_eq!(Domain::common_numeric(&Domain::Varchar, &Domain::Integer), None);
    }

    #[test]
    fn numeric_precision_merges() {
        let left = Domain::Numeric {
            precision: 10,
            scale: 2,
        };
        let right = Domain::Numeric {
            precision: 6,
            scale: 4,
        };
        assert_eq!(
            Domain::common_numeric(&left, &right),
            Some(Domain::Numeric {
                precision: 12,
                scale: 4
            })
        );
    }

    #[test]
    fn comparability() {
        assert!(Domain::Char.is_comparable_with(&Domain::Varchar));
        assert!(Domain::Integer.is_comparable_with(&Domain::Double));
        assert!(!Domain::Date.is_comparable_with(&Domain::Varchar));
    }
}
