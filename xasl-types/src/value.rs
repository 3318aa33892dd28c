use std::fmt;

use crate::domain::{CollectionKind, Domain};

/// Object identifier of a class instance: volume, page and slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Oid {
    pub volume: i16,
    pub page: i32,
    pub slot: i16,
}

impl Oid {
    pub const NULL: Oid = Oid {
        volume: -1,
        page: -1,
        slot: -1,
    };

    pub const fn new(volume: i16, page: i32, slot: i16) -> Self {
        Self { volume, page, slot }
    }

    pub fn is_null(&self) -> bool {
        self.page < 0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}|{}|{}", self.page, self.slot, self.volume)
    }
}

/// A literal value carried by the parse tree or held in a constant regu
/// variable.
#[derive(Clone, Debug, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i32),
    BigInt(i64),
    Double(f64),
    /// Fixed-point value: `unscaled * 10^-scale`.
    Numeric { unscaled: i128, scale: u8 },
    String(String),
    /// Days since the epoch.
    Date(i32),
    /// Seconds since midnight.
    Time(u32),
    /// Seconds since the epoch.
    Timestamp(i64),
    Oid(Oid),
    Collection {
        kind: CollectionKind,
        elements: Vec<DbValue>,
    },
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// The domain implied by the value itself.
    pub fn domain(&self) -> Domain {
        match self {
            DbValue::Null => Domain::Null,
            DbValue::Integer(_) => Domain::Integer,
            DbValue::BigInt(_) => Domain::BigInt,
            DbValue::Double(_) => Domain::Double,
            DbValue::Numeric { unscaled, scale } => Domain::Numeric {
                precision: digits(*unscaled).max(*scale).min(38),
                scale: *scale,
            },
            DbValue::String(_) => Domain::Varchar,
            DbValue::Date(_) => Domain::Date,
            DbValue::Time(_) => Domain::Time,
            DbValue::Timestamp(_) => Domain::Timestamp,
            DbValue::Oid(_) => Domain::Object,
            DbValue::Collection { kind, elements } => {
                let mut element = Domain::Null;
                for value in elements {
                    let next = value.domain();
                    element = if element == Domain::Null || element == next {
                        next
                    } else {
                        Domain::common_numeric(&element, &next).unwrap_or(Domain::Variable)
                    };
                }
                Domain::Collection {
                    kind: *kind,
                    element: Box::new(element),
                }
            }
        }
    }

    /// Convert the value into `target` without losing information.
    ///
    /// Returns `None` when the conversion would truncate or the domains are
    /// unrelated. `Null` converts to every domain.
    pub fn coerce_to(&self, target: &Domain) -> Option<DbValue> {
        if self.is_null() || target.is_variable() {
            return Some(self.clone());
        }
        match (self, target) {
            (DbValue::Integer(v), Domain::Integer) => Some(DbValue::Integer(*v)),
            (DbValue::Integer(v), Domain::BigInt) => Some(DbValue::BigInt(i64::from(*v))),
            (DbValue::Integer(v), Domain::Double) => Some(DbValue::Double(f64::from(*v))),
            (DbValue::Integer(v), Domain::Numeric { scale, .. }) => {
                scaled(i128::from(*v), *scale)
            }
            (DbValue::BigInt(v), Domain::Integer) => {
                i32::try_from(*v).ok().map(DbValue::Integer)
            }
            (DbValue::BigInt(v), Domain::BigInt) => Some(DbValue::BigInt(*v)),
            (DbValue::BigInt(v), Domain::Double) => Some(DbValue::Double(*v as f64)),
            (DbValue::BigInt(v), Domain::Numeric { scale, .. }) => scaled(i128::from(*v), *scale),
            (DbValue::Double(v), Domain::Double) => Some(DbValue::Double(*v)),
            (DbValue::Double(v), Domain::Integer) if v.fract() == 0.0 => {
                let as_int = *v as i64;
                i32::try_from(as_int).ok().map(DbValue::Integer)
            }
            (DbValue::Double(v), Domain::BigInt) if v.fract() == 0.0 => {
                Some(DbValue::BigInt(*v as i64))
            }
            (DbValue::Numeric { unscaled, scale }, Domain::Numeric { scale: target, .. }) => {
                rescale(*unscaled, *scale, *target)
            }
            (DbValue::Numeric { unscaled, scale }, Domain::Double) => Some(DbValue::Double(
                *unscaled as f64 / 10f64.powi(i32::from(*scale)),
            )),
            (DbValue::Numeric { unscaled, scale }, Domain::Integer | Domain::BigInt) => {
                let DbValue::Numeric { unscaled, .. } = rescale(*unscaled, *scale, 0)? else {
                    return None;
                };
                let value = i64::try_from(unscaled).ok()?;
                DbValue::BigInt(value).coerce_to(target)
            }
            (DbValue::String(s), Domain::Char | Domain::Varchar) => {
                Some(DbValue::String(s.clone()))
            }
            (DbValue::Date(d), Domain::Date) => Some(DbValue::Date(*d)),
            (DbValue::Date(d), Domain::Timestamp) => {
                Some(DbValue::Timestamp(i64::from(*d) * 86_400))
            }
            (DbValue::Time(t), Domain::Time) => Some(DbValue::Time(*t)),
            (DbValue::Timestamp(t), Domain::Timestamp) => Some(DbValue::Timestamp(*t)),
            (DbValue::Oid(oid), Domain::Object) => Some(DbValue::Oid(*oid)),
            (DbValue::Collection { elements, .. }, Domain::Collection { kind, element }) => {
                let elements = elements
                    .iter()
                    .map(|value| value.coerce_to(element))
                    .collect::<Option<Vec<_>>>()?;
                Some(DbValue::Collection {
                    kind: *kind,
                    elements,
                })
            }
            _ => None,
        }
    }
}

fn digits(mut value: i128) -> u8 {
    let mut count = 1u8;
    value = value.abs();
    while value >= 10 {
        value /= 10;
        count = count.saturating_add(1);
    }
    count
}

fn scaled(value: i128, scale: u8) -> Option<DbValue> {
    let factor = 10i128.checked_pow(u32::from(scale))?;
    Some(DbValue::Numeric {
        unscaled: value.checked_mul(factor)?,
        scale,
    })
}

fn rescale(unscaled: i128, from: u8, to: u8) -> Option<DbValue> {
    if to >= from {
        let factor = 10i128.checked_pow(u32::from(to - from))?;
        return Some(DbValue::Numeric {
            unscaled: unscaled.checked_mul(factor)?,
            scale: to,
        });
    }
    let factor = 10i128.checked_pow(u32::from(from - to))?;
    if unscaled % factor != 0 {
        return None;
    }
    Some(DbValue::Numeric {
        unscaled: unscaled / factor,
        scale: to,
    })
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => f.write_str("NULL"),
            DbValue::Integer(v) => write!(f, "{v}"),
            DbValue::BigInt(v) => write!(f, "{v}"),
            DbValue::Double(v) => write!(f, "{v:?}"),
            DbValue::Numeric { unscaled, scale } => {
                if *scale == 0 {
                    return write!(f, "{unscaled}");
                }
                let factor = 10i128.pow(u32::from(*scale));
                let sign = if *unscaled < 0 { "-" } else { "" };
                let abs = unscaled.abs();
                write!(
                    f,
                    "{sign}{}.{:0width$}",
                    abs / factor,
                    abs % factor,
                    width = usize::from(*scale)
                )
            }
            DbValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            DbValue::Date(d) => write!(f, "DATE({d})"),
            DbValue::Time(t) => write!(f, "TIME({t})"),
            DbValue::Timestamp(t) => write!(f, "TIMESTAMP({t})"),
            DbValue::Oid(oid) => write!(f, "{oid}"),
            DbValue::Collection { kind, elements } => {
                write!(f, "{}{{", kind.name())?;
                for (i, value) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Integer(value)
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::BigInt(value)
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Double(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::String(value.to_string())
    }
}

impl From<Oid> for DbValue {
    fn from(value: Oid) -> Self {
        DbValue::Oid(value)
    }
}
