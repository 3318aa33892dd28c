//! SQL-like rendering of input trees, used in diagnostics and debug logs.

use std::fmt;

use crate::expr::{
    AggregateFunc, ArithOp, CompareOp, Conjunct, Expr, ExprKind, Function, PseudoColumn,
    Quantifier, RangeOp, SetQuantifier, UnaryOp,
};
use crate::statement::{Query, SelectBlock, SetOpKind};

impl ArithOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Concat => "||",
        }
    }
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::NullSafeEq => "<=>",
        }
    }
}

impl Function {
    pub fn as_str(self) -> &'static str {
        match self {
            Function::Abs => "ABS",
            Function::Round => "ROUND",
            Function::Floor => "FLOOR",
            Function::Ceil => "CEIL",
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::CharLength => "CHAR_LENGTH",
            Function::Substring => "SUBSTRING",
            Function::Coalesce => "COALESCE",
            Function::Nvl => "NVL",
        }
    }
}

impl AggregateFunc {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunc::CountStar | AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

impl PseudoColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            PseudoColumn::InstNum => "INST_NUM()",
            PseudoColumn::OrderByNum => "ORDERBY_NUM()",
            PseudoColumn::GroupByNum => "GROUPBY_NUM()",
            PseudoColumn::Level => "LEVEL",
            PseudoColumn::ConnectByIsLeaf => "CONNECT_BY_ISLEAF",
            PseudoColumn::ConnectByIsCycle => "CONNECT_BY_ISCYCLE",
        }
    }
}

impl SetOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SetOpKind::Union => "UNION",
            SetOpKind::Difference => "DIFFERENCE",
            SetOpKind::Intersection => "INTERSECTION",
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(value) => write!(f, "{value}"),
            ExprKind::Name(name) => write!(f, "s{}.{}", name.spec.raw(), name.name),
            ExprKind::Pseudo(p) => f.write_str(p.as_str()),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => write!(f, "-({operand})"),
            ExprKind::Arith { op, left, right } => write!(f, "({left} {} {right})", op.as_str()),
            ExprKind::Function { func, args } => {
                write!(f, "{}(", func.as_str())?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            ExprKind::Cast { operand, target } => write!(f, "CAST({operand} AS {target})"),
            ExprKind::Aggregate(call) => {
                if call.func == AggregateFunc::CountStar {
                    return f.write_str("COUNT(*)");
                }
                write!(f, "{}(", call.func.as_str())?;
                if call.quantifier == SetQuantifier::Distinct {
                    f.write_str("DISTINCT ")?;
                }
                if let Some(arg) = &call.arg {
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ExprKind::Subquery(query) => write!(f, "({query})"),
            ExprKind::SetLiteral { kind, elements } => {
                write!(f, "{}{{", kind.name())?;
                write_list(f, elements, ", ")?;
                f.write_str("}")
            }
            ExprKind::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items, ", ")?;
                f.write_str(")")
            }
            ExprKind::Prior(operand) => write!(f, "PRIOR {operand}"),
            ExprKind::Compare { op, left, right } => write!(f, "{left} {} {right}", op.as_str()),
            ExprKind::Between {
                negated,
                operand,
                low,
                high,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} {not}BETWEEN {low} AND {high}")
            }
            ExprKind::Range { operand, ranges } => {
                write!(f, "{operand} RANGE (")?;
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let low = range.low.as_deref();
                    let high = range.high.as_deref();
                    match (range.op, low, high) {
                        (RangeOp::Eq, Some(v), _) => write!(f, "= {v}")?,
                        (RangeOp::Ge | RangeOp::Gt, Some(v), _) => {
                            let op = if range.op == RangeOp::Ge { ">=" } else { ">" };
                            write!(f, "{op} {v}")?
                        }
                        (RangeOp::Le | RangeOp::Lt, _, Some(v)) | (RangeOp::Le | RangeOp::Lt, Some(v), None) => {
                            let op = if range.op == RangeOp::Le { "<=" } else { "<" };
                            write!(f, "{op} {v}")?
                        }
                        (op, Some(lo), Some(hi)) => {
                            let (l, h) = match op {
                                RangeOp::GeLe => ("[", "]"),
                                RangeOp::GeLt => ("[", ")"),
                                RangeOp::GtLe => ("(", "]"),
                                _ => ("(", ")"),
                            };
                            write!(f, "{l}{lo}, {hi}{h}")?
                        }
                        _ => f.write_str("?")?,
                    }
                }
                f.write_str(")")
            }
            ExprKind::Like {
                negated,
                operand,
                pattern,
                escape,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} {not}LIKE {pattern}")?;
                if let Some(escape) = escape {
                    write!(f, " ESCAPE {escape}")?;
                }
                Ok(())
            }
            ExprKind::Quantified {
                op,
                quantifier,
                left,
                right,
            } => {
                let q = match quantifier {
                    Quantifier::Some => "SOME",
                    Quantifier::All => "ALL",
                };
                write!(f, "{left} {} {q} {right}", op.as_str())
            }
            ExprKind::IsNull { negated, operand } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} IS {not}NULL")
            }
            ExprKind::Exists(query) => write!(f, "EXISTS ({query})"),
            ExprKind::Not(operand) => write!(f, "NOT ({operand})"),
            ExprKind::And(terms) => {
                f.write_str("(")?;
                write_list(f, terms, " AND ")?;
                f.write_str(")")
            }
            ExprKind::Or(terms) => {
                f.write_str("(")?;
                write_list(f, terms, " OR ")?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.len() == 1 {
            return write!(f, "{}", self.terms[0]);
        }
        f.write_str("(")?;
        write_list(f, &self.terms, " OR ")?;
        f.write_str(")")
    }
}

fn write_conjuncts(f: &mut fmt::Formatter<'_>, conjuncts: &[Conjunct]) -> fmt::Result {
    for (i, c) in conjuncts.iter().enumerate() {
        if i > 0 {
            f.write_str(" AND ")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for SelectBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item.expr)?;
        }
        if !self.from.is_empty() {
            f.write_str(" FROM ")?;
            for (i, entry) in self.from.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} s{}", entry.display_name(), entry.spec.raw())?;
            }
        }
        if !self.where_clause.is_empty() {
            f.write_str(" WHERE ")?;
            write_conjuncts(f, &self.where_clause)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by, ", ")?;
        }
        if !self.having.is_empty() {
            f.write_str(" HAVING ")?;
            write_conjuncts(f, &self.having)?;
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Select(block) => write!(f, "{block}"),
            Query::SetOp(op) => {
                let all = if op.all { " ALL" } else { "" };
                write!(f, "{} {}{all} {}", op.left, op.op.as_str(), op.right)
            }
        }
    }
}
