use std::fmt;

/// Arithmetic operator of a binary expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }

    pub(crate) fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(BinOp::Add),
            '-' => Some(BinOp::Sub),
            '*' => Some(BinOp::Mul),
            '/' => Some(BinOp::Div),
            _ => None,
        }
    }

    /// Apply the operator with plain IEEE-754 semantics (`1/0` is `inf`).
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
        }
    }
}

/// A parsed sensor expression.
///
/// Names are the registry names as written by the user; nothing here is bound
/// yet. See `engine::compile` for turning an `Expr` into a `Sampler`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A callable used without parentheses, e.g. `pcpu` or `ncores`.
    Reference(String),
    /// A domain literal in an argument position, e.g. `physical` in `ncores(physical)`.
    Tag { domain: String, tag: String },
    Call { name: String, args: Vec<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { name: name.into(), args }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Expr::Reference(name.into())
    }
}

// Binary expressions are always parenthesized so the output shows how
// precedence was resolved: `1+2*3` displays as `(1 + (2 * 3))`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{value}"),
            Expr::Reference(name) => f.write_str(name),
            Expr::Tag { tag, .. } => f.write_str(tag),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_resolved_precedence() {
        let expr = Expr::binary(
            BinOp::Sub,
            Expr::binary(BinOp::Mul, Expr::Number(2.0), Expr::reference("ncores")),
            Expr::call("max", vec![Expr::Number(1.5), Expr::Number(-3.0)]),
        );
        assert_eq!(expr.to_string(), "((2 * ncores) - max(1.5, -3))");
    }

    #[test]
    fn division_by_zero_is_not_an_error() {
        assert_eq!(BinOp::Div.apply(1.0, 0.0), f64::INFINITY);
        assert!(BinOp::Div.apply(0.0, 0.0).is_nan());
    }
}
