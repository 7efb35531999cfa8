use std::fmt::{self, Display, Formatter};

use crate::number::{FALSE, NAN, Number, TRUE};

/// Single-operand operations, covering both operators (`-`, `not`) and the
/// one-argument builtin functions that specialize into unary nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Floor,
    Ceil,
    Round,
    Trunc,
    Frac,
    Sign,
    Deg2Rad,
    Rad2Deg,
}

impl UnaryOp {
    #[inline(always)]
    pub fn apply(&self, v: Number) -> Number {
        let x = v.value();
        match self {
            UnaryOp::Neg => -v,
            UnaryOp::Not => {
                if v.is_nan() {
                    NAN
                } else {
                    Number::from(!v.is_true())
                }
            }
            UnaryOp::Abs => v.abs(),
            UnaryOp::Sqrt => Number::new(x.sqrt()),
            UnaryOp::Sin => Number::new(x.sin()),
            UnaryOp::Cos => Number::new(x.cos()),
            UnaryOp::Tan => Number::new(x.tan()),
            UnaryOp::Asin => Number::new(x.asin()),
            UnaryOp::Acos => Number::new(x.acos()),
            UnaryOp::Atan => Number::new(x.atan()),
            UnaryOp::Sinh => Number::new(x.sinh()),
            UnaryOp::Cosh => Number::new(x.cosh()),
            UnaryOp::Tanh => Number::new(x.tanh()),
            UnaryOp::Exp => Number::new(x.exp()),
            UnaryOp::Ln => Number::new(x.ln()),
            UnaryOp::Log10 => Number::new(x.log10()),
            UnaryOp::Log2 => Number::new(x.log2()),
            UnaryOp::Floor => Number::new(x.floor()),
            UnaryOp::Ceil => Number::new(x.ceil()),
            UnaryOp::Round => Number::new(x.round()),
            UnaryOp::Trunc => Number::new(x.trunc()),
            UnaryOp::Frac => Number::new(x.fract()),
            UnaryOp::Sign => {
                if x.is_nan() {
                    NAN
                } else if x > 0.0 {
                    TRUE
                } else if x < 0.0 {
                    -TRUE
                } else {
                    FALSE
                }
            }
            UnaryOp::Deg2Rad => Number::new(x.to_radians()),
            UnaryOp::Rad2Deg => Number::new(x.to_degrees()),
        }
    }

    /// The builtin function name this operation answers to, or `None` for
    /// the two operator spellings.
    pub fn function_name(&self) -> Option<&'static str> {
        match self {
            UnaryOp::Neg | UnaryOp::Not => None,
            UnaryOp::Abs => Some("abs"),
            UnaryOp::Sqrt => Some("sqrt"),
            UnaryOp::Sin => Some("sin"),
            UnaryOp::Cos => Some("cos"),
            UnaryOp::Tan => Some("tan"),
            UnaryOp::Asin => Some("asin"),
            UnaryOp::Acos => Some("acos"),
            UnaryOp::Atan => Some("atan"),
            UnaryOp::Sinh => Some("sinh"),
            UnaryOp::Cosh => Some("cosh"),
            UnaryOp::Tanh => Some("tanh"),
            UnaryOp::Exp => Some("exp"),
            UnaryOp::Ln => Some("ln"),
            UnaryOp::Log10 => Some("log10"),
            UnaryOp::Log2 => Some("log2"),
            UnaryOp::Floor => Some("floor"),
            UnaryOp::Ceil => Some("ceil"),
            UnaryOp::Round => Some("round"),
            UnaryOp::Trunc => Some("trunc"),
            UnaryOp::Frac => Some("frac"),
            UnaryOp::Sign => Some("sign"),
            UnaryOp::Deg2Rad => Some("deg2rad"),
            UnaryOp::Rad2Deg => Some("rad2deg"),
        }
    }
}

/// Two-operand operations selected by the parser's precedence ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    Nand,
    Nor,
}

impl BinaryOp {
    #[inline(always)]
    pub fn apply(&self, lhs: Number, rhs: Number) -> Number {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Mod => lhs % rhs,
            BinaryOp::Pow => lhs.pow(rhs),
            BinaryOp::Lt => Number::from(lhs.value() < rhs.value()),
            BinaryOp::Lte => Number::from(lhs.value() <= rhs.value()),
            BinaryOp::Gt => Number::from(lhs.value() > rhs.value()),
            BinaryOp::Gte => Number::from(lhs.value() >= rhs.value()),
            BinaryOp::Eq => Number::from(lhs.value() == rhs.value()),
            BinaryOp::Ne => Number::from(lhs.value() != rhs.value()),
            BinaryOp::And => {
                if lhs.is_nan() || rhs.is_nan() {
                    NAN
                } else {
                    Number::from(lhs.is_true() && rhs.is_true())
                }
            }
            BinaryOp::Or => {
                if lhs.is_nan() || rhs.is_nan() {
                    NAN
                } else {
                    Number::from(lhs.is_true() || rhs.is_true())
                }
            }
            BinaryOp::Xor => {
                if lhs.is_nan() || rhs.is_nan() {
                    NAN
                } else {
                    Number::from(lhs.is_true() != rhs.is_true())
                }
            }
            BinaryOp::Nand => {
                if lhs.is_nan() || rhs.is_nan() {
                    NAN
                } else {
                    Number::from(!(lhs.is_true() && rhs.is_true()))
                }
            }
            BinaryOp::Nor => {
                if lhs.is_nan() || rhs.is_nan() {
                    NAN
                } else {
                    Number::from(!(lhs.is_true() || rhs.is_true()))
                }
            }
        }
    }

    /// Comparison outcome for operands that only expose an ordering
    /// (strings). Non-comparison operators yield NaN.
    pub fn apply_ordering(&self, ord: std::cmp::Ordering) -> Number {
        match self {
            BinaryOp::Lt => Number::from(ord.is_lt()),
            BinaryOp::Lte => Number::from(ord.is_le()),
            BinaryOp::Gt => Number::from(ord.is_gt()),
            BinaryOp::Gte => Number::from(ord.is_ge()),
            BinaryOp::Eq => Number::from(ord.is_eq()),
            BinaryOp::Ne => Number::from(ord.is_ne()),
            _ => NAN,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Nand => "nand",
            BinaryOp::Nor => "nor",
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.as_str())
    }
}

/// Reductions over a whole vector view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Avg,
    Min,
    Max,
    Prod,
}

impl AggOp {
    pub fn apply(&self, view: &crate::vector::VectorView) -> Number {
        if view.is_empty() {
            return NAN;
        }
        match self {
            AggOp::Sum => view.fold(Number::default(), |a, b| a + b),
            AggOp::Avg => {
                view.fold(Number::default(), |a, b| a + b) / Number::from(view.len())
            }
            AggOp::Min => view.fold(crate::number::INFINITE, Number::min),
            AggOp::Max => view.fold(-crate::number::INFINITE, Number::max),
            AggOp::Prod => view.fold(TRUE, |a, b| a * b),
        }
    }

    pub fn function_name(&self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Avg => "avg",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Prod => "mul",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BinaryOp::Add, 2.0, 3.0, 5.0)]
    #[case(BinaryOp::Sub, 2.0, 3.0, -1.0)]
    #[case(BinaryOp::Mul, 2.0, 3.0, 6.0)]
    #[case(BinaryOp::Div, 3.0, 2.0, 1.5)]
    #[case(BinaryOp::Mod, 7.0, 4.0, 3.0)]
    #[case(BinaryOp::Pow, 2.0, 3.0, 8.0)]
    #[case(BinaryOp::Lt, 1.0, 2.0, 1.0)]
    #[case(BinaryOp::Gte, 2.0, 2.0, 1.0)]
    #[case(BinaryOp::Eq, 2.0, 3.0, 0.0)]
    #[case(BinaryOp::Ne, 2.0, 3.0, 1.0)]
    #[case(BinaryOp::And, 1.0, 0.0, 0.0)]
    #[case(BinaryOp::Or, 1.0, 0.0, 1.0)]
    #[case(BinaryOp::Xor, 1.0, 1.0, 0.0)]
    #[case(BinaryOp::Nand, 1.0, 1.0, 0.0)]
    #[case(BinaryOp::Nor, 0.0, 0.0, 1.0)]
    fn test_binary_apply(
        #[case] op: BinaryOp,
        #[case] a: f64,
        #[case] b: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(
            op.apply(Number::new(a), Number::new(b)),
            Number::new(expected)
        );
    }

    #[rstest]
    #[case(UnaryOp::Neg, 2.0, -2.0)]
    #[case(UnaryOp::Not, 0.0, 1.0)]
    #[case(UnaryOp::Not, 3.0, 0.0)]
    #[case(UnaryOp::Abs, -4.0, 4.0)]
    #[case(UnaryOp::Sqrt, 9.0, 3.0)]
    #[case(UnaryOp::Floor, 1.7, 1.0)]
    #[case(UnaryOp::Sign, -3.0, -1.0)]
    #[case(UnaryOp::Frac, 1.25, 0.25)]
    fn test_unary_apply(#[case] op: UnaryOp, #[case] v: f64, #[case] expected: f64) {
        assert_eq!(op.apply(Number::new(v)), Number::new(expected));
    }

    #[test]
    fn test_logic_with_nan_is_nan() {
        assert!(BinaryOp::And.apply(NAN, TRUE).is_nan());
        assert!(UnaryOp::Not.apply(NAN).is_nan());
    }

    #[test]
    fn test_sqrt_of_negative_is_nan() {
        assert!(UnaryOp::Sqrt.apply(Number::new(-1.0)).is_nan());
    }
}
