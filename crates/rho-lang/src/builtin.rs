use crate::number::{self, Number};
use crate::ops::{BinaryOp, UnaryOp};
use crate::symbol_table::{Arity, FunctionEntry, FunctionKind, SymbolTable};
use smol_str::SmolStr;

/// Every one-argument builtin that specializes into a unary node.
pub(crate) const UNARY_FUNCTIONS: &[UnaryOp] = &[
    UnaryOp::Abs,
    UnaryOp::Sqrt,
    UnaryOp::Sin,
    UnaryOp::Cos,
    UnaryOp::Tan,
    UnaryOp::Asin,
    UnaryOp::Acos,
    UnaryOp::Atan,
    UnaryOp::Sinh,
    UnaryOp::Cosh,
    UnaryOp::Tanh,
    UnaryOp::Exp,
    UnaryOp::Ln,
    UnaryOp::Log10,
    UnaryOp::Log2,
    UnaryOp::Floor,
    UnaryOp::Ceil,
    UnaryOp::Round,
    UnaryOp::Trunc,
    UnaryOp::Frac,
    UnaryOp::Sign,
    UnaryOp::Deg2Rad,
    UnaryOp::Rad2Deg,
];

fn min(args: &[Number]) -> Number {
    args.iter().copied().fold(number::INFINITE, Number::min)
}

fn max(args: &[Number]) -> Number {
    args.iter().copied().fold(-number::INFINITE, Number::max)
}

fn sum(args: &[Number]) -> Number {
    args.iter().copied().fold(Number::default(), |a, b| a + b)
}

fn avg(args: &[Number]) -> Number {
    sum(args) / Number::from(args.len())
}

fn mul(args: &[Number]) -> Number {
    args.iter().copied().fold(number::TRUE, |a, b| a * b)
}

fn atan2(args: &[Number]) -> Number {
    Number::new(args[0].value().atan2(args[1].value()))
}

fn hypot(args: &[Number]) -> Number {
    Number::new(args[0].value().hypot(args[1].value()))
}

fn logn(args: &[Number]) -> Number {
    Number::new(args[0].value().log(args[1].value()))
}

fn root(args: &[Number]) -> Number {
    args[0].pow(number::TRUE / args[1])
}

fn clamp(args: &[Number]) -> Number {
    // clamp(low, value, high)
    args[1].max(args[0]).min(args[2])
}

fn inrange(args: &[Number]) -> Number {
    Number::from(args[0] <= args[1] && args[1] <= args[2])
}

/// Installs the builtin math library and standard constants into `table`.
pub(crate) fn install(table: &mut SymbolTable) {
    table.add_constant("pi", Number::new(std::f64::consts::PI));
    table.add_constant("e", Number::new(std::f64::consts::E));
    table.add_constant("inf", number::INFINITE);
    table.add_constant("nan", number::NAN);

    for op in UNARY_FUNCTIONS {
        let name = match op.function_name() {
            Some(name) => name,
            None => continue,
        };
        table.add_entry(FunctionEntry {
            name: SmolStr::new(name),
            arity: Arity::Exact(1),
            kind: FunctionKind::Unary(*op),
        });
    }

    table.add_entry(FunctionEntry {
        name: SmolStr::new("pow"),
        arity: Arity::Exact(2),
        kind: FunctionKind::Binary(BinaryOp::Pow),
    });
    table.add_entry(FunctionEntry {
        name: SmolStr::new("mod"),
        arity: Arity::Exact(2),
        kind: FunctionKind::Binary(BinaryOp::Mod),
    });

    let natives: &[(&str, Arity, fn(&[Number]) -> Number)] = &[
        ("min", Arity::AtLeast(1), min),
        ("max", Arity::AtLeast(1), max),
        ("sum", Arity::AtLeast(1), sum),
        ("avg", Arity::AtLeast(1), avg),
        ("mul", Arity::AtLeast(1), mul),
        ("atan2", Arity::Exact(2), atan2),
        ("hypot", Arity::Exact(2), hypot),
        ("logn", Arity::Exact(2), logn),
        ("root", Arity::Exact(2), root),
        ("clamp", Arity::Exact(3), clamp),
        ("inrange", Arity::Exact(3), inrange),
    ];
    for (name, arity, f) in natives {
        table.add_entry(FunctionEntry {
            name: SmolStr::new(name),
            arity: *arity,
            kind: FunctionKind::Native(*f),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn nums(values: &[f64]) -> Vec<Number> {
        values.iter().map(|v| Number::new(*v)).collect()
    }

    #[rstest]
    #[case(&[3.0, 1.0, 2.0], 1.0)]
    #[case(&[5.0], 5.0)]
    fn test_min(#[case] args: &[f64], #[case] expected: f64) {
        assert_eq!(min(&nums(args)), Number::new(expected));
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0, 4.0], 2.5)]
    fn test_avg(#[case] args: &[f64], #[case] expected: f64) {
        assert_eq!(avg(&nums(args)), Number::new(expected));
    }

    #[rstest]
    #[case(&[0.0, 5.0, 10.0], 5.0)]
    #[case(&[0.0, -5.0, 10.0], 0.0)]
    #[case(&[0.0, 15.0, 10.0], 10.0)]
    fn test_clamp(#[case] args: &[f64], #[case] expected: f64) {
        assert_eq!(clamp(&nums(args)), Number::new(expected));
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0], 1.0)]
    #[case(&[1.0, 5.0, 3.0], 0.0)]
    fn test_inrange(#[case] args: &[f64], #[case] expected: f64) {
        assert_eq!(inrange(&nums(args)), Number::new(expected));
    }

    #[test]
    fn test_root() {
        assert_eq!(
            root(&nums(&[27.0, 3.0])),
            Number::new(27f64.powf(1.0 / 3.0))
        );
    }
}
