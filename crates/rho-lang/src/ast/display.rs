use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ast::node::{Node, Operand, RangeEndpoint, StrExpr, VecRhs};
use crate::ops::BinaryOp;

// Rendering is fully parenthesized so that re-parsing the text yields a
// tree with identical evaluation order, regardless of the precedence the
// original source relied on.

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(n) => write!(f, "{}", n),
            Operand::Var(var) => write!(f, "{}", var.name()),
            Operand::Expr(node) => write!(f, "{}", node),
        }
    }
}

impl Display for RangeEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RangeEndpoint::Const(i) => write!(f, "{}", i),
            RangeEndpoint::Expr(node) => write!(f, "{}", node),
            RangeEndpoint::Open => Ok(()),
        }
    }
}

impl Display for StrExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StrExpr::Lit(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    match c {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        _ => write!(f, "{}", c)?,
                    }
                }
                f.write_str("'")
            }
            StrExpr::Var(var) => write!(f, "{}", var.name()),
            StrExpr::Concat(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            StrExpr::Slice { base, range, .. } => {
                write!(f, "{}[{}:{}]", base, range.start, range.end)
            }
        }
    }
}

fn compound(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+=",
        BinaryOp::Sub => "-=",
        BinaryOp::Mul => "*=",
        BinaryOp::Div => "/=",
        BinaryOp::Mod => "%=",
        // Only the five arithmetic operators have compound spellings.
        _ => ":=",
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Const(n) => write!(f, "{}", n),
            Node::Var(var) => write!(f, "{}", var.name()),
            Node::VecRef(name, _) => write!(f, "{}", name),
            Node::Str(se) => write!(f, "{}", se),
            Node::Unary { op, child } => match op.function_name() {
                Some(name) => write!(f, "{}({})", name, child),
                None if *op == crate::ops::UnaryOp::Not => write!(f, "(not {})", child),
                None => write!(f, "(-{})", child),
            },
            Node::UnaryVar { op, child } => match op.function_name() {
                Some(name) => write!(f, "{}({})", name, child.name()),
                None if *op == crate::ops::UnaryOp::Not => write!(f, "(not {})", child.name()),
                None => write!(f, "(-{})", child.name()),
            },
            Node::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Node::BinaryVV { op, lhs, rhs } => {
                write!(f, "({} {} {})", lhs.name(), op, rhs.name())
            }
            Node::BinaryVC { op, lhs, rhs } => write!(f, "({} {} {})", lhs.name(), op, rhs),
            Node::BinaryCV { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs.name()),
            Node::BinaryVN { op, lhs, rhs } => write!(f, "({} {} {})", lhs.name(), op, rhs),
            Node::BinaryNV { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs.name()),
            Node::BinaryCN { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Node::BinaryNC { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Node::FusedLeft {
                outer,
                inner,
                a,
                b,
                c,
            } => write!(f, "(({} {} {}) {} {})", a, inner, b, outer, c),
            Node::FusedRight {
                outer,
                inner,
                a,
                b,
                c,
            } => write!(f, "({} {} ({} {} {}))", a, outer, b, inner, c),
            Node::FusedQuad {
                outer,
                left,
                right,
                a,
                b,
                c,
                d,
            } => write!(
                f,
                "(({} {} {}) {} ({} {} {}))",
                a, left, b, outer, c, right, d
            ),
            Node::AxnB { a, x, n, b } => {
                write!(f, "(({} * ({} ^ {})) + {})", a, x.name(), n, b)
            }
            Node::VecElem { name, index, .. } => write!(f, "{}[{}]", name, index),
            Node::Agg { op, name, .. } => write!(f, "{}({})", op.function_name(), name),
            Node::StrCompare { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Node::Call { entry, args } => {
                write!(f, "{}({})", entry.name, args.iter().format(", "))
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "if ({}) {}", cond, then)?;
                if let Some(node) = otherwise {
                    write!(f, " else {}", node)?;
                }
                Ok(())
            }
            Node::Switch { arms, default } => {
                f.write_str("switch { ")?;
                for (cond, value) in arms {
                    write!(f, "case {} : {}; ", cond, value)?;
                }
                if let Some(node) = default {
                    write!(f, "default : {}; ", node)?;
                }
                f.write_str("}")
            }
            Node::While { cond, body, .. } => write!(f, "while ({}) {}", cond, body),
            Node::RepeatUntil { body, cond, .. } => {
                write!(f, "repeat {} until ({})", body, cond)
            }
            Node::For {
                init,
                cond,
                incr,
                body,
                ..
            } => {
                f.write_str("for (")?;
                if let Some(node) = init {
                    write!(f, "{}", node)?;
                }
                f.write_str("; ")?;
                if let Some(node) = cond {
                    write!(f, "{}", node)?;
                }
                f.write_str("; ")?;
                if let Some(node) = incr {
                    write!(f, "{}", node)?;
                }
                write!(f, ") {}", body)
            }
            Node::Block(nodes) => {
                f.write_str("{ ")?;
                for node in nodes {
                    write!(f, "{}; ", node)?;
                }
                f.write_str("}")
            }
            Node::Break(value) => match value {
                Some(node) => write!(f, "break[{}]", node),
                None => f.write_str("break"),
            },
            Node::Continue => f.write_str("continue"),
            Node::Return { args, .. } => {
                write!(f, "return [{}]", args.iter().format(", "))
            }
            Node::Assign { target, rhs } => write!(f, "({} := {})", target.name(), rhs),
            Node::OpAssign { op, target, rhs } => {
                write!(f, "({} {} {})", target.name(), compound(*op), rhs)
            }
            Node::VecElemAssign {
                name,
                index,
                op,
                rhs,
                ..
            } => match op {
                Some(op) => write!(f, "({}[{}] {} {})", name, index, compound(*op), rhs),
                None => write!(f, "({}[{}] := {})", name, index, rhs),
            },
            Node::VecAssign { name, rhs, .. } => match rhs {
                VecRhs::Vector(other, _) => write!(f, "({} := {})", name, other),
                VecRhs::VectorOp(op, other, _) => {
                    write!(f, "({} {} {})", name, compound(*op), other)
                }
                VecRhs::Scalar(node) => write!(f, "({} := {})", name, node),
                VecRhs::ScalarOp(op, node) => {
                    write!(f, "({} {} {})", name, compound(*op), node)
                }
                VecRhs::List(nodes) => {
                    write!(f, "({} := {{{}}})", name, nodes.iter().format(", "))
                }
            },
            Node::StrAssign { target, rhs } => write!(f, "({} := {})", target.name(), rhs),
            Node::Swap { a, b } => write!(f, "({} <=> {})", a.name(), b.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::ops::{BinaryOp, UnaryOp};
    use crate::symbol_table::ScalarRef;

    fn c(v: f64) -> Box<Node> {
        Box::new(Node::Const(Number::new(v)))
    }

    #[test]
    fn test_binary_is_parenthesized() {
        let tree = Node::Binary {
            op: BinaryOp::Add,
            lhs: c(1.0),
            rhs: Box::new(Node::Binary {
                op: BinaryOp::Mul,
                lhs: c(2.0),
                rhs: c(3.0),
            }),
        };
        assert_eq!(tree.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn test_unary_spellings() {
        let neg = Node::Unary {
            op: UnaryOp::Neg,
            child: c(2.0),
        };
        assert_eq!(neg.to_string(), "(-2)");
        let sqrt = Node::Unary {
            op: UnaryOp::Sqrt,
            child: c(9.0),
        };
        assert_eq!(sqrt.to_string(), "sqrt(9)");
    }

    #[test]
    fn test_fused_shapes_render_expanded() {
        let x = ScalarRef::new("x", Number::new(2.0));
        let tree = Node::AxnB {
            a: Operand::Const(Number::new(3.0)),
            x: x.clone(),
            n: Number::new(2.0),
            b: Operand::Const(Number::new(1.0)),
        };
        assert_eq!(tree.to_string(), "((3 * (x ^ 2)) + 1)");

        let fused = Node::FusedLeft {
            outer: BinaryOp::Add,
            inner: BinaryOp::Mul,
            a: Operand::Var(x.clone()),
            b: Operand::Const(Number::new(4.0)),
            c: Operand::Var(x),
        };
        assert_eq!(fused.to_string(), "((x * 4) + x)");
    }

    #[test]
    fn test_string_literal_escaping() {
        let se = StrExpr::Lit("a'b\\c".to_string());
        assert_eq!(se.to_string(), "'a\\'b\\\\c'");
    }

    #[test]
    fn test_control_flow_rendering() {
        let tree = Node::If {
            cond: Box::new(Node::Binary {
                op: BinaryOp::Lt,
                lhs: c(1.0),
                rhs: c(2.0),
            }),
            then: c(10.0),
            otherwise: Some(c(20.0)),
        };
        assert_eq!(tree.to_string(), "if ((1 < 2)) 10 else 20");
    }

    #[test]
    fn test_assignment_rendering() {
        let x = ScalarRef::new("x", Number::new(0.0));
        let tree = Node::OpAssign {
            op: BinaryOp::Add,
            target: x,
            rhs: c(1.0),
        };
        assert_eq!(tree.to_string(), "(x += 1)");
    }
}
