use crate::ast::node::{Node, Operand};
use crate::number;
use crate::ops::{BinaryOp, UnaryOp};

/// Builds nodes for the parser, picking the most compact shape that keeps
/// the semantics of the generic construction.
///
/// Synthesis runs bottom-up as the parser reduces, so by the time an
/// operator application reaches [`Synthesizer::binary`] its operands have
/// already been folded and specialized. Every rewrite here is
/// behavior-preserving: constant folding applies the same operator code
/// evaluation would, identity reductions only drop effect-free
/// sub-expressions, and fused shapes evaluate their operands in the same
/// left-to-right order as the nested nodes they replace. Rewrites that
/// would reorder operands require every reordered operand to be
/// effect-free.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer {
    enabled: bool,
}

impl Synthesizer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn unary(&self, op: UnaryOp, child: Node) -> Node {
        if !self.enabled {
            return Node::Unary {
                op,
                child: Box::new(child),
            };
        }
        match child {
            Node::Const(v) => Node::Const(op.apply(v)),
            Node::Var(var) => Node::UnaryVar { op, child: var },
            other => Node::Unary {
                op,
                child: Box::new(other),
            },
        }
    }

    pub fn binary(&self, op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        if !self.enabled {
            return Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        if let (Node::Const(a), Node::Const(b)) = (&lhs, &rhs) {
            return Node::Const(op.apply(*a, *b));
        }
        let (lhs, rhs) = match reduce_identity(op, lhs, rhs) {
            Ok(node) => return node,
            Err(operands) => operands,
        };
        let (lhs, rhs) = if op == BinaryOp::Add {
            match try_axnb(lhs, rhs) {
                Ok(node) => return node,
                Err(operands) => operands,
            }
        } else {
            (lhs, rhs)
        };
        if is_fusable(op) {
            return match (decompose(lhs), decompose(rhs)) {
                (Ok((left, a, b)), Ok((right, c, d))) => Node::FusedQuad {
                    outer: op,
                    left,
                    right,
                    a,
                    b,
                    c,
                    d,
                },
                (Ok((inner, a, b)), Err(rhs)) => Node::FusedLeft {
                    outer: op,
                    inner,
                    a,
                    b,
                    c: Operand::from_node(rhs),
                },
                (Err(lhs), Ok((inner, b, c))) => Node::FusedRight {
                    outer: op,
                    inner,
                    a: Operand::from_node(lhs),
                    b,
                    c,
                },
                (Err(lhs), Err(rhs)) => classify(op, lhs, rhs),
            };
        }
        classify(op, lhs, rhs)
    }

    /// `cond ? then : otherwise` and the statement form of `if`. A missing
    /// else-branch yields quiet NaN when the condition is false.
    pub fn conditional(&self, cond: Node, then: Node, otherwise: Option<Node>) -> Node {
        if self.enabled {
            if let Node::Const(v) = cond {
                return if v.is_true() {
                    if let Some(node) = otherwise {
                        crate::ast::dispose::dispose(node);
                    }
                    then
                } else {
                    match otherwise {
                        Some(node) => {
                            crate::ast::dispose::dispose(then);
                            node
                        }
                        None => {
                            crate::ast::dispose::dispose(then);
                            Node::Const(number::NAN)
                        }
                    }
                };
            }
        }
        Node::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(true)
    }
}

fn is_const(node: &Node, value: f64) -> bool {
    matches!(node, Node::Const(v) if v.value() == value)
}

/// Drops neutral operands. Reductions that discard a live sub-expression
/// (`x ^ 0`) require it to be effect-free.
fn reduce_identity(op: BinaryOp, lhs: Node, rhs: Node) -> Result<Node, (Node, Node)> {
    match op {
        BinaryOp::Add => {
            // Not IEEE-exact for a -0.0 operand: the unreduced sum yields
            // +0.0 while the reduced form keeps -0.0. Division by the
            // result can tell the two apart.
            if is_const(&rhs, 0.0) {
                return Ok(lhs);
            }
            if is_const(&lhs, 0.0) {
                return Ok(rhs);
            }
        }
        BinaryOp::Sub => {
            if is_const(&rhs, 0.0) {
                return Ok(lhs);
            }
        }
        BinaryOp::Mul => {
            if is_const(&rhs, 1.0) {
                return Ok(lhs);
            }
            if is_const(&lhs, 1.0) {
                return Ok(rhs);
            }
        }
        BinaryOp::Div => {
            if is_const(&rhs, 1.0) {
                return Ok(lhs);
            }
        }
        BinaryOp::Pow => {
            if is_const(&rhs, 1.0) {
                return Ok(lhs);
            }
            // powf(x, 0) is 1 for every x, NaN and infinities included.
            if is_const(&rhs, 0.0) && !lhs.has_side_effects() {
                crate::ast::dispose::dispose(lhs);
                return Ok(Node::Const(number::TRUE));
            }
        }
        _ => {}
    }
    Err((lhs, rhs))
}

fn is_fusable(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Pow
    )
}

/// Splits a two-operand arithmetic node back into its operator and operand
/// slots so a parent application can absorb it. Returns the node unchanged
/// when it does not have exactly two operand slots.
fn decompose(node: Node) -> Result<(BinaryOp, Operand, Operand), Node> {
    match node {
        Node::Binary { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::from_node(*lhs), Operand::from_node(*rhs)))
        }
        Node::BinaryVV { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::Var(lhs), Operand::Var(rhs)))
        }
        Node::BinaryVC { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::Var(lhs), Operand::Const(rhs)))
        }
        Node::BinaryCV { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::Const(lhs), Operand::Var(rhs)))
        }
        Node::BinaryVN { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::Var(lhs), Operand::from_node(*rhs)))
        }
        Node::BinaryNV { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::from_node(*lhs), Operand::Var(rhs)))
        }
        Node::BinaryCN { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::Const(lhs), Operand::from_node(*rhs)))
        }
        Node::BinaryNC { op, lhs, rhs } if is_fusable(op) => {
            Ok((op, Operand::from_node(*lhs), Operand::Const(rhs)))
        }
        other => Err(other),
    }
}

/// Recognizes `a * x ^ n + b`. By the time `+` is applied the left factor
/// has already fused into `a * (x ^ n)`, so the pattern is a single
/// [`Node::FusedRight`] on either side of the addition.
fn try_axnb(lhs: Node, rhs: Node) -> Result<Node, (Node, Node)> {
    fn axn(node: &Node) -> bool {
        matches!(
            node,
            Node::FusedRight {
                outer: BinaryOp::Mul,
                inner: BinaryOp::Pow,
                b: Operand::Var(_),
                c: Operand::Const(_),
                ..
            }
        )
    }

    fn build(axn: Node, b: Node) -> Node {
        match axn {
            Node::FusedRight {
                a,
                b: Operand::Var(x),
                c: Operand::Const(n),
                ..
            } => Node::AxnB {
                a,
                x,
                n,
                b: Operand::from_node(b),
            },
            _ => unreachable!("caller checked the shape"),
        }
    }

    if axn(&lhs) {
        Ok(build(lhs, rhs))
    } else if axn(&rhs) && !lhs.has_side_effects() && !rhs.has_side_effects() {
        // The closed form evaluates a and x before b, so commuting the
        // addends is only valid when neither side writes storage.
        Ok(build(rhs, lhs))
    } else {
        Err((lhs, rhs))
    }
}

fn classify(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
    match (lhs, rhs) {
        (Node::Var(lhs), Node::Var(rhs)) => Node::BinaryVV { op, lhs, rhs },
        (Node::Var(lhs), Node::Const(rhs)) => Node::BinaryVC { op, lhs, rhs },
        (Node::Const(lhs), Node::Var(rhs)) => Node::BinaryCV { op, lhs, rhs },
        (Node::Var(lhs), rhs) => Node::BinaryVN {
            op,
            lhs,
            rhs: Box::new(rhs),
        },
        (lhs, Node::Var(rhs)) => Node::BinaryNV {
            op,
            lhs: Box::new(lhs),
            rhs,
        },
        (Node::Const(lhs), rhs) => Node::BinaryCN {
            op,
            lhs,
            rhs: Box::new(rhs),
        },
        (lhs, Node::Const(rhs)) => Node::BinaryNC {
            op,
            lhs: Box::new(lhs),
            rhs,
        },
        (lhs, rhs) => Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}
