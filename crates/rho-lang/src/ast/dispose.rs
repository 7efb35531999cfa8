use crate::ast::node::{Node, Operand, RangeEndpoint, StrExpr, VecRhs};

/// Owning handle for a compiled tree. Dropping the handle tears the tree
/// down with an explicit worklist, so trees of any depth are freed without
/// recursing.
///
/// [`Node`] itself has no `Drop` impl. That keeps variants destructurable
/// (the synthesizer takes nodes apart by value when it fuses them) and
/// leaves this handle as the single place disposal happens.
#[derive(Debug, Default)]
pub struct TreeHandle {
    root: Option<Node>,
}

impl TreeHandle {
    pub fn new(root: Node) -> Self {
        Self { root: Some(root) }
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Takes the tree back out of the handle, leaving it empty.
    pub fn take(&mut self) -> Option<Node> {
        self.root.take()
    }
}

impl Drop for TreeHandle {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            dispose(root);
        }
    }
}

/// Frees `node` and everything it owns iteratively. Shared handles
/// (variable storage, vector views, function entries, loop guards) are
/// only un-referenced, never freed here.
pub fn dispose(node: Node) {
    let mut nodes: Vec<Node> = vec![node];
    let mut strs: Vec<StrExpr> = Vec::new();

    while !nodes.is_empty() || !strs.is_empty() {
        if let Some(node) = nodes.pop() {
            drain_node(node, &mut nodes, &mut strs);
        }
        if let Some(se) = strs.pop() {
            drain_str(se, &mut nodes, &mut strs);
        }
    }
}

fn drain_operand(operand: Operand, nodes: &mut Vec<Node>) {
    if let Operand::Expr(node) = operand {
        nodes.push(*node);
    }
}

fn drain_endpoint(endpoint: RangeEndpoint, nodes: &mut Vec<Node>) {
    if let RangeEndpoint::Expr(node) = endpoint {
        nodes.push(*node);
    }
}

fn drain_str(se: StrExpr, nodes: &mut Vec<Node>, strs: &mut Vec<StrExpr>) {
    match se {
        StrExpr::Lit(_) | StrExpr::Var(_) => {}
        StrExpr::Concat(lhs, rhs) => {
            strs.push(*lhs);
            strs.push(*rhs);
        }
        StrExpr::Slice { base, range, .. } => {
            strs.push(*base);
            drain_endpoint(range.start, nodes);
            drain_endpoint(range.end, nodes);
        }
    }
}

fn drain_node(node: Node, nodes: &mut Vec<Node>, strs: &mut Vec<StrExpr>) {
    match node {
        Node::Const(_)
        | Node::Var(_)
        | Node::VecRef(_, _)
        | Node::UnaryVar { .. }
        | Node::BinaryVV { .. }
        | Node::BinaryVC { .. }
        | Node::BinaryCV { .. }
        | Node::Agg { .. }
        | Node::Continue
        | Node::Swap { .. } => {}
        Node::Str(se) => strs.push(se),
        Node::Unary { child, .. } => nodes.push(*child),
        Node::Binary { lhs, rhs, .. } => {
            nodes.push(*lhs);
            nodes.push(*rhs);
        }
        Node::BinaryVN { rhs, .. } | Node::BinaryCN { rhs, .. } => nodes.push(*rhs),
        Node::BinaryNV { lhs, .. } | Node::BinaryNC { lhs, .. } => nodes.push(*lhs),
        Node::FusedLeft { a, b, c, .. } | Node::FusedRight { a, b, c, .. } => {
            drain_operand(a, nodes);
            drain_operand(b, nodes);
            drain_operand(c, nodes);
        }
        Node::FusedQuad { a, b, c, d, .. } => {
            drain_operand(a, nodes);
            drain_operand(b, nodes);
            drain_operand(c, nodes);
            drain_operand(d, nodes);
        }
        Node::AxnB { a, b, .. } => {
            drain_operand(a, nodes);
            drain_operand(b, nodes);
        }
        Node::VecElem { index, .. } => nodes.push(*index),
        Node::StrCompare { lhs, rhs, .. } => {
            strs.push(lhs);
            strs.push(rhs);
        }
        Node::Call { args, .. } => nodes.extend(args),
        Node::If {
            cond,
            then,
            otherwise,
        } => {
            nodes.push(*cond);
            nodes.push(*then);
            if let Some(node) = otherwise {
                nodes.push(*node);
            }
        }
        Node::Switch { arms, default } => {
            for (cond, value) in arms {
                nodes.push(cond);
                nodes.push(value);
            }
            if let Some(node) = default {
                nodes.push(*node);
            }
        }
        Node::While { cond, body, .. } => {
            nodes.push(*cond);
            nodes.push(*body);
        }
        Node::RepeatUntil { body, cond, .. } => {
            nodes.push(*body);
            nodes.push(*cond);
        }
        Node::For {
            init,
            cond,
            incr,
            body,
            ..
        } => {
            for part in [init, cond, incr].into_iter().flatten() {
                nodes.push(*part);
            }
            nodes.push(*body);
        }
        Node::Block(children) => nodes.extend(children),
        Node::Break(value) => {
            if let Some(node) = value {
                nodes.push(*node);
            }
        }
        Node::Return { args, .. } => nodes.extend(args),
        Node::Assign { rhs, .. } | Node::OpAssign { rhs, .. } => nodes.push(*rhs),
        Node::VecElemAssign { index, rhs, .. } => {
            nodes.push(*index);
            nodes.push(*rhs);
        }
        Node::VecAssign { rhs, .. } => match rhs {
            VecRhs::Scalar(node) | VecRhs::ScalarOp(_, node) => nodes.push(*node),
            VecRhs::List(children) => nodes.extend(children),
            VecRhs::Vector(_, _) | VecRhs::VectorOp(_, _, _) => {}
        },
        Node::StrAssign { rhs, .. } => strs.push(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::ops::{BinaryOp, UnaryOp};
    use crate::symbol_table::ScalarRef;

    #[test]
    fn test_drop_handle_on_deep_tree() {
        let mut node = Node::Const(Number::new(0.0));
        for _ in 0..500_000 {
            node = Node::Unary {
                op: UnaryOp::Neg,
                child: Box::new(node),
            };
        }
        drop(TreeHandle::new(node));
    }

    #[test]
    fn test_shared_storage_survives_disposal() {
        let var = ScalarRef::new("x", Number::new(7.0));
        let tree = Node::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Node::Var(var.clone())),
            rhs: Box::new(Node::Var(var.clone())),
        };
        assert_eq!(var.handle_count(), 3);
        dispose(tree);
        assert_eq!(var.handle_count(), 1);
        assert_eq!(var.get(), Number::new(7.0));
    }

    #[test]
    fn test_take_prevents_double_disposal() {
        let mut handle = TreeHandle::new(Node::Const(Number::new(1.0)));
        let node = handle.take();
        assert!(node.is_some());
        assert!(handle.root().is_none());
        drop(handle);
    }
}
