use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::guard::LoopGuard;
use crate::number::Number;
use crate::ops::{AggOp, BinaryOp, UnaryOp};
use crate::symbol_table::{FunctionEntry, ScalarRef, StringRef};
use crate::vector::VectorView;
use crate::{Shared, SharedCell};

pub type GuardHandle = Shared<dyn LoopGuard>;

/// Values staged by a `return` statement, read back by the envelope after
/// the return signal unwinds out of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedResult {
    Number(Number),
    Str(String),
}

pub type ResultSlot = Shared<SharedCell<Vec<StagedResult>>>;

/// A leaf-classified operand slot inside a fused node: the three static
/// classifications the synthesizer distinguishes at parse time.
#[derive(Debug)]
pub enum Operand {
    Const(Number),
    Var(ScalarRef),
    Expr(Box<Node>),
}

impl Operand {
    pub fn from_node(node: Node) -> Self {
        match node {
            Node::Const(n) => Operand::Const(n),
            Node::Var(var) => Operand::Var(var),
            other => Operand::Expr(Box::new(other)),
        }
    }

    pub fn as_expr(&self) -> Option<&Node> {
        match self {
            Operand::Expr(node) => Some(node),
            _ => None,
        }
    }
}

/// One endpoint of a slice range: fixed at compile time or computed per
/// evaluation.
#[derive(Debug)]
pub enum RangeEndpoint {
    Const(usize),
    Expr(Box<Node>),
    /// Defaults to the start (resp. one past the end) of the sliced value.
    Open,
}

/// A `[start : end]` slice suffix, resolved against the target's length at
/// evaluation time. The end index is inclusive.
#[derive(Debug)]
pub struct IndexRange {
    pub start: RangeEndpoint,
    pub end: RangeEndpoint,
}

/// String-valued expression. String nodes evaluate to quiet NaN through the
/// numeric channel; their text is produced separately.
#[derive(Debug)]
pub enum StrExpr {
    Lit(String),
    Var(StringRef),
    Concat(Box<StrExpr>, Box<StrExpr>),
    Slice {
        base: Box<StrExpr>,
        range: IndexRange,
        check: bool,
    },
}

/// Right-hand side of a whole-vector assignment.
#[derive(Debug)]
pub enum VecRhs {
    /// `v := u` — reconcile sizes, then bulk copy.
    Vector(SmolStr, VectorView),
    /// `v ⊙= u` — reconcile sizes, then elementwise combine.
    VectorOp(BinaryOp, SmolStr, VectorView),
    /// `v := expr` — broadcast fill.
    Scalar(Box<Node>),
    /// `v ⊙= expr` — elementwise against a scalar.
    ScalarOp(BinaryOp, Box<Node>),
    /// `v := {e, e, ...}` — elementwise initializer, clamped to the view.
    List(Vec<Node>),
}

/// The universal unit of a compiled expression.
///
/// The set of shapes is closed: generic n-ary nodes plus the compact
/// specialized shapes the synthesizer selects for common operand patterns.
/// Specialized shapes are pure optimizations; each is semantically identical
/// to the generic construction it replaces.
///
/// Children are stored either as owned `Box<Node>` edges (synthesized
/// sub-expressions, freed exactly once with the tree) or as shared handles
/// into symbol-table storage (never freed by the tree).
#[derive(Debug)]
pub enum Node {
    // ---- leaves ----
    Const(Number),
    Var(ScalarRef),
    VecRef(SmolStr, VectorView),
    Str(StrExpr),

    // ---- generic operator applications ----
    Unary {
        op: UnaryOp,
        child: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },

    // ---- specialized shapes (selected by the synthesizer) ----
    UnaryVar {
        op: UnaryOp,
        child: ScalarRef,
    },
    BinaryVV {
        op: BinaryOp,
        lhs: ScalarRef,
        rhs: ScalarRef,
    },
    BinaryVC {
        op: BinaryOp,
        lhs: ScalarRef,
        rhs: Number,
    },
    BinaryCV {
        op: BinaryOp,
        lhs: Number,
        rhs: ScalarRef,
    },
    BinaryVN {
        op: BinaryOp,
        lhs: ScalarRef,
        rhs: Box<Node>,
    },
    BinaryNV {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: ScalarRef,
    },
    BinaryCN {
        op: BinaryOp,
        lhs: Number,
        rhs: Box<Node>,
    },
    BinaryNC {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Number,
    },
    /// `(a inner b) outer c`
    FusedLeft {
        outer: BinaryOp,
        inner: BinaryOp,
        a: Operand,
        b: Operand,
        c: Operand,
    },
    /// `a outer (b inner c)`
    FusedRight {
        outer: BinaryOp,
        inner: BinaryOp,
        a: Operand,
        b: Operand,
        c: Operand,
    },
    /// `(a left b) outer (c right d)`
    FusedQuad {
        outer: BinaryOp,
        left: BinaryOp,
        right: BinaryOp,
        a: Operand,
        b: Operand,
        c: Operand,
        d: Operand,
    },
    /// Closed form `a * x^n + b`.
    AxnB {
        a: Operand,
        x: ScalarRef,
        n: Number,
        b: Operand,
    },

    // ---- vector / string operations ----
    VecElem {
        name: SmolStr,
        view: VectorView,
        index: Box<Node>,
        check: bool,
    },
    Agg {
        op: AggOp,
        name: SmolStr,
        view: VectorView,
    },
    StrCompare {
        op: BinaryOp,
        lhs: StrExpr,
        rhs: StrExpr,
    },

    // ---- calls ----
    Call {
        entry: Shared<FunctionEntry>,
        args: Vec<Node>,
    },

    // ---- control flow ----
    If {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    Switch {
        arms: Vec<(Node, Node)>,
        default: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
        guard: Option<GuardHandle>,
    },
    RepeatUntil {
        body: Box<Node>,
        cond: Box<Node>,
        guard: Option<GuardHandle>,
    },
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        incr: Option<Box<Node>>,
        body: Box<Node>,
        guard: Option<GuardHandle>,
    },
    Block(Vec<Node>),
    Break(Option<Box<Node>>),
    Continue,
    Return {
        args: Vec<Node>,
        slot: ResultSlot,
    },

    // ---- binding forms ----
    Assign {
        target: ScalarRef,
        rhs: Box<Node>,
    },
    OpAssign {
        op: BinaryOp,
        target: ScalarRef,
        rhs: Box<Node>,
    },
    VecElemAssign {
        name: SmolStr,
        view: VectorView,
        index: Box<Node>,
        op: Option<BinaryOp>,
        rhs: Box<Node>,
        check: bool,
    },
    VecAssign {
        name: SmolStr,
        target: VectorView,
        rhs: VecRhs,
    },
    StrAssign {
        target: StringRef,
        rhs: StrExpr,
    },
    Swap {
        a: ScalarRef,
        b: ScalarRef,
    },
}

/// Discriminant tag for [`Node`], used by traversals and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Const,
    Var,
    VecRef,
    Str,
    Unary,
    Binary,
    UnaryVar,
    BinaryVV,
    BinaryVC,
    BinaryCV,
    BinaryVN,
    BinaryNV,
    BinaryCN,
    BinaryNC,
    FusedLeft,
    FusedRight,
    FusedQuad,
    AxnB,
    VecElem,
    Agg,
    StrCompare,
    Call,
    If,
    Switch,
    While,
    RepeatUntil,
    For,
    Block,
    Break,
    Continue,
    Return,
    Assign,
    OpAssign,
    VecElemAssign,
    VecAssign,
    StrAssign,
    Swap,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Const(_) => NodeKind::Const,
            Node::Var(_) => NodeKind::Var,
            Node::VecRef(_, _) => NodeKind::VecRef,
            Node::Str(_) => NodeKind::Str,
            Node::Unary { .. } => NodeKind::Unary,
            Node::Binary { .. } => NodeKind::Binary,
            Node::UnaryVar { .. } => NodeKind::UnaryVar,
            Node::BinaryVV { .. } => NodeKind::BinaryVV,
            Node::BinaryVC { .. } => NodeKind::BinaryVC,
            Node::BinaryCV { .. } => NodeKind::BinaryCV,
            Node::BinaryVN { .. } => NodeKind::BinaryVN,
            Node::BinaryNV { .. } => NodeKind::BinaryNV,
            Node::BinaryCN { .. } => NodeKind::BinaryCN,
            Node::BinaryNC { .. } => NodeKind::BinaryNC,
            Node::FusedLeft { .. } => NodeKind::FusedLeft,
            Node::FusedRight { .. } => NodeKind::FusedRight,
            Node::FusedQuad { .. } => NodeKind::FusedQuad,
            Node::AxnB { .. } => NodeKind::AxnB,
            Node::VecElem { .. } => NodeKind::VecElem,
            Node::Agg { .. } => NodeKind::Agg,
            Node::StrCompare { .. } => NodeKind::StrCompare,
            Node::Call { .. } => NodeKind::Call,
            Node::If { .. } => NodeKind::If,
            Node::Switch { .. } => NodeKind::Switch,
            Node::While { .. } => NodeKind::While,
            Node::RepeatUntil { .. } => NodeKind::RepeatUntil,
            Node::For { .. } => NodeKind::For,
            Node::Block(_) => NodeKind::Block,
            Node::Break(_) => NodeKind::Break,
            Node::Continue => NodeKind::Continue,
            Node::Return { .. } => NodeKind::Return,
            Node::Assign { .. } => NodeKind::Assign,
            Node::OpAssign { .. } => NodeKind::OpAssign,
            Node::VecElemAssign { .. } => NodeKind::VecElemAssign,
            Node::VecAssign { .. } => NodeKind::VecAssign,
            Node::StrAssign { .. } => NodeKind::StrAssign,
            Node::Swap { .. } => NodeKind::Swap,
        }
    }

    /// `true` when evaluation produces a string, read through the text
    /// channel instead of `value()`.
    pub fn is_string(&self) -> bool {
        matches!(self, Node::Str(_))
    }

    /// Direct sub-expression children, in evaluation order where one exists.
    pub fn children(&self) -> SmallVec<[&Node; 4]> {
        let mut out: SmallVec<[&Node; 4]> = SmallVec::new();
        match self {
            Node::Const(_) | Node::Var(_) | Node::VecRef(_, _) | Node::Continue | Node::Swap { .. } => {}
            Node::Str(se) => collect_str_children(se, &mut out),
            Node::Unary { child, .. } => out.push(child),
            Node::Binary { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            Node::UnaryVar { .. }
            | Node::BinaryVV { .. }
            | Node::BinaryVC { .. }
            | Node::BinaryCV { .. } => {}
            Node::BinaryVN { rhs, .. } => out.push(rhs),
            Node::BinaryNV { lhs, .. } => out.push(lhs),
            Node::BinaryCN { rhs, .. } => out.push(rhs),
            Node::BinaryNC { lhs, .. } => out.push(lhs),
            Node::FusedLeft { a, b, c, .. } | Node::FusedRight { a, b, c, .. } => {
                push_operand(&mut out, a);
                push_operand(&mut out, b);
                push_operand(&mut out, c);
            }
            Node::FusedQuad { a, b, c, d, .. } => {
                push_operand(&mut out, a);
                push_operand(&mut out, b);
                push_operand(&mut out, c);
                push_operand(&mut out, d);
            }
            Node::AxnB { a, b, .. } => {
                push_operand(&mut out, a);
                push_operand(&mut out, b);
            }
            Node::VecElem { index, .. } => out.push(index),
            Node::Agg { .. } => {}
            Node::StrCompare { lhs, rhs, .. } => {
                collect_str_children(lhs, &mut out);
                collect_str_children(rhs, &mut out);
            }
            Node::Call { args, .. } => out.extend(args.iter()),
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                out.push(cond);
                out.push(then);
                if let Some(node) = otherwise {
                    out.push(node);
                }
            }
            Node::Switch { arms, default } => {
                for (cond, value) in arms {
                    out.push(cond);
                    out.push(value);
                }
                if let Some(node) = default {
                    out.push(node);
                }
            }
            Node::While { cond, body, .. } => {
                out.push(cond);
                out.push(body);
            }
            Node::RepeatUntil { body, cond, .. } => {
                out.push(body);
                out.push(cond);
            }
            Node::For {
                init,
                cond,
                incr,
                body,
                ..
            } => {
                for part in [init, cond, incr].into_iter().flatten() {
                    out.push(part);
                }
                out.push(body);
            }
            Node::Block(nodes) => out.extend(nodes.iter()),
            Node::Break(value) => {
                if let Some(node) = value {
                    out.push(node);
                }
            }
            Node::Return { args, .. } => out.extend(args.iter()),
            Node::Assign { rhs, .. } | Node::OpAssign { rhs, .. } => out.push(rhs),
            Node::VecElemAssign { index, rhs, .. } => {
                out.push(index);
                out.push(rhs);
            }
            Node::VecAssign { rhs, .. } => match rhs {
                VecRhs::Scalar(node) | VecRhs::ScalarOp(_, node) => out.push(node),
                VecRhs::List(nodes) => out.extend(nodes.iter()),
                VecRhs::Vector(_, _) | VecRhs::VectorOp(_, _, _) => {}
            },
            Node::StrAssign { rhs, .. } => collect_str_children(rhs, &mut out),
        }
        out
    }

    /// 1 + the maximum child depth, computed with an explicit stack so that
    /// pathologically deep trees do not overflow the call stack.
    pub fn depth(&self) -> usize {
        let mut max = 1;
        let mut stack: Vec<(&Node, usize)> = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            for child in node.children() {
                stack.push((child, depth + 1));
            }
        }
        max
    }

    /// Total number of nodes reachable from (and including) this one.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&Node> = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children());
        }
        count
    }

    /// `true` when evaluating this subtree writes to bound storage (or
    /// stages results). Compound assignment and the synthesizer's identity
    /// reductions consult this before dropping a sub-expression.
    pub fn has_side_effects(&self) -> bool {
        let mut stack: Vec<&Node> = vec![self];
        while let Some(node) = stack.pop() {
            match node.kind() {
                NodeKind::Assign
                | NodeKind::OpAssign
                | NodeKind::VecElemAssign
                | NodeKind::VecAssign
                | NodeKind::StrAssign
                | NodeKind::Swap
                | NodeKind::Return
                // Host closures are opaque; assume the worst.
                | NodeKind::Call => return true,
                _ => stack.extend(node.children()),
            }
        }
        false
    }
}

fn push_operand<'a>(out: &mut SmallVec<[&'a Node; 4]>, operand: &'a Operand) {
    if let Operand::Expr(node) = operand {
        out.push(node);
    }
}

fn collect_str_children<'a>(se: &'a StrExpr, out: &mut SmallVec<[&'a Node; 4]>) {
    match se {
        StrExpr::Lit(_) | StrExpr::Var(_) => {}
        StrExpr::Concat(lhs, rhs) => {
            collect_str_children(lhs, out);
            collect_str_children(rhs, out);
        }
        StrExpr::Slice { base, range, .. } => {
            collect_str_children(base, out);
            for endpoint in [&range.start, &range.end] {
                if let RangeEndpoint::Expr(node) = endpoint {
                    out.push(node);
                }
            }
        }
    }
}
