use std::iter::Peekable;

use smol_str::SmolStr;

use crate::Shared;
use crate::ast::dispose::dispose;
use crate::ast::error::ParseError;
use crate::ast::node::{
    GuardHandle, IndexRange, Node, RangeEndpoint, ResultSlot, StrExpr, VecRhs,
};
use crate::bridge::SymbolicBridge;
use crate::lexer::Lexer;
use crate::lexer::token::{Token, TokenKind};
use crate::number;
use crate::ops::{AggOp, BinaryOp, UnaryOp};
use crate::symbol_table::{Arity, FunctionEntry, FunctionKind, Symbol, SymbolTable};
use crate::synthesizer::Synthesizer;
use crate::vector::VectorView;

/// Compilation knobs carried by the parser.
///
/// `synthesis` toggles node specialization (folded constants, compact
/// operand shapes, fusion); turning it off yields the generic tree used by
/// differential tests. `range_checks` decides whether index and slice nodes
/// validate bounds at evaluation time. `guard` is cloned into every loop
/// node. `bridge` serves `integrate`/`differentiate` requests.
#[derive(Clone)]
pub struct ParserSettings<'a> {
    pub synthesis: bool,
    pub range_checks: bool,
    pub guard: Option<GuardHandle>,
    pub bridge: Option<&'a dyn SymbolicBridge>,
}

impl Default for ParserSettings<'_> {
    fn default() -> Self {
        Self {
            synthesis: true,
            range_checks: true,
            guard: None,
            bridge: None,
        }
    }
}

/// What an expression production reduced to. Numeric, string, and vector
/// expressions share one precedence ladder but route to different node
/// families, so intermediate results carry their kind until an operator
/// forces a decision.
enum Parsed {
    Num(Node),
    Str(StrExpr),
    Vec(SmolStr, VectorView),
}

impl Parsed {
    /// Collapses to a plain node: strings keep their NaN-valued node form,
    /// vectors degrade to their first element.
    fn into_node(self) -> Node {
        match self {
            Parsed::Num(node) => node,
            Parsed::Str(se) => Node::Str(se),
            Parsed::Vec(name, view) => Node::VecRef(name, view),
        }
    }
}

pub struct Parser<'a> {
    tokens: Peekable<core::slice::Iter<'a, Token>>,
    table: &'a mut SymbolTable,
    settings: ParserSettings<'a>,
    synth: Synthesizer,
    slot: ResultSlot,
    loop_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: core::slice::Iter<'a, Token>,
        table: &'a mut SymbolTable,
        settings: ParserSettings<'a>,
    ) -> Self {
        let synth = Synthesizer::new(settings.synthesis);
        Self {
            tokens: tokens.peekable(),
            table,
            settings,
            synth,
            slot: Shared::new(crate::SharedCell::new(Vec::new())),
            loop_depth: 0,
        }
    }

    /// The slot `return` statements stage their values into, shared with
    /// the compiled expression object.
    pub fn result_slot(&self) -> ResultSlot {
        Shared::clone(&self.slot)
    }

    pub fn parse(&mut self) -> Result<Node, ParseError> {
        let mut stmts = self.parse_statements(&[TokenKind::Eof])?;
        if stmts.len() == 1 {
            Ok(stmts.remove(0))
        } else if stmts.is_empty() {
            Err(ParseError::UnexpectedEofDetected)
        } else {
            Ok(Node::Block(stmts))
        }
    }

    // ---- token plumbing ----

    fn advance(&mut self) -> Result<Token, ParseError> {
        self.tokens
            .next()
            .cloned()
            .ok_or(ParseError::UnexpectedEofDetected)
    }

    fn at(&mut self, kind: &TokenKind) -> bool {
        matches!(self.tokens.peek(), Some(token) if token.kind == *kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.tokens.next();
            true
        } else {
            false
        }
    }

    fn expect_token(
        &mut self,
        kind: TokenKind,
        err: fn(Token) -> ParseError,
    ) -> Result<(), ParseError> {
        match self.tokens.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(err(token.clone())),
            None => Err(ParseError::UnexpectedEofDetected),
        }
    }

    // ---- statements ----

    fn parse_statements(&mut self, terminators: &[TokenKind]) -> Result<Vec<Node>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::SemiColon) {}
            match self.tokens.peek() {
                Some(token) if terminators.contains(&token.kind) => break,
                Some(token) if token.kind == TokenKind::Eof => {
                    return Err(ParseError::UnexpectedEofDetected);
                }
                Some(_) => {}
                None => return Err(ParseError::UnexpectedEofDetected),
            }
            stmts.push(self.parse_stmt()?);
            match self.tokens.peek() {
                Some(token) if token.kind == TokenKind::SemiColon => continue,
                Some(token) if terminators.contains(&token.kind) => break,
                Some(token) => return Err(ParseError::UnexpectedToken((*token).clone())),
                None => return Err(ParseError::UnexpectedEofDetected),
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Node, ParseError> {
        let kind = match self.tokens.peek() {
            Some(token) => token.kind.clone(),
            None => return Err(ParseError::UnexpectedEofDetected),
        };
        match kind {
            TokenKind::Var => {
                let token = self.advance()?;
                self.parse_var_decl(token)
            }
            TokenKind::Break => {
                let token = self.advance()?;
                self.parse_break(token)
            }
            TokenKind::Continue => {
                let token = self.advance()?;
                if self.loop_depth == 0 {
                    Err(ParseError::ContinueOutsideLoop(token))
                } else {
                    Ok(Node::Continue)
                }
            }
            TokenKind::Return => {
                self.advance()?;
                self.parse_return()
            }
            _ => Ok(self.parse_expr()?.into_node()),
        }
    }

    fn parse_break(&mut self, token: Token) -> Result<Node, ParseError> {
        if self.loop_depth == 0 {
            return Err(ParseError::BreakOutsideLoop(token));
        }
        let value = if self.eat(&TokenKind::LBracket) {
            let node = self.parse_expr()?.into_node();
            self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
            Some(Box::new(node))
        } else {
            None
        };
        Ok(Node::Break(value))
    }

    fn parse_return(&mut self) -> Result<Node, ParseError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::LBracket) && !self.eat(&TokenKind::RBracket) {
            loop {
                args.push(self.parse_expr()?.into_node());
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
                break;
            }
        }
        Ok(Node::Return {
            args,
            slot: Shared::clone(&self.slot),
        })
    }

    fn parse_var_decl(&mut self, _var_token: Token) -> Result<Node, ParseError> {
        let ident = self.advance()?;
        let name = match &ident.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(ParseError::UnexpectedToken(ident)),
        };
        if self.table.contains(&name) {
            return Err(ParseError::Redeclaration(ident, name));
        }
        if self.at(&TokenKind::LBracket) {
            let bracket = self.advance()?;
            let size_node = self.parse_expr()?.into_node();
            let size = const_index(&bracket, size_node)?;
            self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
            let target = self.table.add_vector(&name, VectorView::new(size));
            let rhs = if self.eat(&TokenKind::Assign) {
                if self.at(&TokenKind::LBrace) {
                    VecRhs::List(self.parse_vec_list()?)
                } else {
                    VecRhs::Scalar(Box::new(self.parse_expr()?.into_node()))
                }
            } else {
                VecRhs::Scalar(Box::new(Node::Const(number::FALSE)))
            };
            return Ok(Node::VecAssign { name, target, rhs });
        }
        if self.eat(&TokenKind::Assign) {
            return match self.parse_expr()? {
                Parsed::Str(se) => {
                    let target = self.table.add_string(&name, "");
                    Ok(Node::StrAssign { target, rhs: se })
                }
                other => {
                    let target = self.table.add_variable(&name, number::FALSE);
                    Ok(Node::Assign {
                        target,
                        rhs: Box::new(other.into_node()),
                    })
                }
            };
        }
        // A bare declaration lowers to a zero assignment.
        let target = self.table.add_variable(&name, number::FALSE);
        Ok(Node::Assign {
            target,
            rhs: Box::new(Node::Const(number::FALSE)),
        })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Parsed, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Parsed, ParseError> {
        let left = self.parse_ternary()?;
        let op = match self.tokens.peek().map(|token| &token.kind) {
            Some(TokenKind::Assign) => None,
            Some(TokenKind::PlusAssign) => Some(BinaryOp::Add),
            Some(TokenKind::MinusAssign) => Some(BinaryOp::Sub),
            Some(TokenKind::MulAssign) => Some(BinaryOp::Mul),
            Some(TokenKind::DivAssign) => Some(BinaryOp::Div),
            Some(TokenKind::ModAssign) => Some(BinaryOp::Mod),
            Some(TokenKind::SwapOp) => {
                let token = self.advance()?;
                let rhs = self.parse_assignment()?;
                return match (left, rhs) {
                    (Parsed::Num(Node::Var(a)), Parsed::Num(Node::Var(b))) => {
                        Ok(Parsed::Num(Node::Swap { a, b }))
                    }
                    _ => Err(ParseError::InvalidAssignmentTarget(token)),
                };
            }
            _ => return Ok(left),
        };
        let token = self.advance()?;
        match left {
            Parsed::Vec(name, target) => {
                let rhs = if op.is_none() && self.at(&TokenKind::LBrace) {
                    VecRhs::List(self.parse_vec_list()?)
                } else {
                    match self.parse_assignment()? {
                        Parsed::Vec(other, view) => match op {
                            None => VecRhs::Vector(other, view),
                            Some(op) => VecRhs::VectorOp(op, other, view),
                        },
                        Parsed::Num(node) => match op {
                            None => VecRhs::Scalar(Box::new(node)),
                            Some(op) => VecRhs::ScalarOp(op, Box::new(node)),
                        },
                        Parsed::Str(_) => {
                            return Err(ParseError::TypeMismatch(
                                token,
                                name,
                                "a string cannot be assigned to a vector",
                            ));
                        }
                    }
                };
                Ok(Parsed::Num(Node::VecAssign { name, target, rhs }))
            }
            Parsed::Num(Node::Var(target)) => {
                let rhs = match self.parse_assignment()? {
                    Parsed::Str(_) => {
                        return Err(ParseError::TypeMismatch(
                            token,
                            target.name().clone(),
                            "a string cannot be assigned to a scalar",
                        ));
                    }
                    other => other.into_node(),
                };
                Ok(Parsed::Num(match op {
                    None => Node::Assign {
                        target,
                        rhs: Box::new(rhs),
                    },
                    Some(op) => Node::OpAssign {
                        op,
                        target,
                        rhs: Box::new(rhs),
                    },
                }))
            }
            Parsed::Num(Node::VecElem {
                name,
                view,
                index,
                check,
            }) => {
                let rhs = match self.parse_assignment()? {
                    Parsed::Str(_) => {
                        return Err(ParseError::TypeMismatch(
                            token,
                            name,
                            "a string cannot be assigned to a vector element",
                        ));
                    }
                    other => other.into_node(),
                };
                Ok(Parsed::Num(Node::VecElemAssign {
                    name,
                    view,
                    index,
                    op,
                    rhs: Box::new(rhs),
                    check,
                }))
            }
            Parsed::Str(StrExpr::Var(target)) => match (op, self.parse_assignment()?) {
                (None, Parsed::Str(rhs)) => Ok(Parsed::Num(Node::StrAssign { target, rhs })),
                (Some(BinaryOp::Add), Parsed::Str(rhs)) => {
                    let rhs = StrExpr::Concat(
                        Box::new(StrExpr::Var(target.clone())),
                        Box::new(rhs),
                    );
                    Ok(Parsed::Num(Node::StrAssign { target, rhs }))
                }
                _ => Err(ParseError::TypeMismatch(
                    token,
                    target.name().clone(),
                    "strings support only `:=` and `+=` with a string right-hand side",
                )),
            },
            _ => Err(ParseError::InvalidAssignmentTarget(token)),
        }
    }

    fn parse_ternary(&mut self) -> Result<Parsed, ParseError> {
        let cond = self.parse_binary()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect_token(TokenKind::Colon, ParseError::UnexpectedToken)?;
        let otherwise = self.parse_ternary()?;
        Ok(Parsed::Num(self.synth.conditional(
            cond.into_node(),
            then.into_node(),
            Some(otherwise.into_node()),
        )))
    }

    #[inline(always)]
    fn binary_op_precedence(kind: &TokenKind) -> u8 {
        match kind {
            TokenKind::Or | TokenKind::Nor | TokenKind::Nand | TokenKind::Xor => 1,
            TokenKind::And => 2,
            TokenKind::EqEq | TokenKind::NeEq => 3,
            TokenKind::Lt | TokenKind::Lte | TokenKind::Gt | TokenKind::Gte => 4,
            TokenKind::Plus | TokenKind::Minus => 5,
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => 6,
            _ => 0,
        }
    }

    fn token_binary_op(kind: &TokenKind) -> Option<BinaryOp> {
        match kind {
            TokenKind::Or => Some(BinaryOp::Or),
            TokenKind::Nor => Some(BinaryOp::Nor),
            TokenKind::Nand => Some(BinaryOp::Nand),
            TokenKind::Xor => Some(BinaryOp::Xor),
            TokenKind::And => Some(BinaryOp::And),
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NeEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Lte => Some(BinaryOp::Lte),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Gte => Some(BinaryOp::Gte),
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            TokenKind::Asterisk => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    fn parse_binary(&mut self) -> Result<Parsed, ParseError> {
        let left = self.parse_unary()?;
        self.parse_binary_op(left, 1)
    }

    /// Precedence climbing over the left-associative operator ladder.
    /// `^` is right-associative and binds tighter than unary minus, so it
    /// lives in [`Parser::parse_power`] instead.
    fn parse_binary_op(&mut self, mut left: Parsed, min_prec: u8) -> Result<Parsed, ParseError> {
        loop {
            let prec = match self.tokens.peek() {
                Some(token) => Self::binary_op_precedence(&token.kind),
                None => break,
            };
            if prec == 0 || prec < min_prec {
                break;
            }
            let token = self.advance()?;
            let op = match Self::token_binary_op(&token.kind) {
                Some(op) => op,
                None => return Err(ParseError::UnexpectedToken(token)),
            };
            let mut right = self.parse_unary()?;
            loop {
                let next_prec = match self.tokens.peek() {
                    Some(token) => Self::binary_op_precedence(&token.kind),
                    None => 0,
                };
                if next_prec > prec {
                    right = self.parse_binary_op(right, prec + 1)?;
                } else {
                    break;
                }
            }
            left = self.apply_binary(op, left, right, &token)?;
        }
        Ok(left)
    }

    fn apply_binary(
        &mut self,
        op: BinaryOp,
        left: Parsed,
        right: Parsed,
        token: &Token,
    ) -> Result<Parsed, ParseError> {
        match (left, right) {
            (Parsed::Str(lhs), Parsed::Str(rhs)) => {
                if op == BinaryOp::Add {
                    Ok(Parsed::Str(StrExpr::Concat(Box::new(lhs), Box::new(rhs))))
                } else if op.is_comparison() {
                    Ok(Parsed::Num(Node::StrCompare { op, lhs, rhs }))
                } else {
                    Err(ParseError::TypeMismatch(
                        token.clone(),
                        SmolStr::new(op.as_str()),
                        "strings support only `+` and comparisons",
                    ))
                }
            }
            (Parsed::Str(_), _) | (_, Parsed::Str(_)) => Err(ParseError::TypeMismatch(
                token.clone(),
                SmolStr::new(op.as_str()),
                "cannot mix string and numeric operands",
            )),
            (left, right) => Ok(Parsed::Num(self.synth.binary(
                op,
                left.into_node(),
                right.into_node(),
            ))),
        }
    }

    fn parse_unary(&mut self) -> Result<Parsed, ParseError> {
        match self.tokens.peek().map(|token| &token.kind) {
            Some(TokenKind::Minus) => {
                self.advance()?;
                let child = self.parse_unary()?;
                Ok(Parsed::Num(self.synth.unary(UnaryOp::Neg, child.into_node())))
            }
            Some(TokenKind::Plus) => {
                self.advance()?;
                self.parse_unary()
            }
            Some(TokenKind::Not) => {
                self.advance()?;
                let child = self.parse_unary()?;
                Ok(Parsed::Num(self.synth.unary(UnaryOp::Not, child.into_node())))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Parsed, ParseError> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::Caret) {
            // Right-associative: the exponent may itself start with `-`.
            let exp = self.parse_unary()?;
            return Ok(Parsed::Num(self.synth.binary(
                BinaryOp::Pow,
                base.into_node(),
                exp.into_node(),
            )));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Parsed, ParseError> {
        let mut value = self.parse_primary()?;
        while self.at(&TokenKind::LBracket) {
            let bracket = self.advance()?;
            value = match value {
                Parsed::Vec(name, view) => self.parse_vec_suffix(bracket, name, view)?,
                Parsed::Str(base) => self.parse_str_suffix(bracket, base)?,
                Parsed::Num(_) => return Err(ParseError::UnexpectedToken(bracket)),
            };
        }
        Ok(value)
    }

    /// `v[i]` element access or a `v[a:b]` slice. Slice endpoints must be
    /// compile-time constants because the slice aliases the buffer through
    /// a re-based view built here.
    fn parse_vec_suffix(
        &mut self,
        bracket: Token,
        name: SmolStr,
        view: VectorView,
    ) -> Result<Parsed, ParseError> {
        let start = if self.at(&TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expr()?.into_node())
        };
        if self.eat(&TokenKind::Colon) {
            let end = if self.at(&TokenKind::RBracket) {
                None
            } else {
                Some(self.parse_expr()?.into_node())
            };
            self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
            let start_idx = match start {
                Some(node) => const_index(&bracket, node)?,
                None => 0,
            };
            let end_idx = match end {
                Some(node) => const_index(&bracket, node)?,
                None => view.len().saturating_sub(1),
            };
            if start_idx > end_idx || end_idx >= view.len() {
                return Err(ParseError::InvalidRange(bracket));
            }
            // The slice suffix becomes part of the stored name, so every
            // node over the re-based view serializes back to `v[a : b]`.
            let sliced = SmolStr::from(format!("{}[{} : {}]", name, start_idx, end_idx));
            return Ok(Parsed::Vec(
                sliced,
                view.rebase(start_idx, end_idx - start_idx + 1),
            ));
        }
        let index = match start {
            Some(node) => node,
            None => return Err(ParseError::UnexpectedToken(bracket)),
        };
        self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
        Ok(Parsed::Num(Node::VecElem {
            name,
            view,
            index: Box::new(index),
            check: self.settings.range_checks,
        }))
    }

    /// `s[a:b]` with endpoints evaluated per pass; `s[i]` is sugar for the
    /// one-character slice and therefore needs a constant index.
    fn parse_str_suffix(&mut self, bracket: Token, base: StrExpr) -> Result<Parsed, ParseError> {
        let start = if self.at(&TokenKind::Colon) {
            RangeEndpoint::Open
        } else {
            endpoint(self.parse_expr()?.into_node())
        };
        if self.eat(&TokenKind::Colon) {
            let end = if self.at(&TokenKind::RBracket) {
                RangeEndpoint::Open
            } else {
                endpoint(self.parse_expr()?.into_node())
            };
            self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
            return Ok(Parsed::Str(StrExpr::Slice {
                base: Box::new(base),
                range: IndexRange { start, end },
                check: self.settings.range_checks,
            }));
        }
        self.expect_token(TokenKind::RBracket, ParseError::ExpectedClosingBracket)?;
        match start {
            RangeEndpoint::Const(i) => Ok(Parsed::Str(StrExpr::Slice {
                base: Box::new(base),
                range: IndexRange {
                    start: RangeEndpoint::Const(i),
                    end: RangeEndpoint::Const(i),
                },
                check: self.settings.range_checks,
            })),
            _ => Err(ParseError::ConstantIndexRequired(bracket)),
        }
    }

    fn parse_primary(&mut self) -> Result<Parsed, ParseError> {
        let token = self.advance()?;
        match token.kind.clone() {
            TokenKind::NumberLiteral(n) => Ok(Parsed::Num(Node::Const(n))),
            TokenKind::StringLiteral(s) => Ok(Parsed::Str(StrExpr::Lit(s))),
            TokenKind::BoolLiteral(b) => Ok(Parsed::Num(Node::Const(if b {
                number::TRUE
            } else {
                number::FALSE
            }))),
            TokenKind::Ident(name) => self.parse_ident(token, name),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
                Ok(inner)
            }
            TokenKind::LBrace => {
                let stmts = self.parse_statements(&[TokenKind::RBrace])?;
                self.expect_token(TokenKind::RBrace, ParseError::ExpectedClosingBrace)?;
                Ok(Parsed::Num(Node::Block(stmts)))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Eof => Err(ParseError::UnexpectedEofDetected),
            _ => Err(ParseError::UnexpectedToken(token)),
        }
    }

    fn parse_ident(&mut self, token: Token, name: SmolStr) -> Result<Parsed, ParseError> {
        let symbol = self.table.lookup(&name).cloned();
        match symbol {
            Some(Symbol::Variable(var)) => Ok(Parsed::Num(Node::Var(var))),
            Some(Symbol::Constant(value)) => Ok(Parsed::Num(Node::Const(value))),
            Some(Symbol::Str(var)) => Ok(Parsed::Str(StrExpr::Var(var))),
            Some(Symbol::Vector(view)) => Ok(Parsed::Vec(name, view)),
            Some(Symbol::Function(entry)) => self.parse_call(token, entry),
            None if name == "integrate" || name == "differentiate" => {
                self.parse_symbolic(token, name)
            }
            None => {
                // An unknown name directly followed by `:=` springs into
                // existence as a scalar variable.
                if self.at(&TokenKind::Assign) {
                    let var = self.table.add_variable(&name, number::FALSE);
                    Ok(Parsed::Num(Node::Var(var)))
                } else {
                    Err(ParseError::UnknownSymbol(token, name))
                }
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Parsed>, ParseError> {
        self.expect_token(TokenKind::LParen, ParseError::UnexpectedToken)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
            break;
        }
        Ok(args)
    }

    fn parse_call(
        &mut self,
        token: Token,
        entry: Shared<FunctionEntry>,
    ) -> Result<Parsed, ParseError> {
        let mut args = self.parse_args()?;
        // A reduction builtin applied to a whole vector becomes a bulk
        // aggregation node instead of a variadic call.
        if args.len() == 1
            && matches!(entry.kind, FunctionKind::Native(_))
            && matches!(args[0], Parsed::Vec(_, _))
        {
            if let Some(op) = agg_for(&entry.name) {
                if let Some(Parsed::Vec(name, view)) = args.pop() {
                    return Ok(Parsed::Num(Node::Agg { op, name, view }));
                }
            }
        }
        if !entry.arity.accepts(args.len()) {
            return Err(ParseError::InvalidArity {
                token,
                name: entry.name.clone(),
                expected: entry.arity,
                got: args.len(),
            });
        }
        let mut nodes = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Parsed::Str(_) => {
                    return Err(ParseError::TypeMismatch(
                        token,
                        entry.name.clone(),
                        "function arguments must be numeric",
                    ));
                }
                other => nodes.push(other.into_node()),
            }
        }
        let node = match (&entry.kind, nodes.len()) {
            (FunctionKind::Unary(op), 1) => {
                let op = *op;
                self.synth.unary(op, nodes.remove(0))
            }
            (FunctionKind::Binary(op), 2) => {
                let op = *op;
                let mut it = nodes.into_iter();
                match (it.next(), it.next()) {
                    (Some(lhs), Some(rhs)) => self.synth.binary(op, lhs, rhs),
                    _ => return Err(ParseError::UnexpectedToken(token)),
                }
            }
            _ => Node::Call {
                entry: Shared::clone(&entry),
                args: nodes,
            },
        };
        Ok(Parsed::Num(node))
    }

    /// `integrate(...)` / `differentiate(...)`: serialize the compiled
    /// argument back to text, hand it to the external symbolic engine, and
    /// parse the textual answer through a nested parser over the same
    /// symbol table.
    fn parse_symbolic(&mut self, token: Token, name: SmolStr) -> Result<Parsed, ParseError> {
        let mut args = self.parse_args()?;
        if args.len() != 1 {
            return Err(ParseError::InvalidArity {
                token,
                name,
                expected: Arity::Exact(1),
                got: args.len(),
            });
        }
        let body = match args.pop() {
            Some(arg) => arg.into_node(),
            None => return Err(ParseError::UnexpectedEofDetected),
        };
        let request = format!("{}({})", name, body);
        dispose(body);
        let bridge = match self.settings.bridge {
            Some(bridge) => bridge,
            None => {
                return Err(ParseError::SymbolicBridge(
                    token,
                    "no symbolic bridge installed".to_string(),
                ));
            }
        };
        let response = bridge
            .evaluate(&request)
            .map_err(|e| ParseError::SymbolicBridge(token.clone(), e.to_string()))?;
        let tokens = Lexer::tokenize(&response)
            .map_err(|e| ParseError::SymbolicBridge(token.clone(), e.to_string()))?;
        let mut sub = Parser::new(tokens.iter(), &mut *self.table, self.settings.clone());
        let node = sub.parse()?;
        Ok(Parsed::Num(node))
    }

    // ---- control flow ----

    fn parse_body(&mut self) -> Result<Node, ParseError> {
        if self.eat(&TokenKind::LBrace) {
            let stmts = self.parse_statements(&[TokenKind::RBrace])?;
            self.expect_token(TokenKind::RBrace, ParseError::ExpectedClosingBrace)?;
            Ok(Node::Block(stmts))
        } else {
            self.parse_stmt()
        }
    }

    fn parse_if(&mut self) -> Result<Parsed, ParseError> {
        self.expect_token(TokenKind::LParen, ParseError::UnexpectedToken)?;
        let cond = self.parse_expr()?;
        self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
        let then = self.parse_body()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(Parsed::Num(self.synth.conditional(
            cond.into_node(),
            then,
            otherwise,
        )))
    }

    fn parse_while(&mut self) -> Result<Parsed, ParseError> {
        self.expect_token(TokenKind::LParen, ParseError::UnexpectedToken)?;
        let cond = self.parse_expr()?;
        self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        Ok(Parsed::Num(Node::While {
            cond: Box::new(cond.into_node()),
            body: Box::new(body?),
            guard: self.settings.guard.clone(),
        }))
    }

    fn parse_repeat(&mut self) -> Result<Parsed, ParseError> {
        self.loop_depth += 1;
        let stmts = self.parse_statements(&[TokenKind::Until]);
        self.loop_depth -= 1;
        let mut stmts = stmts?;
        self.expect_token(TokenKind::Until, ParseError::UnexpectedToken)?;
        self.expect_token(TokenKind::LParen, ParseError::UnexpectedToken)?;
        let cond = self.parse_expr()?;
        self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
        let body = if stmts.len() == 1 {
            stmts.remove(0)
        } else {
            Node::Block(stmts)
        };
        Ok(Parsed::Num(Node::RepeatUntil {
            body: Box::new(body),
            cond: Box::new(cond.into_node()),
            guard: self.settings.guard.clone(),
        }))
    }

    fn parse_for(&mut self) -> Result<Parsed, ParseError> {
        self.expect_token(TokenKind::LParen, ParseError::UnexpectedToken)?;
        let init = if self.at(&TokenKind::SemiColon) {
            None
        } else {
            Some(Box::new(self.parse_stmt()?))
        };
        self.expect_token(TokenKind::SemiColon, ParseError::UnexpectedToken)?;
        let cond = if self.at(&TokenKind::SemiColon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?.into_node()))
        };
        self.expect_token(TokenKind::SemiColon, ParseError::UnexpectedToken)?;
        let incr = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expr()?.into_node()))
        };
        self.expect_token(TokenKind::RParen, ParseError::ExpectedClosingParen)?;
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        Ok(Parsed::Num(Node::For {
            init,
            cond,
            incr,
            body: Box::new(body?),
            guard: self.settings.guard.clone(),
        }))
    }

    fn parse_switch(&mut self) -> Result<Parsed, ParseError> {
        self.expect_token(TokenKind::LBrace, ParseError::UnexpectedToken)?;
        let mut arms = Vec::new();
        let mut default = None;
        loop {
            while self.eat(&TokenKind::SemiColon) {}
            let token = self.advance()?;
            match token.kind {
                TokenKind::Case => {
                    let cond = self.parse_expr()?.into_node();
                    self.expect_token(TokenKind::Colon, ParseError::UnexpectedToken)?;
                    let value = self.parse_expr()?.into_node();
                    arms.push((cond, value));
                }
                TokenKind::Default => {
                    self.expect_token(TokenKind::Colon, ParseError::UnexpectedToken)?;
                    default = Some(Box::new(self.parse_expr()?.into_node()));
                }
                TokenKind::RBrace => break,
                _ => return Err(ParseError::UnexpectedToken(token)),
            }
        }
        Ok(Parsed::Num(Node::Switch { arms, default }))
    }

    fn parse_vec_list(&mut self) -> Result<Vec<Node>, ParseError> {
        self.expect_token(TokenKind::LBrace, ParseError::UnexpectedToken)?;
        let mut items = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?.into_node());
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect_token(TokenKind::RBrace, ParseError::ExpectedClosingBrace)?;
            break;
        }
        Ok(items)
    }
}

fn const_index(token: &Token, node: Node) -> Result<usize, ParseError> {
    match node {
        Node::Const(n) if n.is_int() && n.value() >= 0.0 => Ok(n.to_int() as usize),
        other => {
            dispose(other);
            Err(ParseError::ConstantIndexRequired(token.clone()))
        }
    }
}

fn endpoint(node: Node) -> RangeEndpoint {
    match node {
        Node::Const(n) if n.is_int() && n.value() >= 0.0 => {
            RangeEndpoint::Const(n.to_int() as usize)
        }
        other => RangeEndpoint::Expr(Box::new(other)),
    }
}

fn agg_for(name: &str) -> Option<AggOp> {
    match name {
        "sum" => Some(AggOp::Sum),
        "avg" => Some(AggOp::Avg),
        "min" => Some(AggOp::Min),
        "max" => Some(AggOp::Max),
        "mul" => Some(AggOp::Prod),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::node::NodeKind;
    use crate::number::Number;
    use rstest::rstest;

    fn parse_with(input: &str, table: &mut SymbolTable, synthesis: bool) -> Result<Node, ParseError> {
        let tokens = Lexer::tokenize(input).unwrap();
        let settings = ParserSettings {
            synthesis,
            ..ParserSettings::default()
        };
        let mut parser = Parser::new(tokens.iter(), table, settings);
        parser.parse()
    }

    fn parse(input: &str) -> Result<Node, ParseError> {
        let mut table = SymbolTable::with_builtins();
        parse_with(input, &mut table, true)
    }

    #[rstest]
    #[case("2 + 3 * 4", "(2 + (3 * 4))")]
    #[case("2 * 3 + 4", "((2 * 3) + 4)")]
    #[case("2 ^ 3 ^ 2", "(2 ^ (3 ^ 2))")]
    #[case("1 < 2 and 3 < 4", "((1 < 2) and (3 < 4))")]
    #[case("-2 ^ 2", "(-(2 ^ 2))")]
    #[case("(2 + 3) * 4", "((2 + 3) * 4)")]
    fn test_precedence(#[case] input: &str, #[case] expected: &str) {
        let mut table = SymbolTable::with_builtins();
        let node = parse_with(input, &mut table, false).unwrap();
        assert_eq!(node.to_string(), expected);
    }

    #[test]
    fn test_constant_folding_through_parse() {
        let node = parse("2 + 3 * 4").unwrap();
        assert!(matches!(node, Node::Const(v) if v == Number::new(14.0)));
    }

    #[test]
    fn test_auto_created_variable() {
        let mut table = SymbolTable::with_builtins();
        let node = parse_with("x := 5", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::Assign);
        assert!(table.variable("x").is_some());
    }

    #[test]
    fn test_unknown_symbol_without_assignment() {
        assert!(matches!(
            parse("x + 1"),
            Err(ParseError::UnknownSymbol(_, name)) if name == "x"
        ));
    }

    #[test]
    fn test_bound_variable_specializes() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(2.0));
        let node = parse_with("x + 1", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::BinaryVC);
    }

    #[test]
    fn test_string_concat_and_compare() {
        let node = parse("'abc' + 'def'").unwrap();
        assert_eq!(node.kind(), NodeKind::Str);
        let node = parse("'abc' < 'abd'").unwrap();
        assert_eq!(node.kind(), NodeKind::StrCompare);
        assert!(matches!(
            parse("'abc' * 'def'"),
            Err(ParseError::TypeMismatch(_, _, _))
        ));
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        assert!(matches!(parse("break"), Err(ParseError::BreakOutsideLoop(_))));
        assert!(matches!(
            parse("continue"),
            Err(ParseError::ContinueOutsideLoop(_))
        ));
    }

    #[test]
    fn test_loop_with_break() {
        let node = parse("while (1) { break; }").unwrap();
        assert_eq!(node.kind(), NodeKind::While);
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        assert!(matches!(
            parse("sin(1, 2)"),
            Err(ParseError::InvalidArity { got: 2, .. })
        ));
    }

    #[test]
    fn test_unbalanced_paren_is_rejected() {
        assert!(matches!(
            parse("(1 + 2"),
            Err(ParseError::ExpectedClosingParen(_)) | Err(ParseError::UnexpectedEofDetected)
        ));
    }

    #[test]
    fn test_vector_element_and_slice() {
        let mut table = SymbolTable::with_builtins();
        table.add_vector("v", VectorView::from_values(vec![
            Number::new(1.0),
            Number::new(2.0),
            Number::new(3.0),
            Number::new(4.0),
        ]));
        let node = parse_with("v[1]", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::VecElem);

        let node = parse_with("sum(v[1:2])", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::Agg);
        // The slice bounds survive into the serialized form.
        assert_eq!(node.to_string(), "sum(v[1 : 2])");

        let mut table2 = SymbolTable::with_builtins();
        table2.add_vector("v", VectorView::new(4));
        table2.add_variable("i", Number::new(0.0));
        assert!(matches!(
            parse_with("v[i:2]", &mut table2, true),
            Err(ParseError::ConstantIndexRequired(_))
        ));
    }

    #[test]
    fn test_whole_vector_assignment_forms() {
        let mut table = SymbolTable::with_builtins();
        table.add_vector("v", VectorView::new(3));
        table.add_vector("u", VectorView::new(3));
        let node = parse_with("v := u", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::VecAssign);
        let node = parse_with("v += 1", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::VecAssign);
        let node = parse_with("v := {1, 2, 3}", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::VecAssign);
    }

    #[test]
    fn test_var_declaration_forms() {
        let mut table = SymbolTable::with_builtins();
        let node = parse_with("var x := 3; x + 1", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::Block);
        assert!(table.variable("x").is_some());

        let mut table = SymbolTable::with_builtins();
        parse_with("var v[3] := {1, 2, 3}", &mut table, true).unwrap();
        assert!(table.vector("v").is_some());

        let mut table = SymbolTable::with_builtins();
        parse_with("var s := 'abc'", &mut table, true).unwrap();
        assert!(table.string("s").is_some());

        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(1.0));
        assert!(matches!(
            parse_with("var x := 2", &mut table, true),
            Err(ParseError::Redeclaration(_, _))
        ));
    }

    #[test]
    fn test_switch_parsing() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(1.0));
        let node = parse_with(
            "switch { case x < 0 : -1; case x > 0 : 1; default : 0; }",
            &mut table,
            true,
        )
        .unwrap();
        assert_eq!(node.kind(), NodeKind::Switch);
    }

    #[test]
    fn test_ternary_and_if() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(1.0));
        let node = parse_with("x < 0 ? -x : x", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::If);
        let node = parse_with("if (x < 0) 1 else 2", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::If);
    }

    #[test]
    fn test_swap_requires_two_variables() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("a", Number::new(1.0));
        table.add_variable("b", Number::new(2.0));
        let node = parse_with("a <=> b", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::Swap);
        assert!(matches!(
            parse_with("a <=> 1", &mut table, true),
            Err(ParseError::InvalidAssignmentTarget(_))
        ));
    }

    #[test]
    fn test_round_trip_stability() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(2.0));
        let node = parse_with("3 * x ^ 2 + 1", &mut table, true).unwrap();
        assert_eq!(node.kind(), NodeKind::AxnB);
        let text = node.to_string();
        let mut table2 = SymbolTable::with_builtins();
        table2.add_variable("x", Number::new(2.0));
        let reparsed = parse_with(&text, &mut table2, true).unwrap();
        assert_eq!(reparsed.to_string(), text);
    }
}
