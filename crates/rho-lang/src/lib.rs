//! `rho-lang` is an embeddable compiler and evaluator for a small
//! dynamically-typed expression language with scalars, strings, vectors,
//! and imperative control flow.
//!
//! Expressions compile once against a [`SymbolTable`] and evaluate many
//! times against the live storage they were bound to:
//!
//! ```rust
//! use rho_lang::{Compiler, Number, SymbolTable};
//!
//! let mut table = SymbolTable::with_builtins();
//! let x = table.add_variable("x", Number::new(2.0));
//!
//! let expr = Compiler::new().compile("3 * x ^ 2 + 1", &mut table).unwrap();
//! assert_eq!(expr.evaluate().unwrap(), Number::new(13.0));
//!
//! x.set(Number::new(10.0));
//! assert_eq!(expr.evaluate().unwrap(), Number::new(301.0));
//! ```
mod ast;
mod bridge;
mod builtin;
mod engine;
mod error;
mod eval;
mod guard;
mod lexer;
mod number;
mod ops;
mod range;
mod symbol_table;
mod synthesizer;
mod vector;

pub use ast::TreeHandle;
pub use ast::error::ParseError;
pub use ast::node::{Node, NodeKind, StagedResult};
pub use ast::parser::{Parser, ParserSettings};
pub use bridge::{BridgeError, SymbolicBridge};
pub use engine::{Compiler, Expression, Options};
pub use error::{Error, InnerError, RuntimeError};
pub use eval::Interrupt;
pub use guard::{CountLimit, LoopGuard, Timeout};
pub use lexer::Lexer;
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use number::Number;
pub use ops::{AggOp, BinaryOp, UnaryOp};
pub use range::{Position, Range};
pub use symbol_table::{Arity, ScalarRef, StringRef, Symbol, SymbolTable};
pub use vector::VectorView;

pub type Shared<T> = std::rc::Rc<T>;
pub type SharedCell<T> = std::cell::RefCell<T>;

/// Compiles `code` against `table` with default options.
#[allow(clippy::result_large_err)]
pub fn compile(code: &str, table: &mut SymbolTable) -> Result<Expression, Error> {
    Compiler::new().compile(code, table)
}
