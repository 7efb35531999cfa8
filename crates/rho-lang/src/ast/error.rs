use smol_str::SmolStr;
use thiserror::Error;

use crate::Token;
use crate::symbol_table::Arity;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEofDetected,
    #[error("Unknown symbol `{1}`")]
    UnknownSymbol(Token, SmolStr),
    #[error("Function `{name}` expects {expected} argument(s) but got {got}")]
    InvalidArity {
        token: Token,
        name: SmolStr,
        expected: Arity,
        got: usize,
    },
    #[error("Invalid assignment target `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    InvalidAssignmentTarget(Token),
    #[error("`break` outside of a loop")]
    BreakOutsideLoop(Token),
    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop(Token),
    #[error("Expected a closing parenthesis `)` but got `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingParen(Token),
    #[error("Expected a closing bracket `]` but got `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingBracket(Token),
    #[error("Expected a closing brace `}}` but got `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingBrace(Token),
    #[error("`{1}` cannot be used here: {2}")]
    TypeMismatch(Token, SmolStr, &'static str),
    #[error("Vector slice bounds must be constants")]
    ConstantIndexRequired(Token),
    #[error("`{1}` is already defined")]
    Redeclaration(Token, SmolStr),
    #[error("Symbolic request failed: {1}")]
    SymbolicBridge(Token, String),
    #[error("Slice start must not exceed its end")]
    InvalidRange(Token),
}

impl ParseError {
    /// The token at which parsing failed, for diagnostics.
    pub fn token(&self) -> Option<&Token> {
        match self {
            ParseError::UnexpectedToken(token)
            | ParseError::UnknownSymbol(token, _)
            | ParseError::InvalidArity { token, .. }
            | ParseError::InvalidAssignmentTarget(token)
            | ParseError::BreakOutsideLoop(token)
            | ParseError::ContinueOutsideLoop(token)
            | ParseError::ExpectedClosingParen(token)
            | ParseError::ExpectedClosingBracket(token)
            | ParseError::ExpectedClosingBrace(token)
            | ParseError::TypeMismatch(token, _, _)
            | ParseError::ConstantIndexRequired(token)
            | ParseError::Redeclaration(token, _)
            | ParseError::SymbolicBridge(token, _)
            | ParseError::InvalidRange(token) => Some(token),
            ParseError::UnexpectedEofDetected => None,
        }
    }
}
