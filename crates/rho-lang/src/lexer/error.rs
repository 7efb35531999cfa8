use thiserror::Error;

use super::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unexpected token")]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEofDetected,
}
