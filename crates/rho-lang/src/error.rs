use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::Token;
use crate::ast::error::ParseError;
use crate::lexer::error::LexerError;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Compile-time failure with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

/// Fatal evaluation failure, unwound out of `evaluate()`. Everything else
/// at evaluation time is quiet-NaN propagation.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum RuntimeError {
    #[error("Loop exceeded its iteration budget after {iterations} iteration(s)")]
    LoopViolation { iterations: u64 },
    #[error("Index {index} is out of bounds for a buffer of {len} element(s)")]
    RangeViolation { index: i64, len: usize },
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let token = match &cause {
            InnerError::Lexer(LexerError::UnexpectedToken(token)) => Some(token),
            InnerError::Lexer(LexerError::UnexpectedEofDetected) => None,
            InnerError::Parse(err) => err.token(),
        };

        let location = match token {
            Some(token) => span_for(&source_code, token),
            None => {
                // EOF-style errors point at the end of the input.
                let lines = source_code.lines();
                let loc_line = lines.clone().count().saturating_sub(1);
                let loc_col = lines.last().map(|line| line.len()).unwrap_or(0);
                SourceSpan::new(
                    SourceOffset::from_location(&source_code, loc_line, loc_col),
                    1,
                )
            }
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

fn span_for(source_code: &str, token: &Token) -> SourceSpan {
    let start = SourceOffset::from_location(
        source_code,
        token.range.start.line as usize,
        token.range.start.column,
    );
    let end = SourceOffset::from_location(
        source_code,
        token.range.end.line as usize,
        token.range.end.column,
    );
    SourceSpan::new(
        start,
        std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
    )
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => "LexerError::UnexpectedToken",
            InnerError::Lexer(LexerError::UnexpectedEofDetected) => {
                "LexerError::UnexpectedEofDetected"
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEofDetected) => {
                "ParseError::UnexpectedEofDetected"
            }
            InnerError::Parse(ParseError::UnknownSymbol(_, _)) => "ParseError::UnknownSymbol",
            InnerError::Parse(ParseError::InvalidArity { .. }) => "ParseError::InvalidArity",
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                "ParseError::InvalidAssignmentTarget"
            }
            InnerError::Parse(ParseError::BreakOutsideLoop(_)) => "ParseError::BreakOutsideLoop",
            InnerError::Parse(ParseError::ContinueOutsideLoop(_)) => {
                "ParseError::ContinueOutsideLoop"
            }
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                "ParseError::ExpectedClosingParen"
            }
            InnerError::Parse(ParseError::ExpectedClosingBracket(_)) => {
                "ParseError::ExpectedClosingBracket"
            }
            InnerError::Parse(ParseError::ExpectedClosingBrace(_)) => {
                "ParseError::ExpectedClosingBrace"
            }
            InnerError::Parse(ParseError::TypeMismatch(_, _, _)) => "ParseError::TypeMismatch",
            InnerError::Parse(ParseError::ConstantIndexRequired(_)) => {
                "ParseError::ConstantIndexRequired"
            }
            InnerError::Parse(ParseError::Redeclaration(_, _)) => "ParseError::Redeclaration",
            InnerError::Parse(ParseError::SymbolicBridge(_, _)) => "ParseError::SymbolicBridge",
            InnerError::Parse(ParseError::InvalidRange(_)) => "ParseError::InvalidRange",
        };
        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => {
                Some("Check for unexpected or misplaced characters in your input.".to_string())
            }
            InnerError::Lexer(LexerError::UnexpectedEofDetected)
            | InnerError::Parse(ParseError::UnexpectedEofDetected) => Some(
                "Input ended unexpectedly. Make sure all expressions are complete.".to_string(),
            ),
            InnerError::Parse(ParseError::UnknownSymbol(_, name)) => Some(format!(
                "'{name}' is not bound. Register it in the symbol table or assign to it with `:=`."
            )),
            InnerError::Parse(ParseError::InvalidArity {
                name,
                expected,
                got,
                ..
            }) => Some(format!(
                "'{name}' expects {expected} argument(s), but {got} were supplied."
            )),
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => Some(
                "Only variables, vector elements, vectors, and strings can be assigned to."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::BreakOutsideLoop(_))
            | InnerError::Parse(ParseError::ContinueOutsideLoop(_)) => {
                Some("Loop control statements are only valid inside a loop body.".to_string())
            }
            InnerError::Parse(ParseError::ConstantIndexRequired(_)) => Some(
                "Vector slice bounds are resolved at compile time and must be integer constants."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::Redeclaration(_, name)) => {
                Some(format!("'{name}' already exists; `var` cannot shadow it."))
            }
            _ => None,
        };
        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}
