use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub enum TokenKind {
    // literals and symbols
    NumberLiteral(Number),
    StringLiteral(String),
    BoolLiteral(bool),
    Ident(SmolStr),
    // arithmetic
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Caret,
    // assignment, joined upstream in the lexer
    Assign,
    PlusAssign,
    MinusAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    SwapOp,
    // comparison
    EqEq,
    NeEq,
    Lt,
    Lte,
    Gt,
    Gte,
    // logic keywords
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Not,
    // punctuation
    Question,
    Colon,
    SemiColon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    // keywords
    If,
    Else,
    While,
    For,
    Repeat,
    Until,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Var,
    Eof,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "'{}'", s),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Assign => write!(f, ":="),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::MulAssign => write!(f, "*="),
            TokenKind::DivAssign => write!(f, "/="),
            TokenKind::ModAssign => write!(f, "%="),
            TokenKind::SwapOp => write!(f, "<=>"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Xor => write!(f, "xor"),
            TokenKind::Nand => write!(f, "nand"),
            TokenKind::Nor => write!(f, "nor"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::While => write!(f, "while"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Repeat => write!(f, "repeat"),
            TokenKind::Until => write!(f, "until"),
            TokenKind::Switch => write!(f, "switch"),
            TokenKind::Case => write!(f, "case"),
            TokenKind::Default => write!(f, "default"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Var => write!(f, "var"),
            TokenKind::Eof => write!(f, ""),
        }
    }
}
