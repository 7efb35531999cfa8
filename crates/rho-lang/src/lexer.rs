pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag};
use nom::character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace1, none_of, one_of};
use nom::combinator::{map, map_res, opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, bytes::complete::escaped_transform};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::number::Number;
use crate::range::{Position, Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

pub struct Lexer;

impl Lexer {
    /// Converts source text into a flat token sequence terminated by an
    /// [`TokenKind::Eof`] token. Operator joining (`:=`, `<=`, `<=>`, ...)
    /// happens here so the parser only ever needs one token of lookahead.
    pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
        match tokens(Span::new(input)) {
            Ok((rest, toks)) => {
                if rest.fragment().is_empty() {
                    let eof = Token {
                        range: rest.into(),
                        kind: TokenKind::Eof,
                    };
                    Ok([toks, vec![eof]].concat())
                } else {
                    Err(LexerError::UnexpectedToken(unexpected_token(rest)))
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(LexerError::UnexpectedToken(unexpected_token(e.input)))
            }
            Err(nom::Err::Incomplete(_)) => Err(LexerError::UnexpectedEofDetected),
        }
    }
}

fn unexpected_token(span: Span) -> Token {
    let start: Position = span.into();
    let end = Position::new(start.line, start.column + 1);
    Token {
        range: Range { start, end },
        kind: TokenKind::Eof,
    }
}

fn line_comment(input: Span) -> IResult<Span, ()> {
    value((), preceded(char('#'), opt(is_not("\n\r")))).parse(input)
}

fn skip(input: Span) -> IResult<Span, ()> {
    value(
        (),
        many0(alt((value((), multispace1), line_comment))),
    )
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        recognize((
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |span: Span| {
            span.fragment().parse::<f64>().map(|n| Token {
                range: span.into(),
                kind: TokenKind::NumberLiteral(Number::new(n)),
            })
        },
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (input, start) = position(input)?;
    let (input, text) = delimited(
        char('\''),
        map(
            opt(escaped_transform(
                none_of("\\'"),
                '\\',
                alt((
                    value("'", tag("'")),
                    value("\\", tag("\\")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                    value("\r", tag("r")),
                )),
            )),
            |s| s.unwrap_or_default(),
        ),
        char('\''),
    )
    .parse(input)?;
    let (input, end) = position(input)?;

    Ok((
        input,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLiteral(text),
        },
    ))
}

fn ident_or_keyword(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let kind = match *span.fragment() {
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "while" => TokenKind::While,
                "for" => TokenKind::For,
                "repeat" => TokenKind::Repeat,
                "until" => TokenKind::Until,
                "switch" => TokenKind::Switch,
                "case" => TokenKind::Case,
                "default" => TokenKind::Default,
                "break" => TokenKind::Break,
                "continue" => TokenKind::Continue,
                "return" => TokenKind::Return,
                "var" => TokenKind::Var,
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "xor" => TokenKind::Xor,
                "nand" => TokenKind::Nand,
                "nor" => TokenKind::Nor,
                "not" => TokenKind::Not,
                "true" => TokenKind::BoolLiteral(true),
                "false" => TokenKind::BoolLiteral(false),
                name => TokenKind::Ident(SmolStr::new(name)),
            };
            Token {
                range: span.into(),
                kind,
            }
        },
    )
    .parse(input)
}

define_token_parser!(swap_op, "<=>", TokenKind::SwapOp);
define_token_parser!(assign, ":=", TokenKind::Assign);
define_token_parser!(plus_assign, "+=", TokenKind::PlusAssign);
define_token_parser!(minus_assign, "-=", TokenKind::MinusAssign);
define_token_parser!(mul_assign, "*=", TokenKind::MulAssign);
define_token_parser!(div_assign, "/=", TokenKind::DivAssign);
define_token_parser!(mod_assign, "%=", TokenKind::ModAssign);
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(ne_eq_alt, "<>", TokenKind::NeEq);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);
define_token_parser!(caret, "^", TokenKind::Caret);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(question, "?", TokenKind::Question);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);

fn compound_operators(input: Span) -> IResult<Span, Token> {
    // Longest match first: `<=>` before `<=` before `<`.
    alt((
        swap_op, assign, plus_assign, minus_assign, mul_assign, div_assign, mod_assign, eq_eq,
        ne_eq, ne_eq_alt, lte, gte,
    ))
    .parse(input)
}

fn simple_operators(input: Span) -> IResult<Span, Token> {
    alt((plus, minus, asterisk, slash, percent, caret, lt, gt)).parse(input)
}

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        question, colon, semi_colon, comma, l_paren, r_paren, l_bracket, r_bracket, l_brace,
        r_brace,
    ))
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((
        number_literal,
        string_literal,
        ident_or_keyword,
        compound_operators,
        simple_operators,
        punctuations,
    ))
    .parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    let (input, toks) = many0(preceded(skip, token)).parse(input)?;
    let (input, _) = skip(input)?;
    Ok((input, toks))
}
