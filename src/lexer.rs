//! Lexical analysis: turns raw source text into a flat, end-marked token sequence.
//!
//! At every position the longest keyword that starts there wins, compared without
//! regard to case. Only when no keyword matches is a number or an identifier read,
//! so `n-1` is `n`, `-`, `1` and `index` is `IN` followed by `dex`. A space inside a
//! multi-word keyword matches any run of whitespace.
//!
//! The lexer knows nothing about which identifiers name functions; that is decided
//! later by the parser's pre-pass, so every identifier leaves here as a
//! [`TokenKind::Variable`].
use core::fmt;

pub use logos::Span;
use logos::{Lexer, Logos};
use tracing::debug;

use crate::ops::{BinOp, KeyOp, Punct, UnOp};

/// Identifiers longer than this are rejected.
pub const MAX_IDENTIFIER_LEN: usize = 50;

fn process_identifier(lexer: &mut Lexer<Lexeme>) -> Result<Box<str>, LexerError> {
    let name = lexer.slice();
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(LexerError::IdentifierTooLong(name.len()));
    }
    Ok(Box::from(name))
}

fn process_number(lexer: &mut Lexer<Lexeme>) -> Result<f64, LexerError> {
    lexer
        .slice()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(LexerError::MalformedNumber)
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),
    #[error("malformed number")]
    MalformedNumber,
    #[error("identifier is {0} bytes long, the limit is {MAX_IDENTIFIER_LEN}")]
    IdentifierTooLong(usize),
}

/// A lexical failure anchored to the bytes that caused it.
#[derive(thiserror::Error, Debug, PartialEq, Clone)]
#[error("{kind} at {}..{}", .span.start, .span.end)]
pub struct LexError {
    pub kind: LexerError,
    pub span: Span,
}

/// Lexemes read where no keyword matched.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError)]
pub enum Lexeme {
    #[regex(r"[0-9]+(\.[0-9]*)?", process_number)]
    #[regex(r"\.[0-9]+", process_number)]
    Number(f64),

    #[regex("[A-Za-z][A-Za-z0-9]*", process_identifier)]
    Identifier(Box<str>),
}

/// The keyword table. A space stands for any non-empty run of whitespace.
static KEYWORDS: [(&str, TokenKind); 38] = [
    ("Precious", TokenKind::Punct(Punct::Separator)),
    ("Unexpected", TokenKind::Punct(Punct::OpenParen)),
    ("Journey", TokenKind::Punct(Punct::CloseParen)),
    ("Black", TokenKind::Punct(Punct::OpenBrace)),
    ("Gates", TokenKind::Punct(Punct::CloseBrace)),
    ("A pony", TokenKind::Punct(Punct::AssignEnd)),
    ("Mellon", TokenKind::Punct(Punct::FuncDef)),
    ("Fellowship", TokenKind::Punct(Punct::ArgsBegin)),
    ("of the Ring", TokenKind::Punct(Punct::ArgsEnd)),
    ("Gollum", TokenKind::Punct(Punct::Comma)),
    ("ADD", TokenKind::BinOp(BinOp::Add)),
    ("+", TokenKind::BinOp(BinOp::Add)),
    ("SUB", TokenKind::BinOp(BinOp::Sub)),
    ("-", TokenKind::BinOp(BinOp::Sub)),
    ("MUL", TokenKind::BinOp(BinOp::Mul)),
    ("*", TokenKind::BinOp(BinOp::Mul)),
    ("DIV", TokenKind::BinOp(BinOp::Div)),
    ("/", TokenKind::BinOp(BinOp::Div)),
    ("POW", TokenKind::BinOp(BinOp::Pow)),
    ("^", TokenKind::BinOp(BinOp::Pow)),
    ("==", TokenKind::BinOp(BinOp::Eq)),
    (">", TokenKind::BinOp(BinOp::Gt)),
    ("<", TokenKind::BinOp(BinOp::Lt)),
    (">=", TokenKind::BinOp(BinOp::Ge)),
    ("<=", TokenKind::BinOp(BinOp::Le)),
    ("!=", TokenKind::BinOp(BinOp::Ne)),
    ("Give him", TokenKind::BinOp(BinOp::Assign)),
    ("SIN", TokenKind::UnOp(UnOp::Sin)),
    ("COS", TokenKind::UnOp(UnOp::Cos)),
    ("SQRT", TokenKind::UnOp(UnOp::Sqrt)),
    ("LN", TokenKind::UnOp(UnOp::Ln)),
    ("!", TokenKind::UnOp(UnOp::Not)),
    ("OUT", TokenKind::UnOp(UnOp::Out)),
    ("OUT_S", TokenKind::UnOp(UnOp::OutS)),
    ("IN", TokenKind::UnOp(UnOp::In)),
    ("Return of the King", TokenKind::UnOp(UnOp::Ret)),
    (
        "One does not simply walk into Mordor",
        TokenKind::KeyOp(KeyOp::If),
    ),
    ("So it begins", TokenKind::KeyOp(KeyOp::While)),
];

/// Byte length of `keyword` at the start of `rest`, if it is there.
fn keyword_len(rest: &str, keyword: &str) -> Option<usize> {
    let mut pos = 0;
    for (n, word) in keyword.split(' ').enumerate() {
        if n > 0 {
            let gap = rest[pos..].len() - rest[pos..].trim_start_matches(is_blank).len();
            if gap == 0 {
                return None;
            }
            pos += gap;
        }
        let end = pos + word.len();
        if !rest.get(pos..end)?.eq_ignore_ascii_case(word) {
            return None;
        }
        pos = end;
    }
    Some(pos)
}

/// Longest keyword starting `rest`, with its byte length.
fn match_keyword(rest: &str) -> Option<(TokenKind, usize)> {
    KEYWORDS
        .iter()
        .filter_map(|(keyword, kind)| keyword_len(rest, keyword).map(|len| (kind, len)))
        .max_by_key(|(_, len)| *len)
        .map(|(kind, len)| (kind.clone(), len))
}

fn is_blank(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// Token tags as the parser sees them.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Punct(Punct),
    BinOp(BinOp),
    UnOp(UnOp),
    KeyOp(KeyOp),
    Number(f64),
    Variable(Box<str>),
    /// An identifier the function pre-pass found in the function table
    Function(Box<str>),
}

impl From<Lexeme> for TokenKind {
    fn from(lexeme: Lexeme) -> Self {
        match lexeme {
            Lexeme::Number(value) => Self::Number(value),
            Lexeme::Identifier(name) => Self::Variable(name),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punct(Punct::EndOfStream) => write!(f, "end of input"),
            Self::Punct(punct) => write!(f, "`{punct}`"),
            Self::BinOp(op) => write!(f, "`{op}`"),
            Self::UnOp(op) => write!(f, "`{op}`"),
            Self::KeyOp(op) => write!(f, "`{op}`"),
            Self::Number(value) => write!(f, "number {value}"),
            Self::Variable(name) => write!(f, "variable `{name}`"),
            Self::Function(name) => write!(f, "function `{name}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }
}

/// Lex the whole source into tokens terminated by [`Punct::EndOfStream`].
///
/// A NUL byte ends the input just like the end of the buffer does.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let source = source.split('\0').next().unwrap_or_default();
    let mut tokens = Vec::new();
    let mut pos = 0;

    loop {
        pos = source.len() - source[pos..].trim_start_matches(is_blank).len();
        let rest = &source[pos..];
        if rest.is_empty() {
            break;
        }

        if let Some((kind, len)) = match_keyword(rest) {
            tokens.push(Token {
                kind,
                span: pos..pos + len,
            });
            pos += len;
            continue;
        }

        let mut lexer = Lexeme::lexer(rest);
        let Some(lexeme) = lexer.next() else { break };
        let span = pos + lexer.span().start..pos + lexer.span().end;
        match lexeme {
            Ok(lexeme) => tokens.push(Token {
                kind: lexeme.into(),
                span: span.clone(),
            }),
            Err(LexerError::Invalid) => {
                let chr = rest.chars().next().unwrap_or('\0');
                return Err(LexError {
                    kind: LexerError::UnexpectedCharacter(chr),
                    span: pos..pos + chr.len_utf8(),
                });
            }
            Err(kind) => return Err(LexError { kind, span }),
        }
        pos = span.end;
    }

    tokens.push(Token {
        kind: TokenKind::Punct(Punct::EndOfStream),
        span: source.len()..source.len(),
    });
    debug!(tokens = tokens.len(), bytes = source.len(), "lexed source");
    Ok(tokens)
}
