//! Prefix-parenthesised exchange format for trees.
//!
//! Each node is written as `( <tag> <payload> <left> <right> )` with `_` standing in
//! for an absent child, e.g. the statement `OUT 1` inside a one-item chain:
//!
//! ```text
//! ( 0 23 ( 2 5 _ ( 4 1 _ _ ) ) _ )
//! ```
//!
//! Symbol names are not part of the format. Reading a tree back registers
//! placeholder names (`var<N>`, `func<N>`) so every index stays resolvable.
use core::fmt;

use logos::{Logos, Span};
use tracing::debug;

use super::{tag, NodeId, NodeKind, Tree};
use crate::ops::{BinOp, KeyOp, Punct, UnOp};

/// Symbol indices above this are rejected instead of reserving placeholder names.
pub const MAX_SYMBOL_INDEX: usize = 1 << 16;

/// Display adapter writing a tree in the exchange format.
pub struct Dump<'t>(pub &'t Tree);

enum Step {
    Node(Option<NodeId>),
    Text(&'static str),
}

impl fmt::Display for Dump<'_> {
    /// Cyclic trees never terminate here, run the verifier first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // statement chains can be arbitrarily long, so no recursion
        let mut steps = vec![Step::Node(self.0.root())];
        while let Some(step) = steps.pop() {
            let id = match step {
                Step::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Step::Node(id) => id,
            };
            let Some(node) = id.and_then(|id| self.0.get(id)) else {
                f.write_str("_")?;
                continue;
            };
            write!(f, "( {} {} ", node.kind.tag(), node.kind.payload())?;
            steps.extend([
                Step::Text(" )"),
                Step::Node(node.right),
                Step::Text(" "),
                Step::Node(node.left),
            ]);
        }
        writeln!(f)
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Symbol {
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[token("_")]
    Absent,
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"-?(inf|NaN)", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("`(`"),
            Self::Close => f.write_str("`)`"),
            Self::Absent => f.write_str("`_`"),
            Self::Number(value) => write!(f, "number {value}"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("unrecognised input")]
    Invalid { span: Span },
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: Box<str>,
        span: Span,
    },
    #[error("unknown node tag {tag}")]
    UnknownTag { tag: f64, span: Span },
    #[error("payload {payload} is not valid for node tag {tag}")]
    BadPayload { tag: i64, payload: f64, span: Span },
    #[error("unexpected input after the tree")]
    Trailing { span: Span },
}

impl ReadError {
    pub fn span(&self) -> Span {
        match self {
            Self::Invalid { span }
            | Self::Unexpected { span, .. }
            | Self::UnknownTag { span, .. }
            | Self::BadPayload { span, .. }
            | Self::Trailing { span } => span.clone(),
        }
    }
}

/// A node whose header has been read. `left` is filled once its left child is complete.
struct Pending {
    kind: NodeKind,
    left: Option<Option<NodeId>>,
}

struct Reader {
    symbols: Vec<(Symbol, Span)>,
    pos: usize,
    end: usize,
    tree: Tree,
}

impl Reader {
    fn peek_span(&self) -> Span {
        self.symbols
            .get(self.pos)
            .map_or(self.end..self.end, |(_, span)| span.clone())
    }

    fn next(&mut self, expected: &'static str) -> Result<(Symbol, Span), ReadError> {
        let Some(item) = self.symbols.get(self.pos).cloned() else {
            return Err(ReadError::Unexpected {
                expected,
                found: Box::from("end of input"),
                span: self.end..self.end,
            });
        };
        self.pos += 1;
        Ok(item)
    }

    fn number(&mut self, expected: &'static str) -> Result<(f64, Span), ReadError> {
        match self.next(expected)? {
            (Symbol::Number(value), span) => Ok((value, span)),
            (other, span) => Err(ReadError::Unexpected {
                expected,
                found: other.to_string().into_boxed_str(),
                span,
            }),
        }
    }

    fn close(&mut self) -> Result<(), ReadError> {
        match self.next("`)`")? {
            (Symbol::Close, _) => Ok(()),
            (other, span) => Err(ReadError::Unexpected {
                expected: "`)`",
                found: other.to_string().into_boxed_str(),
                span,
            }),
        }
    }

    /// Read one node with all its descendants.
    ///
    /// Nodes still waiting for children sit on an explicit stack, so a long
    /// statement chain cannot exhaust the call stack.
    fn node(&mut self) -> Result<Option<NodeId>, ReadError> {
        let mut open = Vec::<Pending>::new();
        loop {
            let mut done = match self.next("`(` or `_`")? {
                (Symbol::Absent, _) => None,
                (Symbol::Open, _) => {
                    let (tag, tag_span) = self.number("a node tag")?;
                    let (payload, payload_span) = self.number("a node payload")?;
                    let kind = self.kind(tag, tag_span, payload, payload_span)?;
                    open.push(Pending { kind, left: None });
                    continue;
                }
                (other, span) => {
                    return Err(ReadError::Unexpected {
                        expected: "`(` or `_`",
                        found: other.to_string().into_boxed_str(),
                        span,
                    })
                }
            };

            loop {
                match open.pop() {
                    None => return Ok(done),
                    Some(Pending { kind, left: None }) => {
                        open.push(Pending {
                            kind,
                            left: Some(done),
                        });
                        break;
                    }
                    Some(Pending {
                        kind,
                        left: Some(left),
                    }) => {
                        self.close()?;
                        done = Some(self.tree.node(kind, left, done));
                    }
                }
            }
        }
    }

    fn kind(
        &mut self,
        tag: f64,
        tag_span: Span,
        payload: f64,
        span: Span,
    ) -> Result<NodeKind, ReadError> {
        if tag.fract() != 0.0 || !(-1.0..=6.0).contains(&tag) {
            return Err(ReadError::UnknownTag {
                tag,
                span: tag_span,
            });
        }
        let tag = tag as i64;
        let bad_payload = || ReadError::BadPayload {
            tag,
            payload,
            span: span.clone(),
        };
        let code = (payload.fract() == 0.0).then_some(payload as i64);
        let index = code
            .and_then(|code| usize::try_from(code).ok())
            .filter(|index| *index <= MAX_SYMBOL_INDEX);

        let kind = match tag {
            tag::NO_TYPE => NodeKind::NoType,
            tag::PUNCTUATION => code
                .and_then(Punct::from_code)
                .filter(|punct| *punct == Punct::Separator)
                .map(|_| NodeKind::Separator)
                .ok_or_else(bad_payload)?,
            tag::BIN_OP => code
                .and_then(BinOp::from_code)
                .map(NodeKind::BinOp)
                .ok_or_else(bad_payload)?,
            tag::UN_OP => code
                .and_then(UnOp::from_code)
                .map(NodeKind::UnOp)
                .ok_or_else(bad_payload)?,
            tag::KEY_OP => code
                .and_then(KeyOp::from_code)
                .map(NodeKind::KeyOp)
                .ok_or_else(bad_payload)?,
            tag::NUMBER => NodeKind::Number(payload),
            tag::VARIABLE => {
                let index = index.ok_or_else(bad_payload)?;
                self.tree.vars.reserve_through(index, "var");
                NodeKind::Variable(index)
            }
            _ => {
                let index = index.ok_or_else(bad_payload)?;
                self.tree.funcs.reserve_through(index, "func");
                NodeKind::Function(index)
            }
        };
        Ok(kind)
    }
}

/// Rebuild a tree from the exchange format.
///
/// Nodes are created bottom-up through [`Tree::node`], so the live counter and
/// parent links come out exactly as the parser would leave them.
pub fn read_tree(source: &str) -> Result<Tree, ReadError> {
    let mut symbols = Vec::new();
    for (symbol, span) in Symbol::lexer(source).spanned() {
        match symbol {
            Ok(symbol) => symbols.push((symbol, span)),
            Err(()) => return Err(ReadError::Invalid { span }),
        }
    }

    let mut reader = Reader {
        symbols,
        pos: 0,
        end: source.len(),
        tree: Tree::new(),
    };
    let root = reader.node()?;
    if reader.pos < reader.symbols.len() {
        return Err(ReadError::Trailing {
            span: reader.peek_span(),
        });
    }
    reader.tree.set_root(root);

    debug!(
        nodes = reader.tree.live(),
        vars = reader.tree.vars.len(),
        funcs = reader.tree.funcs.len(),
        "read tree"
    );
    Ok(reader.tree)
}
