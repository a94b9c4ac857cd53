//! Operator and punctuation codes shared by tokens and tree nodes.
//!
//! All four families live in one numeric space, which is what the AST exchange
//! format writes as a node payload:
//!
//! ```text
//! SIN 0 .. RET 8 | ADD 9 .. ASSUME 20 | IF 21, WHILE 22 | separator 23 .. comma 33
//! ```
use core::fmt;

use arbitrary::Arbitrary;

/// Unary operators, including the return marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum UnOp {
    Sin,
    Cos,
    Sqrt,
    Ln,
    Not,
    Out,
    OutS,
    In,
    Ret,
}

/// Binary operators. [`BinOp::Assign`] is the "assume" node built by assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum KeyOp {
    If,
    While,
}

/// Punctuation keywords. Only [`Punct::Separator`] ever becomes a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    /// `Precious` in source, the statement separator inside the tree
    Separator,
    EndOfStream,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    AssignEnd,
    FuncDef,
    ArgsBegin,
    ArgsEnd,
    Comma,
}

const UN_OPS: [UnOp; 9] = [
    UnOp::Sin,
    UnOp::Cos,
    UnOp::Sqrt,
    UnOp::Ln,
    UnOp::Not,
    UnOp::Out,
    UnOp::OutS,
    UnOp::In,
    UnOp::Ret,
];

const BIN_OPS: [BinOp; 12] = [
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::Div,
    BinOp::Pow,
    BinOp::Eq,
    BinOp::Gt,
    BinOp::Lt,
    BinOp::Ge,
    BinOp::Le,
    BinOp::Ne,
    BinOp::Assign,
];

const KEY_OPS: [KeyOp; 2] = [KeyOp::If, KeyOp::While];

const PUNCTS: [Punct; 11] = [
    Punct::Separator,
    Punct::EndOfStream,
    Punct::OpenParen,
    Punct::CloseParen,
    Punct::OpenBrace,
    Punct::CloseBrace,
    Punct::AssignEnd,
    Punct::FuncDef,
    Punct::ArgsBegin,
    Punct::ArgsEnd,
    Punct::Comma,
];

const BIN_OP_BASE: i64 = UN_OPS.len() as i64;
const KEY_OP_BASE: i64 = BIN_OP_BASE + BIN_OPS.len() as i64;
const PUNCT_BASE: i64 = KEY_OP_BASE + KEY_OPS.len() as i64;

fn from_table<T: Copy>(table: &[T], base: i64, code: i64) -> Option<T> {
    usize::try_from(code - base)
        .ok()
        .and_then(|idx| table.get(idx).copied())
}

fn position<T: PartialEq>(table: &[T], item: &T) -> i64 {
    // every variant is listed in its table
    table.iter().position(|t| t == item).unwrap_or_default() as i64
}

impl UnOp {
    pub fn code(self) -> i64 {
        position(&UN_OPS, &self)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        from_table(&UN_OPS, 0, code)
    }

    /// Canonical source spelling.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Sin => "SIN",
            Self::Cos => "COS",
            Self::Sqrt => "SQRT",
            Self::Ln => "LN",
            Self::Not => "!",
            Self::Out => "OUT",
            Self::OutS => "OUT_S",
            Self::In => "IN",
            Self::Ret => "Return of the King",
        }
    }

    /// Stack machine mnemonic. `Ret` is lowered to `POP rax` + `ret` instead.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Sin => "SIN",
            Self::Cos => "COS",
            Self::Sqrt => "SQRT",
            Self::Ln => "LN",
            Self::Not => "NOT",
            Self::Out => "OUT",
            Self::OutS => "OUT_S",
            Self::In => "IN",
            Self::Ret => "ret",
        }
    }

    /// Operators that may only start a statement, never appear inside an expression.
    pub fn is_statement_only(self) -> bool {
        matches!(self, Self::Out | Self::OutS | Self::Ret)
    }
}

impl BinOp {
    pub fn code(self) -> i64 {
        BIN_OP_BASE + position(&BIN_OPS, &self)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        from_table(&BIN_OPS, BIN_OP_BASE, code)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Pow => "POW",
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Ne => "!=",
            Self::Assign => "Give him",
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Pow => "POW",
            Self::Eq => "IS_EQUAL",
            Self::Gt => "GREATER",
            Self::Lt => "LESS",
            Self::Ge => "GOE",
            Self::Le => "LOE",
            Self::Ne => "NOT_EQUAL",
            Self::Assign => "ASSUME",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Gt | Self::Lt | Self::Ge | Self::Le | Self::Ne
        )
    }

    pub fn is_additive(self) -> bool {
        matches!(self, Self::Add | Self::Sub)
    }

    pub fn is_multiplicative(self) -> bool {
        matches!(self, Self::Mul | Self::Div | Self::Pow)
    }
}

impl KeyOp {
    pub fn code(self) -> i64 {
        KEY_OP_BASE + position(&KEY_OPS, &self)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        from_table(&KEY_OPS, KEY_OP_BASE, code)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::If => "One does not simply walk into Mordor",
            Self::While => "So it begins",
        }
    }
}

impl Punct {
    pub fn code(self) -> i64 {
        PUNCT_BASE + position(&PUNCTS, &self)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        from_table(&PUNCTS, PUNCT_BASE, code)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Separator => "Precious",
            Self::EndOfStream => "end of input",
            Self::OpenParen => "Unexpected",
            Self::CloseParen => "Journey",
            Self::OpenBrace => "Black",
            Self::CloseBrace => "Gates",
            Self::AssignEnd => "A pony",
            Self::FuncDef => "Mellon",
            Self::ArgsBegin => "Fellowship",
            Self::ArgsEnd => "of the Ring",
            Self::Comma => "Gollum",
        }
    }
}

macro_rules! keyword_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.keyword())
                }
            }
        )*
    };
}

keyword_display!(UnOp, BinOp, KeyOp, Punct);

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn codes_follow_the_shared_numbering() {
        check!(UnOp::Sin.code() == 0);
        check!(UnOp::Ret.code() == 8);
        check!(BinOp::Add.code() == 9);
        check!(BinOp::Assign.code() == 20);
        check!(KeyOp::If.code() == 21);
        check!(KeyOp::While.code() == 22);
        check!(Punct::Separator.code() == 23);
        check!(Punct::Comma.code() == 33);
    }

    #[test]
    fn codes_decode_back() {
        for op in UN_OPS {
            let_assert!(Some(back) = UnOp::from_code(op.code()));
            check!(back == op);
        }
        for op in BIN_OPS {
            let_assert!(Some(back) = BinOp::from_code(op.code()));
            check!(back == op);
        }
        for op in KEY_OPS {
            check!(KeyOp::from_code(op.code()) == Some(op));
        }
        for punct in PUNCTS {
            check!(Punct::from_code(punct.code()) == Some(punct));
        }
    }

    #[test]
    fn codes_outside_a_family_are_rejected() {
        check!(UnOp::from_code(9).is_none());
        check!(BinOp::from_code(8).is_none());
        check!(BinOp::from_code(21).is_none());
        check!(KeyOp::from_code(-1).is_none());
        check!(Punct::from_code(34).is_none());
    }
}
