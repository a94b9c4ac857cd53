use crate::{
    ast::{serial::ReadError, VerifyErrors},
    compiler::CodegenError,
    lexer::{LexError, Span},
    parser::SyntaxError,
};

/// Any failure of a compilation run. Every stage is fail-fast, so there is at most one.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("lexical error: {0}")]
    Lex(#[from] LexError),
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("malformed tree dump: {0}")]
    Read(#[from] ReadError),
    #[error(transparent)]
    Verify(#[from] VerifyErrors),
    /// The verifier should have rejected the tree; this is a defect, not a user error.
    #[error("internal code generation error: {0}")]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    /// Source bytes the error points at, for errors raised on text.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lex(err) => Some(err.span.clone()),
            Self::Syntax(err) => Some(err.span()),
            Self::Read(err) => Some(err.span()),
            Self::Verify(_) | Self::Codegen(_) => None,
        }
    }
}
