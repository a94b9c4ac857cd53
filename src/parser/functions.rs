//! Function-name pre-pass.
//!
//! Runs over the already lexed tokens before any statement is parsed, so a call may
//! name a function whose definition comes later in the source.
use tracing::trace;

use super::SyntaxError;
use crate::{
    lexer::{Token, TokenKind},
    ops::Punct,
    symbols::SymbolTable,
};

/// Register every name that follows a `Mellon` keyword, then retag matching
/// identifiers as [`TokenKind::Function`].
pub fn register_functions(
    tokens: &mut [Token],
    funcs: &mut SymbolTable,
) -> Result<(), SyntaxError> {
    for pair in tokens.windows(2) {
        let [def, name] = pair else { continue };
        if !def.is_punct(Punct::FuncDef) {
            continue;
        }
        // a missing name is reported by the parser proper
        let TokenKind::Variable(text) = &name.kind else {
            continue;
        };
        if funcs.lookup(text).is_some() {
            return Err(SyntaxError::Redefinition {
                name: text.clone(),
                span: name.span.clone(),
            });
        }
        let index = funcs.intern(text);
        trace!(name = &**text, index, "registered function");
    }

    for token in tokens.iter_mut() {
        if let TokenKind::Variable(text) = &token.kind {
            if funcs.lookup(text).is_some() {
                token.kind = TokenKind::Function(text.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::register_functions;
    use crate::{
        lexer::{tokenize, TokenKind},
        parser::SyntaxError,
        symbols::SymbolTable,
    };

    #[test]
    fn forward_calls_are_retagged() {
        let_assert!(Ok(mut tokens) = tokenize("helper Mellon main Mellon helper x"));
        let mut funcs = SymbolTable::new();
        let_assert!(Ok(()) = register_functions(&mut tokens, &mut funcs));
        check!(funcs.lookup("main") == Some(0));
        check!(funcs.lookup("helper") == Some(1));
        check!(tokens[0].kind == TokenKind::Function(Box::from("helper")));
        check!(tokens[4].kind == TokenKind::Function(Box::from("helper")));
        check!(tokens[5].kind == TokenKind::Variable(Box::from("x")));
    }

    #[test]
    fn duplicate_definition() {
        let_assert!(Ok(mut tokens) = tokenize("Mellon f Mellon g Mellon f"));
        let mut funcs = SymbolTable::new();
        let_assert!(
            Err(SyntaxError::Redefinition { name, span }) = register_functions(&mut tokens, &mut funcs)
        );
        check!(&*name == "f");
        check!(span == (25..26));
    }
}
