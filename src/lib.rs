//! Compiler for the Mellon toy language.
//!
//! Source text goes through [`lexer::tokenize`], the function pre-pass in
//! [`parser::functions`], the recursive-descent [`parser::Parser`], the tree
//! [`verify`](ast::verify) pass and finally [`compiler::generate`], which prints
//! stack-machine assembly.
pub mod ast;
pub mod compiler;
mod error;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod symbols;

use tracing::debug;

pub use ast::{serial::read_tree, verify, NodeId, NodeKind, Tree, VerifyErrors};
pub use error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Name of the function that runs first, under the `:main` label
    pub entry: Box<str>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            entry: Box::from("main"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compilation {
    pub tree: Tree,
    pub assembly: String,
}

/// Lex and parse `source` into an unverified tree.
pub fn parse(source: &str, options: &CompileOptions) -> Result<Tree, CompileError> {
    let mut tokens = lexer::tokenize(source)?;
    let mut tree = Tree::new();
    parser::functions::register_functions(&mut tokens, &mut tree.funcs)?;
    debug!(functions = tree.funcs.len(), "registered functions");
    let tree = parser::Parser::new(&tokens, tree).parse_program(&options.entry)?;
    Ok(tree)
}

pub fn compile(source: &str) -> Result<Compilation, CompileError> {
    compile_with(source, &CompileOptions::default())
}

pub fn compile_with(source: &str, options: &CompileOptions) -> Result<Compilation, CompileError> {
    compile_tree(parse(source, options)?)
}

/// Verify an already built tree and generate its assembly.
pub fn compile_tree(tree: Tree) -> Result<Compilation, CompileError> {
    verify(&tree).into_result()?;
    let assembly = compiler::generate(&tree)?;
    Ok(Compilation { tree, assembly })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use assert2::{check, let_assert};
    use tracing::{span, Event, Level, Metadata, Subscriber};

    use crate::{
        ast::serial::{read_tree, Dump},
        compile, compile_tree, CompileError, VerifyErrors,
    };

    const PROGRAM: &str = "\
        Mellon fact Fellowship n of the Ring Black \
            One does not simply walk into Mordor Unexpected n <= 1 Journey \
                Black Return of the King 1 Precious Gates Precious \
            Return of the King n * fact Fellowship n - 1 of the Ring Precious \
        Gates \
        Mellon main Black IN k Precious OUT fact Fellowship k of the Ring Precious Gates";

    #[test]
    fn dump_round_trip_keeps_shape_and_assembly() {
        let_assert!(Ok(first) = compile(PROGRAM));
        let dumped = Dump(&first.tree).to_string();
        let_assert!(Ok(tree) = read_tree(&dumped));
        check!(tree.same_shape(&first.tree));
        let_assert!(Ok(second) = compile_tree(tree));
        check!(second.assembly == first.assembly);
    }

    #[test]
    fn long_bodies_dump_and_read_back() {
        let body = "OUT 1 Precious ".repeat(50_000);
        let source = format!("Mellon main Black {body}Gates");
        let_assert!(Ok(first) = compile(&source));
        let dumped = Dump(&first.tree).to_string();
        let_assert!(Ok(tree) = read_tree(&dumped));
        check!(tree.same_shape(&first.tree));
        let_assert!(Ok(second) = compile_tree(tree));
        check!(second.assembly == first.assembly);
    }

    /// Counts `WARN` events and ignores everything else.
    struct WarnCounter(Arc<AtomicUsize>);

    impl Subscriber for WarnCounter {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }

        fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

        fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

        fn event(&self, event: &Event<'_>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn enter(&self, _: &span::Id) {}

        fn exit(&self, _: &span::Id) {}
    }

    #[test]
    fn entry_parameters_warn_once() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let result = tracing::subscriber::with_default(WarnCounter(warnings.clone()), || {
            compile("Mellon main Fellowship a of the Ring Black OUT 1 Precious Gates")
        });
        check!(result.is_ok());
        check!(warnings.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn errors_carry_spans() {
        let_assert!(Err(err) = compile("Mellon main Black OUT $ Precious Gates"));
        let_assert!(CompileError::Lex(_) = &err);
        check!(err.span() == Some(22..23));

        let_assert!(Err(err) = compile("Mellon main Black OUT 1 Gates"));
        check!(err.span() == Some(24..29));
    }

    #[test]
    fn verifier_runs_on_dumped_trees() {
        // a call to a function that was never defined
        let_assert!(Ok(tree) = read_tree("( 6 0 ( 0 23 ( 0 23 ( 6 1 _ _ ) _ ) _ ) _ )"));
        let_assert!(Err(CompileError::Verify(errors)) = compile_tree(tree));
        check!(errors == VerifyErrors::UNRESOLVED_INDEX);
        check!(errors.bits() == 64);
    }
}
