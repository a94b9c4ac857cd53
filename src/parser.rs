//! Recursive-descent parser building a [`Tree`] from tokens.
//!
//! ```text
//! Program    := Function+ EndOfStream
//! Function   := Mellon FuncName FuncArgs? Body
//! FuncArgs   := Fellowship (Variable (Gollum Variable)*)? of the Ring
//! Body       := Black Statement* Gates
//! Statement  := (Assign | If | While | Call | Return | Output | Input) Precious
//! Assign     := Give him Variable A pony Comparison
//! If         := One does not simply walk into Mordor Primary Body Body?
//! While      := So it begins Primary Body
//! Call       := FuncName CallArgs?
//! CallArgs   := Fellowship (Expression (Gollum Expression)*)? of the Ring
//! Return     := Return of the King Comparison
//! Output     := (OUT | OUT_S) Expression
//! Input      := IN Variable
//! Comparison := Expression (CmpOp Expression)?
//! Expression := Term ((ADD | SUB) Term)*
//! Term       := Primary ((MUL | DIV | POW) Primary)*
//! Primary    := Unexpected Comparison Journey | UnaryOp Expression | IN Variable | Value
//! Value      := Number | Variable | Call
//! ```
//!
//! There is no error recovery: the first mismatch ends the parse.
use core::fmt;

use tracing::{debug, warn};

use crate::{
    ast::{NodeId, NodeKind, Tree},
    lexer::{Span, Token, TokenKind},
    ops::{BinOp, KeyOp, Punct, UnOp},
    symbols::SymbolIndex,
};

pub mod functions;

/// What the parser was looking for when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Punct(Punct),
    Variable,
    FunctionName,
    Statement,
    Expression,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punct(Punct::EndOfStream) => f.write_str("end of input"),
            Self::Punct(punct) => write!(f, "`{punct}`"),
            Self::Variable => f.write_str("a variable"),
            Self::FunctionName => f.write_str("a function name"),
            Self::Statement => f.write_str("a statement"),
            Self::Expression => f.write_str("an expression"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: Expected,
        found: TokenKind,
        span: Span,
    },
    #[error("function `{name}` is defined more than once")]
    Redefinition { name: Box<str>, span: Span },
    #[error("comparisons cannot be chained, found a second `{op}`")]
    ChainedComparison { op: BinOp, span: Span },
}

impl SyntaxError {
    pub fn span(&self) -> Span {
        match self {
            Self::Unexpected { span, .. }
            | Self::Redefinition { span, .. }
            | Self::ChainedComparison { span, .. } => span.clone(),
        }
    }
}

struct Definition {
    index: SymbolIndex,
    body: Option<NodeId>,
    params: Option<NodeId>,
}

/// Cursor over the token sequence, always ending in [`Punct::EndOfStream`].
struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
    eos: Token,
}

impl<'a> TokenStream<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let end = tokens.last().map_or(0, |token| token.span.end);
        Self {
            tokens,
            pos: 0,
            eos: Token {
                kind: TokenKind::Punct(Punct::EndOfStream),
                span: end..end,
            },
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eos)
    }

    fn advance(&mut self) -> &Token {
        let token = self.tokens.get(self.pos).unwrap_or(&self.eos);
        self.pos += 1;
        token
    }

    fn at(&self, punct: Punct) -> bool {
        self.peek().is_punct(punct)
    }

    fn unexpected(&self, expected: Expected) -> SyntaxError {
        let token = self.peek();
        SyntaxError::Unexpected {
            expected,
            found: token.kind.clone(),
            span: token.span.clone(),
        }
    }

    fn expect(&mut self, punct: Punct) -> Result<(), SyntaxError> {
        if self.at(punct) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(Expected::Punct(punct)))
        }
    }
}

pub struct Parser<'a> {
    stream: TokenStream<'a>,
    tree: Tree,
}

impl<'a> Parser<'a> {
    /// `tree` should already hold the function table filled by
    /// [`functions::register_functions`] for these tokens.
    pub fn new(tokens: &'a [Token], tree: Tree) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            tree,
        }
    }

    /// Parse the whole program and attach it as the tree root.
    ///
    /// The definition named `entry` becomes the root, falling back to the first one.
    pub fn parse_program(mut self, entry: &str) -> Result<Tree, SyntaxError> {
        let mut defs = Vec::new();
        loop {
            defs.push(self.function()?);
            if self.stream.at(Punct::EndOfStream) {
                break;
            }
        }

        let entry_pos = self
            .tree
            .funcs
            .lookup(entry)
            .and_then(|index| defs.iter().position(|def| def.index == index))
            .unwrap_or_default();
        let entry_def = defs.remove(entry_pos);
        if entry_def.params.is_some() {
            warn!(
                name = self.tree.funcs.resolve(entry_def.index).unwrap_or_default(),
                "parameters of the entry function are never bound"
            );
        }
        defs.insert(0, entry_def);

        let mut next = None;
        for def in defs.into_iter().rev() {
            let header = self.tree.node(NodeKind::Separator, def.body, def.params);
            next = Some(
                self.tree
                    .node(NodeKind::Function(def.index), Some(header), next),
            );
        }
        self.tree.set_root(next);

        debug!(
            nodes = self.tree.live(),
            vars = self.tree.vars.len(),
            funcs = self.tree.funcs.len(),
            "parsed program"
        );
        Ok(self.tree)
    }

    fn function(&mut self) -> Result<Definition, SyntaxError> {
        self.stream.expect(Punct::FuncDef)?;
        let index = self.function_name()?;
        let params = if self.stream.at(Punct::ArgsBegin) {
            self.params()?
        } else {
            None
        };
        let body = self.body()?;
        Ok(Definition {
            index,
            body,
            params,
        })
    }

    fn function_name(&mut self) -> Result<SymbolIndex, SyntaxError> {
        if let TokenKind::Function(name) = &self.stream.peek().kind {
            if let Some(index) = self.tree.funcs.lookup(name) {
                self.stream.advance();
                return Ok(index);
            }
        }
        Err(self.stream.unexpected(Expected::FunctionName))
    }

    fn params(&mut self) -> Result<Option<NodeId>, SyntaxError> {
        self.stream.expect(Punct::ArgsBegin)?;
        let mut params = Vec::new();
        if !self.stream.at(Punct::ArgsEnd) {
            params.push(self.variable()?);
            while self.stream.at(Punct::Comma) {
                self.stream.advance();
                params.push(self.variable()?);
            }
        }
        self.stream.expect(Punct::ArgsEnd)?;
        Ok(self.tree.chain(params))
    }

    fn body(&mut self) -> Result<Option<NodeId>, SyntaxError> {
        self.stream.expect(Punct::OpenBrace)?;
        let mut statements = Vec::new();
        while !self.stream.at(Punct::CloseBrace) {
            statements.push(self.statement()?);
        }
        self.stream.expect(Punct::CloseBrace)?;
        Ok(self.tree.chain(statements))
    }

    fn statement(&mut self) -> Result<NodeId, SyntaxError> {
        let statement = match self.stream.peek().kind {
            TokenKind::BinOp(BinOp::Assign) => self.assign()?,
            TokenKind::KeyOp(KeyOp::If) => self.if_statement()?,
            TokenKind::KeyOp(KeyOp::While) => self.while_statement()?,
            TokenKind::Function(_) => self.call()?,
            TokenKind::UnOp(UnOp::Ret) => {
                self.stream.advance();
                let value = self.comparison()?;
                self.tree
                    .node(NodeKind::UnOp(UnOp::Ret), None, Some(value))
            }
            TokenKind::UnOp(op @ (UnOp::Out | UnOp::OutS)) => {
                self.stream.advance();
                let value = self.expression()?;
                self.tree.node(NodeKind::UnOp(op), None, Some(value))
            }
            TokenKind::UnOp(UnOp::In) => self.input()?,
            _ => return Err(self.stream.unexpected(Expected::Statement)),
        };
        self.stream.expect(Punct::Separator)?;
        Ok(statement)
    }

    fn assign(&mut self) -> Result<NodeId, SyntaxError> {
        self.stream.advance();
        let target = self.variable()?;
        self.stream.expect(Punct::AssignEnd)?;
        let value = self.comparison()?;
        Ok(self
            .tree
            .node(NodeKind::BinOp(BinOp::Assign), Some(target), Some(value)))
    }

    fn if_statement(&mut self) -> Result<NodeId, SyntaxError> {
        self.stream.advance();
        let condition = self.primary()?;
        let then_branch = self.body()?;
        let else_branch = if self.stream.at(Punct::OpenBrace) {
            self.body()?
        } else {
            None
        };
        let branches = self
            .tree
            .node(NodeKind::Separator, then_branch, else_branch);
        Ok(self
            .tree
            .node(NodeKind::KeyOp(KeyOp::If), Some(condition), Some(branches)))
    }

    fn while_statement(&mut self) -> Result<NodeId, SyntaxError> {
        self.stream.advance();
        let condition = self.primary()?;
        let body = self.body()?;
        let branches = self.tree.node(NodeKind::Separator, body, None);
        Ok(self
            .tree
            .node(NodeKind::KeyOp(KeyOp::While), Some(condition), Some(branches)))
    }

    fn input(&mut self) -> Result<NodeId, SyntaxError> {
        self.stream.advance();
        let target = self.variable()?;
        Ok(self.tree.node(NodeKind::UnOp(UnOp::In), None, Some(target)))
    }

    fn call(&mut self) -> Result<NodeId, SyntaxError> {
        let index = self.function_name()?;
        let mut args = Vec::new();
        if self.stream.at(Punct::ArgsBegin) {
            self.stream.advance();
            if !self.stream.at(Punct::ArgsEnd) {
                args.push(self.expression()?);
                while self.stream.at(Punct::Comma) {
                    self.stream.advance();
                    args.push(self.expression()?);
                }
            }
            self.stream.expect(Punct::ArgsEnd)?;
        }
        let args = self.tree.chain(args);
        Ok(self.tree.node(NodeKind::Function(index), None, args))
    }

    fn comparison_op(&self) -> Option<BinOp> {
        match self.stream.peek().kind {
            TokenKind::BinOp(op) if op.is_comparison() => Some(op),
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<NodeId, SyntaxError> {
        let lhs = self.expression()?;
        let Some(op) = self.comparison_op() else {
            return Ok(lhs);
        };
        self.stream.advance();
        let rhs = self.expression()?;
        if let Some(op) = self.comparison_op() {
            return Err(SyntaxError::ChainedComparison {
                op,
                span: self.stream.peek().span.clone(),
            });
        }
        Ok(self.tree.node(NodeKind::BinOp(op), Some(lhs), Some(rhs)))
    }

    fn expression(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.term()?;
        while let TokenKind::BinOp(op) = self.stream.peek().kind {
            if !op.is_additive() {
                break;
            }
            self.stream.advance();
            let rhs = self.term()?;
            lhs = self.tree.node(NodeKind::BinOp(op), Some(lhs), Some(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.primary()?;
        while let TokenKind::BinOp(op) = self.stream.peek().kind {
            if !op.is_multiplicative() {
                break;
            }
            self.stream.advance();
            let rhs = self.primary()?;
            lhs = self.tree.node(NodeKind::BinOp(op), Some(lhs), Some(rhs));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<NodeId, SyntaxError> {
        match self.stream.peek().kind {
            TokenKind::Punct(Punct::OpenParen) => {
                self.stream.advance();
                let inner = self.comparison()?;
                self.stream.expect(Punct::CloseParen)?;
                Ok(inner)
            }
            TokenKind::UnOp(UnOp::In) => self.input(),
            TokenKind::UnOp(op) if !op.is_statement_only() => {
                self.stream.advance();
                let operand = self.expression()?;
                Ok(self.tree.node(NodeKind::UnOp(op), None, Some(operand)))
            }
            _ => self.value(),
        }
    }

    fn value(&mut self) -> Result<NodeId, SyntaxError> {
        match self.stream.peek().kind {
            TokenKind::Number(value) => {
                self.stream.advance();
                Ok(self.tree.leaf(NodeKind::Number(value)))
            }
            TokenKind::Variable(_) => self.variable(),
            TokenKind::Function(_) => self.call(),
            _ => Err(self.stream.unexpected(Expected::Expression)),
        }
    }

    fn variable(&mut self) -> Result<NodeId, SyntaxError> {
        let TokenKind::Variable(name) = &self.stream.peek().kind else {
            return Err(self.stream.unexpected(Expected::Variable));
        };
        let index = self.tree.vars.intern(name);
        self.stream.advance();
        Ok(self.tree.leaf(NodeKind::Variable(index)))
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{Expected, SyntaxError};
    use crate::{
        ast::{NodeId, NodeKind, Tree},
        lexer::TokenKind,
        ops::{BinOp, KeyOp, Punct, UnOp},
        parse, CompileError, CompileOptions,
    };

    fn parsed(source: &str) -> Tree {
        let_assert!(Ok(tree) = parse(source, &CompileOptions::default()));
        tree
    }

    fn syntax_error(source: &str) -> SyntaxError {
        let_assert!(
            Err(CompileError::Syntax(err)) = parse(source, &CompileOptions::default())
        );
        err
    }

    fn left(tree: &Tree, id: NodeId) -> NodeId {
        let_assert!(Some(child) = tree.get(id).and_then(|node| node.left));
        child
    }

    fn right(tree: &Tree, id: NodeId) -> NodeId {
        let_assert!(Some(child) = tree.get(id).and_then(|node| node.right));
        child
    }

    /// First statement of the entry function.
    fn first_statement(tree: &Tree) -> NodeId {
        let_assert!(Some(root) = tree.root());
        let header = left(tree, root);
        let body = left(tree, header);
        left(tree, body)
    }

    #[test]
    fn definition_shape() {
        let tree = parsed(
            "Mellon main Black Give him x A pony 2 Precious Return of the King x Precious Gates",
        );
        let_assert!(Some(root) = tree.root());
        check!(tree.kind(root) == Some(NodeKind::Function(0)));
        let header = left(&tree, root);
        check!(tree.kind(header) == Some(NodeKind::Separator));
        let statements = tree
            .chain_items(tree.get(header).and_then(|node| node.left))
            .flatten()
            .filter_map(|id| tree.kind(id))
            .collect::<Vec<_>>();
        check!(
            statements
                == [
                    NodeKind::BinOp(BinOp::Assign),
                    NodeKind::UnOp(UnOp::Ret)
                ]
        );
        check!(tree.vars.lookup("x") == Some(0));
    }

    #[test]
    fn precedence_and_associativity() {
        let tree = parsed("Mellon main Black Give him r A pony 1 - 2 - 3 * 4 Precious Gates");
        let assign = first_statement(&tree);
        // (1 - 2) - (3 * 4)
        let outer = right(&tree, assign);
        check!(tree.kind(outer) == Some(NodeKind::BinOp(BinOp::Sub)));
        check!(tree.kind(left(&tree, outer)) == Some(NodeKind::BinOp(BinOp::Sub)));
        check!(tree.kind(right(&tree, outer)) == Some(NodeKind::BinOp(BinOp::Mul)));
    }

    #[test]
    fn parentheses_and_unary_operators() {
        let tree = parsed(
            "Mellon main Black Give him r A pony SQRT Unexpected a + b Journey * 2 Precious Gates",
        );
        let assign = first_statement(&tree);
        // the unary operand is a whole expression
        let sqrt = right(&tree, assign);
        check!(tree.kind(sqrt) == Some(NodeKind::UnOp(UnOp::Sqrt)));
        check!(tree.get(sqrt).and_then(|node| node.left).is_none());
        check!(tree.kind(right(&tree, sqrt)) == Some(NodeKind::BinOp(BinOp::Mul)));
    }

    #[test]
    fn if_with_else() {
        let tree = parsed(
            "Mellon main Black \
             One does not simply walk into Mordor Unexpected x > 1 Journey \
             Black OUT 1 Precious Gates Black OUT 2 Precious Gates Precious Gates",
        );
        let branch = first_statement(&tree);
        check!(tree.kind(branch) == Some(NodeKind::KeyOp(KeyOp::If)));
        check!(tree.kind(left(&tree, branch)) == Some(NodeKind::BinOp(BinOp::Gt)));
        let arms = right(&tree, branch);
        check!(tree.kind(arms) == Some(NodeKind::Separator));
        check!(tree.kind(left(&tree, arms)) == Some(NodeKind::Separator));
        check!(tree.kind(right(&tree, arms)) == Some(NodeKind::Separator));
    }

    #[test]
    fn while_has_no_false_branch() {
        let tree = parsed(
            "Mellon main Black So it begins x Black Give him x A pony x - 1 Precious Gates Precious Gates",
        );
        let looping = first_statement(&tree);
        check!(tree.kind(looping) == Some(NodeKind::KeyOp(KeyOp::While)));
        let arms = right(&tree, looping);
        check!(tree.get(arms).and_then(|node| node.right).is_none());
    }

    #[test]
    fn entry_becomes_root() {
        let tree = parsed(
            "Mellon helper Fellowship a Gollum b of the Ring Black Return of the King a Precious Gates \
             Mellon main Black Return of the King helper Fellowship 1 Gollum 2 of the Ring Precious Gates",
        );
        let defs = tree
            .definitions()
            .filter_map(|id| tree.kind(id))
            .collect::<Vec<_>>();
        check!(defs == [NodeKind::Function(1), NodeKind::Function(0)]);
        check!(tree.funcs.lookup("main") == Some(1));
    }

    #[test]
    fn first_definition_is_entry_without_main() {
        let tree = parsed("Mellon start Black Gates Mellon other Black Gates");
        let defs = tree
            .definitions()
            .filter_map(|id| tree.kind(id))
            .collect::<Vec<_>>();
        check!(defs == [NodeKind::Function(0), NodeKind::Function(1)]);
    }

    #[test]
    fn call_statement_without_arguments() {
        let tree = parsed("Mellon main Black ping Precious Gates Mellon ping Black Gates");
        let call = first_statement(&tree);
        check!(tree.kind(call) == Some(NodeKind::Function(1)));
        check!(tree.get(call).is_some_and(|node| node.is_leaf()));
    }

    #[test]
    fn every_created_node_is_reachable() {
        let tree = parsed(
            "Mellon main Black IN n Precious Give him s A pony IN m + COS n Precious \
             OUT s Precious OUT_S s Precious Gates",
        );
        check!(crate::ast::verify(&tree).is_empty());
    }

    #[test]
    fn missing_separator() {
        let err = syntax_error("Mellon main Black Give him x A pony 2 Gates");
        let_assert!(
            SyntaxError::Unexpected {
                expected: Expected::Punct(Punct::Separator),
                found: TokenKind::Punct(Punct::CloseBrace),
                span,
            } = err
        );
        check!(span == (38..43));
    }

    #[test]
    fn chained_comparison() {
        let err = syntax_error("Mellon main Black Give him x A pony 1 < 2 < 3 Precious Gates");
        let_assert!(SyntaxError::ChainedComparison { op: BinOp::Lt, .. } = err);
    }

    #[test]
    fn statement_only_operator_in_expression() {
        let err = syntax_error("Mellon main Black Give him x A pony OUT 1 Precious Gates");
        let_assert!(
            SyntaxError::Unexpected {
                expected: Expected::Expression,
                found: TokenKind::UnOp(UnOp::Out),
                ..
            } = err
        );
    }

    #[test]
    fn bare_expression_is_not_a_statement() {
        let err = syntax_error("Mellon main Black x Precious Gates");
        let_assert!(
            SyntaxError::Unexpected {
                expected: Expected::Statement,
                ..
            } = err
        );
    }

    #[test]
    fn empty_program() {
        let err = syntax_error("   ");
        let_assert!(
            SyntaxError::Unexpected {
                expected: Expected::Punct(Punct::FuncDef),
                found: TokenKind::Punct(Punct::EndOfStream),
                ..
            } = err
        );
    }

    #[test]
    fn unterminated_body() {
        let err = syntax_error("Mellon main Black OUT 1 Precious");
        let_assert!(
            SyntaxError::Unexpected {
                expected: Expected::Statement,
                found: TokenKind::Punct(Punct::EndOfStream),
                ..
            } = err
        );
    }

    #[test]
    fn redefinition() {
        let err = syntax_error("Mellon f Black Gates Mellon f Black Gates");
        let_assert!(SyntaxError::Redefinition { .. } = err);
    }
}
