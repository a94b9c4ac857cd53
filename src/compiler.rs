//! Lower a verified tree into stack-machine assembly.
//!
//! For example:
//!
//! ```text
//! Mellon sq Fellowship n of the Ring Black Return of the King n * n Precious Gates
//! Mellon main Black Give him x A pony sq Fellowship 3 of the Ring Precious Gates
//! ```
//!
//! compiles to
//!
//! ```text
//!     jmp :main
//! :func0
//!     POP [0]
//!     PUSH [0]
//!     PUSH [0]
//!     MUL
//!     POP rax
//!     ret
//! :main
//!     PUSH 3
//!     CALL :func0
//!     PUSH rax
//!     POP [1]
//!     hlt
//! ```
//!
//! Variables live in flat global slots indexed by their symbol index. A call saves
//! every variable its arguments mention before pushing the arguments and restores
//! them afterwards, which is the only protection a caller gets from its callee.
use core::fmt;

use tracing::{debug, trace};

use crate::{
    ast::{Node, NodeId, NodeKind, Tree},
    ops::{BinOp, KeyOp, UnOp},
    symbols::SymbolIndex,
};

pub mod context;

pub use context::CodegenContext;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error("the tree has no root")]
    MissingRoot,
    #[error("link to {0} points outside the tree")]
    Dangling(NodeId),
    #[error("{node} ({kind}) has no lowering rule")]
    NoLowering { node: NodeId, kind: NodeKind },
    #[error("{node} is malformed: {reason}")]
    Malformed { node: NodeId, reason: &'static str },
}

macro_rules! instr {
    ($ctx:expr, $($arg:tt)*) => {
        $ctx.instr(format_args!($($arg)*))
    };
}

macro_rules! label {
    ($ctx:expr, $($arg:tt)*) => {
        $ctx.label(format_args!($($arg)*))
    };
}

/// Jump target of a function.
struct Target {
    index: SymbolIndex,
    entry: SymbolIndex,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == self.entry {
            f.write_str(":main")
        } else {
            write!(f, ":func{}", self.index)
        }
    }
}

struct Generator<'t> {
    tree: &'t Tree,
    ctx: CodegenContext,
    entry: SymbolIndex,
}

impl<'t> Generator<'t> {
    fn node(&self, id: NodeId) -> Result<&'t Node, CodegenError> {
        self.tree.get(id).ok_or(CodegenError::Dangling(id))
    }

    fn child(&self, parent: NodeId, id: Option<NodeId>) -> Result<NodeId, CodegenError> {
        id.ok_or(CodegenError::Malformed {
            node: parent,
            reason: "missing child",
        })
    }

    fn target(&self, index: SymbolIndex) -> Target {
        Target {
            index,
            entry: self.entry,
        }
    }

    fn slot(&self, parent: NodeId, id: Option<NodeId>) -> Result<SymbolIndex, CodegenError> {
        let id = self.child(parent, id)?;
        match self.node(id)?.kind {
            NodeKind::Variable(index) => Ok(index),
            _ => Err(CodegenError::Malformed {
                node: parent,
                reason: "expected a variable",
            }),
        }
    }

    /// Header separator of a definition: body chain left, parameter chain right.
    fn header(&self, def: NodeId) -> Result<(SymbolIndex, &'t Node), CodegenError> {
        let node = self.node(def)?;
        match (node.kind, node.left) {
            (NodeKind::Function(index), Some(header)) => Ok((index, self.node(header)?)),
            _ => Err(CodegenError::Malformed {
                node: def,
                reason: "expected a function definition",
            }),
        }
    }

    fn program(&mut self, root: NodeId) -> Result<(), CodegenError> {
        // parameters of the entry are never bound, the parser warns about them
        let (entry, header) = self.header(root)?;
        self.entry = entry;

        instr!(self.ctx, "jmp :main");
        let tree = self.tree;
        for def in tree.definitions().skip(1) {
            self.definition(def)?;
        }
        label!(self.ctx, ":main");
        self.statements(header.left)?;
        instr!(self.ctx, "hlt");
        Ok(())
    }

    fn definition(&mut self, def: NodeId) -> Result<(), CodegenError> {
        let (index, header) = self.header(def)?;
        trace!(index, "emitting function");
        label!(self.ctx, "{}", self.target(index));

        let params = self
            .tree
            .chain_items(header.right)
            .map(|param| self.slot(def, param))
            .collect::<Result<Vec<_>, _>>()?;
        // the last argument pushed is the last parameter
        for slot in params.iter().rev() {
            instr!(self.ctx, "POP [{slot}]");
        }

        self.statements(header.left)?;
        if !self.ends_with_return(header.left) {
            instr!(self.ctx, "ret");
        }
        Ok(())
    }

    fn ends_with_return(&self, body: Option<NodeId>) -> bool {
        self.tree
            .chain_items(body)
            .last()
            .flatten()
            .and_then(|id| self.tree.kind(id))
            == Some(NodeKind::UnOp(UnOp::Ret))
    }

    fn statements(&mut self, head: Option<NodeId>) -> Result<(), CodegenError> {
        let tree = self.tree;
        for statement in tree.chain_items(head).flatten() {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::BinOp(BinOp::Assign) => {
                self.expression(self.child(id, node.right)?)?;
                let slot = self.slot(id, node.left)?;
                instr!(self.ctx, "POP [{slot}]");
            }
            NodeKind::Function(index) if node.left.is_none() => {
                self.call(index, node.right, false)?;
            }
            NodeKind::UnOp(UnOp::Ret) => {
                self.expression(self.child(id, node.right)?)?;
                instr!(self.ctx, "POP rax");
                instr!(self.ctx, "ret");
            }
            NodeKind::UnOp(UnOp::In) => {
                let slot = self.slot(id, node.right)?;
                instr!(self.ctx, "IN");
                instr!(self.ctx, "POP [{slot}]");
            }
            NodeKind::UnOp(op @ (UnOp::Out | UnOp::OutS)) => {
                self.expression(self.child(id, node.right)?)?;
                instr!(self.ctx, "{}", op.mnemonic());
            }
            NodeKind::KeyOp(KeyOp::If) => self.branch(id, node)?,
            NodeKind::KeyOp(KeyOp::While) => self.looping(id, node)?,
            NodeKind::NoType => {
                return Err(CodegenError::NoLowering {
                    node: id,
                    kind: node.kind,
                })
            }
            _ => {
                return Err(CodegenError::Malformed {
                    node: id,
                    reason: "not a statement",
                })
            }
        }
        Ok(())
    }

    fn arms(&self, id: NodeId, node: &Node) -> Result<(NodeId, &'t Node), CodegenError> {
        let condition = self.child(id, node.left)?;
        let arms = self.node(self.child(id, node.right)?)?;
        if arms.kind != NodeKind::Separator {
            return Err(CodegenError::Malformed {
                node: id,
                reason: "branches are not held by a separator",
            });
        }
        Ok((condition, arms))
    }

    fn branch(&mut self, id: NodeId, node: &Node) -> Result<(), CodegenError> {
        let (condition, arms) = self.arms(id, node)?;
        let n = self.ctx.fresh_if();

        self.expression(condition)?;
        instr!(self.ctx, "PUSH 0");
        instr!(self.ctx, "je :if_false_label{n}");
        self.statements(arms.left)?;
        instr!(self.ctx, "jmp :if_true_label{n}");
        label!(self.ctx, ":if_false_label{n}");
        self.statements(arms.right)?;
        label!(self.ctx, ":if_true_label{n}");
        Ok(())
    }

    fn looping(&mut self, id: NodeId, node: &Node) -> Result<(), CodegenError> {
        let (condition, arms) = self.arms(id, node)?;
        let n = self.ctx.fresh_while();

        label!(self.ctx, ":while_true_label{n}");
        self.expression(condition)?;
        instr!(self.ctx, "PUSH 0");
        instr!(self.ctx, "je :while_false_label{n}");
        self.statements(arms.left)?;
        instr!(self.ctx, "jmp :while_true_label{n}");
        label!(self.ctx, ":while_false_label{n}");
        Ok(())
    }

    fn expression(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::Number(value) => instr!(self.ctx, "PUSH {value}"),
            NodeKind::Variable(index) => instr!(self.ctx, "PUSH [{index}]"),
            NodeKind::BinOp(BinOp::Assign) => {
                return Err(CodegenError::Malformed {
                    node: id,
                    reason: "assignment used as a value",
                })
            }
            NodeKind::BinOp(op) => {
                self.expression(self.child(id, node.left)?)?;
                self.expression(self.child(id, node.right)?)?;
                instr!(self.ctx, "{}", op.mnemonic());
            }
            NodeKind::UnOp(UnOp::In) => {
                let slot = self.slot(id, node.right)?;
                instr!(self.ctx, "IN");
                instr!(self.ctx, "POP [{slot}]");
                instr!(self.ctx, "PUSH [{slot}]");
            }
            NodeKind::UnOp(op) if !op.is_statement_only() => {
                self.expression(self.child(id, node.right)?)?;
                instr!(self.ctx, "{}", op.mnemonic());
            }
            NodeKind::Function(index) if node.left.is_none() => {
                self.call(index, node.right, true)?;
            }
            NodeKind::NoType => {
                return Err(CodegenError::NoLowering {
                    node: id,
                    kind: node.kind,
                })
            }
            _ => {
                return Err(CodegenError::Malformed {
                    node: id,
                    reason: "not a value",
                })
            }
        }
        Ok(())
    }

    /// Variable leaves under `id`, in pre-order.
    fn mentioned_variables(&self, id: Option<NodeId>, found: &mut Vec<SymbolIndex>) {
        let Some(node) = id.and_then(|id| self.tree.get(id)) else {
            return;
        };
        if let NodeKind::Variable(index) = node.kind {
            found.push(index);
        }
        self.mentioned_variables(node.left, found);
        self.mentioned_variables(node.right, found);
    }

    fn call(
        &mut self,
        index: SymbolIndex,
        args: Option<NodeId>,
        as_value: bool,
    ) -> Result<(), CodegenError> {
        let mut saved = Vec::new();
        self.mentioned_variables(args, &mut saved);

        for slot in &saved {
            instr!(self.ctx, "PUSH [{slot}]");
        }
        let tree = self.tree;
        for arg in tree.chain_items(args).flatten() {
            self.expression(arg)?;
        }
        instr!(self.ctx, "CALL {}", self.target(index));
        for slot in saved.iter().rev() {
            instr!(self.ctx, "POP [{slot}]");
        }
        if as_value {
            instr!(self.ctx, "PUSH rax");
        }
        Ok(())
    }
}

/// Generate assembly for a tree that has passed [`crate::ast::verify`].
pub fn generate(tree: &Tree) -> Result<String, CodegenError> {
    generate_with(tree, CodegenContext::new())
}

pub fn generate_with(tree: &Tree, ctx: CodegenContext) -> Result<String, CodegenError> {
    let root = tree.root().ok_or(CodegenError::MissingRoot)?;
    let mut generator = Generator {
        tree,
        ctx,
        entry: 0,
    };
    generator.program(root)?;
    debug!(lines = generator.ctx.lines(), "generated assembly");
    Ok(generator.ctx.finish())
}
