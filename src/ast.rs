//! Arena-backed binary syntax tree.
//!
//! Every node lives in one vector owned by the [`Tree`] and links to its children
//! and parent by [`NodeId`]. Statement lists, argument lists and parameter lists are
//! right-linked chains of [`NodeKind::Separator`] nodes holding one item each in
//! their left child.
//!
//! ```text
//! FUNCTION(main)
//! ├── left: SEPARATOR
//! │   ├── left: body chain
//! │   └── right: parameter chain
//! └── right: next definition
//! ```
use core::fmt;

use crate::{
    ops::{BinOp, KeyOp, Punct, UnOp},
    symbols::{SymbolIndex, SymbolTable},
};

pub mod image;
pub mod serial;
pub mod verify;

pub use verify::{verify, VerifyErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Numeric tag written in front of every node by the exchange format.
pub mod tag {
    pub const NO_TYPE: i64 = -1;
    pub const PUNCTUATION: i64 = 0;
    pub const BIN_OP: i64 = 1;
    pub const UN_OP: i64 = 2;
    pub const KEY_OP: i64 = 3;
    pub const NUMBER: i64 = 4;
    pub const VARIABLE: i64 = 5;
    pub const FUNCTION: i64 = 6;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Placeholder that must never reach code generation
    NoType,
    Separator,
    BinOp(BinOp),
    UnOp(UnOp),
    KeyOp(KeyOp),
    Number(f64),
    Variable(SymbolIndex),
    /// A definition when the left child is present, a call otherwise
    Function(SymbolIndex),
}

impl NodeKind {
    pub fn tag(&self) -> i64 {
        match self {
            Self::NoType => tag::NO_TYPE,
            Self::Separator => tag::PUNCTUATION,
            Self::BinOp(_) => tag::BIN_OP,
            Self::UnOp(_) => tag::UN_OP,
            Self::KeyOp(_) => tag::KEY_OP,
            Self::Number(_) => tag::NUMBER,
            Self::Variable(_) => tag::VARIABLE,
            Self::Function(_) => tag::FUNCTION,
        }
    }

    pub fn payload(&self) -> f64 {
        match *self {
            Self::NoType => 0.0,
            Self::Separator => Punct::Separator.code() as f64,
            Self::BinOp(op) => op.code() as f64,
            Self::UnOp(op) => op.code() as f64,
            Self::KeyOp(op) => op.code() as f64,
            Self::Number(value) => value,
            Self::Variable(index) | Self::Function(index) => index as f64,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoType => write!(f, "NO_TYPE"),
            Self::Separator => write!(f, "SEPARATOR"),
            Self::BinOp(op) => write!(f, "{}", op.mnemonic()),
            Self::UnOp(op) => write!(f, "{}", op.mnemonic()),
            Self::KeyOp(KeyOp::If) => write!(f, "IF"),
            Self::KeyOp(KeyOp::While) => write!(f, "WHILE"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Variable(index) => write!(f, "VAR {index}"),
            Self::Function(index) => write!(f, "FUNC {index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Back reference only, never followed when walking down
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn children(&self) -> impl Iterator<Item = NodeId> {
        self.left.into_iter().chain(self.right)
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    live: usize,
    pub vars: SymbolTable,
    pub funcs: SymbolTable,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node, adopting `left` and `right` as its children.
    pub fn node(&mut self, kind: NodeKind, left: Option<NodeId>, right: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            left,
            right,
            parent: None,
        });
        for child in [left, right].into_iter().flatten() {
            if let Some(node) = self.nodes.get_mut(child.0) {
                node.parent = Some(id);
            }
        }
        self.live += 1;
        id
    }

    pub fn leaf(&mut self, kind: NodeKind) -> NodeId {
        self.node(kind, None, None)
    }

    /// Build a right-linked separator chain holding `items` in order.
    pub fn chain(&mut self, items: impl IntoIterator<Item = NodeId>) -> Option<NodeId> {
        let items = items.into_iter().collect::<Vec<_>>();
        items
            .into_iter()
            .rev()
            .fold(None, |next, item| {
                Some(self.node(NodeKind::Separator, Some(item), next))
            })
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.get(id).map(|node| node.kind)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// Relink a child slot. The live counter is left alone, so this is how
    /// a caller can break the shape invariants on purpose.
    pub fn set_children(&mut self, id: NodeId, left: Option<NodeId>, right: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.left = left;
            node.right = right;
        }
    }

    /// Number of nodes created through [`Tree::node`].
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Items of the separator chain starting at `head`, in order.
    pub fn chain_items(&self, head: Option<NodeId>) -> ChainItems<'_> {
        ChainItems { tree: self, next: head }
    }

    /// Definitions hanging off the root, entry first.
    pub fn definitions(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.root;
        core::iter::from_fn(move || {
            let id = next?;
            next = self.get(id)?.right;
            Some(id)
        })
    }

    /// Compare shapes, kinds and payloads, ignoring node ids and symbol names.
    pub fn same_shape(&self, other: &Tree) -> bool {
        let mut pending = vec![(self.root, other.root)];
        while let Some(pair) = pending.pop() {
            match pair {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    let (Some(nx), Some(ny)) = (self.get(x), other.get(y)) else {
                        return false;
                    };
                    if nx.kind.tag() != ny.kind.tag()
                        || nx.kind.payload().to_bits() != ny.kind.payload().to_bits()
                    {
                        return false;
                    }
                    pending.push((nx.right, ny.right));
                    pending.push((nx.left, ny.left));
                }
                _ => return false,
            }
        }
        true
    }
}

pub struct ChainItems<'t> {
    tree: &'t Tree,
    next: Option<NodeId>,
}

impl Iterator for ChainItems<'_> {
    /// `None` items come from separators with an empty left slot.
    type Item = Option<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.next?)?;
        self.next = node.right;
        Some(node.left)
    }
}
