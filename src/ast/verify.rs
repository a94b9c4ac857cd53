//! Whole-tree consistency checks run between parsing and code generation.
//!
//! Findings are accumulated into a bitmask instead of stopping at the first one;
//! the mask is small enough to be used directly as a process exit status.
use core::borrow::Borrow;

use tracing::debug;

use super::{NodeId, NodeKind, Tree};
use crate::ops::{KeyOp, UnOp};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[error("tree verification failed: {}", flag_names(.0))]
pub struct VerifyErrors(u8);

impl VerifyErrors {
    pub const ROOT_MISSING: Self = Self(1);
    /// Also raised for child links that point outside the arena
    pub const CYCLE_FOUND: Self = Self(1 << 1);
    pub const NO_TYPE: Self = Self(1 << 2);
    pub const OPERATION_WRONG_CHILDREN: Self = Self(1 << 3);
    pub const NUMBER_WRONG_CHILDREN: Self = Self(1 << 4);
    pub const VARIABLE_WRONG_CHILDREN: Self = Self(1 << 5);
    pub const UNRESOLVED_INDEX: Self = Self(1 << 6);
    pub const CALL_ARITY: Self = Self(1 << 7);

    const NAMES: [(Self, &'static str); 8] = [
        (Self::ROOT_MISSING, "ROOT_MISSING"),
        (Self::CYCLE_FOUND, "CYCLE_FOUND"),
        (Self::NO_TYPE, "NO_TYPE"),
        (Self::OPERATION_WRONG_CHILDREN, "OPERATION_WRONG_CHILDREN"),
        (Self::NUMBER_WRONG_CHILDREN, "NUMBER_WRONG_CHILDREN"),
        (Self::VARIABLE_WRONG_CHILDREN, "VARIABLE_WRONG_CHILDREN"),
        (Self::UNRESOLVED_INDEX, "UNRESOLVED_INDEX"),
        (Self::CALL_ARITY, "CALL_ARITY"),
    ];

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    /// Names of the raised flags joined with `|`.
    pub fn names(self) -> String {
        flag_names(self.0)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl core::ops::BitOr for VerifyErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

fn flag_names(bits: impl Borrow<u8>) -> String {
    let errors = VerifyErrors(*bits.borrow());
    let names = VerifyErrors::NAMES
        .iter()
        .filter(|(flag, _)| errors.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>();
    if names.is_empty() {
        String::from("no errors")
    } else {
        names.join(" | ")
    }
}

struct Definition {
    index: usize,
    params: usize,
}

struct Call {
    index: usize,
    args: usize,
}

struct Verifier<'t> {
    tree: &'t Tree,
    errors: VerifyErrors,
    visited: Vec<bool>,
    reached: usize,
    definitions: Vec<Definition>,
    calls: Vec<Call>,
}

impl<'t> Verifier<'t> {
    fn child_kind(&self, id: Option<NodeId>) -> Option<NodeKind> {
        id.and_then(|id| self.tree.kind(id))
    }

    fn chain_len(&self, head: Option<NodeId>) -> usize {
        // bounded so a cyclic chain cannot spin forever
        self.tree.chain_items(head).take(self.tree.nodes.len()).count()
    }

    fn walk(&mut self, root: NodeId) {
        let tree = self.tree;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = tree.get(id) else {
                self.errors.insert(VerifyErrors::CYCLE_FOUND);
                continue;
            };
            if std::mem::replace(&mut self.visited[id.0], true) {
                self.errors.insert(VerifyErrors::CYCLE_FOUND);
                continue;
            }
            self.reached += 1;
            self.check(node.kind, node.left, node.right);
            // right first so the left subtree is visited first
            stack.extend(node.right);
            stack.extend(node.left);
        }
    }

    fn check(&mut self, kind: NodeKind, left: Option<NodeId>, right: Option<NodeId>) {
        use VerifyErrors as E;

        let has_both = left.is_some() && right.is_some();
        match kind {
            NodeKind::NoType => self.errors.insert(E::NO_TYPE),
            NodeKind::Separator => {}
            NodeKind::BinOp(op) => {
                let target_ok = op != crate::ops::BinOp::Assign
                    || matches!(self.child_kind(left), Some(NodeKind::Variable(_)));
                if !has_both || !target_ok {
                    self.errors.insert(E::OPERATION_WRONG_CHILDREN);
                }
            }
            NodeKind::UnOp(op) => {
                let operand_ok = op != UnOp::In
                    || matches!(self.child_kind(right), Some(NodeKind::Variable(_)));
                if left.is_some() || right.is_none() || !operand_ok {
                    self.errors.insert(E::OPERATION_WRONG_CHILDREN);
                }
            }
            NodeKind::KeyOp(KeyOp::If | KeyOp::While) => {
                if left.is_none() || self.child_kind(right) != Some(NodeKind::Separator) {
                    self.errors.insert(E::OPERATION_WRONG_CHILDREN);
                }
            }
            NodeKind::Number(_) => {
                if left.is_some() || right.is_some() {
                    self.errors.insert(E::NUMBER_WRONG_CHILDREN);
                }
            }
            NodeKind::Variable(index) => {
                if left.is_some() || right.is_some() {
                    self.errors.insert(E::VARIABLE_WRONG_CHILDREN);
                }
                if !self.tree.vars.contains_index(index) {
                    self.errors.insert(E::UNRESOLVED_INDEX);
                }
            }
            NodeKind::Function(index) => {
                if !self.tree.funcs.contains_index(index) {
                    self.errors.insert(E::UNRESOLVED_INDEX);
                }
                match left {
                    None => {
                        let args = self.chain_len(right);
                        self.calls.push(Call { index, args });
                    }
                    Some(header) => match self.tree.get(header) {
                        Some(node) if node.kind == NodeKind::Separator => {
                            let params = self.chain_len(node.right);
                            self.definitions.push(Definition { index, params });
                        }
                        _ => self.errors.insert(E::OPERATION_WRONG_CHILDREN),
                    },
                }
            }
        }
    }

    fn check_calls(&mut self) {
        for call in &self.calls {
            match self.definitions.iter().find(|def| def.index == call.index) {
                None => self.errors.insert(VerifyErrors::UNRESOLVED_INDEX),
                Some(def) if def.params != call.args => {
                    self.errors.insert(VerifyErrors::CALL_ARITY)
                }
                Some(_) => {}
            }
        }
    }
}

/// Check acyclicity, node-count consistency, per-kind arity and symbol resolution.
///
/// Never mutates the tree; an empty mask means the tree is fit for code generation.
pub fn verify(tree: &Tree) -> VerifyErrors {
    let Some(root) = tree.root() else {
        return VerifyErrors::ROOT_MISSING;
    };

    let mut verifier = Verifier {
        tree,
        errors: VerifyErrors::empty(),
        visited: vec![false; tree.nodes.len()],
        reached: 0,
        definitions: Vec::new(),
        calls: Vec::new(),
    };
    verifier.walk(root);
    if verifier.reached != tree.live() {
        verifier.errors.insert(VerifyErrors::CYCLE_FOUND);
    }
    verifier.check_calls();

    debug!(
        reached = verifier.reached,
        live = tree.live(),
        errors = %verifier.errors.names(),
        "verified tree"
    );
    verifier.errors
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{verify, VerifyErrors};
    use crate::{
        ast::{NodeKind, Tree},
        ops::{BinOp, UnOp},
    };

    /// `main` returning `x + 1` after assigning `x`.
    fn sound_tree() -> Tree {
        let mut tree = Tree::new();
        let x = tree.vars.intern("x");
        let main = tree.funcs.intern("main");
        let target = tree.leaf(NodeKind::Variable(x));
        let two = tree.leaf(NodeKind::Number(2.0));
        let assign = tree.node(NodeKind::BinOp(BinOp::Assign), Some(target), Some(two));
        let lhs = tree.leaf(NodeKind::Variable(x));
        let one = tree.leaf(NodeKind::Number(1.0));
        let sum = tree.node(NodeKind::BinOp(BinOp::Add), Some(lhs), Some(one));
        let ret = tree.node(NodeKind::UnOp(UnOp::Ret), None, Some(sum));
        let body = tree.chain([assign, ret]);
        let header = tree.node(NodeKind::Separator, body, None);
        let def = tree.node(NodeKind::Function(main), Some(header), None);
        tree.set_root(Some(def));
        tree
    }

    #[test]
    fn sound_tree_passes() {
        check!(verify(&sound_tree()).is_empty());
    }

    #[test]
    fn missing_root() {
        check!(verify(&Tree::new()) == VerifyErrors::ROOT_MISSING);
    }

    #[test]
    fn binary_operator_with_one_child() {
        let mut tree = sound_tree();
        let one = tree.leaf(NodeKind::Number(1.0));
        let bad = tree.node(NodeKind::BinOp(BinOp::Mul), Some(one), None);
        let ret = tree.node(NodeKind::UnOp(UnOp::Ret), None, Some(bad));
        let body = tree.chain([ret]);
        let header = tree.node(NodeKind::Separator, body, None);
        let f = tree.funcs.intern("f");
        let def = tree.node(NodeKind::Function(f), Some(header), tree.root());
        tree.set_root(Some(def));

        let errors = verify(&tree);
        check!(errors == VerifyErrors::OPERATION_WRONG_CHILDREN);
        check!(errors.bits() == 8);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut tree = sound_tree();
        let_assert!(Some(root) = tree.root());
        let_assert!(Some(header) = tree.get(root).and_then(|n| n.left));
        tree.set_children(header, Some(root), None);
        check!(verify(&tree).contains(VerifyErrors::CYCLE_FOUND));
    }

    #[test]
    fn unreachable_node_breaks_the_count() {
        let mut tree = sound_tree();
        tree.leaf(NodeKind::Number(7.0));
        check!(verify(&tree) == VerifyErrors::CYCLE_FOUND);
    }

    #[test]
    fn findings_accumulate() {
        let mut tree = sound_tree();
        let nothing = tree.leaf(NodeKind::NoType);
        let seven = tree.leaf(NodeKind::Number(7.0));
        let bad_number = tree.node(NodeKind::Number(1.0), Some(seven), None);
        let ghost = tree.leaf(NodeKind::Variable(40));
        let out = tree.node(NodeKind::UnOp(UnOp::Out), None, Some(ghost));
        let body = tree.chain([nothing, bad_number, out]);
        let header = tree.node(NodeKind::Separator, body, None);
        let f = tree.funcs.intern("f");
        let def = tree.node(NodeKind::Function(f), Some(header), tree.root());
        tree.set_root(Some(def));

        let errors = verify(&tree);
        check!(
            errors
                == VerifyErrors::NO_TYPE
                    | VerifyErrors::NUMBER_WRONG_CHILDREN
                    | VerifyErrors::UNRESOLVED_INDEX
        );
        check!(errors.names() == "NO_TYPE | NUMBER_WRONG_CHILDREN | UNRESOLVED_INDEX");
        check!(errors.to_string().starts_with("tree verification failed: NO_TYPE"));
    }

    #[test]
    fn calls_must_match_a_definition() {
        let mut tree = Tree::new();
        let main = tree.funcs.intern("main");
        let helper = tree.funcs.intern("helper");
        let arg = tree.leaf(NodeKind::Number(1.0));
        let args = tree.chain([arg]);
        let call = tree.node(NodeKind::Function(helper), None, args);
        let body = tree.chain([call]);
        let header = tree.node(NodeKind::Separator, body, None);
        let def = tree.node(NodeKind::Function(main), Some(header), None);
        tree.set_root(Some(def));
        check!(verify(&tree) == VerifyErrors::UNRESOLVED_INDEX);

        let no_params = tree.leaf(NodeKind::Separator);
        let helper_def = tree.node(NodeKind::Function(helper), Some(no_params), Some(def));
        tree.set_root(Some(helper_def));
        check!(verify(&tree) == VerifyErrors::CALL_ARITY);
    }
}
