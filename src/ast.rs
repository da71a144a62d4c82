//! The abstract syntax tree: an index-based arena rather than a pointer
//! graph. Every node is addressed by a [`NodeId`] into a
//! single flat `Vec<Node>`; children are stored as more `NodeId`s, so the
//! whole tree can be built, walked, and mutated without borrow-checker
//! friction between the parser, resolver, and code generator.
//!
//! `NodeId(0)` is a reserved sentinel meaning "absent" (`lhs`/`rhs` unused
//! by a given `NodeKind`, or an optional child that wasn't written). A
//! node's resolved type, by contrast, is tracked as `Option<TypeId>` rather
//! than overloading index 0 of the *type* table (`TypeId::ANY` is a real,
//! meaningful primitive there) — see `DESIGN.md`.

use crate::lexer::TokenIndex;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The sentinel "no node" value; `lhs`/`rhs` fields use this when a
    /// `NodeKind` doesn't need them.
    pub const NONE: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which extra payload, if any, `extra_data_i` indexes into
/// [`Ast::extra_data`]. Not every `NodeKind` needs one; those that do keep
/// their payload out of line so [`Node`] itself stays a fixed, small size.
#[derive(Debug, Clone)]
pub enum ExtraData {
    /// `Call`: the argument list, in source order.
    CallArgs(Vec<NodeId>),
    /// `Block`/`Program`: the statement list, in source order. Also used by
    /// `If` to carry zero or one else-branch node, so `If` doesn't need a
    /// third link field just for the rare else case.
    StatementList(Vec<NodeId>),
    /// `FunDecl`: parameter node ids plus an optional declared return-type
    /// token (absent means the return type is inferred as `Unit`).
    FunSignature {
        params: Vec<NodeId>,
        return_type_token: Option<TokenIndex>,
    },
    /// `Param`/`VarDecl`: the declared type annotation, if written out.
    TypeAnnotation(Option<TokenIndex>),
}

bitflags::bitflags! {
    /// Per-node flags the resolver sets as it walks the tree. Kept separate
    /// from `NodeKind` so resolution doesn't need to rewrite node shapes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// `VarDecl`: declared `val` rather than `var` (immutable after init).
        const IS_VAL = 0b0001;
        /// `Identifier` used as an lvalue (left of `=`).
        const IS_LVALUE = 0b0010;
        /// `FunDecl`/`Call`: resolved to a `static` JVM method.
        const IS_STATIC = 0b0100;
    }
}

/// Every node shape the parser produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The whole file. `extra_data_i` -> `StatementList` of top-level decls.
    Program,
    /// `fun name(params): ReturnType { body }`. `lhs` -> body `Block`.
    /// `extra_data_i` -> `FunSignature`.
    FunDecl,
    /// A single parameter inside a `FunDecl`'s parameter list.
    /// `main_token_i` -> name token. `extra_data_i` -> `TypeAnnotation`.
    Param,
    /// `val`/`var name: Type = init`. `lhs` -> initializer expression.
    /// `extra_data_i` -> `TypeAnnotation`.
    VarDecl,
    /// `{ stmt* }`. `extra_data_i` -> `StatementList`.
    Block,
    /// `if (cond) then else else_`. `lhs` -> cond, `rhs` -> then branch.
    /// `extra_data_i` unused unless an else branch is present, in which case
    /// it stores a single-element `StatementList` wrapping the else node —
    /// kept this way so `If` need not grow a fourth link field.
    If,
    /// `while (cond) body`. `lhs` -> cond, `rhs` -> body.
    While,
    /// `return expr?`. `lhs` -> expr, or `NodeId::NONE` for a bare `return`.
    Return,
    /// `lhs = rhs` (assignment expression-statement).
    Assign,
    /// Binary operator. `main_token_i` names the operator; `lhs`/`rhs` are
    /// the operands.
    BinaryOp,
    /// Unary prefix operator (`-`, `!`). `lhs` -> operand.
    UnaryOp,
    /// `lhs && rhs` — kept distinct from `BinaryOp` because it short-circuits.
    LogicalAnd,
    /// `lhs || rhs` — short-circuits.
    LogicalOr,
    /// A bare identifier reference (variable or unqualified call target).
    Identifier,
    /// An integer literal. Token text carries the digits.
    IntegerLiteral,
    /// A floating literal.
    FloatLiteral,
    /// A string literal (no interpolation).
    StringLiteral,
    /// `true`/`false`.
    BooleanLiteral,
    /// `f(args)`. `lhs` -> callee (`Identifier` or navigation chain).
    /// `extra_data_i` -> `CallArgs`.
    Call,
    /// `a.b.c` navigation chain. `lhs` -> the base expression, `main_token_i`
    /// names the trailing segment.
    Navigation,
    /// `(expr)` — kept as its own node (rather than elided) so the resolver
    /// can report spans that include the parentheses.
    Grouping,
    /// Parser-recovery placeholder: a syntactically-required child or
    /// top-level item the parser could not produce after a panic-mode
    /// resync. Never reaches code generation — the
    /// driver aborts at the first `Diagnostic` of `Severity::Error`.
    Error,
}

/// One AST node. Fixed-size on purpose: anything that isn't O(1) per node
/// (argument lists, statement lists, parameter lists) lives in
/// [`Ast::extra_data`] instead.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub kind: NodeKind,
    /// The token this node is "named after" — used for span reporting and,
    /// for `Identifier`/`BinaryOp`/etc, to recover the source text.
    pub main_token_i: TokenIndex,
    pub lhs: NodeId,
    pub rhs: NodeId,
    /// Index into [`Ast::extra_data`], or `u32::MAX` if this node doesn't
    /// use one.
    pub extra_data_i: u32,
    /// Filled in by the resolver; `None` before resolution and for nodes
    /// that never carry a type (`Program`, `Block`, ...).
    pub type_i: Option<TypeId>,
    pub flags: NodeFlags,
}

const NO_EXTRA_DATA: u32 = u32::MAX;

impl Node {
    fn leaf(kind: NodeKind, main_token_i: TokenIndex) -> Node {
        Node {
            kind,
            main_token_i,
            lhs: NodeId::NONE,
            rhs: NodeId::NONE,
            extra_data_i: NO_EXTRA_DATA,
            type_i: None,
            flags: NodeFlags::empty(),
        }
    }
}

/// The AST arena for one source file. `nodes[0]` is an unused placeholder
/// so `NodeId(0)` can serve as `NodeId::NONE`.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    extra_data: Vec<ExtraData>,
}

impl Ast {
    pub fn new() -> Ast {
        Ast {
            nodes: vec![Node::leaf(NodeKind::Error, 0)],
            extra_data: Vec::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn set_type(&mut self, id: NodeId, type_id: TypeId) {
        self.nodes[id.index()].type_i = Some(type_id);
    }

    pub fn extra_data(&self, node: &Node) -> &ExtraData {
        &self.extra_data[node.extra_data_i as usize]
    }

    /// Push a node with no children (`Identifier`, literals, `Error`).
    pub fn push_leaf(&mut self, kind: NodeKind, main_token_i: TokenIndex) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::leaf(kind, main_token_i));
        id
    }

    /// Push a node using `lhs`/`rhs` only (no out-of-line payload).
    pub fn push(&mut self, kind: NodeKind, main_token_i: TokenIndex, lhs: NodeId, rhs: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            lhs,
            rhs,
            ..Node::leaf(kind, main_token_i)
        });
        id
    }

    /// Push a node that also carries an out-of-line `extra_data` payload.
    pub fn push_with_extra(
        &mut self,
        kind: NodeKind,
        main_token_i: TokenIndex,
        lhs: NodeId,
        rhs: NodeId,
        extra: ExtraData,
    ) -> NodeId {
        let extra_data_i = self.extra_data.len() as u32;
        self.extra_data.push(extra);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            lhs,
            rhs,
            extra_data_i,
            ..Node::leaf(kind, main_token_i)
        });
        id
    }

    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        self.nodes[id.index()].flags |= flags;
    }

    pub fn statement_list(&self, node: &Node) -> &[NodeId] {
        match self.extra_data(node) {
            ExtraData::StatementList(list) => list,
            other => panic!("expected StatementList extra_data, got {other:?}"),
        }
    }

    pub fn call_args(&self, node: &Node) -> &[NodeId] {
        match self.extra_data(node) {
            ExtraData::CallArgs(args) => args,
            other => panic!("expected CallArgs extra_data, got {other:?}"),
        }
    }

    pub fn fun_signature(&self, node: &Node) -> (&[NodeId], Option<TokenIndex>) {
        match self.extra_data(node) {
            ExtraData::FunSignature {
                params,
                return_type_token,
            } => (params, *return_type_token),
            other => panic!("expected FunSignature extra_data, got {other:?}"),
        }
    }

    pub fn type_annotation(&self, node: &Node) -> Option<TokenIndex> {
        match self.extra_data(node) {
            ExtraData::TypeAnnotation(token) => *token,
            other => panic!("expected TypeAnnotation extra_data, got {other:?}"),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_first_slot() {
        let ast = Ast::new();
        assert_eq!(NodeId::NONE.index(), 0);
        assert_eq!(ast.len(), 1);
    }

    #[test]
    fn push_with_extra_roundtrips_statement_list() {
        let mut ast = Ast::new();
        let a = ast.push_leaf(NodeKind::Identifier, 1);
        let b = ast.push_leaf(NodeKind::Identifier, 2);
        let block = ast.push_with_extra(
            NodeKind::Block,
            0,
            NodeId::NONE,
            NodeId::NONE,
            ExtraData::StatementList(vec![a, b]),
        );
        let node = ast.get(block);
        assert_eq!(ast.statement_list(node), &[a, b]);
    }
}
