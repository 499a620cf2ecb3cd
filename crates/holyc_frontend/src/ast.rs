//! Untyped and typed syntax trees.
//!
//! The parser produces a tree of [`Node`]s with a closed [`NodeKind`] tag;
//! semantic analysis converts it into the same-shaped [`TypedNode`] tree,
//! filling in the `ty` field. Nodes own their children exclusively and are
//! immutable once parsing finishes.

use crate::types::Ty;
use std::fmt;

/// Closed set of syntax node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    FunctionDecl,
    ParamList,
    Param,
    /// Default-argument expression attached to a `Param`.
    DefaultArg,
    VarDecl,
    VarDeclList,
    Block,
    EmptyStmt,
    If,
    While,
    DoWhile,
    For,
    /// Placeholder for an omitted `for` clause.
    ForInit,
    ForCond,
    ForInc,
    Switch,
    CaseClause,
    DefaultClause,
    StartLabel,
    EndLabel,
    Break,
    Goto,
    Label,
    Return,
    Try,
    Throw,
    Lock,
    Asm,
    AsmArg,
    LinkageDecl,
    TypeAliasDecl,
    ClassDecl,
    FieldDecl,
    FieldMetaTokens,
    ExprStmt,
    PrintStmt,
    /// Produced by sema when `Identifier;` resolves to an all-defaults call.
    NoParenCallStmt,
    Literal,
    Identifier,
    Unary,
    Binary,
    Assign,
    Cast,
    Postfix,
    Lane,
    Member,
    Index,
    Call,
    CallArgs,
    EmptyArg,
    Comma,
    Dollar,
    DeclType,
    DeclName,
    DeclSpec,
}

impl NodeKind {
    /// Whether this kind occupies a statement position, for the statement
    /// indexing used by goto-legality analysis.
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeKind::VarDecl
                | NodeKind::VarDeclList
                | NodeKind::Block
                | NodeKind::EmptyStmt
                | NodeKind::If
                | NodeKind::While
                | NodeKind::DoWhile
                | NodeKind::For
                | NodeKind::Switch
                | NodeKind::CaseClause
                | NodeKind::DefaultClause
                | NodeKind::StartLabel
                | NodeKind::EndLabel
                | NodeKind::Break
                | NodeKind::Goto
                | NodeKind::Label
                | NodeKind::Return
                | NodeKind::Try
                | NodeKind::Throw
                | NodeKind::Lock
                | NodeKind::Asm
                | NodeKind::LinkageDecl
                | NodeKind::TypeAliasDecl
                | NodeKind::ClassDecl
                | NodeKind::ExprStmt
                | NodeKind::PrintStmt
                | NodeKind::NoParenCallStmt
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An untyped syntax node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Operator, raw token payload, or joined declaration text.
    pub text: String,
    pub children: Vec<Node>,
    pub line: u32,
    pub column: u32,
}

impl Node {
    pub fn new(kind: NodeKind, text: impl Into<String>) -> Self {
        Node { kind, text: text.into(), children: Vec::new(), line: 0, column: 0 }
    }

    pub fn at(kind: NodeKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Node { kind, text: text.into(), children: Vec::new(), line, column }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn find_child(&self, kind: NodeKind) -> Option<&Node> {
        self.children.iter().find(|c| c.kind == kind)
    }
}

/// A syntax node annotated with its resolved type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode {
    pub kind: NodeKind,
    pub text: String,
    pub children: Vec<TypedNode>,
    pub line: u32,
    pub column: u32,
    pub ty: Option<Ty>,
}

impl TypedNode {
    pub fn from_parsed(node: &Node) -> TypedNode {
        TypedNode {
            kind: node.kind,
            text: node.text.clone(),
            children: node.children.iter().map(TypedNode::from_parsed).collect(),
            line: node.line,
            column: node.column,
            ty: None,
        }
    }

    pub fn find_child(&self, kind: NodeKind) -> Option<&TypedNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// The resolved type, defaulting to `I64` when sema left it unset.
    pub fn ty_or_i64(&self) -> Ty {
        self.ty.clone().unwrap_or(Ty::I64)
    }
}

/// Render the typed tree as the indented dump used by `ast-dump`.
pub fn dump_typed(root: &TypedNode) -> String {
    let mut out = String::new();
    dump_typed_node(root, 0, &mut out);
    out
}

fn dump_typed_node(node: &TypedNode, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.kind.to_string());
    if !node.text.is_empty() {
        out.push_str(": ");
        out.push_str(&node.text);
    }
    if let Some(ty) = &node.ty {
        out.push_str(&format!(" [type={ty}]"));
    }
    out.push('\n');
    for child in &node.children {
        dump_typed_node(child, depth + 1, out);
    }
}
