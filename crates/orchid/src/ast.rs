//! Abstract syntax tree.
//!
//! One flat [`Node`] sum type covers statements and expressions; the
//! interpreter dispatches on it with a single `match`. Every node is wrapped
//! in [`Spanned`] carrying the source position of its first token.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{token::Pos, value::Unit};

/// A parsed script: leading `@` directives plus the statement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub metadata: Vec<Metadata>,
    pub body: Vec<Spanned>,
}

/// One `@name ...` directive from the top of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub entries: Vec<MetaEntry>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaEntry {
    Word(String),
    Text(String),
    Number(f64),
    /// `MCP("name")` / `Plugin("name")` inside `@requires`.
    Requires { kind: RequireKind, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequireKind {
    Mcp,
    Plugin,
}

/// A node plus the position of its first token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned {
    pub pos: Pos,
    pub node: Node,
}

impl Spanned {
    #[must_use]
    pub fn new(pos: Pos, node: Node) -> Self {
        Self { pos, node }
    }
}

/// `<name>` / `<name=value>` behavior tag attached to an operation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: Option<Box<Spanned>>,
}

pub type Tags = SmallVec<[Tag; 2]>;

/// A call argument, positional or keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Spanned,
}

/// A macro or agent parameter with an optional default expression.
///
/// Defaults are evaluated in the caller's environment at call time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Spanned>,
}

/// One `except` arm: optional error-kind filter, optional `as` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptArm {
    pub kind: Option<String>,
    pub bind: Option<String>,
    pub body: Vec<Spanned>,
}

/// A single fork branch: `name: expr` or a bare expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkBranch {
    pub name: Option<String>,
    pub expr: Spanned,
}

/// The two bodies a fork can have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForkBody {
    /// Explicit branches: all named (dict result) or all bare (list result).
    Branches(Vec<ForkBranch>),
    /// `for x in xs:` — one branch per element, list result in element order.
    For {
        var: String,
        iter: Box<Spanned>,
        body: Vec<Spanned>,
    },
}

/// A macro or agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Spanned>,
    pub is_agent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// `-`, `*`, `/`. Additive `+` is the semantic merge and has its own node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Sub,
    Mul,
    Div,
}

/// Assignment target: one name or a destructuring name list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    Name(String),
    Destructure(Vec<String>),
}

/// One part of an interpolated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpPart {
    Lit(String),
    Expr(Spanned),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    // --- statements ---
    Assignment {
        target: AssignTarget,
        value: Box<Spanned>,
    },
    PlusAssignment {
        name: String,
        value: Box<Spanned>,
    },
    If {
        cond: Box<Spanned>,
        then_body: Vec<Spanned>,
        elifs: Vec<(Spanned, Vec<Spanned>)>,
        else_body: Option<Vec<Spanned>>,
    },
    For {
        var: String,
        iter: Box<Spanned>,
        body: Vec<Spanned>,
    },
    While {
        cond: Box<Spanned>,
        body: Vec<Spanned>,
    },
    /// `until cond<tags>: body` — body first, then the condition.
    Until {
        cond: Box<Spanned>,
        body: Vec<Spanned>,
        tags: Tags,
    },
    Try {
        body: Vec<Spanned>,
        excepts: Vec<ExceptArm>,
        finally: Option<Vec<Spanned>>,
    },
    Assert {
        cond: Box<Spanned>,
        message: Option<Box<Spanned>>,
    },
    Require {
        cond: Box<Spanned>,
        message: Option<Box<Spanned>>,
    },
    Definition(Definition),
    Permissions {
        entries: Vec<Spanned>,
    },
    Import {
        path: String,
        alias: Option<String>,
    },
    UseMcp {
        name: String,
    },
    UsePlugin {
        name: String,
        alias: Option<String>,
    },
    Emit {
        event: String,
        payload: Option<Box<Spanned>>,
    },
    On {
        event: String,
        var: String,
        body: Vec<Spanned>,
    },
    Return {
        value: Option<Box<Spanned>>,
    },
    Break,
    Atomic {
        body: Vec<Spanned>,
    },

    // --- expressions ---
    Operation {
        name: String,
        args: Vec<Arg>,
        tags: Tags,
    },
    Namespaced {
        namespace: String,
        name: String,
        args: Vec<Arg>,
        tags: Tags,
    },
    /// Call of a computed callee (`mod.helper(x)`); identifier callees parse
    /// to [`Node::Operation`] instead.
    Call {
        callee: Box<Spanned>,
        args: Vec<Arg>,
        tags: Tags,
    },
    Fork {
        count: Option<usize>,
        body: ForkBody,
    },
    Pipe {
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    Alternative {
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    Not {
        expr: Box<Spanned>,
    },
    Comparison {
        op: CmpOp,
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    In {
        item: Box<Spanned>,
        collection: Box<Spanned>,
    },
    Merge {
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    Arith {
        op: ArithOp,
        left: Box<Spanned>,
        right: Box<Spanned>,
    },
    Neg {
        expr: Box<Spanned>,
    },
    Member {
        object: Box<Spanned>,
        field: String,
    },
    Index {
        object: Box<Spanned>,
        index: Box<Spanned>,
    },
    StringLit(String),
    InterpolatedString {
        parts: Vec<InterpPart>,
    },
    NumberLit {
        value: f64,
        unit: Option<Unit>,
    },
    BoolLit(bool),
    NullLit,
    ListLit(Vec<Spanned>),
    DictLit(Vec<(String, Spanned)>),
    Identifier(String),
    /// Bare `_`.
    ImplicitContext,
    Listen,
    Stream {
        source: Box<Spanned>,
    },
}

impl Node {
    /// True when an operation node carries the given statically-known tag.
    #[must_use]
    pub fn has_tag(&self, tag_name: &str) -> bool {
        match self {
            Self::Operation { tags, .. } | Self::Namespaced { tags, .. } | Self::Call { tags, .. } => {
                tags.iter().any(|t| t.name == tag_name)
            }
            _ => false,
        }
    }
}
