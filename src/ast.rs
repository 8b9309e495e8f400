//! The typed AST produced by the parser.
//!
//! Rather than one deep node hierarchy, the grammar is split into the two closed sum types a
//! recursive-descent grammar naturally produces: [`Expr`] for anything with a value
//! (`Evaluate(ctx) -> Value`) and [`Stmt`] for anything with only side effects
//! (`Render(writer, ctx)`). Every variant carries the [`Position`] it started at so errors and
//! the sandbox collaborator can report a precise location.

use crate::immutable_string::ImmutableString;
use crate::token::Position;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Binary operators recognized by the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    NullCoalesce,
    In,
    NotIn,
    Matches,
    StartsWith,
    EndsWith,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Concat => "~",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::NullCoalesce => "??",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::Matches => "matches",
            BinOp::StartsWith => "starts with",
            BinOp::EndsWith => "ends with",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Plus,
}

/// The right-hand side of `.`/`[ ]` attribute access: a bare name, or a computed expression
/// (`obj[expr]`) evaluated and stringified to a key at render time.
#[derive(Debug, Clone)]
pub enum AttrKey {
    Name(ImmutableString),
    Computed(Box<Expr>),
}

/// The key side of an object literal entry: a bare identifier or a quoted string.
#[derive(Debug, Clone)]
pub enum ObjectKey {
    Name(ImmutableString),
    Str(ImmutableString),
}

impl ObjectKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ObjectKey::Name(n) | ObjectKey::Str(n) => n.as_str(),
        }
    }
}

/// An expression node: anything with a value.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value, Position),
    Variable(ImmutableString, Position),
    GetAttr {
        object: Box<Expr>,
        key: AttrKey,
        pos: Position,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Position,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        pos: Position,
    },
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        pos: Position,
    },
    Array(Vec<Expr>, Position),
    Object(Vec<(ObjectKey, Expr)>, Position),
    /// A function or macro call. `callee` is evaluated like any other expression; a bare
    /// [`Expr::Variable`] callee additionally falls back to the engine's global function
    /// registry when it resolves to nothing callable (see `render.rs`), since an unbound name
    /// and a registered function name look identical at parse time.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: Position,
    },
    Filter {
        node: Box<Expr>,
        name: ImmutableString,
        args: Vec<Expr>,
        pos: Position,
    },
    Test {
        node: Box<Expr>,
        name: ImmutableString,
        args: Vec<Expr>,
        pos: Position,
    },
}

impl Expr {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal(_, p)
            | Expr::Variable(_, p)
            | Expr::GetAttr { pos: p, .. }
            | Expr::Binary { pos: p, .. }
            | Expr::Unary { pos: p, .. }
            | Expr::Conditional { pos: p, .. }
            | Expr::Array(_, p)
            | Expr::Object(_, p)
            | Expr::Call { pos: p, .. }
            | Expr::Filter { pos: p, .. }
            | Expr::Test { pos: p, .. } => *p,
        }
    }
}

/// A statement node: anything evaluated for its effect on the output writer or the context.
#[derive(Debug, Clone)]
pub enum Stmt {
    Text(ImmutableString, Position),
    Print(Expr, Position),
    If {
        /// `(condition, body)` pairs in source order: the `if` branch first, then each `elseif`.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
        pos: Position,
    },
    For {
        key_var: Option<ImmutableString>,
        value_var: ImmutableString,
        sequence: Expr,
        body: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        pos: Position,
    },
    Block {
        name: ImmutableString,
        body: Vec<Stmt>,
        pos: Position,
    },
    Extends {
        template: Expr,
        pos: Position,
    },
    Include {
        template: Expr,
        /// The `with <expr>` clause, if given: an expression evaluated to a mapping and merged
        /// into (or, with `only`, replacing) the including context. Twig accepts either an
        /// object literal (`with {foo: bar}`) or a bare variable holding one; both are just
        /// expressions from the parser's point of view.
        variables: Option<Expr>,
        ignore_missing: bool,
        only: bool,
        pos: Position,
    },
    Set {
        name: ImmutableString,
        value: Expr,
        pos: Position,
    },
    Do {
        expr: Expr,
        pos: Position,
    },
    Macro(Arc<MacroDef>, Position),
    Import {
        template: Expr,
        alias: ImmutableString,
        pos: Position,
    },
    FromImport {
        template: Expr,
        /// `(macro name in source template, local alias)`.
        macros: Vec<(ImmutableString, ImmutableString)>,
        pos: Position,
    },
    Spaceless {
        body: Vec<Stmt>,
        pos: Position,
    },
    Apply {
        body: Vec<Stmt>,
        filter: ImmutableString,
        args: Vec<Expr>,
        pos: Position,
    },
    Verbatim(ImmutableString, Position),
}

impl Stmt {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Stmt::Text(_, p)
            | Stmt::Print(_, p)
            | Stmt::If { pos: p, .. }
            | Stmt::For { pos: p, .. }
            | Stmt::Block { pos: p, .. }
            | Stmt::Extends { pos: p, .. }
            | Stmt::Include { pos: p, .. }
            | Stmt::Set { pos: p, .. }
            | Stmt::Do { pos: p, .. }
            | Stmt::Macro(_, p)
            | Stmt::Import { pos: p, .. }
            | Stmt::FromImport { pos: p, .. }
            | Stmt::Spaceless { pos: p, .. }
            | Stmt::Apply { pos: p, .. }
            | Stmt::Verbatim(_, p) => *p,
        }
    }
}

/// A parsed, callable macro. Shared (via [`Arc`]) between the [`Stmt::Macro`] that defines it and
/// any [`Value::Macro`][crate::value::Value::Macro] bound to a name through `import`/`from`.
#[derive(Debug)]
pub struct MacroDef {
    pub name: ImmutableString,
    pub params: Vec<ImmutableString>,
    pub defaults: BTreeMap<ImmutableString, Expr>,
    pub body: Arc<[Stmt]>,
    pub pos: Position,
}

/// A parsed template: the root statement sequence plus its declared name and source.
///
/// Immutable after parsing. Looked up by name through the [`crate::engine::Engine`]'s cache.
#[derive(Debug)]
pub struct Template {
    pub name: ImmutableString,
    pub source: Arc<str>,
    pub body: Vec<Stmt>,
}
