//! Sandboxed boolean expressions over a single task.
//!
//! A small, JavaScript-flavoured language used by the `customExpression`
//! filter criterion. Expressions can read a fixed set of task fields,
//! navigate structured payloads/results, compare, do arithmetic and call a
//! handful of string/array methods. Nothing else is reachable: there are no
//! assignments, no loops and no user-defined functions.
//!
//! ```text
//! payload.user.email.endsWith("@example.com") && retried >= 3
//! ```
//!
//! Compilation resolves every identifier and method name up front, so a
//! misspelled field is rejected before any task is looked at.

mod error;
mod interpreter;
mod lexer;
mod parser;
pub(crate) mod suggest;
mod value;

use std::fmt;

use taskscope_core::Task;

pub use error::{EvalError, ExprError};

/// Longest accepted expression source, in bytes.
pub const MAX_SOURCE_LEN: usize = 16 * 1024;

/// Deepest accepted syntax tree.
pub const MAX_DEPTH: usize = 256;

/// Deepest accepted nesting of parentheses, brackets, call arguments and
/// prefix operators.
pub const MAX_NESTING: usize = 64;

// ── Bound variables ─────────────────────────────────────────────────

/// Task fields an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Queue,
    Type,
    State,
    StartTime,
    MaxRetry,
    Retried,
    LastFailedAt,
    ErrorMessage,
    NextProcessAt,
    TimeoutSeconds,
    Deadline,
    Group,
    CompletedAt,
    TtlSeconds,
    IsOrphaned,
    Payload,
    Result,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Id,
        Field::Queue,
        Field::Type,
        Field::State,
        Field::StartTime,
        Field::MaxRetry,
        Field::Retried,
        Field::LastFailedAt,
        Field::ErrorMessage,
        Field::NextProcessAt,
        Field::TimeoutSeconds,
        Field::Deadline,
        Field::Group,
        Field::CompletedAt,
        Field::TtlSeconds,
        Field::IsOrphaned,
        Field::Payload,
        Field::Result,
    ];

    /// Variable names in binding order.
    pub const NAMES: &'static [&'static str] = &[
        "id",
        "queue",
        "type",
        "state",
        "start_time",
        "max_retry",
        "retried",
        "last_failed_at",
        "error_message",
        "next_process_at",
        "timeout_seconds",
        "deadline",
        "group",
        "completed_at",
        "ttl_seconds",
        "is_orphaned",
        "payload",
        "result",
    ];

    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Methods ─────────────────────────────────────────────────────────

/// Built-in methods callable with `receiver.method(args)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Includes,
    StartsWith,
    EndsWith,
    ToLowerCase,
    ToUpperCase,
    Trim,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Includes,
        Method::StartsWith,
        Method::EndsWith,
        Method::ToLowerCase,
        Method::ToUpperCase,
        Method::Trim,
    ];

    pub const NAMES: &'static [&'static str] = &[
        "includes",
        "startsWith",
        "endsWith",
        "toLowerCase",
        "toUpperCase",
        "trim",
    ];

    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }

    pub fn from_name(name: &str) -> Option<Method> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }

    /// Number of arguments the method takes.
    pub fn arity(&self) -> usize {
        match self {
            Method::Includes | Method::StartsWith | Method::EndsWith => 1,
            Method::ToLowerCase | Method::ToUpperCase | Method::Trim => 0,
        }
    }
}

// ── Syntax tree ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Field(Field),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Short-circuiting `&&` / `||`; yields one of its operands.
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    /// `object.name`
    Member(Box<Expr>, String),
    /// `object[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `receiver.method(args)`
    Call(Box<Expr>, Method, Vec<Expr>),
}

impl Expr {
    /// Whether any path from this node is longer than `limit`.
    ///
    /// Never recurses deeper than `limit` itself.
    pub(crate) fn deeper_than(&self, limit: usize) -> bool {
        if limit == 0 {
            return true;
        }
        let below = limit - 1;
        match self {
            Expr::Literal(_) | Expr::Field(_) => false,
            Expr::Unary(_, inner) | Expr::Member(inner, _) => inner.deeper_than(below),
            Expr::Binary(_, l, r) | Expr::Logical(_, l, r) | Expr::Index(l, r) => {
                l.deeper_than(below) || r.deeper_than(below)
            }
            Expr::Call(receiver, _, args) => {
                receiver.deeper_than(below) || args.iter().any(|a| a.deeper_than(below))
            }
        }
    }
}

// ── Compiled expression ─────────────────────────────────────────────

/// A parsed, name-resolved expression ready to run against tasks.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse and resolve `source`.
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(ExprError::TooLong {
                len: source.len(),
                limit: MAX_SOURCE_LEN,
            });
        }
        let tokens = lexer::tokenize(source)?;
        let root = parser::parse(&tokens)?;
        if root.deeper_than(MAX_DEPTH) {
            return Err(ExprError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `task` and coerce the outcome to a boolean.
    pub fn test(&self, task: &Task) -> Result<bool, EvalError> {
        interpreter::eval(&self.root, task).map(|v| v.truthy())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
