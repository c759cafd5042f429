//! Compile-time and run-time expression errors.

use thiserror::Error;

/// The expression could not be compiled. Offsets are byte positions in the source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character `{ch}` at {at}")]
    UnexpectedChar { ch: char, at: usize },

    #[error("unterminated string starting at {at}")]
    UnterminatedString { at: usize },

    #[error("invalid number `{text}` at {at}")]
    InvalidNumber { text: String, at: usize },

    #[error("expected {expected}, found `{found}` at {at}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        at: usize,
    },

    #[error("expected {expected}, found end of expression")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown variable `{name}`{hint}")]
    UnknownVariable { name: String, hint: String },

    #[error("unknown method `{name}`{hint}")]
    UnknownMethod { name: String, hint: String },

    #[error("`{method}` takes {expected} argument(s), got {found}")]
    WrongArity {
        method: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("expression is {len} bytes, limit is {limit}")]
    TooLong { len: usize, limit: usize },
}

/// Evaluation failed for one task. The task simply does not match.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("cannot read `{property}` of {on}")]
    NullAccess { property: String, on: &'static str },

    #[error("`{method}` is not a method of {on}")]
    NotCallable { method: &'static str, on: &'static str },

    #[error("`{method}` expects a {expected} argument, got {found}")]
    ArgumentType {
        method: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{op}` is not defined for {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("`{op}` is not defined for {found}")]
    InvalidOperand { op: &'static str, found: &'static str },

    #[error("division by zero")]
    DivisionByZero,
}
