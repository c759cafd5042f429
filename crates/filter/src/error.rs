//! Error types for compiling filters and running scans.

use thiserror::Error;

use taskscope_core::{CoreError, ListError};

use crate::expr::ExprError;

/// A filter spec was rejected before any scan started.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid {field} regex: {source}")]
    InvalidRegex {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid custom expression: {0}")]
    InvalidExpression(#[from] ExprError),
}

/// A page could not be read. Fetch errors are never retried.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("failed to list page {page}: {source}")]
    List {
        page: u32,
        #[source]
        source: ListError,
    },

    #[error("page {page} did not arrive within {timeout_ms}ms")]
    Timeout { page: u32, timeout_ms: u64 },
}

/// Why a scan did not produce a result.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] CompileError),

    #[error("task collection is not addressable: {0}")]
    Collection(#[from] CoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ScanError {
    /// Validation errors happen before a scan exists and leave the session untouched.
    pub fn is_validation(&self) -> bool {
        matches!(self, ScanError::Validation(_) | ScanError::Collection(_))
    }
}
