//! Compiled form of a [`FilterSpec`], evaluated once per task.

use regex::Regex;
use tracing::debug;

use taskscope_core::Task;

use crate::error::CompileError;
use crate::expr::{EvalError, Expression};
use crate::spec::FilterSpec;

/// Validated, ready-to-run filter criteria.
///
/// Substring and regex criteria look at the compact JSON encoding of the
/// payload or result. Tasks without a result never satisfy a result criterion.
#[derive(Debug, Clone)]
pub struct Predicate {
    payload_query: Option<String>,
    result_query: Option<String>,
    payload_regex: Option<Regex>,
    result_regex: Option<Regex>,
    expression: Option<Expression>,
}

fn compile_regex(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, CompileError> {
    pattern
        .map(|p| Regex::new(p).map_err(|source| CompileError::InvalidRegex { field, source }))
        .transpose()
}

impl Predicate {
    /// Validate every criterion of `spec`. Nothing is evaluated yet.
    pub fn compile(spec: &FilterSpec) -> Result<Self, CompileError> {
        Ok(Self {
            payload_query: spec.payload_query().map(str::to_string),
            result_query: spec.result_query().map(str::to_string),
            payload_regex: compile_regex("payload", spec.payload_regex())?,
            result_regex: compile_regex("result", spec.result_regex())?,
            expression: spec.custom_expression().map(Expression::compile).transpose()?,
        })
    }

    /// True when every task matches.
    pub fn accepts_all(&self) -> bool {
        self.payload_query.is_none()
            && self.result_query.is_none()
            && self.payload_regex.is_none()
            && self.result_regex.is_none()
            && self.expression.is_none()
    }

    /// Evaluate all criteria, surfacing expression failures.
    pub fn evaluate(&self, task: &Task) -> Result<bool, EvalError> {
        if self.payload_query.is_some() || self.payload_regex.is_some() {
            let payload = task.payload_text();
            if !text_matches(&payload, self.payload_query.as_deref(), self.payload_regex.as_ref()) {
                return Ok(false);
            }
        }

        if self.result_query.is_some() || self.result_regex.is_some() {
            let Some(result) = task.result_text() else {
                return Ok(false);
            };
            if !text_matches(&result, self.result_query.as_deref(), self.result_regex.as_ref()) {
                return Ok(false);
            }
        }

        match &self.expression {
            Some(expression) => expression.test(task),
            None => Ok(true),
        }
    }

    /// Whether `task` satisfies the filter. A failing expression is a non-match.
    pub fn matches(&self, task: &Task) -> bool {
        self.evaluate(task).unwrap_or_else(|e| {
            debug!(task_id = %task.id, error = %e, "expression failed, task skipped");
            false
        })
    }
}

fn text_matches(text: &str, query: Option<&str>, regex: Option<&Regex>) -> bool {
    query.map_or(true, |q| text.contains(q)) && regex.map_or(true, |re| re.is_match(text))
}
