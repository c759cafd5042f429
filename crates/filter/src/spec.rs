//! User-supplied filter criteria.

use serde::{Deserialize, Serialize};

/// What a scan should look for. Every present criterion must hold (AND);
/// absent or blank criteria are ignored.
///
/// Serialized in camelCase so spec files match the dashboard form:
///
/// ```json
/// { "payloadQuery": "\"id\":42", "customExpression": "retried > 2", "resultLimit": 100 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    /// Substring of the JSON-encoded payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_query: Option<String>,
    /// Substring of the JSON-encoded result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_query: Option<String>,
    /// Regex searched (unanchored) in the JSON-encoded payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_regex: Option<String>,
    /// Regex searched (unanchored) in the JSON-encoded result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_regex: Option<String>,
    /// Boolean expression over task fields, see [`crate::expr`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_expression: Option<String>,
    /// Maximum number of matches. Unset or negative means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_limit: Option<i64>,
}

/// A criterion counts only if it has non-whitespace content. The text itself
/// is used untrimmed.
fn present(criterion: &Option<String>) -> Option<&str> {
    criterion.as_deref().filter(|s| !s.trim().is_empty())
}

impl FilterSpec {
    pub fn payload_query(&self) -> Option<&str> {
        present(&self.payload_query)
    }

    pub fn result_query(&self) -> Option<&str> {
        present(&self.result_query)
    }

    pub fn payload_regex(&self) -> Option<&str> {
        present(&self.payload_regex)
    }

    pub fn result_regex(&self) -> Option<&str> {
        present(&self.result_regex)
    }

    pub fn custom_expression(&self) -> Option<&str> {
        present(&self.custom_expression)
    }

    /// Cap on matches, `None` when unlimited.
    pub fn effective_limit(&self) -> Option<usize> {
        self.result_limit
            .filter(|limit| *limit >= 0)
            .map(|limit| limit as usize)
    }

    /// True when no criterion is set: every task matches.
    pub fn is_unconstrained(&self) -> bool {
        self.payload_query().is_none()
            && self.result_query().is_none()
            && self.payload_regex().is_none()
            && self.result_regex().is_none()
            && self.custom_expression().is_none()
    }

    /// Whether any criterion looks at the task result.
    pub fn inspects_result(&self) -> bool {
        self.result_query().is_some() || self.result_regex().is_some()
    }

    pub fn with_payload_query(mut self, query: impl Into<String>) -> Self {
        self.payload_query = Some(query.into());
        self
    }

    pub fn with_result_query(mut self, query: impl Into<String>) -> Self {
        self.result_query = Some(query.into());
        self
    }

    pub fn with_payload_regex(mut self, pattern: impl Into<String>) -> Self {
        self.payload_regex = Some(pattern.into());
        self
    }

    pub fn with_result_regex(mut self, pattern: impl Into<String>) -> Self {
        self.result_regex = Some(pattern.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.custom_expression = Some(expression.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.result_limit = Some(limit);
        self
    }
}
