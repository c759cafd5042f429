//! What `taskscope filter` prints on stdout.

use serde::Serialize;

use taskscope_client::BatchOutcome;
use taskscope_core::MutationKind;
use taskscope_filter::{FilterOperation, ScanOutcome};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub kind: MutationKind,
    pub succeeded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl ActionReport {
    pub fn new(kind: MutationKind, outcome: BatchOutcome) -> Self {
        Self {
            kind,
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed,
        }
    }
}

/// Scan summary plus the operation as it stands after any follow-up action.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub outcome: ScanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionReport>,
    pub operation: Option<FilterOperation>,
}

impl Report {
    pub fn ids(&self) -> Vec<String> {
        self.operation
            .as_ref()
            .map(FilterOperation::result_ids)
            .unwrap_or_default()
    }
}
