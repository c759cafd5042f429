use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskState;

/// Point-in-time queue counters returned alongside every task page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    #[serde(default)]
    pub queue: String,
    #[serde(default, rename = "memory_usage_bytes")]
    pub memory_usage: i64,
    /// Total number of tasks in the queue.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub aggregating: u64,
    #[serde(default)]
    pub scheduled: u64,
    #[serde(default)]
    pub retry: u64,
    #[serde(default)]
    pub archived: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// Number of tasks currently in `state`.
    pub fn count_for(&self, state: TaskState) -> u64 {
        match state {
            TaskState::Active => self.active,
            TaskState::Pending => self.pending,
            TaskState::Scheduled => self.scheduled,
            TaskState::Retry => self.retry,
            TaskState::Archived => self.archived,
            TaskState::Aggregating => self.aggregating,
            TaskState::Completed => self.completed,
        }
    }
}
