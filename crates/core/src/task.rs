//! Task model shared by the client, the filter engine and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a task. Also names the category a task list is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Active,
    Pending,
    Scheduled,
    Retry,
    Archived,
    Aggregating,
    Completed,
}

impl TaskState {
    pub const ALL: [TaskState; 7] = [
        TaskState::Active,
        TaskState::Pending,
        TaskState::Scheduled,
        TaskState::Retry,
        TaskState::Archived,
        TaskState::Aggregating,
        TaskState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Pending => "pending",
            TaskState::Scheduled => "scheduled",
            TaskState::Retry => "retry",
            TaskState::Archived => "archived",
            TaskState::Aggregating => "aggregating",
            TaskState::Completed => "completed",
        }
    }

    /// REST collection segment, e.g. `pending_tasks`.
    pub fn collection_segment(&self) -> String {
        format!("{}_tasks", self.as_str())
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidState(s.to_string()))
    }
}

/// A unit of queued work as seen by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique within its queue.
    pub id: String,
    pub queue: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub state: TaskState,
    /// Structured payload. Payloads that are not JSON are kept as a JSON string.
    pub payload: serde_json::Value,
    /// Present only for completed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_process_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_retry: i64,
    #[serde(default)]
    pub retried: i64,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub timeout_seconds: i64,
    #[serde(default)]
    pub ttl_seconds: i64,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub is_orphaned: bool,
}

impl Task {
    /// Minimal task in `state` with an empty object payload.
    pub fn new(id: impl Into<String>, queue: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            task_type: String::new(),
            state,
            payload: serde_json::Value::Object(Default::default()),
            result: None,
            start_time: None,
            next_process_at: None,
            last_failed_at: None,
            completed_at: None,
            deadline: None,
            max_retry: 0,
            retried: 0,
            error_message: String::new(),
            timeout_seconds: 0,
            ttl_seconds: 0,
            group: None,
            is_orphaned: false,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Compact JSON text of the payload, object keys in received order.
    pub fn payload_text(&self) -> String {
        self.payload.to_string()
    }

    /// Canonical string form of the result, if the task has one.
    pub fn result_text(&self) -> Option<String> {
        self.result.as_ref().map(|r| r.to_string())
    }
}

/// Address of one task category in one queue, e.g. the retry tasks of `critical`.
///
/// Aggregating tasks live under a group, so their collection carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskCollection {
    pub queue: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl TaskCollection {
    pub fn new(queue: impl Into<String>, state: TaskState) -> Self {
        Self {
            queue: queue.into(),
            state,
            group: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Ensure the collection is addressable (aggregating tasks need a group).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.state == TaskState::Aggregating && self.group.is_none() {
            return Err(CoreError::MissingGroup(self.queue.clone()));
        }
        Ok(())
    }

    /// Whether `task` belongs to this collection.
    pub fn contains(&self, task: &Task) -> bool {
        if task.queue != self.queue || task.state != self.state {
            return false;
        }
        match &self.group {
            Some(group) => task.group.as_deref() == Some(group.as_str()),
            None => true,
        }
    }
}

impl fmt::Display for TaskCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}/{}", self.queue, group, self.state),
            None => write!(f, "{}/{}", self.queue, self.state),
        }
    }
}
