//! Parse listing responses into [`Task`]s.
//!
//! The monitoring API formats payloads and results as display strings and
//! uses empty strings (or `"-"`) for timestamps that are not set. Decoding is
//! lenient: structured payloads are recovered when the string is JSON, and
//! unparseable timestamps are treated as absent.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use taskscope_core::{QueueStats, Task, TaskCollection, TaskPage, TaskState};

use crate::error::ClientError;

/// Turn a formatted payload/result into a structured value.
///
/// JSON text is parsed; anything else is kept verbatim as a JSON string.
fn structured(v: &Value) -> Value {
    match v {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        other => other.clone(),
    }
}

fn timestamp(obj: &Map<String, Value>, key: &str, task_id: &str) -> Option<DateTime<Utc>> {
    let raw = obj.get(key)?.as_str()?.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        // Go's zero time shows up as 0001-01-01 when a field was never set.
        Ok(ts) if ts.timestamp() <= 0 => None,
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(task_id, field = key, value = raw, error = %e, "unparseable task timestamp");
            None
        }
    }
}

fn string(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn integer(obj: &Map<String, Value>, key: &str) -> i64 {
    obj.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Parse one task record listed from `collection`.
///
/// The collection fills in `queue`, `state` and `group` when the record
/// omits them (older list endpoints do not send `state`).
pub fn parse_task(value: &Value, collection: &TaskCollection) -> Result<Task, ClientError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ClientError::Parse("task record is not a JSON object".into()))?;

    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::Parse("task record without id".into()))?
        .to_string();

    let state = match obj.get("state").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s.parse::<TaskState>()?,
        _ => collection.state,
    };

    let queue = match string(obj, "queue") {
        q if q.is_empty() => collection.queue.clone(),
        q => q,
    };

    let result = obj
        .get("result")
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .map(structured);

    let group = obj
        .get("group")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| collection.group.clone());

    Ok(Task {
        task_type: string(obj, "type"),
        state,
        payload: obj.get("payload").map(structured).unwrap_or(Value::Null),
        result,
        start_time: timestamp(obj, "start_time", &id),
        next_process_at: timestamp(obj, "next_process_at", &id),
        last_failed_at: timestamp(obj, "last_failed_at", &id),
        completed_at: timestamp(obj, "completed_at", &id),
        deadline: timestamp(obj, "deadline", &id),
        max_retry: integer(obj, "max_retry"),
        retried: integer(obj, "retried"),
        error_message: string(obj, "error_message"),
        timeout_seconds: integer(obj, "timeout_seconds"),
        ttl_seconds: integer(obj, "ttl_seconds"),
        group,
        is_orphaned: obj.get("is_orphaned").and_then(|v| v.as_bool()).unwrap_or(false),
        queue,
        id,
    })
}

/// Parse a `{ tasks, stats }` listing response.
pub fn parse_task_page(body: &Value, collection: &TaskCollection) -> Result<TaskPage, ClientError> {
    let obj = body
        .as_object()
        .ok_or_else(|| ClientError::Parse("listing response is not a JSON object".into()))?;

    let tasks = match obj.get("tasks") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse_task(item, collection))
            .collect::<Result<Vec<_>, _>>()?,
        // The API serializes an empty page as `null`.
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(ClientError::Parse("`tasks` is not an array".into())),
    };

    let stats = match obj.get("stats") {
        Some(v) if !v.is_null() => Some(
            serde_json::from_value::<QueueStats>(v.clone())
                .map_err(|e| ClientError::Parse(format!("invalid stats: {e}")))?,
        ),
        _ => None,
    };

    Ok(TaskPage { tasks, stats })
}
