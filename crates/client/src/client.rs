//! HTTP client for the monitoring REST API.

use async_trait::async_trait;
use reqwest::{Method, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use taskscope_core::config::ApiConfig;
use taskscope_core::{
    ListError, MutationBus, MutationKind, Task, TaskCollection, TaskLister, TaskMutated, TaskPage,
    TaskState,
};

use crate::error::ClientError;
use crate::wire::{parse_task, parse_task_page};

/// Result of a batch mutation. The backend has no rollback, so a batch can
/// partially succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Request body shared by every batch endpoint.
#[derive(Serialize)]
struct BatchRequest<'a> {
    task_ids: &'a [String],
}

/// Client for the task listing and mutation endpoints.
///
/// Every successful mutation is published on the shared [`MutationBus`].
#[derive(Debug, Clone)]
pub struct TaskscopeClient {
    base_url: Url,
    http: reqwest::Client,
    bus: MutationBus,
}

impl TaskscopeClient {
    pub fn new(api: &ApiConfig, bus: MutationBus) -> Result<Self, ClientError> {
        let base_url = Url::parse(api.base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Url(format!("{}: {e}", api.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Url(format!("{} cannot be a base URL", api.base_url)));
        }
        let http = reqwest::Client::builder()
            .timeout(api.request_timeout())
            .build()?;

        info!(base_url = %base_url, "task API client initialized");

        Ok(Self {
            base_url,
            http,
            bus,
        })
    }

    pub fn bus(&self) -> &MutationBus {
        &self.bus
    }

    // ── URL layout ──────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Segments addressing a collection, e.g. `queues/default/retry_tasks`.
    fn collection_segments(collection: &TaskCollection) -> Result<Vec<String>, ClientError> {
        collection.validate()?;
        let mut segments = vec!["queues".to_string(), collection.queue.clone()];
        if let (TaskState::Aggregating, Some(group)) = (collection.state, &collection.group) {
            segments.push("groups".to_string());
            segments.push(group.clone());
        }
        segments.push(collection.state.collection_segment());
        Ok(segments)
    }

    /// URL of the collection itself, optionally suffixed with `:action`.
    fn collection_url(
        &self,
        collection: &TaskCollection,
        action: Option<&str>,
    ) -> Result<Url, ClientError> {
        let mut segments = Self::collection_segments(collection)?;
        if let (Some(action), Some(last)) = (action, segments.last_mut()) {
            last.push(':');
            last.push_str(action);
        }
        let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.url(&refs)
    }

    /// URL of one task in a collection, optionally suffixed with `:action`.
    fn task_url(
        &self,
        collection: &TaskCollection,
        id: &str,
        action: Option<&str>,
    ) -> Result<Url, ClientError> {
        let mut segments = Self::collection_segments(collection)?;
        segments.push(match action {
            Some(action) => format!("{id}:{action}"),
            None => id.to_string(),
        });
        let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.url(&refs)
    }

    async fn checked(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(ClientError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    // ── Listing ─────────────────────────────────────────────────

    /// Read one page (1-based) of a task collection.
    pub async fn list_page(
        &self,
        collection: &TaskCollection,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, ClientError> {
        let url = self.collection_url(collection, None)?;
        debug!(%url, page, size, "listing tasks");

        let resp = self
            .http
            .get(url)
            .query(&[("page", page), ("size", size)])
            .send()
            .await?;
        let body: Value = Self::checked(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("listing body: {e}")))?;

        parse_task_page(&body, collection)
    }

    /// Fetch a single task by id.
    pub async fn get_task(&self, queue: &str, id: &str) -> Result<Task, ClientError> {
        let url = self.url(&["queues", queue, "tasks", id])?;
        let resp = self.http.get(url).send().await?;
        let body: Value = Self::checked(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("task body: {e}")))?;

        // The single-task endpoint always reports `state`; pending is only a fallback.
        parse_task(&body, &TaskCollection::new(queue, TaskState::Pending))
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Run, archive or delete one task.
    pub async fn mutate_task(
        &self,
        collection: &TaskCollection,
        kind: MutationKind,
        id: &str,
    ) -> Result<(), ClientError> {
        kind.check(collection.state)?;
        let (method, url) = match kind {
            MutationKind::Delete => (Method::DELETE, self.task_url(collection, id, None)?),
            other => (Method::POST, self.task_url(collection, id, Some(other.as_str()))?),
        };

        let resp = self.http.request(method, url).send().await?;
        Self::checked(resp).await?;

        info!(collection = %collection, %kind, task_id = id, "task mutated");
        self.bus
            .publish(TaskMutated::single(collection.clone(), kind, id));
        Ok(())
    }

    pub async fn run_task(&self, collection: &TaskCollection, id: &str) -> Result<(), ClientError> {
        self.mutate_task(collection, MutationKind::Run, id).await
    }

    pub async fn archive_task(
        &self,
        collection: &TaskCollection,
        id: &str,
    ) -> Result<(), ClientError> {
        self.mutate_task(collection, MutationKind::Archive, id).await
    }

    pub async fn delete_task(
        &self,
        collection: &TaskCollection,
        id: &str,
    ) -> Result<(), ClientError> {
        self.mutate_task(collection, MutationKind::Delete, id).await
    }

    /// Apply `kind` to a list of task ids.
    ///
    /// Only the ids the backend reports as succeeded are published.
    pub async fn batch_mutate(
        &self,
        collection: &TaskCollection,
        kind: MutationKind,
        ids: &[String],
    ) -> Result<BatchOutcome, ClientError> {
        kind.check(collection.state)?;
        if ids.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let action = format!("batch_{}", kind.as_str());
        let url = self.collection_url(collection, Some(&action))?;
        let resp = self
            .http
            .post(url)
            .json(&BatchRequest { task_ids: ids })
            .send()
            .await?;
        let body: Value = Self::checked(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("batch body: {e}")))?;

        let outcome = parse_batch_outcome(&body, kind)?;
        if !outcome.failed.is_empty() {
            warn!(
                collection = %collection,
                %kind,
                failed = outcome.failed.len(),
                "batch mutation partially failed"
            );
        }
        info!(
            collection = %collection,
            %kind,
            succeeded = outcome.succeeded.len(),
            "batch mutation applied"
        );

        self.bus.publish(TaskMutated::batch(
            collection.clone(),
            kind,
            outcome.succeeded.clone(),
        ));
        Ok(outcome)
    }

    /// Apply `kind` to every task in the collection.
    pub async fn mutate_all(
        &self,
        collection: &TaskCollection,
        kind: MutationKind,
    ) -> Result<(), ClientError> {
        kind.check(collection.state)?;
        let action = format!("{}_all", kind.as_str());
        let url = self.collection_url(collection, Some(&action))?;
        let method = match kind {
            MutationKind::Delete => Method::DELETE,
            _ => Method::POST,
        };

        let resp = self.http.request(method, url).send().await?;
        Self::checked(resp).await?;

        info!(collection = %collection, %kind, "mutation applied to whole collection");
        self.bus.publish(TaskMutated::all(collection.clone(), kind));
        Ok(())
    }
}

/// Pull the succeeded/failed id lists out of a batch response.
fn parse_batch_outcome(body: &Value, kind: MutationKind) -> Result<BatchOutcome, ClientError> {
    let (ok_key, err_key) = match kind {
        MutationKind::Run => ("pending_ids", "error_ids"),
        MutationKind::Archive => ("archived_ids", "error_ids"),
        MutationKind::Delete => ("deleted_ids", "failed_ids"),
    };

    let ids = |key: &str| -> Result<Vec<String>, ClientError> {
        match body.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| ClientError::Parse(format!("`{key}`: {e}"))),
        }
    };

    Ok(BatchOutcome {
        succeeded: ids(ok_key)?,
        failed: ids(err_key)?,
    })
}

#[async_trait]
impl TaskLister for TaskscopeClient {
    async fn list_tasks(
        &self,
        collection: &TaskCollection,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, ListError> {
        self.list_page(collection, page, size)
            .await
            .map_err(ListError::from)
    }
}
