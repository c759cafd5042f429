//! Paginated task listing seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ListError;
use crate::stats::QueueStats;
use crate::task::{Task, TaskCollection};

/// One page of a task collection plus the queue counters at read time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub stats: Option<QueueStats>,
}

/// Backend that can read a task collection page by page.
///
/// Implementations handle transport details; pages are 1-based and a page
/// shorter than `size` means the collection is exhausted.
#[async_trait]
pub trait TaskLister: Send + Sync {
    async fn list_tasks(
        &self,
        collection: &TaskCollection,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, ListError>;
}

#[async_trait]
impl<T: TaskLister + ?Sized> TaskLister for Arc<T> {
    async fn list_tasks(
        &self,
        collection: &TaskCollection,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, ListError> {
        (**self).list_tasks(collection, page, size).await
    }
}
