//! Sequential page reader over one task collection.

use std::time::Duration;

use tracing::debug;

use taskscope_core::{QueueStats, Task, TaskCollection, TaskLister};

use crate::error::FetchError;

/// Reads a collection page by page (1-based) until a short page shows the
/// end. Failures are reported, never retried.
pub struct PageFetcher<L> {
    lister: L,
    collection: TaskCollection,
    page_size: u32,
    next_page: u32,
    exhausted: bool,
    timeout: Option<Duration>,
    stats: Option<QueueStats>,
}

impl<L: TaskLister> PageFetcher<L> {
    pub fn new(lister: L, collection: TaskCollection, page_size: u32) -> Self {
        Self {
            lister,
            collection,
            page_size: page_size.max(1),
            next_page: 1,
            exhausted: false,
            timeout: None,
            stats: None,
        }
    }

    /// Bound each page read; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the next page. `Ok(None)` once the collection is exhausted.
    ///
    /// An empty page also counts as exhaustion and yields `None`.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Task>>, FetchError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self.next_page;
        let request = self.lister.list_tasks(&self.collection, page, self.page_size);
        let listed = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| FetchError::Timeout {
                    page,
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => request.await,
        };
        let listed = listed.map_err(|source| FetchError::List { page, source })?;

        if listed.stats.is_some() {
            self.stats = listed.stats;
        }
        self.next_page += 1;

        let len = listed.tasks.len();
        if len < self.page_size as usize {
            self.exhausted = true;
        }
        debug!(
            collection = %self.collection,
            page,
            tasks = len,
            exhausted = self.exhausted,
            "page fetched"
        );

        if len == 0 {
            return Ok(None);
        }
        Ok(Some(listed.tasks))
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.next_page = 1;
        self.exhausted = false;
    }

    pub fn collection(&self) -> &TaskCollection {
        &self.collection
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Pages successfully read since the last restart.
    pub fn pages_fetched(&self) -> u32 {
        self.next_page - 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Latest queue counters reported alongside a page.
    pub fn stats(&self) -> Option<&QueueStats> {
        self.stats.as_ref()
    }

    /// Externally known size of the collection, if the backend reported it.
    pub fn total(&self) -> Option<u64> {
        self.stats
            .as_ref()
            .map(|stats| stats.count_for(self.collection.state))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use taskscope_core::{ListError, TaskPage, TaskState};

    use super::*;

    /// Serves `total` tasks in pages and counts calls.
    struct Numbered {
        total: usize,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskLister for Numbered {
        async fn list_tasks(
            &self,
            collection: &TaskCollection,
            page: u32,
            size: u32,
        ) -> Result<TaskPage, ListError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = (page as usize - 1) * size as usize;
            let end = (start + size as usize).min(self.total);
            let tasks = (start.min(end)..end)
                .map(|i| Task::new(format!("t{i}"), collection.queue.clone(), collection.state))
                .collect();
            Ok(TaskPage {
                tasks,
                stats: Some(QueueStats {
                    queue: collection.queue.clone(),
                    retry: self.total as u64,
                    ..QueueStats::default()
                }),
            })
        }
    }

    fn fetcher(total: usize, size: u32) -> (PageFetcher<Arc<Numbered>>, Arc<Numbered>) {
        let lister = Arc::new(Numbered {
            total,
            calls: AtomicU32::new(0),
        });
        let coll = TaskCollection::new("default", TaskState::Retry);
        (PageFetcher::new(lister.clone(), coll, size), lister)
    }

    #[tokio::test]
    async fn short_page_marks_exhaustion() {
        let (mut f, lister) = fetcher(12, 5);
        assert_eq!(f.next_page().await.unwrap().unwrap().len(), 5);
        assert_eq!(f.next_page().await.unwrap().unwrap().len(), 5);
        assert_eq!(f.next_page().await.unwrap().unwrap().len(), 2);
        assert!(f.is_exhausted());
        assert!(f.next_page().await.unwrap().is_none());
        assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
        assert_eq!(f.pages_fetched(), 3);
        assert_eq!(f.total(), Some(12));
    }

    #[tokio::test]
    async fn exact_multiple_ends_with_empty_page() {
        let (mut f, lister) = fetcher(10, 5);
        assert!(f.next_page().await.unwrap().is_some());
        assert!(f.next_page().await.unwrap().is_some());
        assert!(f.next_page().await.unwrap().is_none());
        assert!(f.next_page().await.unwrap().is_none());
        assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn restart_rewinds_to_first_page() {
        let (mut f, _) = fetcher(3, 5);
        let first = f.next_page().await.unwrap().unwrap();
        assert!(f.next_page().await.unwrap().is_none());
        f.restart();
        let again = f.next_page().await.unwrap().unwrap();
        assert_eq!(first, again);
    }

    struct Failing;

    #[async_trait]
    impl TaskLister for Failing {
        async fn list_tasks(&self, _: &TaskCollection, _: u32, _: u32) -> Result<TaskPage, ListError> {
            Err(ListError::Status {
                status: 500,
                body: "redis down".into(),
            })
        }
    }

    #[tokio::test]
    async fn list_failure_names_the_page() {
        let mut f = PageFetcher::new(Failing, TaskCollection::new("q", TaskState::Pending), 10);
        let err = f.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::List { page: 1, .. }));
        assert!(err.to_string().contains("redis down") || err.to_string().contains("page 1"));
    }

    struct Stalled;

    #[async_trait]
    impl TaskLister for Stalled {
        async fn list_tasks(&self, _: &TaskCollection, _: u32, _: u32) -> Result<TaskPage, ListError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(TaskPage::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_page_times_out() {
        let mut f = PageFetcher::new(Stalled, TaskCollection::new("q", TaskState::Pending), 10)
            .with_timeout(Some(Duration::from_secs(5)));
        let err = f.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { page: 1, timeout_ms: 5000 }));
    }
}
