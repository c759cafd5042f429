//! End-to-end scans against an in-memory task backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use taskscope_core::config::ScanConfig;
use taskscope_core::{
    ListError, MutationBus, MutationKind, QueueStats, Task, TaskCollection, TaskLister,
    TaskMutated, TaskPage, TaskState,
};
use taskscope_filter::{
    CompletionReason, FetchError, FilterSpec, ResultSetSynchronizer, ScanController, ScanError,
    ScanOutcome, ScanPhase, ScanSession,
};

type Hook = Box<dyn Fn(u32) + Send + Sync>;

/// Serves a fixed task list page by page and records which pages were asked for.
struct Backend {
    tasks: Vec<Task>,
    requested: Mutex<Vec<u32>>,
    fail_on: Option<u32>,
    stall_on: Option<u32>,
    on_page: Mutex<Option<Hook>>,
}

#[derive(Clone)]
struct MemoryLister(Arc<Backend>);

impl MemoryLister {
    fn new(tasks: Vec<Task>) -> Self {
        Self::with_faults(tasks, None, None)
    }

    fn with_faults(tasks: Vec<Task>, fail_on: Option<u32>, stall_on: Option<u32>) -> Self {
        Self(Arc::new(Backend {
            tasks,
            requested: Mutex::new(Vec::new()),
            fail_on,
            stall_on,
            on_page: Mutex::new(None),
        }))
    }

    /// Run `hook` while a page request is in flight.
    fn on_page(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.0.on_page.lock().unwrap() = Some(Box::new(hook));
    }

    fn requested(&self) -> Vec<u32> {
        self.0.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskLister for MemoryLister {
    async fn list_tasks(
        &self,
        collection: &TaskCollection,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, ListError> {
        self.0.requested.lock().unwrap().push(page);
        {
            let hook = self.0.on_page.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook(page);
            }
        }
        if self.0.fail_on == Some(page) {
            return Err(ListError::Status {
                status: 500,
                body: "redis: connection refused".into(),
            });
        }
        if self.0.stall_on == Some(page) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let start = ((page - 1) * size) as usize;
        let tasks = self
            .0
            .tasks
            .iter()
            .skip(start)
            .take(size as usize)
            .cloned()
            .collect();
        Ok(TaskPage {
            tasks,
            stats: Some(QueueStats {
                queue: collection.queue.clone(),
                retry: self.0.tasks.len() as u64,
                ..QueueStats::default()
            }),
        })
    }
}

fn coll() -> TaskCollection {
    TaskCollection::new("default", TaskState::Retry)
}

fn numbered(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| {
            Task::new(format!("t{i}"), "default", TaskState::Retry)
                .with_type("email:send")
                .with_payload(json!({"id": i}))
        })
        .collect()
}

fn config(page_size: u32) -> ScanConfig {
    ScanConfig {
        page_size,
        ..ScanConfig::default()
    }
}

fn controller(lister: &MemoryLister, page_size: u32) -> ScanController<MemoryLister> {
    ScanController::new(lister.clone(), ScanSession::new(), config(page_size))
}

#[tokio::test]
async fn empty_spec_matches_every_task() {
    let lister = MemoryLister::new(numbered(12));
    let ctl = controller(&lister, 5);

    let outcome = ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();

    assert!(matches!(
        outcome,
        ScanOutcome::Completed {
            processed_tasks: 12,
            matches: 12,
            reason: CompletionReason::Exhausted,
            ..
        }
    ));
    let op = ctl.session().operation().unwrap();
    assert!(op.done);
    assert_eq!(op.result.len(), 12);
    assert_eq!(op.total, Some(12));
    assert_eq!(ctl.session().phase(), ScanPhase::Completed);
    assert_eq!(lister.requested(), vec![1, 2, 3]);
}

#[tokio::test]
async fn payload_substring_scan() {
    let tasks = vec![
        Task::new("hit", "default", TaskState::Retry).with_payload(json!({"id": 42})),
        Task::new("miss", "default", TaskState::Retry).with_payload(json!({"id": 7})),
    ];
    let lister = MemoryLister::new(tasks);
    let ctl = controller(&lister, 10);

    ctl.start(coll(), &FilterSpec::default().with_payload_query("42"))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(ctl.session().operation().unwrap().result_ids(), vec!["hit"]);

    ctl.start(coll(), &FilterSpec::default().with_payload_query("43"))
        .unwrap()
        .run()
        .await
        .unwrap();
    let op = ctl.session().operation().unwrap();
    assert!(op.result.is_empty());
    assert_eq!(op.processed_tasks, 2);
}

#[tokio::test]
async fn invalid_regex_never_starts_a_scan() {
    let lister = MemoryLister::new(numbered(3));
    let ctl = controller(&lister, 10);

    let err = ctl
        .start(coll(), &FilterSpec::default().with_payload_regex("("))
        .err()
        .unwrap();

    assert!(err.is_validation());
    assert!(matches!(err, ScanError::Validation(_)));
    assert_eq!(ctl.session().phase(), ScanPhase::Idle);
    assert!(ctl.session().operation().is_none());
    assert!(lister.requested().is_empty());
}

#[tokio::test]
async fn rejected_spec_leaves_previous_result_alone() {
    let lister = MemoryLister::new(numbered(3));
    let ctl = controller(&lister, 10);
    ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();

    assert!(ctl
        .start(coll(), &FilterSpec::default().with_expression("retried >"))
        .is_err());
    assert_eq!(ctl.session().phase(), ScanPhase::Completed);
    assert_eq!(ctl.session().operation().unwrap().result.len(), 3);
}

#[tokio::test]
async fn aggregating_collection_without_group_is_rejected() {
    let lister = MemoryLister::new(Vec::new());
    let ctl = controller(&lister, 10);
    let err = ctl
        .start(TaskCollection::new("default", TaskState::Aggregating), &FilterSpec::default())
        .err()
        .unwrap();
    assert!(matches!(err, ScanError::Collection(_)));
    assert!(ctl.session().operation().is_none());
}

#[tokio::test]
async fn result_limit_stops_after_the_page_with_the_last_match() {
    // Every third task matches: t0, t3 on page 1, t6 on page 2.
    let tasks: Vec<Task> = numbered(20)
        .into_iter()
        .enumerate()
        .map(|(i, t)| if i % 3 == 0 { t.with_type("match") } else { t })
        .collect();
    let lister = MemoryLister::new(tasks);
    let ctl = controller(&lister, 5);
    let spec = FilterSpec::default()
        .with_expression(r#"type == "match""#)
        .with_limit(3);

    let outcome = ctl.start(coll(), &spec).unwrap().run().await.unwrap();

    assert!(matches!(
        outcome,
        ScanOutcome::Completed {
            matches: 3,
            reason: CompletionReason::LimitReached,
            ..
        }
    ));
    let op = ctl.session().operation().unwrap();
    assert!(op.done);
    assert_eq!(op.result_ids(), vec!["t0", "t3", "t6"]);
    assert_eq!(op.processed_tasks, 10);
    assert_eq!(lister.requested(), vec![1, 2]);
}

#[tokio::test]
async fn limit_within_a_single_page_truncates() {
    let lister = MemoryLister::new(numbered(10));
    let ctl = controller(&lister, 10);
    ctl.start(coll(), &FilterSpec::default().with_limit(4))
        .unwrap()
        .run()
        .await
        .unwrap();
    let op = ctl.session().operation().unwrap();
    assert_eq!(op.result.len(), 4);
    assert_eq!(op.processed_tasks, 10);
}

#[tokio::test]
async fn zero_limit_completes_without_fetching() {
    let lister = MemoryLister::new(numbered(10));
    let ctl = controller(&lister, 5);
    let outcome = ctl
        .start(coll(), &FilterSpec::default().with_limit(0))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ScanOutcome::Completed {
            processed_tasks: 0,
            reason: CompletionReason::LimitReached,
            ..
        }
    ));
    assert!(lister.requested().is_empty());
}

#[tokio::test]
async fn processed_count_is_independent_of_matches() {
    let lister = MemoryLister::new(numbered(23));
    let ctl = controller(&lister, 10);
    ctl.start(coll(), &FilterSpec::default().with_payload_query("no such text"))
        .unwrap()
        .run()
        .await
        .unwrap();
    let op = ctl.session().operation().unwrap();
    assert_eq!(op.processed_tasks, 23);
    assert!(op.result.is_empty());
}

#[tokio::test]
async fn cancel_during_fetch_discards_the_scan() {
    let lister = MemoryLister::new(numbered(20));
    let ctl = controller(&lister, 5);
    let session = ctl.session().clone();
    lister.on_page(move |page| {
        if page == 2 {
            session.cancel();
        }
    });

    let outcome = ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();

    assert!(matches!(
        outcome,
        ScanOutcome::Cancelled {
            processed_tasks: 5,
            ..
        }
    ));
    assert!(ctl.session().operation().is_none());
    assert_eq!(ctl.session().phase(), ScanPhase::Cancelled);
    assert_eq!(lister.requested(), vec![1, 2]);
}

#[tokio::test]
async fn cancel_before_first_page_fetches_nothing() {
    let lister = MemoryLister::new(numbered(20));
    let ctl = controller(&lister, 5);
    let scan = ctl.start(coll(), &FilterSpec::default()).unwrap();
    assert!(ctl.session().cancel());

    let outcome = scan.run().await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Cancelled { .. }));
    assert!(lister.requested().is_empty());
    assert!(ctl.session().operation().is_none());
}

#[tokio::test]
async fn fetch_error_fails_and_discards() {
    let lister = MemoryLister::with_faults(numbered(20), Some(2), None);
    let ctl = controller(&lister, 5);

    let err = ctl
        .start(coll(), &FilterSpec::default())
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Fetch(FetchError::List { page: 2, .. })));
    assert!(!err.is_validation());
    assert!(ctl.session().operation().is_none());
    assert_eq!(ctl.session().phase(), ScanPhase::Failed);
    assert!(ctl
        .session()
        .last_error()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn stalled_page_fails_after_timeout() {
    let lister = MemoryLister::with_faults(numbered(20), None, Some(1));
    let ctl = ScanController::new(
        lister.clone(),
        ScanSession::new(),
        ScanConfig {
            page_size: 5,
            page_timeout_secs: 2,
            ..ScanConfig::default()
        },
    );

    let err = ctl
        .start(coll(), &FilterSpec::default())
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Fetch(FetchError::Timeout { page: 1, .. })));
    assert_eq!(ctl.session().phase(), ScanPhase::Failed);
}

#[tokio::test]
async fn new_scan_replaces_the_old_one() {
    let lister = MemoryLister::new(numbered(8));
    let ctl = controller(&lister, 5);

    let first = ctl.start(coll(), &FilterSpec::default()).unwrap();
    let second = ctl
        .start(coll(), &FilterSpec::default().with_payload_query("\"id\":7"))
        .unwrap();
    assert_ne!(first.id(), second.id());

    assert!(matches!(
        first.run().await.unwrap(),
        ScanOutcome::Cancelled { .. }
    ));
    let outcome = second.run().await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { matches: 1, .. }));
    assert_eq!(ctl.session().operation().unwrap().result_ids(), vec!["t7"]);
}

#[tokio::test]
async fn expression_errors_skip_only_the_failing_tasks() {
    let tasks = vec![
        Task::new("a", "default", TaskState::Retry).with_payload(json!({"user": {"name": "ada"}})),
        Task::new("b", "default", TaskState::Retry).with_payload(json!({"user": null})),
        Task::new("c", "default", TaskState::Retry).with_payload(json!({"user": {"name": "ada"}})),
    ];
    let lister = MemoryLister::new(tasks);
    let ctl = controller(&lister, 10);
    ctl.start(
        coll(),
        &FilterSpec::default().with_expression(r#"payload.user.name == "ada""#),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let op = ctl.session().operation().unwrap();
    assert_eq!(op.result_ids(), vec!["a", "c"]);
    assert_eq!(op.processed_tasks, 3);
}

#[tokio::test]
async fn small_eval_chunks_give_the_same_result() {
    let lister = MemoryLister::new(numbered(25));
    let ctl = ScanController::new(
        lister.clone(),
        ScanSession::new(),
        ScanConfig {
            page_size: 10,
            eval_chunk_size: 3,
            ..ScanConfig::default()
        },
    );
    ctl.start(coll(), &FilterSpec::default().with_payload_regex(r#""id":1\d?}"#))
        .unwrap()
        .run()
        .await
        .unwrap();
    let ids = ctl.session().operation().unwrap().result_ids();
    assert_eq!(ids.first().map(String::as_str), Some("t1"));
    assert_eq!(ids.len(), 11);
}

#[tokio::test]
async fn one_progress_notice_per_page() {
    let lister = MemoryLister::new(numbered(12));
    let ctl = controller(&lister, 5);
    let mut notices = ctl.session().subscribe();

    ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice);
    }
    let processed: Vec<u64> = seen
        .iter()
        .filter(|n| n.phase == ScanPhase::Running)
        .map(|n| n.processed_tasks)
        .collect();
    // Begin, then one notice per page.
    assert_eq!(processed, vec![0, 5, 10, 12]);
    assert_eq!(seen.last().unwrap().phase, ScanPhase::Completed);
    assert!(seen.last().unwrap().done);
}

#[tokio::test]
async fn completed_result_follows_mutations() {
    let tasks = vec![
        Task::new("A", "default", TaskState::Retry),
        Task::new("B", "default", TaskState::Retry),
        Task::new("C", "default", TaskState::Retry),
    ];
    let lister = MemoryLister::new(tasks);
    let ctl = controller(&lister, 10);
    let bus = MutationBus::new(16);
    let sync = ResultSetSynchronizer::new(ctl.session().clone()).spawn(&bus);

    ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();

    bus.publish(TaskMutated::batch(coll(), MutationKind::Delete, vec!["B".into()]));
    bus.publish(TaskMutated::single(coll(), MutationKind::Run, "A"));
    bus.publish(TaskMutated::batch(coll(), MutationKind::Delete, vec!["B".into()]));
    drop(bus);
    sync.await.unwrap();

    assert_eq!(ctl.session().operation().unwrap().result_ids(), vec!["C"]);
}

#[tokio::test]
async fn mutations_during_a_running_scan_are_ignored() {
    let lister = MemoryLister::new(numbered(10));
    let ctl = controller(&lister, 5);
    let session = ctl.session().clone();
    lister.on_page(move |page| {
        if page == 2 {
            let mutation = TaskMutated::single(coll(), MutationKind::Delete, "t0");
            assert_eq!(session.evict(mutation), 0);
        }
    });

    ctl.start(coll(), &FilterSpec::default()).unwrap().run().await.unwrap();
    let op = ctl.session().operation().unwrap();
    assert_eq!(op.result.len(), 10);
    assert_eq!(op.result[0].id, "t0");
}
