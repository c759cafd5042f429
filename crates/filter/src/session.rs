//! Shared state of the current filter scan.
//!
//! A [`ScanSession`] owns at most one [`FilterOperation`]. The controller,
//! the result-set synchronizer and any progress view hold clones of the same
//! session; every change goes through [`ScanSession::apply`] under one lock,
//! so progress, completion, cancellation and eviction are totally ordered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskscope_core::{Task, TaskCollection, TaskMutated};

use crate::spec::FilterSpec;

/// Default buffer of the notice channel.
const NOTICE_CAPACITY: usize = 256;

// ── Operation ───────────────────────────────────────────────────────

/// The accumulated state of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOperation {
    pub id: Uuid,
    pub collection: TaskCollection,
    pub spec: FilterSpec,
    pub done: bool,
    pub cancelled: bool,
    /// Tasks fetched so far, matching or not.
    pub processed_tasks: u64,
    /// Matches in fetch order.
    pub result: Vec<Task>,
    /// Size of the collection as last reported by the backend.
    pub total: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl FilterOperation {
    fn new(id: Uuid, collection: TaskCollection, spec: FilterSpec) -> Self {
        Self {
            id,
            collection,
            spec,
            done: false,
            cancelled: false,
            processed_tasks: 0,
            result: Vec::new(),
            total: None,
            started_at: Utc::now(),
        }
    }

    pub fn result_ids(&self) -> Vec<String> {
        self.result.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    Compiling,
    Running,
    Completed,
    Cancelled,
    Failed,
}

// ── Events ──────────────────────────────────────────────────────────

/// Every state change a session accepts.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A spec is being validated.
    Compiling,
    /// Validation failed; the session returns to where it was.
    Rejected,
    /// A new scan replaces whatever was there.
    Begin {
        id: Uuid,
        collection: TaskCollection,
        spec: FilterSpec,
        cancel: Arc<AtomicBool>,
    },
    /// One page was evaluated.
    Progress {
        id: Uuid,
        processed: u64,
        matches: Vec<Task>,
        total: Option<u64>,
    },
    Complete { id: Uuid },
    /// User asked to stop.
    Cancel,
    /// The controller observed cancellation and drops the scan.
    Discard { id: Uuid },
    Fail { id: Uuid, error: String },
    /// Drop tasks touched by a mutation from a completed result.
    Evict(TaskMutated),
    /// Dismiss the scan unconditionally.
    Close,
}

impl ScanEvent {
    fn scan_id(&self) -> Option<Uuid> {
        match self {
            ScanEvent::Begin { id, .. }
            | ScanEvent::Progress { id, .. }
            | ScanEvent::Complete { id }
            | ScanEvent::Discard { id }
            | ScanEvent::Fail { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Count-level view of the session, broadcast after every applied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanNotice {
    pub id: Option<Uuid>,
    pub phase: ScanPhase,
    pub processed_tasks: u64,
    pub matches: usize,
    pub total: Option<u64>,
    pub done: bool,
    pub cancelled: bool,
}

// ── Session ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct SessionState {
    phase: ScanPhase,
    /// Phase to return to when validation fails.
    before_compile: Option<ScanPhase>,
    operation: Option<FilterOperation>,
    cancel: Option<Arc<AtomicBool>>,
    last_error: Option<String>,
}

impl SessionState {
    fn raise_cancel(&mut self) {
        if let Some(flag) = self.cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn notice(&self) -> ScanNotice {
        match &self.operation {
            Some(op) => ScanNotice {
                id: Some(op.id),
                phase: self.phase,
                processed_tasks: op.processed_tasks,
                matches: op.result.len(),
                total: op.total,
                done: op.done,
                cancelled: op.cancelled,
            },
            None => ScanNotice {
                id: None,
                phase: self.phase,
                processed_tasks: 0,
                matches: 0,
                total: None,
                done: false,
                cancelled: false,
            },
        }
    }
}

/// Cloneable handle to the scan state.
#[derive(Debug, Clone)]
pub struct ScanSession {
    state: Arc<Mutex<SessionState>>,
    notices: broadcast::Sender<ScanNotice>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SessionState {
                phase: ScanPhase::Idle,
                before_compile: None,
                operation: None,
                cancel: None,
                last_error: None,
            })),
            notices,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Dispatch never panics mid-update, so a poisoned lock still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one event. Returns false when the event was ignored (stale scan
    /// id, progress after completion or cancellation, nothing to evict).
    pub fn apply(&self, event: ScanEvent) -> bool {
        self.dispatch(event).is_some()
    }

    /// Evict tasks touched by `mutation` from a completed result.
    /// Returns the number of tasks removed.
    pub fn evict(&self, mutation: TaskMutated) -> usize {
        self.dispatch(ScanEvent::Evict(mutation)).unwrap_or(0)
    }

    /// Single dispatch path. `Some(n)` when applied, with `n` the number of
    /// result entries added or removed.
    fn dispatch(&self, event: ScanEvent) -> Option<usize> {
        let mut state = self.lock();

        if let Some(id) = event.scan_id() {
            let is_current = state.operation.as_ref().is_some_and(|op| op.id == id);
            if !is_current && !matches!(event, ScanEvent::Begin { .. }) {
                debug!(scan_id = %id, "ignoring event for a scan that is no longer current");
                return None;
            }
        }

        let changed = match event {
            ScanEvent::Compiling => {
                let phase = state.phase;
                state.before_compile = Some(phase);
                state.phase = ScanPhase::Compiling;
                0
            }
            ScanEvent::Rejected => {
                let saved = state.before_compile.take()?;
                // A scan from before the rejected spec may have settled meanwhile.
                let phase = match &state.operation {
                    Some(op) if op.done => ScanPhase::Completed,
                    Some(_) => ScanPhase::Running,
                    None if state.phase == ScanPhase::Compiling => saved,
                    None => state.phase,
                };
                state.phase = phase;
                0
            }
            ScanEvent::Begin {
                id,
                collection,
                spec,
                cancel,
            } => {
                if let Some(previous) = &state.operation {
                    info!(scan_id = %previous.id, "scan replaced by a new one");
                }
                state.raise_cancel();
                state.operation = Some(FilterOperation::new(id, collection, spec));
                state.cancel = Some(cancel);
                state.before_compile = None;
                state.last_error = None;
                state.phase = ScanPhase::Running;
                0
            }
            ScanEvent::Progress {
                processed,
                matches,
                total,
                ..
            } => {
                let op = state.operation.as_mut()?;
                if op.done || op.cancelled {
                    return None;
                }
                op.processed_tasks += processed;
                let added = matches.len();
                op.result.extend(matches);
                if total.is_some() {
                    op.total = total;
                }
                added
            }
            ScanEvent::Complete { .. } => {
                let op = state.operation.as_mut()?;
                if op.done || op.cancelled {
                    return None;
                }
                op.done = true;
                state.cancel = None;
                state.phase = ScanPhase::Completed;
                0
            }
            ScanEvent::Cancel => {
                let op = state.operation.as_mut()?;
                if op.done {
                    // Nothing in flight: dismiss right away.
                    state.operation = None;
                    state.phase = ScanPhase::Cancelled;
                    0
                } else if op.cancelled {
                    return None;
                } else {
                    op.cancelled = true;
                    state.raise_cancel();
                    0
                }
            }
            ScanEvent::Discard { .. } => {
                let op = state.operation.take()?;
                state.cancel = None;
                state.phase = ScanPhase::Cancelled;
                op.result.len()
            }
            ScanEvent::Fail { error, .. } => {
                let op = state.operation.take()?;
                warn!(scan_id = %op.id, error = %error, "scan failed, partial result discarded");
                state.cancel = None;
                state.last_error = Some(error);
                state.phase = ScanPhase::Failed;
                op.result.len()
            }
            ScanEvent::Evict(mutation) => {
                let op = state.operation.as_mut()?;
                if !op.done {
                    return None;
                }
                let before = op.result.len();
                op.result.retain(|task| !mutation.affects(task));
                let removed = before - op.result.len();
                if removed == 0 {
                    return None;
                }
                debug!(
                    scan_id = %op.id,
                    kind = %mutation.kind,
                    removed,
                    remaining = op.result.len(),
                    "evicted mutated tasks from result"
                );
                removed
            }
            ScanEvent::Close => {
                state.raise_cancel();
                let had_operation = state.operation.take().is_some();
                state.phase = ScanPhase::Idle;
                if !had_operation {
                    return None;
                }
                0
            }
        };

        let notice = state.notice();
        drop(state);
        // No listeners is fine.
        let _ = self.notices.send(notice);
        Some(changed)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Counts of the current scan.
    pub fn snapshot(&self) -> ScanNotice {
        self.lock().notice()
    }

    /// A copy of the current operation, result included.
    pub fn operation(&self) -> Option<FilterOperation> {
        self.lock().operation.clone()
    }

    pub fn phase(&self) -> ScanPhase {
        self.lock().phase
    }

    /// Message of the last failed scan, cleared when a new scan begins.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Id of the current scan, if any.
    pub fn current_id(&self) -> Option<Uuid> {
        self.lock().operation.as_ref().map(|op| op.id)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Request cancellation. A running scan stops at its next page boundary
    /// and is discarded; a completed one is discarded immediately.
    pub fn cancel(&self) -> bool {
        self.apply(ScanEvent::Cancel)
    }

    /// Dismiss the current scan, running or not.
    pub fn close(&self) -> bool {
        self.apply(ScanEvent::Close)
    }

    /// Receive a [`ScanNotice`] after every applied event.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanNotice> {
        self.notices.subscribe()
    }
}
