//! Drives a filter scan: fetch, evaluate, accumulate, report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskscope_core::config::ScanConfig;
use taskscope_core::{TaskCollection, TaskLister};

use crate::error::ScanError;
use crate::fetcher::PageFetcher;
use crate::predicate::Predicate;
use crate::session::{ScanEvent, ScanSession};
use crate::spec::FilterSpec;

/// Starts scans against one task backend and publishes their state on a session.
pub struct ScanController<L> {
    lister: L,
    session: ScanSession,
    config: ScanConfig,
}

impl<L: TaskLister + Clone> ScanController<L> {
    pub fn new(lister: L, session: ScanSession, config: ScanConfig) -> Self {
        Self {
            lister,
            session,
            config,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Validate `spec` and begin a scan of `collection`.
    ///
    /// On a validation error the session is left as it was. Otherwise the
    /// new scan replaces any previous one (whose cancel flag is raised) and
    /// the returned [`Scan`] must be driven with [`Scan::run`].
    pub fn start(&self, collection: TaskCollection, spec: &FilterSpec) -> Result<Scan<L>, ScanError> {
        collection.validate()?;

        self.session.apply(ScanEvent::Compiling);
        let predicate = match Predicate::compile(spec) {
            Ok(predicate) => predicate,
            Err(e) => {
                self.session.apply(ScanEvent::Rejected);
                warn!(collection = %collection, error = %e, "filter rejected");
                return Err(e.into());
            }
        };

        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        self.session.apply(ScanEvent::Begin {
            id,
            collection: collection.clone(),
            spec: spec.clone(),
            cancel: Arc::clone(&cancel),
        });

        info!(
            scan_id = %id,
            collection = %collection,
            page_size = self.config.page_size,
            limit = ?spec.effective_limit(),
            "filter scan started"
        );

        let fetcher = PageFetcher::new(self.lister.clone(), collection, self.config.page_size)
            .with_timeout(self.config.page_timeout());

        Ok(Scan {
            id,
            fetcher,
            predicate,
            limit: spec.effective_limit(),
            chunk: self.config.eval_chunk_size.max(1),
            session: self.session.clone(),
            cancel,
            processed: 0,
            matched: 0,
            eval_errors: 0,
        })
    }
}

/// How a scan ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed {
        id: Uuid,
        processed_tasks: u64,
        matches: usize,
        reason: CompletionReason,
    },
    /// Stopped by cancel, close or a newer scan; nothing was kept.
    Cancelled { id: Uuid, processed_tasks: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Exhausted,
    LimitReached,
}

/// A started scan. Pages are fetched one at a time, strictly in order.
pub struct Scan<L> {
    id: Uuid,
    fetcher: PageFetcher<L>,
    predicate: Predicate,
    limit: Option<usize>,
    chunk: usize,
    session: ScanSession,
    cancel: Arc<AtomicBool>,
    processed: u64,
    matched: usize,
    eval_errors: u64,
}

impl<L: TaskLister> Scan<L> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Flag that stops this scan at its next page boundary when raised.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.matched >= limit)
    }

    fn discard(&self) -> ScanOutcome {
        self.session.apply(ScanEvent::Discard { id: self.id });
        info!(scan_id = %self.id, processed = self.processed, "filter scan cancelled");
        ScanOutcome::Cancelled {
            id: self.id,
            processed_tasks: self.processed,
        }
    }

    /// Run to completion, cancellation or the first fetch failure.
    pub async fn run(mut self) -> Result<ScanOutcome, ScanError> {
        let reason = loop {
            if self.cancelled() {
                return Ok(self.discard());
            }
            if self.limit_reached() {
                break CompletionReason::LimitReached;
            }

            let fetched = self.fetcher.next_page().await;
            // Cancellation during the request wins over whatever it returned.
            if self.cancelled() {
                return Ok(self.discard());
            }
            let page = match fetched {
                Ok(Some(page)) => page,
                Ok(None) => break CompletionReason::Exhausted,
                Err(e) => {
                    self.session.apply(ScanEvent::Fail {
                        id: self.id,
                        error: e.to_string(),
                    });
                    return Err(e.into());
                }
            };

            let page_len = page.len() as u64;
            let mut matches = Vec::new();
            for (i, task) in page.into_iter().enumerate() {
                if i > 0 && i % self.chunk == 0 {
                    tokio::task::yield_now().await;
                }
                if self.limit.is_some_and(|limit| self.matched + matches.len() >= limit) {
                    break;
                }
                match self.predicate.evaluate(&task) {
                    Ok(true) => matches.push(task),
                    Ok(false) => {}
                    Err(e) => {
                        self.eval_errors += 1;
                        debug!(scan_id = %self.id, task_id = %task.id, error = %e, "expression failed, task skipped");
                    }
                }
            }

            self.processed += page_len;
            self.matched += matches.len();
            debug!(
                scan_id = %self.id,
                page = self.fetcher.pages_fetched(),
                processed = self.processed,
                matches = self.matched,
                "page evaluated"
            );
            self.session.apply(ScanEvent::Progress {
                id: self.id,
                processed: page_len,
                matches,
                total: self.fetcher.total(),
            });
        };

        if !self.session.apply(ScanEvent::Complete { id: self.id }) {
            // Cancelled or replaced between the last page and completion.
            return Ok(self.discard());
        }
        info!(
            scan_id = %self.id,
            processed = self.processed,
            matches = self.matched,
            eval_errors = self.eval_errors,
            reason = ?reason,
            "filter scan completed"
        );
        Ok(ScanOutcome::Completed {
            id: self.id,
            processed_tasks: self.processed,
            matches: self.matched,
            reason,
        })
    }
}
