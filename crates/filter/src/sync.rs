//! Keeps a completed scan's result in step with task mutations.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taskscope_core::{MutationBus, TaskMutated};

use crate::session::ScanSession;

/// Removes mutated tasks from the result of a finished scan.
///
/// Tasks are never re-evaluated: anything a mutation touched leaves the
/// result. Mutations that arrive while a scan is still running are ignored,
/// as are repeats of mutations already applied.
#[derive(Debug, Clone)]
pub struct ResultSetSynchronizer {
    session: ScanSession,
}

impl ResultSetSynchronizer {
    pub fn new(session: ScanSession) -> Self {
        Self { session }
    }

    /// Apply one mutation. Returns the number of tasks evicted.
    pub fn apply(&self, mutation: &TaskMutated) -> usize {
        self.session.evict(mutation.clone())
    }

    /// Consume mutations until the bus closes.
    pub async fn run(self, mut rx: broadcast::Receiver<TaskMutated>) {
        loop {
            match rx.recv().await {
                Ok(mutation) => {
                    let removed = self.apply(&mutation);
                    if removed > 0 {
                        debug!(
                            collection = %mutation.collection,
                            kind = %mutation.kind,
                            removed,
                            "result set synchronized"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "mutation subscriber lagged, some evictions were missed");
                }
                Err(RecvError::Closed) => {
                    info!("mutation bus closed, synchronizer stopping");
                    break;
                }
            }
        }
    }

    /// Subscribe to `bus` and run in the background.
    pub fn spawn(self, bus: &MutationBus) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx))
    }
}
