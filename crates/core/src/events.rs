//! Task mutation events.
//!
//! Every call site that successfully runs, archives or deletes tasks publishes
//! a [`TaskMutated`] on the [`MutationBus`]. Derived views (such as a finished
//! filter scan) subscribe instead of enumerating mutation call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::CoreError;
use crate::task::{Task, TaskCollection, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Run,
    Archive,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Run => "run",
            MutationKind::Archive => "archive",
            MutationKind::Delete => "delete",
        }
    }

    /// Whether the backend accepts this mutation for tasks in `state`.
    pub fn allowed_for(&self, state: TaskState) -> bool {
        use TaskState::*;
        match self {
            MutationKind::Run => matches!(state, Scheduled | Retry | Archived | Aggregating),
            MutationKind::Archive => matches!(state, Pending | Scheduled | Retry | Aggregating),
            MutationKind::Delete => !matches!(state, Active),
        }
    }

    pub fn check(&self, state: TaskState) -> Result<(), CoreError> {
        if self.allowed_for(state) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedMutation {
                kind: self.as_str().to_string(),
                state: state.to_string(),
            })
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(MutationKind::Run),
            "archive" => Ok(MutationKind::Archive),
            "delete" => Ok(MutationKind::Delete),
            other => Err(CoreError::InvalidMutation(other.to_string())),
        }
    }
}

/// Which tasks of a collection a mutation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "ids", rename_all = "snake_case")]
pub enum MutationScope {
    /// A single task.
    Task(String),
    /// The ids the backend reported as successfully mutated.
    Batch(Vec<String>),
    /// Every task in the collection at the time of the call.
    All,
}

/// Success signal for a run/archive/delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMutated {
    pub collection: TaskCollection,
    pub kind: MutationKind,
    pub scope: MutationScope,
}

impl TaskMutated {
    pub fn single(collection: TaskCollection, kind: MutationKind, id: impl Into<String>) -> Self {
        Self {
            collection,
            kind,
            scope: MutationScope::Task(id.into()),
        }
    }

    pub fn batch(collection: TaskCollection, kind: MutationKind, ids: Vec<String>) -> Self {
        Self {
            collection,
            kind,
            scope: MutationScope::Batch(ids),
        }
    }

    pub fn all(collection: TaskCollection, kind: MutationKind) -> Self {
        Self {
            collection,
            kind,
            scope: MutationScope::All,
        }
    }

    /// Whether this mutation touched `task`.
    ///
    /// Ids are only unique within a queue, so the queue must match as well.
    pub fn affects(&self, task: &Task) -> bool {
        if task.queue != self.collection.queue {
            return false;
        }
        match &self.scope {
            MutationScope::Task(id) => task.id == *id,
            MutationScope::Batch(ids) => ids.iter().any(|id| *id == task.id),
            MutationScope::All => self.collection.contains(task),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.scope, MutationScope::Batch(ids) if ids.is_empty())
    }
}

/// In-process fan-out of [`TaskMutated`] events.
#[derive(Debug, Clone)]
pub struct MutationBus {
    tx: broadcast::Sender<TaskMutated>,
}

impl MutationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    pub fn publish(&self, event: TaskMutated) -> usize {
        if event.is_empty() {
            return 0;
        }
        debug!(
            collection = %event.collection,
            kind = %event.kind,
            scope = ?event.scope,
            "task mutation published"
        );
        // No subscribers is not an error: nothing derived is listening.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskMutated> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MutationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coll(state: TaskState) -> TaskCollection {
        TaskCollection::new("default", state)
    }

    #[test]
    fn allowed_mutations_follow_backend_routes() {
        assert!(MutationKind::Run.allowed_for(TaskState::Retry));
        assert!(!MutationKind::Run.allowed_for(TaskState::Pending));
        assert!(MutationKind::Archive.allowed_for(TaskState::Pending));
        assert!(!MutationKind::Archive.allowed_for(TaskState::Archived));
        assert!(MutationKind::Delete.allowed_for(TaskState::Completed));
        assert!(!MutationKind::Delete.allowed_for(TaskState::Active));
        assert!(MutationKind::Delete.check(TaskState::Active).is_err());
    }

    #[test]
    fn affects_matches_ids_within_queue() {
        let event = TaskMutated::batch(
            coll(TaskState::Retry),
            MutationKind::Delete,
            vec!["a".into(), "b".into()],
        );
        assert!(event.affects(&Task::new("a", "default", TaskState::Retry)));
        assert!(!event.affects(&Task::new("c", "default", TaskState::Retry)));
        assert!(!event.affects(&Task::new("a", "critical", TaskState::Retry)));
    }

    #[test]
    fn all_scope_matches_whole_collection() {
        let event = TaskMutated::all(coll(TaskState::Scheduled), MutationKind::Run);
        assert!(event.affects(&Task::new("x", "default", TaskState::Scheduled)));
        assert!(!event.affects(&Task::new("x", "default", TaskState::Retry)));
    }

    #[test]
    fn kind_parses_from_cli_text() {
        assert_eq!("Archive".parse::<MutationKind>().unwrap(), MutationKind::Archive);
        assert!("cancel".parse::<MutationKind>().is_err());
    }

    #[tokio::test]
    async fn bus_delivers_to_every_subscriber() {
        let bus = MutationBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = TaskMutated::single(coll(TaskState::Pending), MutationKind::Archive, "t1");
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn empty_batches_are_not_published() {
        let bus = MutationBus::new(8);
        let _rx = bus.subscribe();
        let event = TaskMutated::batch(coll(TaskState::Retry), MutationKind::Run, vec![]);
        assert_eq!(bus.publish(event), 0);
    }
}
