pub mod config;
pub mod error;
pub mod events;
pub mod listing;
pub mod stats;
pub mod task;

pub use config::Config;
pub use error::*;
pub use events::{MutationBus, MutationKind, MutationScope, TaskMutated};
pub use listing::{TaskLister, TaskPage};
pub use stats::QueueStats;
pub use task::{Task, TaskCollection, TaskState};
