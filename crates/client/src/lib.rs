//! REST client for the task-queue monitoring API.
//!
//! Lists task collections page by page (implementing
//! [`taskscope_core::TaskLister`]) and issues run/archive/delete calls,
//! publishing a [`taskscope_core::TaskMutated`] for every success.

pub mod client;
pub mod error;
pub mod wire;

pub use client::{BatchOutcome, TaskscopeClient};
pub use error::ClientError;
pub use wire::{parse_task, parse_task_page};
