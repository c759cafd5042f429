//! Incremental task filter engine.
//!
//! This crate provides:
//! - [`FilterSpec`]: substring, regex and expression criteria plus a result limit
//! - [`Predicate`]: the compiled spec, including a sandboxed expression interpreter
//! - [`PageFetcher`]: sequential page reads over a task collection
//! - [`ScanController`] / [`Scan`]: fetch, evaluate, accumulate and report progress
//! - [`ScanSession`]: the shared, cancellable state of the current scan
//! - [`ResultSetSynchronizer`]: evicts mutated tasks from a finished scan

pub mod controller;
pub mod error;
pub mod expr;
pub mod fetcher;
pub mod predicate;
pub mod session;
pub mod spec;
pub mod sync;

pub use controller::{CompletionReason, Scan, ScanController, ScanOutcome};
pub use error::{CompileError, FetchError, ScanError};
pub use expr::{EvalError, ExprError, Expression};
pub use fetcher::PageFetcher;
pub use predicate::Predicate;
pub use session::{FilterOperation, ScanEvent, ScanNotice, ScanPhase, ScanSession};
pub use spec::FilterSpec;
pub use sync::ResultSetSynchronizer;
