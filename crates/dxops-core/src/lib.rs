//! Core of `dxops`: run one VDB action against many engines in parallel and
//! track the resulting jobs until they drain.
//!
//! ```text
//! orchestrator::run
//!     │  one tokio task per target
//!     ▼
//! TargetWorker   ← connect, resolve VDBs, submit, poll every interval
//!     │
//!     ▼
//! JobTracker     ← job handle → last known state; drops terminal jobs
//! ```

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod summary;
pub mod timing;
pub mod tracker;
pub mod worker;

#[cfg(test)]
mod testing;

pub use action::{ActionRequest, Verb};
pub use config::{DxToolsConfig, RunOptions, Target};
pub use error::{DxOpsError, Result, WorkerError};
pub use orchestrator::{resolve_targets, TargetSelection};
pub use summary::{RunStatus, RunSummary};
pub use worker::{Outcome, ProgressEvent, ProgressKind, RunContext, WorkerResult};
