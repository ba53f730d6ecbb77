use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole run before (or instead of) any target work.
#[derive(Debug, Error)]
pub enum DxOpsError {
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("engine '{0}' cannot be found in the config; check the value and try again")]
    TargetNotFound(String),

    #[error("no default engine found in the config")]
    NoDefaultTarget,

    #[error("no engines configured")]
    NoTargets,

    #[error("job {0} is already tracked")]
    DuplicateJob(String),
}

pub type Result<T> = std::result::Result<T, DxOpsError>;

/// Why a single target's worker failed. Fatal to that target only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{object} not found: {message}")]
    Resolution { object: String, message: String },

    #[error("{action} on {object} failed: {message}")]
    Submission {
        action: String,
        object: String,
        message: String,
    },

    #[error("status of job {job} unavailable after {failures} attempt(s): {message}")]
    Poll {
        job: String,
        failures: u32,
        message: String,
    },

    #[error("job(s) did not complete: {}", format_jobs(.jobs))]
    JobFailed { jobs: Vec<(String, String)> },

    #[error("worker aborted: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Short stable label used in summaries and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Connection(_) => "connection_error",
            WorkerError::Resolution { .. } => "resolution_error",
            WorkerError::Submission { .. } => "submission_error",
            WorkerError::Poll { .. } => "poll_error",
            WorkerError::JobFailed { .. } => "job_failed",
            WorkerError::Internal(_) => "internal_error",
        }
    }
}

fn format_jobs(jobs: &[(String, String)]) -> String {
    jobs.iter()
        .map(|(job, state)| format!("{job} {state}"))
        .collect::<Vec<_>>()
        .join(", ")
}
