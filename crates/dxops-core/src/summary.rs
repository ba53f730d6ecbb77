//! End-of-run aggregation: overall status, exit code, and JSON rendering.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::WorkerError;
use crate::timing::elapsed_minutes;
use crate::worker::{Outcome, WorkerResult};

/// Overall verdict of a run.
///
/// Precedence: any connection, resolution, submission, poll, or internal
/// failure makes the run `Failed`; otherwise any remote job failure makes it
/// `JobFailed`, including an interrupted target that had already seen a job
/// fail; otherwise an interrupted target makes it `Interrupted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Interrupted,
    JobFailed,
    Failed,
}

impl RunStatus {
    /// Process exit code. An interrupted run reports what it managed and
    /// exits 0.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::Interrupted => 0,
            RunStatus::Failed => 1,
            RunStatus::JobFailed => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: Vec<WorkerResult>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(results: Vec<WorkerResult>, elapsed: Duration) -> Self {
        Self {
            results,
            elapsed,
            finished_at: Utc::now(),
        }
    }

    pub fn status(&self) -> RunStatus {
        let mut status = RunStatus::Success;
        for result in &self.results {
            let this = match &result.outcome {
                Outcome::Done => RunStatus::Success,
                Outcome::Interrupted if result.has_job_failures() => RunStatus::JobFailed,
                Outcome::Interrupted => RunStatus::Interrupted,
                Outcome::Failed(WorkerError::JobFailed { .. }) => RunStatus::JobFailed,
                Outcome::Failed(
                    WorkerError::Connection(_)
                    | WorkerError::Resolution { .. }
                    | WorkerError::Submission { .. }
                    | WorkerError::Poll { .. }
                    | WorkerError::Internal(_),
                ) => RunStatus::Failed,
            };
            status = status.max_by_precedence(this);
        }
        status
    }

    pub fn elapsed_minutes(&self) -> f64 {
        elapsed_minutes(self.elapsed)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let results: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "engine": r.target,
                    "status": r.outcome.label(),
                    "message": r.message,
                    "elapsed_minutes": r.elapsed_minutes(),
                    "jobs_completed": r.jobs_completed,
                    "jobs_failed": r.jobs_failed,
                    "jobs_canceled": r.jobs_canceled,
                    "databases": r.databases,
                })
            })
            .collect();

        serde_json::json!({
            "status": match self.status() {
                RunStatus::Success => "success",
                RunStatus::Interrupted => "interrupted",
                RunStatus::JobFailed => "job_failed",
                RunStatus::Failed => "failed",
            },
            "elapsed_minutes": self.elapsed_minutes(),
            "finished_at": self.finished_at,
            "succeeded": self.results.iter().filter(|r| r.is_success()).count(),
            "engines": self.results.len(),
            "results": results,
        })
    }
}

impl RunStatus {
    fn rank(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Interrupted => 1,
            RunStatus::JobFailed => 2,
            RunStatus::Failed => 3,
        }
    }

    fn max_by_precedence(self, other: RunStatus) -> RunStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}
