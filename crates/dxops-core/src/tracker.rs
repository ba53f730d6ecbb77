//! Per-target job bookkeeping.
//!
//! A `JobTracker` is owned by exactly one worker. It holds every job that
//! worker submitted and has not yet seen reach a terminal state. Jobs are
//! kept in submission order so status lines come out stable.

use tracing::{debug, warn};

use crate::engine::{EngineSession, JobState};
use crate::error::{DxOpsError, Result};

#[derive(Debug, Clone, PartialEq)]
struct TrackedJob {
    handle: String,
    state: JobState,
    /// Failed status queries since the last successful one.
    failures: u32,
}

/// A status query that failed during a pass. The job stays tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub job: String,
    /// Consecutive failures for this job, including this one.
    pub consecutive: u32,
    pub message: String,
}

/// What one `poll_all` pass observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    /// Jobs still tracked after the pass.
    pub running: usize,
    /// Every state successfully read in this pass, in submission order.
    pub observed: Vec<(String, JobState)>,
    /// Jobs removed in this pass, with the terminal state they reached.
    pub finished: Vec<(String, JobState)>,
    pub failures: Vec<PollFailure>,
}

impl PollReport {
    /// The first failure that has hit `bound` consecutive misses, if any.
    pub fn persistent_failure(&self, bound: u32) -> Option<&PollFailure> {
        self.failures.iter().find(|f| f.consecutive >= bound.max(1))
    }
}

#[derive(Debug)]
pub struct JobTracker {
    target: String,
    jobs: Vec<TrackedJob>,
}

impl JobTracker {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            jobs: Vec::new(),
        }
    }

    /// Start tracking `handle` in the `Unknown` state.
    pub fn submit(&mut self, handle: impl Into<String>) -> Result<()> {
        let handle = handle.into();
        if self.jobs.iter().any(|j| j.handle == handle) {
            return Err(DxOpsError::DuplicateJob(handle));
        }
        debug!(engine = %self.target, job = %handle, "tracking job");
        self.jobs.push(TrackedJob {
            handle,
            state: JobState::Unknown,
            failures: 0,
        });
        Ok(())
    }

    /// Query every tracked job once.
    ///
    /// Terminal jobs are removed; everything else, including jobs whose query
    /// failed, stays tracked and counts as running. A failed query never
    /// stops the rest of the pass.
    pub async fn poll_all(&mut self, session: &dyn EngineSession) -> PollReport {
        let mut report = PollReport::default();
        if self.jobs.is_empty() {
            return report;
        }

        let mut still_tracked = Vec::with_capacity(self.jobs.len());
        for mut job in std::mem::take(&mut self.jobs) {
            match session.job_state(&job.handle).await {
                Ok(state) => {
                    debug!(engine = %self.target, job = %job.handle, %state, "job status");
                    report.observed.push((job.handle.clone(), state.clone()));
                    job.failures = 0;
                    job.state = state;
                    if job.state.is_terminal() {
                        report.finished.push((job.handle, job.state));
                        continue;
                    }
                }
                Err(e) => {
                    job.failures += 1;
                    warn!(
                        engine = %self.target,
                        job = %job.handle,
                        attempt = job.failures,
                        "job status query failed: {e}"
                    );
                    report.failures.push(PollFailure {
                        job: job.handle.clone(),
                        consecutive: job.failures,
                        message: e.to_string(),
                    });
                }
            }
            still_tracked.push(job);
        }

        self.jobs = still_tracked;
        report.running = self.jobs.len();
        report
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Handles still tracked, in submission order.
    pub fn handles(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.handle.as_str()).collect()
    }

    pub fn state_of(&self, handle: &str) -> Option<&JobState> {
        self.jobs
            .iter()
            .find(|j| j.handle == handle)
            .map(|j| &j.state)
    }
}
