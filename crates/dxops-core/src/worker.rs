//! One worker per target: connect, resolve, submit, poll until drained.
//!
//! ```text
//! Connecting ─► ResolvingObject ─► Submitting ◄─► Polling ─► Done
//!      │               │               │             │
//!      └───────────────┴───────┬───────┴─────────────┘
//!                              ▼
//!                     Failed | Interrupted
//! ```
//!
//! `list` goes straight from `Connecting` to `Submitting` and never polls.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use dx_engine::SourceOperation;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action::ActionRequest;
use crate::config::{RunOptions, Target};
use crate::engine::{Connector, DatabaseUsage, EngineSession, JobState};
use crate::error::WorkerError;
use crate::timing::elapsed_minutes;
use crate::tracker::JobTracker;

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Everything a worker needs besides its target and the request. Built once
/// per run and shared read-only.
pub struct RunContext {
    pub connector: Arc<dyn Connector>,
    pub options: RunOptions,
    pub cancel: CancellationToken,
    /// Start of the run; all elapsed times are measured from here.
    pub started: Instant,
    pub progress: Option<UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    pub fn new(connector: Arc<dyn Connector>, options: RunOptions) -> Self {
        Self {
            connector,
            options,
            cancel: CancellationToken::new(),
            started: Instant::now(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_start(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressKind {
    Connected,
    Submitted { object: String, job: Option<String> },
    JobStatus { job: String, state: JobState },
    Running { count: usize },
}

/// Emitted by workers as they make progress, for the caller to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub target: String,
    pub kind: ProgressKind,
}

// ---------------------------------------------------------------------------
// WorkerResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Connecting,
    ResolvingObject,
    Submitting,
    Polling,
    Done,
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Failed(WorkerError),
    Interrupted,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Failed(e) => e.kind(),
            Outcome::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub target: String,
    pub outcome: Outcome,
    pub message: String,
    /// Time since the start of the run when this worker finished.
    pub elapsed: Duration,
    /// Filled only by the `list` verb.
    pub databases: Vec<DatabaseUsage>,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_canceled: usize,
}

impl WorkerResult {
    pub fn failed(target: impl Into<String>, error: WorkerError, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            message: error.to_string(),
            outcome: Outcome::Failed(error),
            elapsed,
            databases: Vec::new(),
            jobs_completed: 0,
            jobs_failed: 0,
            jobs_canceled: 0,
        }
    }

    /// Whether any job this worker submitted ended FAILED or CANCELED,
    /// whatever the worker's own outcome.
    pub fn has_job_failures(&self) -> bool {
        self.jobs_failed + self.jobs_canceled > 0
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Done
    }

    pub fn elapsed_minutes(&self) -> f64 {
        elapsed_minutes(self.elapsed)
    }
}

// ---------------------------------------------------------------------------
// TargetWorker
// ---------------------------------------------------------------------------

enum Finish {
    Done(String),
    Interrupted(String),
}

pub struct TargetWorker {
    target: Arc<Target>,
    request: Arc<ActionRequest>,
    ctx: Arc<RunContext>,
    tracker: JobTracker,
    phase: WorkerPhase,
    databases: Vec<DatabaseUsage>,
    jobs_completed: usize,
    jobs_failed: Vec<(String, JobState)>,
}

impl TargetWorker {
    pub fn new(target: Arc<Target>, request: Arc<ActionRequest>, ctx: Arc<RunContext>) -> Self {
        let tracker = JobTracker::new(target.name());
        Self {
            target,
            request,
            ctx,
            tracker,
            phase: WorkerPhase::Connecting,
            databases: Vec::new(),
            jobs_completed: 0,
            jobs_failed: Vec::new(),
        }
    }

    /// Drive the target to a terminal phase and report. Never panics on
    /// engine errors; every failure ends up in the result.
    pub async fn run(mut self) -> WorkerResult {
        let driven = self.drive().await;
        let (outcome, message) = match driven {
            Ok(Finish::Done(message)) => {
                self.enter(WorkerPhase::Done);
                (Outcome::Done, message)
            }
            Ok(Finish::Interrupted(message)) => {
                self.enter(WorkerPhase::Interrupted);
                (Outcome::Interrupted, message)
            }
            Err(error) => {
                self.enter(WorkerPhase::Failed);
                warn!("{}: {error}", self.target.name());
                (Outcome::Failed(error.clone()), error.to_string())
            }
        };

        WorkerResult {
            target: self.target.name().to_string(),
            outcome,
            message,
            elapsed: self.ctx.elapsed(),
            databases: std::mem::take(&mut self.databases),
            jobs_completed: self.jobs_completed,
            jobs_failed: self.count_ended(&JobState::Failed),
            jobs_canceled: self.count_ended(&JobState::Canceled),
        }
    }

    async fn drive(&mut self) -> Result<Finish, WorkerError> {
        self.enter(WorkerPhase::Connecting);
        let session = self
            .ctx
            .connector
            .connect(&self.target)
            .await
            .map_err(|e| WorkerError::Connection(e.0))?;
        self.emit(ProgressKind::Connected);

        if self.ctx.cancel.is_cancelled() {
            return Ok(self.interrupted(0));
        }

        let Some(op) = self.request.verb().operation() else {
            return self.list(session.as_ref()).await;
        };

        self.enter(WorkerPhase::ResolvingObject);
        let mut pending = VecDeque::with_capacity(self.request.objects().len());
        for name in self.request.objects() {
            debug!(engine = %self.target.name(), vdb = %name, "searching for reference");
            match session.find_source(name).await {
                Ok(Some(reference)) => pending.push_back((name.clone(), reference)),
                Ok(None) => {
                    return Err(WorkerError::Resolution {
                        object: name.clone(),
                        message: format!("no VDB named '{name}' on {}", self.target.name()),
                    })
                }
                Err(e) => {
                    return Err(WorkerError::Resolution {
                        object: name.clone(),
                        message: e.0,
                    })
                }
            }
        }

        self.drain(session.as_ref(), op, pending).await
    }

    async fn list(&mut self, session: &dyn EngineSession) -> Result<Finish, WorkerError> {
        self.enter(WorkerPhase::Submitting);
        self.databases = session
            .list_databases()
            .await
            .map_err(|e| WorkerError::Submission {
                action: "list".to_string(),
                object: "databases".to_string(),
                message: e.0,
            })?;
        Ok(Finish::Done(format!(
            "{} database(s) listed",
            self.databases.len()
        )))
    }

    /// Submit and poll until nothing is pending or tracked.
    ///
    /// With a ceiling, at most `ceiling` jobs are tracked at once; remaining
    /// submissions wait for earlier jobs to drain.
    async fn drain(
        &mut self,
        session: &dyn EngineSession,
        op: SourceOperation,
        mut pending: VecDeque<(String, String)>,
    ) -> Result<Finish, WorkerError> {
        let ceiling = self.ctx.options.parallel.map(NonZeroUsize::get);
        let bound = self.ctx.options.max_poll_failures;

        loop {
            while !pending.is_empty() && ceiling.map_or(true, |max| self.tracker.len() < max) {
                if self.ctx.cancel.is_cancelled() {
                    return Ok(self.interrupted(pending.len()));
                }
                let Some((name, reference)) = pending.pop_front() else {
                    break;
                };
                self.enter(WorkerPhase::Submitting);
                self.submit(session, op, &name, &reference).await?;
            }

            if self.tracker.is_empty() && pending.is_empty() {
                break;
            }

            if self.ctx.cancel.is_cancelled() {
                return Ok(self.interrupted(pending.len()));
            }

            self.enter(WorkerPhase::Polling);
            let report = self.tracker.poll_all(session).await;
            for (job, state) in report.observed.iter().cloned() {
                self.emit(ProgressKind::JobStatus { job, state });
            }
            for (job, state) in &report.finished {
                if state.is_failure() {
                    self.jobs_failed.push((job.clone(), state.clone()));
                } else {
                    self.jobs_completed += 1;
                }
            }
            debug!(engine = %self.target.name(), running = report.running, "poll pass");
            self.emit(ProgressKind::Running {
                count: report.running,
            });

            if let Some(f) = report.persistent_failure(bound) {
                return Err(WorkerError::Poll {
                    job: f.job.clone(),
                    failures: f.consecutive,
                    message: f.message.clone(),
                });
            }

            if self.tracker.is_empty() {
                if pending.is_empty() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.options.poll_interval) => {}
                _ = self.ctx.cancel.cancelled() => {
                    return Ok(self.interrupted(pending.len()));
                }
            }
        }

        if !self.jobs_failed.is_empty() {
            return Err(WorkerError::JobFailed {
                jobs: self
                    .jobs_failed
                    .iter()
                    .map(|(j, s)| (j.clone(), s.to_string()))
                    .collect(),
            });
        }

        Ok(Finish::Done(format!(
            "{} {} completed",
            self.request.verb(),
            self.request.objects().join(", ")
        )))
    }

    async fn submit(
        &mut self,
        session: &dyn EngineSession,
        op: SourceOperation,
        name: &str,
        reference: &str,
    ) -> Result<(), WorkerError> {
        let submission_error = |message: String| WorkerError::Submission {
            action: op.to_string(),
            object: name.to_string(),
            message,
        };

        let job = session
            .invoke(op, reference)
            .await
            .map_err(|e| submission_error(e.0))?;
        debug!(engine = %self.target.name(), vdb = %name, %op, job = ?job, "submitted");

        match &job {
            Some(handle) => self
                .tracker
                .submit(handle.clone())
                .map_err(|e| submission_error(e.to_string()))?,
            None => self.jobs_completed += 1,
        }
        self.emit(ProgressKind::Submitted {
            object: name.to_string(),
            job,
        });
        Ok(())
    }

    fn count_ended(&self, state: &JobState) -> usize {
        self.jobs_failed.iter().filter(|(_, s)| s == state).count()
    }

    fn interrupted(&self, unsent: usize) -> Finish {
        if self.tracker.is_empty() && unsent == 0 && self.jobs_failed.is_empty() {
            return Finish::Interrupted("interrupted before any work was submitted".to_string());
        }
        let mut message = String::from("interrupted");
        if !self.tracker.is_empty() {
            message.push_str(&format!(
                " with job(s) still running: {}",
                self.tracker.handles().join(", ")
            ));
        }
        if unsent > 0 {
            message.push_str(&format!("; {unsent} submission(s) not sent"));
        }
        if !self.jobs_failed.is_empty() {
            let failed: Vec<String> = self
                .jobs_failed
                .iter()
                .map(|(job, state)| format!("{job} {state}"))
                .collect();
            message.push_str(&format!("; failed: {}", failed.join(", ")));
        }
        Finish::Interrupted(message)
    }

    fn enter(&mut self, phase: WorkerPhase) {
        if self.phase != phase {
            debug!(engine = %self.target.name(), from = ?self.phase, to = ?phase, "phase");
            self.phase = phase;
        }
    }

    fn emit(&self, kind: ProgressKind) {
        if let Some(tx) = &self.ctx.progress {
            // The receiver going away only means nobody is rendering.
            let _ = tx.send(ProgressEvent {
                target: self.target.name().to_string(),
                kind,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
