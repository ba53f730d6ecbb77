use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dxops_core::engine::HttpConnector;
use dxops_core::orchestrator;
use dxops_core::{
    resolve_targets, ActionRequest, DxToolsConfig, Outcome, RunContext, RunOptions, RunStatus,
    RunSummary, Target, TargetSelection, Verb,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::{print_json, print_listing, print_table, render_progress};

pub struct RunArgs {
    pub request: ActionRequest,
    pub selection: TargetSelection,
    pub config: PathBuf,
    pub options: RunOptions,
    pub json: bool,
}

// ---------------------------------------------------------------------------
// RunExit: typed non-zero exit codes, mapped in main
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    Failed { failed: usize, total: usize },
    JobFailed { failed: usize, total: usize },
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::Failed { .. } => RunStatus::Failed.exit_code(),
            RunExit::JobFailed { .. } => RunStatus::JobFailed.exit_code(),
        }
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::Failed { failed, total } => {
                write!(f, "{failed} of {total} engine(s) failed")
            }
            RunExit::JobFailed { failed, total } => {
                write!(f, "jobs failed on {failed} of {total} engine(s)")
            }
        }
    }
}

impl std::error::Error for RunExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let config = DxToolsConfig::load(&args.config).context("failed to load engine config")?;
    let targets = resolve_targets(&config, &args.selection)?;
    let verb = args.request.verb();

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let summary = rt.block_on(execute(
        Arc::new(args.request),
        targets,
        args.options,
        started,
    ));

    if args.json {
        print_json(&summary.to_json())?;
    } else {
        print_summary(&summary, verb);
    }
    info!(
        "dxops took {:.1} minutes to get this far.",
        summary.elapsed_minutes()
    );

    exit_for(&summary)
}

async fn execute(
    request: Arc<ActionRequest>,
    targets: Vec<Arc<Target>>,
    options: RunOptions,
    started: Instant,
) -> RunSummary {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(watch_interrupt(cancel.clone()));

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx, request.verb()));

    let ctx = Arc::new(
        RunContext::new(Arc::new(HttpConnector), options)
            .with_cancel(cancel)
            .with_progress(tx)
            .with_start(started),
    );
    let results = orchestrator::run(request, &targets, Arc::clone(&ctx)).await;
    let elapsed = ctx.elapsed();

    // Last sender goes with the context; the renderer drains and returns.
    drop(ctx);
    interrupt.abort();
    if let Err(e) = renderer.await {
        warn!("progress output stopped early: {e}");
    }

    RunSummary::new(results, elapsed)
}

/// Exit status when a second Ctrl-C abandons in-flight calls.
const FORCED_EXIT_CODE: i32 = 130;

async fn watch_interrupt(cancel: CancellationToken) {
    if interrupt_sequence(cancel, tokio::signal::ctrl_c).await {
        warn!("second interrupt received; quitting without waiting for in-flight calls");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

/// First signal cancels the run; returns `true` if a second one arrives.
async fn interrupt_sequence<F, Fut>(cancel: CancellationToken, mut next_signal: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!("cannot listen for Ctrl-C: {e}");
        return false;
    }
    warn!(
        "interrupt received; no new work will be sent, finishing in-flight calls \
         (Ctrl-C again to quit now)"
    );
    cancel.cancel();

    match next_signal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot listen for Ctrl-C: {e}");
            false
        }
    }
}

fn print_summary(summary: &RunSummary, verb: Verb) {
    if verb == Verb::List {
        for result in summary.results.iter().filter(|r| r.is_success()) {
            print_listing(&result.target, &result.databases);
        }
        println!();
    }

    let rows = summary
        .results
        .iter()
        .map(|r| {
            vec![
                r.target.clone(),
                r.outcome.label().to_string(),
                format!("{:.1}", r.elapsed_minutes()),
                r.message.clone(),
            ]
        })
        .collect();
    print_table(&["ENGINE", "STATUS", "MINUTES", "MESSAGE"], rows);
}

fn exit_for(summary: &RunSummary) -> anyhow::Result<()> {
    let total = summary.results.len();
    let failed = summary
        .results
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed(_)) || r.has_job_failures())
        .count();

    match summary.status() {
        RunStatus::Success => Ok(()),
        RunStatus::Interrupted => {
            warn!("run interrupted; the summary above is partial");
            Ok(())
        }
        RunStatus::JobFailed => Err(RunExit::JobFailed { failed, total }.into()),
        RunStatus::Failed => Err(RunExit::Failed { failed, total }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxops_core::{WorkerError, WorkerResult};
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::time::Duration;

    type Signal = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

    /// Serves scripted signal results, then never fires again.
    fn signals(script: Vec<std::io::Result<()>>) -> impl FnMut() -> Signal {
        let mut script: VecDeque<_> = script.into();
        move || -> Signal {
            match script.pop_front() {
                Some(r) => Box::pin(async move { r }),
                None => Box::pin(std::future::pending()),
            }
        }
    }

    fn result(target: &str, outcome: Outcome) -> WorkerResult {
        WorkerResult {
            target: target.to_string(),
            message: String::new(),
            outcome,
            elapsed: Duration::from_secs(6),
            databases: Vec::new(),
            jobs_completed: 0,
            jobs_failed: 0,
            jobs_canceled: 0,
        }
    }

    fn exit_code(results: Vec<WorkerResult>) -> i32 {
        match exit_for(&RunSummary::new(results, Duration::ZERO)) {
            Ok(()) => 0,
            Err(e) => e.downcast_ref::<RunExit>().map_or(-1, RunExit::exit_code),
        }
    }

    #[test]
    fn exit_codes_follow_run_status() {
        let job_failed = || {
            Outcome::Failed(WorkerError::JobFailed {
                jobs: vec![("JOB-1".into(), "CANCELED".into())],
            })
        };

        assert_eq!(exit_code(vec![result("a", Outcome::Done)]), 0);
        assert_eq!(
            exit_code(vec![
                result("a", Outcome::Done),
                result("b", Outcome::Interrupted)
            ]),
            0
        );
        assert_eq!(exit_code(vec![result("a", job_failed())]), 3);
        assert_eq!(
            exit_code(vec![
                result("a", job_failed()),
                result(
                    "b",
                    Outcome::Failed(WorkerError::Resolution {
                        object: "testvdb".into(),
                        message: "no such VDB".into(),
                    })
                ),
            ]),
            1
        );
    }

    #[test]
    fn run_exit_counts_failed_engines() {
        let err = exit_for(&RunSummary::new(
            vec![
                result("a", Outcome::Done),
                result("b", Outcome::Failed(WorkerError::Connection("refused".into()))),
            ],
            Duration::ZERO,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 engine(s) failed");
    }

    #[test]
    fn interrupted_engine_with_failed_job_is_not_a_clean_exit() {
        let mut interrupted = result("b", Outcome::Interrupted);
        interrupted.jobs_failed = 1;
        let err = exit_for(&RunSummary::new(
            vec![result("a", Outcome::Done), interrupted],
            Duration::ZERO,
        ))
        .unwrap_err();
        assert_eq!(err.downcast_ref::<RunExit>().map(RunExit::exit_code), Some(3));
        assert_eq!(err.to_string(), "jobs failed on 1 of 2 engine(s)");
    }

    #[tokio::test]
    async fn second_interrupt_forces_quit() {
        let cancel = CancellationToken::new();
        let forced = interrupt_sequence(cancel.clone(), signals(vec![Ok(()), Ok(())])).await;
        assert!(forced);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn single_interrupt_only_cancels() {
        let cancel = CancellationToken::new();
        let watcher = interrupt_sequence(cancel.clone(), signals(vec![Ok(())]));
        let waited = tokio::time::timeout(Duration::from_secs(60), watcher).await;
        assert!(waited.is_err(), "watcher returned without a second signal");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn unavailable_signal_leaves_run_alone() {
        let cancel = CancellationToken::new();
        let forced = interrupt_sequence(
            cancel.clone(),
            signals(vec![Err(std::io::Error::other("no signal handler"))]),
        )
        .await;
        assert!(!forced);
        assert!(!cancel.is_cancelled());
    }
}
