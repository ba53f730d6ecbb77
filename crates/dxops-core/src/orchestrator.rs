//! Fan one action out to every selected engine and collect the results.

use std::sync::Arc;

use tracing::info;

use crate::action::ActionRequest;
use crate::config::{DxToolsConfig, Target};
use crate::error::{DxOpsError, Result, WorkerError};
use crate::worker::{RunContext, TargetWorker, WorkerResult};

/// Which engines a run applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    All,
    Named(String),
    Default,
}

impl TargetSelection {
    pub fn from_flags(all: bool, engine: Option<String>) -> Self {
        match (all, engine) {
            (true, _) => TargetSelection::All,
            (false, Some(name)) => TargetSelection::Named(name),
            (false, None) => TargetSelection::Default,
        }
    }
}

/// Resolve the selection against the configured engines, in config order.
///
/// If several engines are flagged default, the first one in the file wins;
/// config validation has already warned about the others.
pub fn resolve_targets(
    config: &DxToolsConfig,
    selection: &TargetSelection,
) -> Result<Vec<Arc<Target>>> {
    match selection {
        TargetSelection::All => {
            if config.targets.is_empty() {
                return Err(DxOpsError::NoTargets);
            }
            info!("Executing against all engines in {}", config.path.display());
            Ok(config.targets.iter().cloned().map(Arc::new).collect())
        }
        TargetSelection::Named(name) => {
            let target = config
                .find(name)
                .ok_or_else(|| DxOpsError::TargetNotFound(name.clone()))?;
            info!("Executing against engine: {name}");
            Ok(vec![Arc::new(target.clone())])
        }
        TargetSelection::Default => {
            let target = config
                .default_target()
                .ok_or(DxOpsError::NoDefaultTarget)?;
            info!("Executing against the default engine: {}", target.name());
            Ok(vec![Arc::new(target.clone())])
        }
    }
}

/// Launch one worker per target concurrently and wait for all of them.
///
/// Results come back in the order of `targets`, whatever order the workers
/// finish in. A worker task that panics is reported as a failed target.
pub async fn run(
    request: Arc<ActionRequest>,
    targets: &[Arc<Target>],
    ctx: Arc<RunContext>,
) -> Vec<WorkerResult> {
    let handles: Vec<_> = targets
        .iter()
        .map(|target| {
            let worker =
                TargetWorker::new(Arc::clone(target), Arc::clone(&request), Arc::clone(&ctx));
            (target.name().to_string(), tokio::spawn(worker.run()))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => results.push(WorkerResult::failed(
                name,
                WorkerError::Internal(format!("task join error: {e}")),
                ctx.elapsed(),
            )),
        }
    }
    results
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Verb;
    use crate::config::RunOptions;
    use crate::engine::JobState;
    use crate::testing::{target, FakeConnector, FakeEngine};
    use crate::worker::Outcome;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(targets: Vec<Target>) -> DxToolsConfig {
        DxToolsConfig {
            targets,
            path: PathBuf::from("dxtools.conf"),
        }
    }

    fn names(targets: &[Arc<Target>]) -> Vec<&str> {
        targets.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn default_selection_picks_flagged_target() {
        let cfg = config(vec![target("east", true), target("west", false)]);
        let resolved = resolve_targets(&cfg, &TargetSelection::from_flags(false, None)).unwrap();
        assert_eq!(names(&resolved), vec!["east"]);
    }

    #[test]
    fn first_default_wins_when_several_are_flagged() {
        let cfg = config(vec![
            target("north", false),
            target("west", true),
            target("east", true),
        ]);
        let resolved = resolve_targets(&cfg, &TargetSelection::Default).unwrap();
        assert_eq!(names(&resolved), vec!["west"]);
    }

    #[test]
    fn no_default_is_an_error() {
        let cfg = config(vec![target("east", false)]);
        let err = resolve_targets(&cfg, &TargetSelection::Default).unwrap_err();
        assert!(matches!(err, DxOpsError::NoDefaultTarget));
    }

    #[test]
    fn named_selection_requires_existing_engine() {
        let cfg = config(vec![target("east", true), target("west", false)]);
        let resolved =
            resolve_targets(&cfg, &TargetSelection::from_flags(false, Some("west".into())))
                .unwrap();
        assert_eq!(names(&resolved), vec!["west"]);

        let err = resolve_targets(&cfg, &TargetSelection::Named("south".into())).unwrap_err();
        assert!(matches!(err, DxOpsError::TargetNotFound(ref n) if n == "south"));
    }

    #[test]
    fn all_selection_keeps_config_order_and_wins_over_name() {
        let cfg = config(vec![target("b", false), target("a", true), target("c", false)]);
        let selection = TargetSelection::from_flags(true, Some("a".into()));
        assert_eq!(selection, TargetSelection::All);
        let resolved = resolve_targets(&cfg, &selection).unwrap();
        assert_eq!(names(&resolved), vec!["b", "a", "c"]);

        let err = resolve_targets(&config(vec![]), &TargetSelection::All).unwrap_err();
        assert!(matches!(err, DxOpsError::NoTargets));
    }

    #[tokio::test(start_paused = true)]
    async fn all_targets_run_and_report_in_resolution_order() {
        // slow finishes last but must still be reported first
        let connector = FakeConnector::new()
            .engine(
                "slow",
                FakeEngine::new().async_source(
                    "testvdb",
                    "VDB-1",
                    "JOB-S",
                    vec![
                        Ok(JobState::Running),
                        Ok(JobState::Running),
                        Ok(JobState::Completed),
                    ],
                ),
            )
            .engine("fast", FakeEngine::new().sync_source("testvdb", "VDB-2"))
            .engine(
                "medium",
                FakeEngine::new().async_source(
                    "testvdb",
                    "VDB-3",
                    "JOB-M",
                    vec![Ok(JobState::Running), Ok(JobState::Completed)],
                ),
            );
        let cfg = config(vec![
            target("slow", false),
            target("fast", true),
            target("medium", false),
        ]);
        let targets = resolve_targets(&cfg, &TargetSelection::All).unwrap();
        let ctx = Arc::new(RunContext::new(Arc::new(connector), RunOptions::default()));
        let request = Arc::new(ActionRequest::on_objects(Verb::Start, ["testvdb"]).unwrap());

        let results = run(request, &targets, ctx).await;

        assert_eq!(results.len(), 3);
        let order: Vec<&str> = results.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(order, vec!["slow", "fast", "medium"]);
        assert!(results.iter().all(|r| r.outcome == Outcome::Done));
        assert_eq!(results[0].elapsed, Duration::from_secs(20));
        assert_eq!(results[1].elapsed, Duration::ZERO);
        assert_eq!(results[2].elapsed, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn one_target_failing_does_not_stop_the_others() {
        let connector = FakeConnector::new()
            .engine("east", FakeEngine::new().sync_source("othervdb", "VDB-9"))
            .engine(
                "west",
                FakeEngine::new().async_source(
                    "testvdb",
                    "VDB-1",
                    "JOB-1",
                    vec![Ok(JobState::Running), Ok(JobState::Completed)],
                ),
            )
            .engine("north", FakeEngine::new().refuse_connection("unreachable"));
        let targets: Vec<Arc<Target>> = ["east", "west", "north"]
            .into_iter()
            .map(|n| Arc::new(target(n, false)))
            .collect();
        let ctx = Arc::new(RunContext::new(Arc::new(connector), RunOptions::default()));
        let request = Arc::new(ActionRequest::on_objects(Verb::Stop, ["testvdb"]).unwrap());

        let results = run(request, &targets, ctx).await;

        assert!(matches!(
            &results[0].outcome,
            Outcome::Failed(WorkerError::Resolution { object, .. }) if object == "testvdb"
        ));
        assert_eq!(results[1].outcome, Outcome::Done);
        assert_eq!(results[1].jobs_completed, 1);
        assert!(matches!(
            results[2].outcome,
            Outcome::Failed(WorkerError::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_list_yields_no_results() {
        let ctx = Arc::new(RunContext::new(
            Arc::new(FakeConnector::new()),
            RunOptions::default(),
        ));
        let results = run(Arc::new(ActionRequest::list()), &[], ctx).await;
        assert!(results.is_empty());
    }
}
