mod logging;
mod output;
mod run;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::{ArgGroup, Parser};
use dxops_core::config::{DEFAULT_CONFIG_PATH, DEFAULT_MAX_POLL_FAILURES};
use dxops_core::{ActionRequest, RunOptions, TargetSelection, Verb};
use run::{RunArgs, RunExit};

#[derive(Parser)]
#[command(
    name = "dxops",
    about = "Start, stop, enable, or disable VDBs, or list database usage, on one or many engines in parallel",
    version
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["start", "stop", "enable", "disable", "list"])
))]
struct Cli {
    /// Start the named VDB(s)
    #[arg(long, requires = "vdb")]
    start: bool,

    /// Stop the named VDB(s)
    #[arg(long, requires = "vdb")]
    stop: bool,

    /// Enable the named VDB(s)
    #[arg(long, requires = "vdb")]
    enable: bool,

    /// Disable the named VDB(s)
    #[arg(long, requires = "vdb")]
    disable: bool,

    /// List every database with its container and space usage
    #[arg(long, conflicts_with = "vdb")]
    list: bool,

    /// VDB name; repeat the flag or separate names with commas
    #[arg(long, value_delimiter = ',')]
    vdb: Vec<String>,

    /// Engine to run against, by hostname (default: the engine flagged default)
    #[arg(short = 'd', long = "engine")]
    engine: Option<String>,

    /// Run against every engine in the config
    #[arg(long, conflicts_with = "engine")]
    all: bool,

    /// Maximum number of jobs tracked at once per engine
    #[arg(long, value_name = "N")]
    parallel: Option<NonZeroUsize>,

    /// Seconds between job status checks [default: 10]
    #[arg(long, value_name = "SECONDS", value_parser = parse_poll_seconds)]
    poll: Option<Duration>,

    /// Failed status checks in a row before a job is given up on
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_POLL_FAILURES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_poll_failures: u32,

    /// Engine configuration file
    #[arg(long, env = "DXTOOLS_CONF", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log file; appended to on every run
    #[arg(long, default_value = "./dx_operations_vdb.log")]
    logdir: PathBuf,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,
}

impl Cli {
    fn verb(&self) -> Verb {
        if self.start {
            Verb::Start
        } else if self.stop {
            Verb::Stop
        } else if self.enable {
            Verb::Enable
        } else if self.disable {
            Verb::Disable
        } else {
            Verb::List
        }
    }

    fn into_args(self) -> anyhow::Result<RunArgs> {
        let request = match self.verb() {
            Verb::List => ActionRequest::list(),
            verb => ActionRequest::on_objects(verb, &self.vdb)
                .ok_or_else(|| anyhow!("--vdb needs at least one non-empty name"))?,
        };

        let defaults = RunOptions::default();
        let options = RunOptions {
            poll_interval: self.poll.unwrap_or(defaults.poll_interval),
            parallel: self.parallel,
            max_poll_failures: self.max_poll_failures,
        };

        Ok(RunArgs {
            request,
            selection: TargetSelection::from_flags(self.all, self.engine),
            config: self.config,
            options,
            json: self.json,
        })
    }
}

fn parse_poll_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("poll interval must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{s}' seconds is too long an interval"))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.debug, &cli.logdir) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = cli.into_args().and_then(run::run) {
        eprintln!("error: {e:#}");
        let code = e.downcast_ref::<RunExit>().map_or(1, RunExit::exit_code);
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dxops").chain(args.iter().copied()))
    }

    #[test]
    fn vdb_accepts_repeats_and_commas() {
        let cli = parse(&["--stop", "--vdb", "a,b", "--vdb", "c"]).unwrap();
        assert_eq!(cli.vdb, vec!["a", "b", "c"]);
        let args = cli.into_args().unwrap();
        assert_eq!(args.request.verb(), Verb::Stop);
        assert_eq!(args.request.objects(), ["a", "b", "c"]);
        assert_eq!(args.selection, TargetSelection::Default);
    }

    #[test]
    fn blank_vdb_names_are_rejected() {
        let cli = parse(&["--start", "--vdb", " , "]).unwrap();
        assert!(cli.into_args().is_err());
    }

    #[test]
    fn options_fall_back_to_defaults() {
        let args = parse(&["--list", "--all"]).unwrap().into_args().unwrap();
        assert_eq!(args.options, RunOptions::default());
        assert_eq!(args.selection, TargetSelection::All);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn fractional_poll_and_parallel_ceiling() {
        let args = parse(&[
            "--enable", "--vdb", "x", "--poll", "0.5", "--parallel", "2", "-d", "west",
        ])
        .unwrap()
        .into_args()
        .unwrap();
        assert_eq!(args.options.poll_interval, Duration::from_millis(500));
        assert_eq!(args.options.parallel, NonZeroUsize::new(2));
        assert_eq!(args.selection, TargetSelection::Named("west".into()));
    }

    #[test]
    fn usage_errors_are_caught_by_clap() {
        let cases: &[&[&str]] = &[
            &[],
            &["--start", "--stop", "--vdb", "x"],
            &["--start"],
            &["--list", "--vdb", "x"],
            &["--list", "--all", "-d", "east"],
            &["--list", "--poll", "0"],
            &["--list", "--poll", "-1"],
            &["--list", "--poll", "1e30"],
            &["--list", "--poll", "inf"],
            &["--list", "--parallel", "0"],
            &["--list", "--max-poll-failures", "0"],
        ];
        for args in cases {
            let err = parse(args).err().unwrap_or_else(|| panic!("{args:?} parsed"));
            assert_ne!(err.kind(), ErrorKind::DisplayHelp, "{args:?}");
            assert_eq!(err.exit_code(), 2, "{args:?}");
        }
    }
}
