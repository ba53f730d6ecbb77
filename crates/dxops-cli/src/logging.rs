use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events `--debug` turns up. Everything else stays at `info`
/// so HTTP internals do not drown the output.
const DEBUG_CRATES: &[&str] = &["dxops", "dxops_core", "dx_engine"];

/// Install the global subscriber: human-readable lines on stderr, and the
/// same lines without colour appended to `log_file`.
pub fn init(debug: bool, log_file: &Path) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if debug {
        for krate in DEBUG_CRATES {
            filter = filter.add_directive(format!("{krate}=debug").parse()?);
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("cannot install log subscriber")?;
    Ok(())
}
