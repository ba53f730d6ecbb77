use dxops_core::engine::DatabaseUsage;
use dxops_core::{ProgressEvent, ProgressKind, Verb};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", format_table(headers, &rows));
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let line = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(headers.iter().map(|h| h.to_string()).collect());
    out.push_str(&line(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        out.push_str(&line(row.clone()));
    }
    out
}

pub fn print_listing(engine: &str, databases: &[DatabaseUsage]) {
    println!("{engine}:");
    print!("{}", format_listing(databases));
}

/// One block per database, sizes in GB with two decimals.
fn format_listing(databases: &[DatabaseUsage]) -> String {
    let mut out = String::new();
    for db in databases {
        out.push_str(&format!("name = {}\n", db.name));
        out.push_str(&format!("provision container= {}\n", db.container()));
        out.push_str(&format!("database disk usage: {:.2} GB\n", db.active_gb()));
        out.push_str(&format!("Size of Snapshots: {:.2} GB\n", db.sync_gb()));
    }
    out
}

/// Log worker progress as it arrives. Returns once every sender is gone.
pub async fn render_progress(mut rx: UnboundedReceiver<ProgressEvent>, verb: Verb) {
    while let Some(event) = rx.recv().await {
        info!("{}", progress_line(&event, verb));
    }
}

fn progress_line(event: &ProgressEvent, verb: Verb) -> String {
    let target = &event.target;
    match &event.kind {
        ProgressKind::Connected => format!("{target}: connected"),
        ProgressKind::Submitted {
            object,
            job: Some(job),
        } => format!("{target}: {verb} {object} submitted as {job}"),
        ProgressKind::Submitted { object, job: None } => {
            format!("{target}: {verb} {object} finished without a job")
        }
        ProgressKind::JobStatus { job, state } => {
            format!("{target}: VDB Operations: {job} {state}")
        }
        ProgressKind::Running { count } => format!("{target}: {count} jobs running."),
    }
}
