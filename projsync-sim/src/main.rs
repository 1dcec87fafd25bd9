//! projsync-sim: example scheduler for the projsync core.
//!
//! Loads a desired project from a JSON file and drives it against an
//! in-memory control plane:
//! - Observes the project once per pass
//! - Creates it when absent, updates it when drifted
//! - Optionally deletes it after the last pass
//! - Writes the final resource (with status) back out as JSON

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use projsync_core::{MemoryProjectService, Project, ProjectReconciler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod scheduler;

use scheduler::Scheduler;

/// projsync example scheduler
#[derive(Parser, Debug)]
#[command(name = "projsync-sim", version, about)]
struct Args {
    /// Desired project (JSON)
    #[arg(long, env = "PROJSYNC_FILE")]
    file: PathBuf,

    /// Number of reconciliation passes
    #[arg(long, env = "PROJSYNC_PASSES", default_value = "5")]
    passes: u32,

    /// Pause between passes in seconds
    #[arg(long, env = "PROJSYNC_INTERVAL", default_value = "1")]
    interval: u64,

    /// Upper bound for a single pass in seconds
    #[arg(long, env = "PROJSYNC_TIMEOUT", default_value = "30")]
    timeout: u64,

    /// Keep running passes after the project is up to date
    #[arg(long, env = "PROJSYNC_KEEP_GOING")]
    keep_going: bool,

    /// Delete the project after the last pass
    #[arg(long, env = "PROJSYNC_DELETE")]
    delete: bool,

    /// Write the final project, including status, to this file
    #[arg(long, env = "PROJSYNC_OUTPUT")]
    output: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, env = "PROJSYNC_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "projsync_core=info,projsync_sim=info,audit=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut project = load_project(&args.file)?;
    info!(
        "Starting projsync-sim for project {} ({} passes)",
        project.metadata.name, args.passes
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_cancel.cancel();
        }
    });

    let reconciler = ProjectReconciler::new(Arc::new(MemoryProjectService::new()));
    let scheduler = Scheduler {
        passes: args.passes,
        interval: Duration::from_secs(args.interval),
        timeout: Duration::from_secs(args.timeout),
        keep_going: args.keep_going,
        delete: args.delete,
    };

    let summary = scheduler.run(&reconciler, &cancel, &mut project).await;
    info!(
        passes = summary.passes,
        failures = summary.failures,
        tokens_issued = summary.tokens_issued,
        state = summary.state.as_str(),
        "Simulation finished"
    );

    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(&project)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote final project to {}", path.display());
    }

    Ok(())
}

fn load_project(path: &Path) -> Result<Project> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let project: Project = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(project)
}
