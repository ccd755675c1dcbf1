//! confsched: run one schedule sync and print its status stream.
//!
//! Usage: `confsched [--force] [--config PATH] [--db PATH] [--assets DIR]`
//!
//! Statuses are written to stdout as JSON lines. The exit code is non-zero
//! when the run ends in an error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use confsched_lib::state::{load_config, load_config_from};
use confsched_lib::sync::orchestrator::SyncOrchestrator;
use confsched_lib::sync::worker::SyncHandle;
use confsched_lib::types::{SyncRequest, SyncStatus};

/// Sync the local conference schedule.
#[derive(Debug, Parser)]
#[command(name = "confsched", version)]
struct Args {
    /// Sync remotely even if no checksum changed
    #[arg(long)]
    force: bool,

    /// Config file (default: ~/.confsched/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "PATH")]
    db: Option<String>,

    /// Bundled snapshot directory, overriding the config
    #[arg(long, value_name = "DIR")]
    assets: Option<String>,
}

fn run(args: Args) -> Result<bool, String> {
    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if args.db.is_some() {
        config.db_path = args.db;
    }
    if let Some(assets) = args.assets {
        config.assets_dir = assets;
    }

    let orchestrator = SyncOrchestrator::from_config(&config).map_err(|e| e.to_string())?;
    let handle = SyncHandle::spawn(orchestrator)
        .map_err(|e| format!("Failed to start sync worker: {e}"))?;

    let request = if args.force {
        SyncRequest::forced()
    } else {
        SyncRequest::default()
    };
    let mut statuses = handle.request(request).map_err(|e| e.to_string())?;

    let mut ok = true;
    while let Some(status) = statuses.blocking_recv() {
        if matches!(status, SyncStatus::Error { .. }) {
            ok = false;
        }
        match serde_json::to_string(&status) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("Failed to serialize status: {}", e),
        }
    }

    handle.shutdown();
    Ok(ok)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
