use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod rpc;
mod state;

use config::DaemonConfig;
use log::{Level, error, info};
use sluice_runtime::logging;
use state::DaemonState;

fn main() -> ExitCode {
    logging::init_with_default(Level::Info).ok();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("[sluice-daemon] {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = DaemonConfig::from_env()?;

    info!(
        "Starting sluice daemon: bind={}, sink={:?} ({}), workers={}",
        config.bind,
        config.sink,
        config.sink_path.display(),
        config.pipeline.worker_count,
    );

    // Bind before spawning workers so a taken port fails fast.
    let listener = rpc::bind(&config.bind)?;
    let state = Arc::new(DaemonState::new(config)?);
    rpc::run_rpc_server(listener, state)
}
