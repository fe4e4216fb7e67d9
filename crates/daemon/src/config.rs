use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use sluice_engine::{
    DEFAULT_BATCH_PERIOD, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT, PipelineConfig,
    SaturationPolicy, default_worker_count,
};
use sluice_runtime::{DEFAULT_BIND_ADDRESS, default_sink_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Append-only JSON-lines file.
    File,
    /// In-process rows, discarded on exit. Useful for load tests.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Saturation {
    Drop,
    Hold,
}

impl From<Saturation> for SaturationPolicy {
    fn from(s: Saturation) -> Self {
        match s {
            Saturation::Drop => SaturationPolicy::Drop,
            Saturation::Hold => SaturationPolicy::Hold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind: String,
    pub pipeline: PipelineConfig,
    pub sink: SinkKind,
    pub sink_path: PathBuf,
}

#[derive(Debug, Parser)]
#[command(name = "sluice-daemon", version, about = "Sluice write-ingestion daemon")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// Queued records at which new calls are rejected
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Largest batch handed to a single worker
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Scheduler tick interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_BATCH_PERIOD.as_millis() as u64)]
    pub batch_period_ms: u64,

    /// Number of sink workers (defaults to available cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Shut down after this many records have been processed
    #[arg(long)]
    pub max_requests: Option<u64>,

    /// Write off a batch that stays unacknowledged this long
    #[arg(long, default_value_t = DEFAULT_DISPATCH_TIMEOUT.as_millis() as u64)]
    pub dispatch_timeout_ms: u64,

    /// How long shutdown waits for workers before abandoning them
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_millis() as u64)]
    pub shutdown_grace_ms: u64,

    /// Fail start-up if no worker can open the sink within this long
    #[arg(long, default_value_t = DEFAULT_STARTUP_TIMEOUT.as_millis() as u64)]
    pub startup_timeout_ms: u64,

    /// Do not replace workers that crash
    #[arg(long)]
    pub no_respawn: bool,

    /// What a tick does when no worker is free
    #[arg(long, value_enum, default_value_t = Saturation::Drop)]
    pub saturation: Saturation,

    #[arg(long, value_enum, default_value_t = SinkKind::File)]
    pub sink: SinkKind,

    /// Path of the file sink (optional override)
    #[arg(long)]
    pub sink_path: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_args(args: &Cli) -> Result<Self> {
        let pipeline = PipelineConfig {
            queue_capacity: args.queue_capacity,
            max_batch_size: args.max_batch_size,
            batch_period: Duration::from_millis(args.batch_period_ms),
            worker_count: args.workers.unwrap_or_else(default_worker_count),
            max_requests: args.max_requests,
            dispatch_timeout: Duration::from_millis(args.dispatch_timeout_ms),
            shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
            startup_timeout: Duration::from_millis(args.startup_timeout_ms),
            respawn_workers: !args.no_respawn,
            saturation: args.saturation.into(),
        };
        pipeline.validate()?;

        Ok(Self {
            bind: args.bind.clone(),
            pipeline,
            sink: args.sink,
            sink_path: args.sink_path.clone().unwrap_or_else(default_sink_path),
        })
    }

    pub fn from_env() -> Result<Self> {
        let args = Cli::parse();
        Self::from_args(&args)
    }
}
