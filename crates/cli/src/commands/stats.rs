use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::finish;
use crate::client::Client;

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(addr: &str, args: StatsArgs) -> ExitCode {
    finish("stats", execute(addr, args))
}

fn execute(addr: &str, args: StatsArgs) -> Result<ExitCode> {
    let stats = Client::connect(addr)?.stats()?;

    if args.json {
        let value = json!({
            "phase": stats.phase,
            "queue_len": stats.queue_len,
            "queue_capacity": stats.queue_capacity,
            "total_processed": stats.total_processed,
            "total_failed": stats.total_failed,
        });
        println!("{value}");
    } else {
        println!("phase:      {}", stats.phase);
        println!("queue:      {}/{}", stats.queue_len, stats.queue_capacity);
        println!("processed:  {}", stats.total_processed);
        println!("failed:     {}", stats.total_failed);
    }

    Ok(ExitCode::SUCCESS)
}
