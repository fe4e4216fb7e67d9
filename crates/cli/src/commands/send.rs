use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use sluice_protocol::IngestStatus;

use super::finish;
use crate::client::Client;

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Payload to submit
    pub payload: String,
}

pub fn run(addr: &str, args: SendArgs) -> ExitCode {
    finish("send", execute(addr, args))
}

fn execute(addr: &str, args: SendArgs) -> Result<ExitCode> {
    let mut client = Client::connect(addr)?;
    match client.process(args.payload)? {
        IngestStatus::Ok => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
        IngestStatus::Rejected => {
            // Caller is expected to back off and retry.
            println!("rejected");
            Ok(ExitCode::from(1))
        }
    }
}
