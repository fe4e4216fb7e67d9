use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use log::{debug, warn};
use serde_json::json;
use sluice_protocol::IngestStatus;

use super::finish;
use crate::client::Client;

/// Payloads per stream session in `--stream` mode.
const STREAM_CHUNK: u64 = 1_000;

#[derive(Debug, Args)]
pub struct BenchArgs {
    /// Total number of payloads to send
    #[arg(long, default_value_t = 1_000_000)]
    pub total: u64,

    /// Number of concurrent connections
    #[arg(long, short = 'c', default_value_t = 100)]
    pub concurrency: usize,

    /// Use streaming calls instead of one unary call per payload
    #[arg(long)]
    pub stream: bool,

    /// Payload length in bytes
    #[arg(long, default_value_t = 13)]
    pub payload_len: usize,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Default)]
struct Tally {
    ok: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

impl Tally {
    fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

pub fn run(addr: &str, args: BenchArgs) -> ExitCode {
    finish("bench", execute(addr, args))
}

fn execute(addr: &str, args: BenchArgs) -> Result<ExitCode> {
    let concurrency = args.concurrency.max(1);
    let tally = Tally::default();
    let started = Instant::now();

    thread::scope(|s| {
        for (conn, share) in split_evenly(args.total, concurrency).into_iter().enumerate() {
            let tally = &tally;
            let args = &args;
            s.spawn(move || run_connection(addr, conn, share, args, tally));
        }
    });

    let elapsed = started.elapsed();
    let ok = tally.ok.load(Ordering::Relaxed);
    let rejected = tally.rejected.load(Ordering::Relaxed);
    let errors = tally.errors.load(Ordering::Relaxed);
    let rate = throughput(ok + rejected, elapsed);

    if args.json {
        let value = json!({
            "total": args.total,
            "concurrency": concurrency,
            "stream": args.stream,
            "ok": ok,
            "rejected": rejected,
            "errors": errors,
            "elapsed_ms": elapsed.as_millis() as u64,
            "requests_per_sec": rate,
        });
        println!("{value}");
    } else {
        println!(
            "sent {} payloads over {concurrency} connections in {:.2}s",
            args.total,
            elapsed.as_secs_f64()
        );
        println!("ok:         {ok}");
        println!("rejected:   {rejected}");
        println!("errors:     {errors}");
        println!("throughput: {rate:.0} req/s");
    }

    Ok(if errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn run_connection(addr: &str, conn: usize, share: u64, args: &BenchArgs, tally: &Tally) {
    if share == 0 {
        return;
    }

    let mut client = match Client::connect(addr) {
        Ok(c) => c,
        Err(e) => {
            warn!("connection {conn}: {e:#}");
            tally.add(&tally.errors, share);
            return;
        }
    };

    let mut sent = 0u64;
    let result: Result<()> = (|| {
        if args.stream {
            while sent < share {
                let n = STREAM_CHUNK.min(share - sent);
                let first = sent;
                let ack = client
                    .stream((first..first + n).map(|i| make_payload(conn, i, args.payload_len)))?;
                sent += n;
                tally.add(&tally.ok, ack.accepted);
                tally.add(&tally.rejected, ack.rejected);
            }
        } else {
            while sent < share {
                let status = client.process(make_payload(conn, sent, args.payload_len))?;
                sent += 1;
                match status {
                    IngestStatus::Ok => tally.add(&tally.ok, 1),
                    IngestStatus::Rejected => tally.add(&tally.rejected, 1),
                }
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        warn!("connection {conn} failed after {sent} payloads: {e:#}");
        tally.add(&tally.errors, share - sent);
    } else {
        debug!("connection {conn} done ({share} payloads)");
    }
}

/// Divide `total` into `parts` shares that differ by at most one.
fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    let parts_u = parts as u64;
    (0..parts_u)
        .map(|i| total / parts_u + u64::from(i < total % parts_u))
        .collect()
}

/// Unique, fixed-length payload for connection `conn`, sequence `seq`.
fn make_payload(conn: usize, seq: u64, len: usize) -> String {
    let mut s = format!("{conn:x}-{seq:x}-");
    let mut fill = seq.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ conn as u64;
    while s.len() < len {
        s.push(char::from(b'a' + (fill % 26) as u8));
        fill = fill.rotate_left(5).wrapping_add(0x2545_F491);
    }
    s
}

fn throughput(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 { 0.0 } else { count as f64 / secs }
}
