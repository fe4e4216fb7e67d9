use std::io::{self, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use sluice_engine::{PipelineError, ShutdownPhase, StreamSession};
use sluice_protocol::codec::{try_read_message, write_message};
use sluice_protocol::{IngestRequest, IngestResponse};

use crate::state::DaemonState;

/// How often the accept loop wakes to check for shutdown.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn bind(addr: &str) -> Result<TcpListener, PipelineError> {
    TcpListener::bind(addr).map_err(|source| PipelineError::BindFailure {
        addr: addr.to_string(),
        source,
    })
}

pub fn run_rpc_server(listener: TcpListener, state: Arc<DaemonState>) -> anyhow::Result<()> {
    let signalled = Arc::new(AtomicBool::new(false));

    // Register signal handlers. They only set the atomic flag
    for sig in [SIGINT, SIGTERM] {
        flag::register(sig, Arc::clone(&signalled))
            .with_context(|| format!("Failed to register signal handler for {sig}"))?;
    }

    serve(listener, state, &signalled)
}

/// Accept connections until the pipeline reaches `Closed`.
///
/// Ingress keeps accepting connections while the pipeline drains, but the
/// gateway rejects every call from `StoppingIngress` on.
pub fn serve(
    listener: TcpListener,
    state: Arc<DaemonState>,
    signalled: &AtomicBool,
) -> anyhow::Result<()> {
    listener
        .set_nonblocking(true)
        .context("Failed to make listener non-blocking")?;

    let local = listener.local_addr().context("Listener has no local address")?;
    info!("sluice daemon listening on {local}");

    loop {
        if signalled.load(Ordering::Relaxed) {
            state.pipeline.request_shutdown("signal received");
        }
        if state.pipeline.phase() == ShutdownPhase::Closed {
            info!("Pipeline closed; stopping RPC server.");
            break;
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("accepted connection from {peer}");
                let state = Arc::clone(&state);
                let spawned = thread::Builder::new()
                    .name(format!("sluice-conn-{peer}"))
                    .spawn(move || {
                        if let Err(err) = handle_client(stream, &state) {
                            warn!("Error while handling client {peer}: {err:#}");
                        }
                    });
                if let Err(err) = spawned {
                    error!("Failed to spawn connection thread: {err}");
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("Accept error: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    let counters = state.pipeline.wait();
    info!(
        "RPC server shutdown complete: {} processed, {} failed",
        counters.total_processed, counters.total_failed
    );
    Ok(())
}

/// One connection is one session: any number of unary calls, and at most one
/// open stream at a time.
fn handle_client(stream: TcpStream, state: &DaemonState) -> anyhow::Result<()> {
    stream
        .set_nonblocking(false)
        .context("Failed to make connection blocking")?;
    stream.set_nodelay(true).ok();

    let mut writer = stream.try_clone().context("Failed to clone connection")?;
    let mut reader = BufReader::new(stream);
    let gateway = state.pipeline.gateway();
    let mut session: Option<StreamSession<'_>> = None;

    loop {
        let request: IngestRequest = match try_read_message(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) => {
                let reply = IngestResponse::Error(format!("malformed request: {err:#}"));
                let _ = write_message(&mut writer, &reply);
                return Err(err.context("Failed to read IngestRequest"));
            }
        };

        let response = match request {
            IngestRequest::Process { payload } => {
                Some(IngestResponse::Status(gateway.process(payload)))
            }
            IngestRequest::StreamItem { payload } => {
                session
                    .get_or_insert_with(|| gateway.stream())
                    .push(payload);
                None
            }
            IngestRequest::StreamEnd => {
                let ack = session.take().map(StreamSession::finish).unwrap_or_default();
                debug!("stream finished: {ack:?}");
                Some(IngestResponse::StreamAck(ack))
            }
            IngestRequest::Stats => Some(IngestResponse::Stats(state.pipeline.stats())),
            IngestRequest::Ping => Some(IngestResponse::Pong),
        };

        if let Some(response) = response {
            write_message(&mut writer, &response).context("Failed to write IngestResponse")?;
        }
    }

    if let Some(open) = session {
        let ack = open.finish();
        debug!(
            "client hung up mid-stream; {} records already queued stay queued",
            ack.accepted
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
