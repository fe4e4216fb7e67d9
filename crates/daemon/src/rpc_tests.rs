use super::*;

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Instant;

use sluice_engine::{MemorySink, PipelineConfig, SaturationPolicy};
use sluice_protocol::codec::read_message;
use sluice_protocol::{IngestStatus, ServerStats, StreamAck};

use crate::config::{DaemonConfig, SinkKind};

struct TestServer {
    addr: SocketAddr,
    state: Arc<DaemonState>,
    signalled: Arc<AtomicBool>,
    sink: MemorySink,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    fn start(queue_capacity: usize, batch_period: Duration) -> Self {
        let pipeline = PipelineConfig {
            queue_capacity,
            max_batch_size: 50,
            batch_period,
            worker_count: 2,
            max_requests: None,
            dispatch_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(2),
            startup_timeout: Duration::from_secs(5),
            respawn_workers: false,
            saturation: SaturationPolicy::Hold,
        };
        let config = DaemonConfig {
            bind: "127.0.0.1:0".into(),
            pipeline,
            sink: SinkKind::Memory,
            sink_path: PathBuf::from("unused"),
        };

        let listener = bind(&config.bind).expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let sink = MemorySink::new();
        let state = Arc::new(
            DaemonState::with_connector(config, Arc::new(sink.clone())).expect("state"),
        );
        let signalled = Arc::new(AtomicBool::new(false));

        let handle = {
            let state = Arc::clone(&state);
            let signalled = Arc::clone(&signalled);
            thread::spawn(move || serve(listener, state, &signalled))
        };

        Self {
            addr,
            state,
            signalled,
            sink,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).expect("connect")
    }

    fn stop(&mut self) {
        self.signalled.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().expect("server thread").expect("serve ok");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn call(stream: &mut TcpStream, request: &IngestRequest) -> IngestResponse {
    write_message(stream, request).expect("write request");
    read_message(stream).expect("read response")
}

fn process(stream: &mut TcpStream, payload: &str) -> IngestStatus {
    match call(
        stream,
        &IngestRequest::Process {
            payload: payload.into(),
        },
    ) {
        IngestResponse::Status(s) => s,
        other => panic!("unexpected response {other:?}"),
    }
}

fn stats(stream: &mut TcpStream) -> ServerStats {
    match call(stream, &IngestRequest::Stats) {
        IngestResponse::Stats(s) => s,
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn unary_calls_are_rejected_once_the_queue_is_full() {
    let server = TestServer::start(2, Duration::from_secs(3600));
    let mut conn = server.connect();

    assert_eq!(process(&mut conn, "a"), IngestStatus::Ok);
    assert_eq!(process(&mut conn, "b"), IngestStatus::Ok);
    assert_eq!(process(&mut conn, "c"), IngestStatus::Rejected);

    let s = stats(&mut conn);
    assert_eq!(s.queue_len, 2);
    assert_eq!(s.queue_capacity, 2);
    assert_eq!(s.phase, "running");
}

#[test]
fn streamed_payloads_are_acked_at_end_of_stream() {
    let server = TestServer::start(100, Duration::from_millis(10));
    let mut conn = server.connect();

    for i in 0..5 {
        write_message(
            &mut conn,
            &IngestRequest::StreamItem {
                payload: format!("s{i}"),
            },
        )
        .unwrap();
    }
    match call(&mut conn, &IngestRequest::StreamEnd) {
        IngestResponse::StreamAck(ack) => assert_eq!(
            ack,
            StreamAck {
                accepted: 5,
                rejected: 0
            }
        ),
        other => panic!("unexpected response {other:?}"),
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while stats(&mut conn).total_processed < 5 {
        assert!(Instant::now() < deadline, "records never processed");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.sink.len(), 5);
}

#[test]
fn ping_and_empty_stream_end() {
    let server = TestServer::start(10, Duration::from_secs(3600));
    let mut conn = server.connect();

    assert!(matches!(call(&mut conn, &IngestRequest::Ping), IngestResponse::Pong));
    assert!(matches!(
        call(&mut conn, &IngestRequest::StreamEnd),
        IngestResponse::StreamAck(StreamAck {
            accepted: 0,
            rejected: 0
        })
    ));
}

#[test]
fn malformed_frame_gets_an_error_reply() {
    let server = TestServer::start(10, Duration::from_secs(3600));
    let mut conn = server.connect();

    conn.write_all(&3u32.to_be_bytes()).unwrap();
    conn.write_all(&[0xff, 0xff, 0xff]).unwrap();

    let reply: IngestResponse = read_message(&mut conn).expect("error reply");
    assert!(matches!(reply, IngestResponse::Error(msg) if msg.contains("malformed")));
}

#[test]
fn signal_closes_the_pipeline_and_rejects_further_calls() {
    let mut server = TestServer::start(10, Duration::from_secs(3600));
    let mut conn = server.connect();
    assert_eq!(process(&mut conn, "before"), IngestStatus::Ok);

    server.stop();
    assert_eq!(server.state.pipeline.phase(), ShutdownPhase::Closed);

    // The connection thread outlives the accept loop.
    assert_eq!(process(&mut conn, "after"), IngestStatus::Rejected);
    assert_eq!(stats(&mut conn).phase, "closed");
}

#[test]
fn binding_a_taken_port_is_a_bind_failure() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    match bind(&addr) {
        Err(PipelineError::BindFailure { addr: a, .. }) => assert_eq!(a, addr),
        other => panic!("expected bind failure, got {other:?}"),
    }
}
