use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use anyhow::{Context, Result, bail};
use sluice_protocol::codec::{read_message, write_message};
use sluice_protocol::{IngestRequest, IngestResponse, IngestStatus, ServerStats, StreamAck};

/// Blocking connection to a sluice daemon. One connection is one session.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).with_context(|| format!("Failed to connect to {addr}"))?;
        stream.set_nodelay(true).ok();
        let writer = BufWriter::new(stream.try_clone().context("Failed to clone connection")?);
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn call(&mut self, request: &IngestRequest) -> Result<IngestResponse> {
        write_message(&mut self.writer, request).context("Failed to send request")?;
        let response: IngestResponse =
            read_message(&mut self.reader).context("Failed to read response")?;
        if let IngestResponse::Error(msg) = response {
            bail!("server error: {msg}");
        }
        Ok(response)
    }

    pub fn ping(&mut self) -> Result<()> {
        match self.call(&IngestRequest::Ping)? {
            IngestResponse::Pong => Ok(()),
            other => bail!("unexpected reply to ping: {other:?}"),
        }
    }

    pub fn process(&mut self, payload: String) -> Result<IngestStatus> {
        match self.call(&IngestRequest::Process { payload })? {
            IngestResponse::Status(status) => Ok(status),
            other => bail!("unexpected reply to process: {other:?}"),
        }
    }

    /// Stream every payload, then end the stream and return the server's ack.
    pub fn stream<I>(&mut self, payloads: I) -> Result<StreamAck>
    where
        I: IntoIterator<Item = String>,
    {
        for payload in payloads {
            write_message(&mut self.writer, &IngestRequest::StreamItem { payload })
                .context("Failed to stream payload")?;
        }
        match self.call(&IngestRequest::StreamEnd)? {
            IngestResponse::StreamAck(ack) => Ok(ack),
            other => bail!("unexpected reply to end of stream: {other:?}"),
        }
    }

    pub fn stats(&mut self) -> Result<ServerStats> {
        match self.call(&IngestRequest::Stats)? {
            IngestResponse::Stats(stats) => Ok(stats),
            other => bail!("unexpected reply to stats: {other:?}"),
        }
    }
}
