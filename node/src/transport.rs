//! # Poll Transport
//!
//! Delivers outbound polls to peers and brings their responses home. The
//! seam is the [`PollTransport`] trait so the simulator and tests can swap
//! the network for a function call; the real implementation speaks
//! HTTP/1.1 with JSON bodies, which is all the poll exchange needs.
//!
//! The HTTP client is deliberately minimal: one short-lived connection
//! per poll with `Connection: close` and no pooling. Poll bodies are small, the
//! cadence is low, and a full HTTP client dependency would outweigh the
//! protocol it carries.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use snowdrift_consensus::Response;

use crate::api::PollRequest;

/// Default per-poll network budget: connect, send, and read the reply.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything that can carry a poll to a peer and return its response.
#[async_trait]
pub trait PollTransport: Send + Sync {
    /// Sends `request` to the peer at `addr` (host:port) and returns the
    /// parsed response.
    async fn send_poll(&self, addr: &str, request: &PollRequest) -> Result<Response>;
}

/// HTTP/1.1 transport used by the daemon.
#[derive(Debug, Clone)]
pub struct HttpPollTransport {
    timeout: Duration,
}

impl HttpPollTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Overrides the per-poll timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, addr: &str, body: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to peer at {}", addr))?;

        let head = format!(
            "POST /poll HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            addr,
            body.len(),
        );

        stream.write_all(head.as_bytes()).await?;
        stream.write_all(body).await?;
        stream.flush().await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        Ok(raw)
    }
}

impl Default for HttpPollTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollTransport for HttpPollTransport {
    async fn send_poll(&self, addr: &str, request: &PollRequest) -> Result<Response> {
        let body = serde_json::to_vec(request).context("failed to encode poll")?;

        let raw = tokio::time::timeout(self.timeout, self.exchange(addr, &body))
            .await
            .with_context(|| format!("poll to {} timed out", addr))??;

        parse_http_response(&raw).with_context(|| format!("bad reply from {}", addr))
    }
}

/// Splits a raw HTTP/1.1 reply into status + body and parses the body as a
/// [`Response`]. Only 200s carry a response worth reading.
fn parse_http_response(raw: &[u8]) -> Result<Response> {
    let text = std::str::from_utf8(raw).context("reply is not utf-8")?;
    let (head, body) = text
        .split_once("\r\n\r\n")
        .context("reply has no header/body split")?;

    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains(" 200 ") && !status_line.ends_with(" 200") {
        bail!("peer answered with `{}`", status_line);
    }

    serde_json::from_str(body.trim()).context("reply body is not a valid response")
}
