//! Basecamp integration test harness.
//!
//! Tests here run the real daemon dispatcher in-process against an
//! ephemeral localhost port and speak the real wire protocol to it.
//! Nothing reaches into session internals — everything a scenario
//! asserts travels over a TCP socket, the way a peer would see it.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use basecamp_core::wire::{FrameHeader, Request, Response, HEADER_LEN};
use basecamp_core::PeerEndpoint;
use basecamp_services::AvailabilityRegistry;
use basecampd::Dispatcher;


// ── Harness ───────────────────────────────────────────────────────────────────

/// Start a tracker on an ephemeral port. Returns the address peers
/// should connect to. The dispatcher task runs until the test ends.
pub async fn start_tracker() -> Result<SocketAddr> {
    start_tracker_with_idle_timeout(Some(Duration::from_secs(30))).await
}

pub async fn start_tracker_with_idle_timeout(
    idle_timeout: Option<Duration>,
) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind test listener")?;
    let registry = AvailabilityRegistry::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let dispatcher = Dispatcher::new(listener, registry, idle_timeout, shutdown_tx);
    let addr = dispatcher.local_addr()?;
    tokio::spawn(dispatcher.run());
    Ok(addr)
}

/// A minimal tracker client speaking the real wire protocol.
pub struct TrackerClient {
    stream: TcpStream,
}

impl TrackerClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to tracker at {addr}"))?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let bytes = request.encode()?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Response> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let (kind, length) = FrameHeader::parse(&header)?;
        let mut body = vec![0u8; length];
        self.stream.read_exact(&mut body).await?;
        Ok(Response::decode(kind, &body)?)
    }

    pub async fn register(&mut self, peer: PeerEndpoint) -> Result<()> {
        self.send(&Request::Register {
            addr: peer.addr,
            port: peer.port,
        })
        .await
    }

    pub async fn update(&mut self, filename: &str, chunk_count: u32) -> Result<()> {
        self.send(&Request::Update {
            filename: filename.to_owned(),
            chunk_count,
        })
        .await
    }

    pub async fn query_directory(&mut self) -> Result<Vec<String>> {
        self.send(&Request::QueryDirectory).await?;
        match self.recv().await? {
            Response::Directory { filenames } => Ok(filenames),
            other => bail!("expected directory response, got {other:?}"),
        }
    }

    pub async fn query_file(&mut self, filename: &str) -> Result<Response> {
        self.send(&Request::QueryFile {
            filename: filename.to_owned(),
        })
        .await?;
        self.recv().await
    }

    /// Send the departure frame and wait for the tracker to close the
    /// connection. Once this returns, the peer's cleanup has been
    /// applied — the tracker removes entries before releasing the socket.
    pub async fn shutdown_and_close(mut self) -> Result<()> {
        self.send(&Request::Shutdown).await?;
        let mut buf = [0u8; 1];
        let n = self.stream.read(&mut buf).await?;
        if n != 0 {
            bail!("expected EOF after shutdown, got {n} bytes");
        }
        Ok(())
    }

    /// Drop the connection without saying goodbye.
    pub fn disconnect_abruptly(self) {
        drop(self);
    }

    /// Write raw bytes, bypassing the request encoder.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Wait for the tracker to close the connection from its side.
    pub async fn expect_eof(&mut self) -> Result<()> {
        let mut buf = [0u8; 1];
        let n = self.stream.read(&mut buf).await?;
        if n != 0 {
            bail!("expected EOF, got {n} bytes");
        }
        Ok(())
    }
}

pub fn endpoint(addr: &str, port: u16) -> PeerEndpoint {
    PeerEndpoint::new(addr.parse().unwrap(), port)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tracker_accepts_connections_and_starts_empty() -> Result<()> {
    let addr = start_tracker().await?;
    let mut client = TrackerClient::connect(addr).await?;

    let filenames = client.query_directory().await?;
    assert!(filenames.is_empty());

    match client.query_file("anything").await? {
        Response::File { found, .. } => assert!(!found),
        other => bail!("expected file response, got {other:?}"),
    }
    Ok(())
}

/// The JSON field names are the protocol. A rename would silently break
/// every deployed peer, so pin them here.
#[tokio::test]
async fn wire_body_field_names_are_stable() -> Result<()> {
    let register = Request::Register {
        addr: "10.0.0.1".parse().unwrap(),
        port: 9000,
    }
    .encode()?;
    let body: serde_json::Value = serde_json::from_slice(&register[HEADER_LEN..])?;
    assert_eq!(body["addr"], "10.0.0.1");
    assert_eq!(body["port"], 9000);

    let update = Request::Update {
        filename: "movie.mp4".to_owned(),
        chunk_count: 4,
    }
    .encode()?;
    let body: serde_json::Value = serde_json::from_slice(&update[HEADER_LEN..])?;
    assert_eq!(body["filename"], "movie.mp4");
    assert_eq!(body["chunk_count"], 4);

    let not_found = Response::file_not_found("nope").encode()?;
    let body: serde_json::Value = serde_json::from_slice(&not_found[HEADER_LEN..])?;
    assert_eq!(body["found"], false);
    assert_eq!(body["filename"], "nope");
    assert!(body["peers"].as_array().unwrap().is_empty());
    assert!(body["chunks"].as_array().unwrap().is_empty());

    Ok(())
}
