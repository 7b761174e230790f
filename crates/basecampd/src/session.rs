//! Per-connection session protocol handler.
//!
//! One task per accepted connection, strictly sequential: await a frame,
//! act on it, answer if it was a query, repeat. A session starts with no
//! identity; the first register frame binds one, and later register
//! frames rebind it (latest wins). Update frames before a register are
//! deliberately ignored — the tracker cannot attribute chunk ownership
//! to a peer it cannot name.
//!
//! Whatever ends the loop — an explicit shutdown frame, clean EOF, a
//! decode error, an I/O failure, the idle timeout, or daemon shutdown —
//! the bound peer's availability entries are removed exactly once, so an
//! ungraceful disconnect leaves no stale holders behind.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use basecamp_core::wire::{FrameHeader, Request, Response, WireError, HEADER_LEN};
use basecamp_core::PeerEndpoint;
use basecamp_services::AvailabilityRegistry;

/// Why a session ended, when it did not end cleanly.
///
/// Every variant is contained to its own session: the registry's
/// invariants hold no matter how many sessions fail concurrently.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("idle for longer than {0:?}")]
    IdleTimeout(Duration),
}

pub struct Session {
    stream: TcpStream,
    /// Transport-level remote address, for logging only. The peer's
    /// registry identity is the self-reported register endpoint.
    transport_addr: SocketAddr,
    registry: AvailabilityRegistry,
    idle_timeout: Option<Duration>,
    shutdown: broadcast::Receiver<()>,
    bound: Option<PeerEndpoint>,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        transport_addr: SocketAddr,
        registry: AvailabilityRegistry,
        idle_timeout: Option<Duration>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            transport_addr,
            registry,
            idle_timeout,
            shutdown,
            bound: None,
        }
    }

    /// Drive the session to completion. Consumes the session; the
    /// connection closes when this returns.
    pub async fn run(mut self) {
        tracing::info!(transport = %self.transport_addr, "peer connected");

        match self.serve().await {
            Ok(()) => tracing::info!(transport = %self.transport_addr, "session closed"),
            Err(e) => {
                tracing::warn!(transport = %self.transport_addr, error = %e, "session terminated")
            }
        }

        // Cleanup runs on every exit path, exactly once. An ungraceful
        // disconnect must not leave stale holder entries any more than a
        // graceful shutdown does.
        if let Some(peer) = self.bound.take() {
            self.registry.remove_peer(&peer);
        }
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let request = tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!(transport = %self.transport_addr, "daemon shutdown, closing session");
                    return Ok(());
                }
                read = read_request(&mut self.stream, self.idle_timeout) => match read? {
                    Some(request) => request,
                    // Clean EOF at a frame boundary.
                    None => return Ok(()),
                },
            };

            match request {
                Request::Register { addr, port } => {
                    let peer = PeerEndpoint::new(addr, port);
                    tracing::info!(transport = %self.transport_addr, %peer, "register");
                    self.bound = Some(peer);
                }

                Request::Update {
                    filename,
                    chunk_count,
                } => match self.bound {
                    Some(peer) => {
                        tracing::info!(%peer, filename, chunk_count, "update availability");
                        self.registry.create_or_update(&filename, peer, chunk_count);
                    }
                    None => {
                        tracing::debug!(
                            transport = %self.transport_addr,
                            filename,
                            "update before register ignored"
                        );
                    }
                },

                Request::QueryDirectory => {
                    tracing::debug!(transport = %self.transport_addr, "query directory");
                    let response = Response::Directory {
                        filenames: self.registry.list_files(),
                    };
                    self.send(&response).await?;
                }

                Request::QueryFile { filename } => {
                    tracing::debug!(transport = %self.transport_addr, filename, "query file");
                    let response = match self.registry.query_file(&filename) {
                        Some(snapshot) => Response::File {
                            found: true,
                            filename: snapshot.filename,
                            peers: snapshot.peers,
                            chunks: snapshot.chunks,
                        },
                        None => Response::file_not_found(&filename),
                    };
                    self.send(&response).await?;
                }

                Request::Shutdown => {
                    tracing::info!(transport = %self.transport_addr, "peer shutdown");
                    return Ok(());
                }
            }
        }
    }

    async fn send(&mut self, response: &Response) -> Result<(), SessionError> {
        let bytes = response.encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Read one request frame, bounded by the idle timeout when one is set.
/// `Ok(None)` is a clean EOF at a frame boundary.
async fn read_request(
    stream: &mut TcpStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Request>, SessionError> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(stream))
            .await
            .map_err(|_| SessionError::IdleTimeout(limit))?,
        None => read_frame(stream).await,
    }
}

async fn read_frame(stream: &mut TcpStream) -> Result<Option<Request>, SessionError> {
    let mut header = [0u8; HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let (kind, length) = FrameHeader::parse(&header)?;
    let mut body = BytesMut::zeroed(length);
    stream.read_exact(&mut body).await?;

    Ok(Some(Request::decode(kind, &body)?))
}
