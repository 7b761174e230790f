//! Connection dispatcher — accepts peers and spawns one session each.
//!
//! The dispatcher holds no peer state. It owns the bound listener and a
//! handle to the shared registry, and acts purely as factory and
//! supervisor: every accepted connection becomes an independent session
//! task. A failure inside one session is that session's problem; a
//! failure of the listener itself means the tracker cannot function and
//! takes the process down.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use basecamp_services::AvailabilityRegistry;

use crate::session::Session;

pub struct Dispatcher {
    listener: TcpListener,
    registry: AvailabilityRegistry,
    idle_timeout: Option<Duration>,
    shutdown: broadcast::Sender<()>,
}

impl Dispatcher {
    pub fn new(
        listener: TcpListener,
        registry: AvailabilityRegistry,
        idle_timeout: Option<Duration>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            listener,
            registry,
            idle_timeout,
            shutdown,
        }
    }

    /// The address the listener is actually bound to. Useful when the
    /// configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown. A listener error is fatal and
    /// propagates; there is no point retrying an accept loop whose
    /// socket is broken.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("dispatcher shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, transport_addr) =
                        accepted.context("tracker listener failed to accept")?;
                    tracing::info!(%transport_addr, "inbound connection");

                    let session = Session::new(
                        stream,
                        transport_addr,
                        self.registry.clone(),
                        self.idle_timeout,
                        self.shutdown.subscribe(),
                    );
                    tokio::spawn(session.run());
                }
            }
        }
    }
}
