//! Peer identity — the reachable address a peer registers with.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A peer's publicly reachable endpoint.
///
/// Immutable value type; equality and hashing are by (addr, port).
/// This is the identity under which a peer appears in the availability
/// registry, and it has no lifecycle of its own — it exists only inside
/// registry sets and as a session's bound identity.
///
/// The address is self-reported in the register frame. The tracker does
/// not cross-check it against the transport address, because peers behind
/// NAT announce a public address that differs from the connection source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
