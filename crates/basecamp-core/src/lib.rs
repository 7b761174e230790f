//! basecamp-core — shared types, wire format, and configuration.
//! All other Basecamp crates depend on this one.

pub mod config;
pub mod endpoint;
pub mod wire;

pub use endpoint::PeerEndpoint;
pub use wire::{ChunkHolders, Request, Response, WireError};
