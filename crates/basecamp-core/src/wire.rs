//! Basecamp wire format — on-wire types for peer↔tracker communication.
//!
//! Every frame on a tracker connection is a fixed-size [`FrameHeader`]
//! followed by `length` bytes of JSON body. The header is #[repr(C, packed)]
//! with zerocopy derives for deterministic layout; bodies are serde_json
//! because every payload carries variable-length filenames and peer lists.
//!
//! Request kind bytes mirror the packet type constants of the protocol's
//! first implementation (0 register, 1 query-directory, 2 query-file,
//! 4 update, 5 shutdown). Changing a kind byte is a breaking change.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::endpoint::PeerEndpoint;

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Fixed prefix of every frame in either direction.
///
/// The receiver can size and route a frame before reading a single body
/// byte. Wire size: 6 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Length of the JSON body in bytes, not including this header.
    pub length: u32,

    /// Frame kind. See the `kind` module for the assignments.
    pub kind: u8,

    /// Wire format version. Currently 0x01. An unknown version is a
    /// protocol error that terminates the offending session.
    pub version: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 6]);

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 6;

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Maximum body size in bytes. A directory response that would exceed this
/// is a deployment problem, not something the codec papers over.
pub const MAX_FRAME: usize = 65535;

/// Frame kind bytes. Requests and responses share the number space:
/// 1 and 2 are the query kinds on the way in and the matching response
/// kinds on the way back — direction disambiguates.
pub mod kind {
    pub const REGISTER: u8 = 0;
    pub const QUERY_DIRECTORY: u8 = 1;
    pub const QUERY_FILE: u8 = 2;
    pub const UPDATE: u8 = 4;
    pub const SHUTDOWN: u8 = 5;

    pub const DIRECTORY: u8 = QUERY_DIRECTORY;
    pub const FILE: u8 = QUERY_FILE;
}

impl FrameHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `bytes`.
    /// Returns (kind, body length) after validating version and length cap.
    pub fn parse(bytes: &[u8]) -> Result<(u8, usize), WireError> {
        let header = FrameHeader::read_from_prefix(bytes).ok_or(WireError::Truncated)?;
        // Copy packed fields to locals to avoid unaligned reference UB.
        let version = header.version;
        let kind = header.kind;
        let length = header.length as usize;
        if version != FRAME_VERSION {
            return Err(WireError::UnknownVersion(version));
        }
        if length > MAX_FRAME {
            return Err(WireError::FrameTooLarge(length));
        }
        Ok((kind, length))
    }
}

/// Build a complete frame (header + body) for a given kind.
pub fn frame(kind: u8, body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_FRAME {
        return Err(WireError::FrameTooLarge(body.len()));
    }
    let header = FrameHeader {
        length: body.len() as u32,
        kind,
        version: FRAME_VERSION,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A request frame, peer → tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Bind the session to the peer's publicly reachable endpoint.
    /// No response frame. Repeating it rebinds the session identity.
    Register { addr: IpAddr, port: u16 },

    /// Announce possession of a file with `chunk_count` chunks.
    /// No response frame. Ignored if the session never registered.
    Update { filename: String, chunk_count: u32 },

    /// Ask for the list of known filenames.
    QueryDirectory,

    /// Ask which peers hold a given file, chunk by chunk.
    QueryFile { filename: String },

    /// Announce departure. The tracker removes the peer's availability
    /// entries and the connection closes. No response frame.
    Shutdown,
}

#[derive(Serialize, Deserialize)]
struct RegisterBody {
    addr: IpAddr,
    port: u16,
}

#[derive(Serialize, Deserialize)]
struct UpdateBody {
    filename: String,
    chunk_count: u32,
}

#[derive(Serialize, Deserialize)]
struct QueryFileBody {
    filename: String,
}

impl Request {
    pub fn kind(&self) -> u8 {
        match self {
            Request::Register { .. } => kind::REGISTER,
            Request::Update { .. } => kind::UPDATE,
            Request::QueryDirectory => kind::QUERY_DIRECTORY,
            Request::QueryFile { .. } => kind::QUERY_FILE,
            Request::Shutdown => kind::SHUTDOWN,
        }
    }

    /// Encode as a complete frame, header included.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = match self {
            Request::Register { addr, port } => serde_json::to_vec(&RegisterBody {
                addr: *addr,
                port: *port,
            })?,
            Request::Update {
                filename,
                chunk_count,
            } => serde_json::to_vec(&UpdateBody {
                filename: filename.clone(),
                chunk_count: *chunk_count,
            })?,
            Request::QueryFile { filename } => serde_json::to_vec(&QueryFileBody {
                filename: filename.clone(),
            })?,
            // No payload.
            Request::QueryDirectory | Request::Shutdown => Vec::new(),
        };
        frame(self.kind(), &body)
    }

    /// Decode a request body for a previously parsed header.
    pub fn decode(kind: u8, body: &[u8]) -> Result<Self, WireError> {
        match kind {
            kind::REGISTER => {
                let b: RegisterBody = serde_json::from_slice(body)?;
                Ok(Request::Register {
                    addr: b.addr,
                    port: b.port,
                })
            }
            kind::UPDATE => {
                let b: UpdateBody = serde_json::from_slice(body)?;
                Ok(Request::Update {
                    filename: b.filename,
                    chunk_count: b.chunk_count,
                })
            }
            kind::QUERY_FILE => {
                let b: QueryFileBody = serde_json::from_slice(body)?;
                Ok(Request::QueryFile {
                    filename: b.filename,
                })
            }
            kind::QUERY_DIRECTORY => Ok(Request::QueryDirectory),
            kind::SHUTDOWN => Ok(Request::Shutdown),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Which peers hold one chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHolders {
    pub index: u32,
    pub holders: Vec<PeerEndpoint>,
}

/// A response frame, tracker → peer. Only the query kinds answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer to QueryDirectory. Order is unspecified.
    Directory { filenames: Vec<String> },

    /// Answer to QueryFile. `found == false` is the explicit not-found
    /// indicator; the lists are empty in that case.
    File {
        found: bool,
        filename: String,
        peers: Vec<PeerEndpoint>,
        chunks: Vec<ChunkHolders>,
    },
}

#[derive(Serialize, Deserialize)]
struct DirectoryBody {
    filenames: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct FileBody {
    found: bool,
    filename: String,
    peers: Vec<PeerEndpoint>,
    chunks: Vec<ChunkHolders>,
}

impl Response {
    pub fn kind(&self) -> u8 {
        match self {
            Response::Directory { .. } => kind::DIRECTORY,
            Response::File { .. } => kind::FILE,
        }
    }

    /// The not-found answer for a file that was never announced.
    pub fn file_not_found(filename: &str) -> Self {
        Response::File {
            found: false,
            filename: filename.to_owned(),
            peers: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Encode as a complete frame, header included.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = match self {
            Response::Directory { filenames } => serde_json::to_vec(&DirectoryBody {
                filenames: filenames.clone(),
            })?,
            Response::File {
                found,
                filename,
                peers,
                chunks,
            } => serde_json::to_vec(&FileBody {
                found: *found,
                filename: filename.clone(),
                peers: peers.clone(),
                chunks: chunks.clone(),
            })?,
        };
        frame(self.kind(), &body)
    }

    /// Decode a response body for a previously parsed header.
    pub fn decode(kind: u8, body: &[u8]) -> Result<Self, WireError> {
        match kind {
            kind::DIRECTORY => {
                let b: DirectoryBody = serde_json::from_slice(body)?;
                Ok(Response::Directory {
                    filenames: b.filenames,
                })
            }
            kind::FILE => {
                let b: FileBody = serde_json::from_slice(body)?;
                Ok(Response::File {
                    found: b.found,
                    filename: b.filename,
                    peers: b.peers,
                    chunks: b.chunks,
                })
            }
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown frame kind: {0}")]
    UnknownKind(u8),

    #[error("frame body of {0} bytes exceeds maximum {}", MAX_FRAME)]
    FrameTooLarge(usize),

    #[error("truncated frame header")]
    Truncated,

    #[error("malformed frame body: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
