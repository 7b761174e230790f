//! Availability registry — which peers hold which chunks of which files.
//!
//! One instance per tracker process, shared by every session. All
//! operations are internally synchronized; the dashmap entry API gives
//! `create_or_update` the atomic create-if-absent-else-update the
//! protocol needs, so two peers racing to announce the same new filename
//! converge on a single record and neither announcement is lost.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use basecamp_core::wire::ChunkHolders;
use basecamp_core::PeerEndpoint;

/// One chunk of a file and the peers known to hold it.
#[derive(Debug)]
struct ChunkRecord {
    index: u32,
    holders: HashSet<PeerEndpoint>,
}

/// Everything the tracker knows about one file.
///
/// The chunk list is sized at first announce and never resized: a later
/// announce with a different chunk count changes file-level membership
/// only. Chunk holder sets likewise only ever name the first announcer
/// (and shrink as peers depart) — per-chunk re-announce is not part of
/// the protocol.
#[derive(Debug)]
struct FileRecord {
    chunks: Vec<ChunkRecord>,
    peers: HashSet<PeerEndpoint>,
}

impl FileRecord {
    fn new(first_announcer: PeerEndpoint, chunk_count: u32) -> Self {
        let chunks = (0..chunk_count)
            .map(|index| ChunkRecord {
                index,
                holders: HashSet::from([first_announcer]),
            })
            .collect();
        Self {
            chunks,
            peers: HashSet::from([first_announcer]),
        }
    }
}

/// Read-consistent deep copy of one file's state, detached from the
/// registry. What a QueryFile response is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub filename: String,
    pub peers: Vec<PeerEndpoint>,
    pub chunks: Vec<ChunkHolders>,
}

/// The availability registry — shared across all session tasks.
///
/// Cheap to clone; clones share the underlying map. Constructed once in
/// the daemon and handed to the dispatcher, never ambient state.
#[derive(Clone, Default)]
pub struct AvailabilityRegistry {
    files: Arc<DashMap<String, FileRecord>>,
}

impl AvailabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `peer` holds (some or all of) `filename`.
    ///
    /// First announce of a never-seen name creates the record with
    /// `declared_chunk_count` chunks, each held by `peer`. Any later
    /// announce — whatever chunk count it declares — only adds `peer`
    /// to the file-level set. Idempotent for a repeating peer.
    pub fn create_or_update(&self, filename: &str, peer: PeerEndpoint, declared_chunk_count: u32) {
        let mut record = self.files.entry(filename.to_owned()).or_insert_with(|| {
            tracing::info!(%peer, filename, chunks = declared_chunk_count, "creating file entry");
            FileRecord::new(peer, declared_chunk_count)
        });
        record.peers.insert(peer);
        tracing::debug!(%peer, filename, "peer added to file membership");
    }

    /// Snapshot of currently known filenames. Order is unspecified.
    pub fn list_files(&self) -> Vec<String> {
        self.files.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Deep copy of one file's chunk and peer state, or `None` if the
    /// name was never announced.
    pub fn query_file(&self, filename: &str) -> Option<FileSnapshot> {
        self.files.get(filename).map(|record| FileSnapshot {
            filename: filename.to_owned(),
            peers: record.peers.iter().copied().collect(),
            chunks: record
                .chunks
                .iter()
                .map(|chunk| ChunkHolders {
                    index: chunk.index,
                    holders: chunk.holders.iter().copied().collect(),
                })
                .collect(),
        })
    }

    /// Remove `peer` from every file-level set and every chunk holder
    /// set. Applied file by file; a concurrent query sees each file
    /// either before or after its removal, never mid-removal.
    pub fn remove_peer(&self, peer: &PeerEndpoint) {
        for mut entry in self.files.iter_mut() {
            let record = entry.value_mut();
            record.peers.remove(peer);
            for chunk in &mut record.chunks {
                chunk.holders.remove(peer);
            }
        }
        tracing::info!(%peer, "peer removed from registry");
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
