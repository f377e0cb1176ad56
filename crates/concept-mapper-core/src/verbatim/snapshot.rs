//! Binary snapshot of the verbatim index.
//!
//! Compiled once from term batch files and serialized to disk with bincode.
//! Once a snapshot exists it is the source of truth: startup loads it and
//! skips the build.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::index::VerbatimIndex;
use super::{IndexError, IndexResult};

/// Snapshot format version. Increment when the layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Format version for bincode compatibility
    pub version: u32,
    /// SHA-256 over the sorted index entries
    pub hash: String,
    pub index: VerbatimIndex,
}

impl IndexSnapshot {
    pub fn new(index: VerbatimIndex) -> Self {
        let hash = content_hash(&index);
        Self {
            version: SNAPSHOT_VERSION,
            hash,
            index,
        }
    }

    /// Load snapshot from disk
    pub fn load(path: &Path) -> IndexResult<Self> {
        let bytes = std::fs::read(path)?;
        let snapshot: Self = bincode::deserialize(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }

    /// Save snapshot to disk, creating parent folders.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    pub fn into_index(self) -> VerbatimIndex {
        self.index
    }

    /// Leading characters of the hash, for log lines.
    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            version: self.version,
            hash: self.hash.clone(),
            key_count: self.index.len(),
            concept_count: self.index.concept_count(),
            max_bucket_len: self.index.max_bucket_len(),
        }
    }
}

/// Order-independent content hash of an index.
pub fn content_hash(index: &VerbatimIndex) -> String {
    let mut hasher = Sha256::new();
    for (key, bucket) in index.sorted_entries() {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        for concept in bucket {
            hasher.update(concept.concept_id.to_le_bytes());
            hasher.update(concept.concept_name.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

/// Snapshot statistics
#[derive(Debug, Clone)]
pub struct SnapshotStats {
    pub version: u32,
    pub hash: String,
    pub key_count: usize,
    pub concept_count: usize,
    pub max_bucket_len: usize,
}

impl std::fmt::Display for SnapshotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Verbatim Index Statistics:")?;
        writeln!(f, "  Version: {}", self.version)?;
        writeln!(f, "  Hash: {}", short_hash(&self.hash))?;
        writeln!(f, "  Normalized terms: {}", self.key_count)?;
        writeln!(f, "  Concept entries: {}", self.concept_count)?;
        writeln!(f, "  Largest bucket: {}", self.max_bucket_len)?;
        Ok(())
    }
}
