//! Content fingerprint index contract.
//!
//! The index records a 64-bit fingerprint of the last successfully
//! written content per tile, keyed by a composite world+map string, an
//! optional variant discriminator and the tile coordinates. The engine
//! treats it as authoritative for staleness checks but does not persist
//! it; durable storage of the index is the collaborator's concern.
//!
//! A crash between a file rename and the index update leaves the two
//! inconsistent; that narrow window is accepted.

use std::collections::HashMap;
use std::sync::Mutex;

/// Sentinel fingerprint meaning "absent/deleted".
pub const HASH_ABSENT: i64 = -1;

/// Fingerprint index collaborator.
pub trait TileHashIndex: Send + Sync {
    /// Last recorded fingerprint, or [`HASH_ABSENT`] if none recorded.
    fn fingerprint(&self, key: &str, variant: Option<&str>, x: i32, y: i32) -> i64;

    /// Record a fingerprint; passing [`HASH_ABSENT`] records
    /// "absent/deleted".
    fn set_fingerprint(&self, key: &str, variant: Option<&str>, x: i32, y: i32, value: i64);
}

/// In-memory fingerprint index.
///
/// The default collaborator when none is injected; contents live only for
/// the process's lifetime.
#[derive(Default)]
pub struct MemoryHashIndex {
    entries: Mutex<HashMap<(String, Option<String>, i32, i32), i64>>,
}

impl MemoryHashIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileHashIndex for MemoryHashIndex {
    fn fingerprint(&self, key: &str, variant: Option<&str>, x: i32, y: i32) -> i64 {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&(key.to_string(), variant.map(str::to_string), x, y))
            .copied()
            .unwrap_or(HASH_ABSENT)
    }

    fn set_fingerprint(&self, key: &str, variant: Option<&str>, x: i32, y: i32, value: i64) {
        let mut entries = self.entries.lock().unwrap();
        let index_key = (key.to_string(), variant.map(str::to_string), x, y);
        if value == HASH_ABSENT {
            entries.remove(&index_key);
        } else {
            entries.insert(index_key, value);
        }
    }
}
