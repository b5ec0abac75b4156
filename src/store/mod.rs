//! Sharded file-tree tile storage engine.
//!
//! Provides the storage root facade ([`TileStore`]), per-tile handles with
//! atomic write / fallback read, an intra-process lock table, and
//! whole-tree enumeration and purge.

mod engine;
mod index;
mod lock;
mod path;
mod queue;
mod retry;
mod types;
mod walk;

pub use engine::{TileHandle, TileRead, TileStore};
pub use index::{MemoryHashIndex, TileHashIndex, HASH_ABSENT};
pub use lock::{LockError, LockTable};
pub use queue::{NoOpQueue, ZoomOutQueue};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use types::{FormatPair, MapSpec, StoreConfig, StoreError, WorldSpec};

// Re-export path codec utilities for convenience
pub use path::{base_name, canonical_path, decode_filename, shard_dir, tile_uri};
