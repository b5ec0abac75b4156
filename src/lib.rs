//! TileTree - sharded file-tree storage for rendered map tiles
//!
//! This library persists fixed-size rendered map tiles into a sharded
//! directory tree, keyed by (world, map, variant, zoom, x, y). It provides
//! atomic crash-safe replacement of a tile's bytes, an in-process lock
//! table for coordinating concurrent readers and writers of the same
//! logical tile, content fingerprints for cheap staleness checks, and
//! whole-tree enumeration and purge that reconstruct tile coordinates
//! purely from filenames.
//!
//! # High-Level API
//!
//! ```no_run
//! use tiletree::coord::TileKey;
//! use tiletree::store::{StoreConfig, TileStore};
//!
//! let store = TileStore::new(StoreConfig::default().with_root("tiles".into()))?;
//! let tile = store.tile(TileKey::new("world", "flat", "", 0, 5, -3));
//!
//! tile.acquire_write_lock()?;
//! tile.write(0x1234, Some(&[0u8; 16]));
//! tile.release_write_lock()?;
//! # Ok::<(), tiletree::store::StoreError>(())
//! ```
//!
//! Rendering and encoding of tile pixels, the world/map model that decides
//! which tiles to request, and durable persistence of the fingerprint
//! index are all external collaborators. Locking is strictly intra-process:
//! two processes sharing one storage root can race destructively.

pub mod coord;
pub mod store;

/// Version of the TileTree library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
