//! Tile key types and zoom-pyramid coordinate derivation.

mod types;

pub use types::TileKey;
