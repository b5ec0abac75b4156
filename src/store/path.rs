//! Tile path codec: canonical path construction and filename decoding.
//!
//! The encoding is bit-exact with existing trees:
//!
//! ```text
//! <root>/<world>/<prefix><variant>/<x>>5>_<y>>5>/[zz..z_]<x>_<y>.<ext>
//! ```
//!
//! The shard directory groups tiles into 32x32 blocks using an arithmetic
//! (sign-preserving) right shift, and zoomed tiles carry one leading `z`
//! per zoom level in the filename.

use crate::coord::TileKey;
use crate::store::types::FormatPair;

/// Shard directory name for a tile coordinate.
///
/// Uses an arithmetic shift so negative coordinates shard toward
/// negative infinity, matching trees written by existing renderers.
pub fn shard_dir(x: i32, y: i32) -> String {
    format!("{}_{}", x >> 5, y >> 5)
}

/// Base filename for a tile, without extension.
///
/// Zoom level 0 is plain `x_y`; higher levels carry one leading `z` per
/// level followed by a separator.
pub fn base_name(zoom: u8, x: i32, y: i32) -> String {
    if zoom == 0 {
        format!("{}_{}", x, y)
    } else {
        format!("{}_{}_{}", "z".repeat(zoom as usize), x, y)
    }
}

/// Canonical relative path for a tile key, without extension.
///
/// Two keys identify the same storage entity iff their canonical paths
/// are equal; this string is also the lock-table key.
pub fn canonical_path(key: &TileKey) -> String {
    format!(
        "{}/{}{}/{}/{}",
        key.world,
        key.map_prefix,
        key.variant_suffix,
        shard_dir(key.x, key.y),
        base_name(key.zoom, key.x, key.y)
    )
}

/// Relative URI for a tile, without the world prefix, with extension.
pub fn tile_uri(key: &TileKey, ext: &str) -> String {
    format!(
        "{}{}/{}/{}.{}",
        key.map_prefix,
        key.variant_suffix,
        shard_dir(key.x, key.y),
        base_name(key.zoom, key.x, key.y),
        ext
    )
}

/// Decode a tile filename into (zoom, x, y).
///
/// Returns `None` for anything that is not a tile file: an extension that
/// is neither configured format, a wrong token count, or a non-integer
/// token. Traversal treats `None` as "skip", never as an error, since
/// directories routinely contain non-tile entries (including `.new` and
/// `.old` write transients, which fail the extension check).
pub fn decode_filename(name: &str, formats: &FormatPair) -> Option<(u8, i32, i32)> {
    let (stem, ext) = name.rsplit_once('.')?;
    if !formats.matches_extension(ext) {
        return None;
    }

    // Count and strip the leading zoom-marker run, then one optional
    // separator.
    let mut rest = stem;
    let mut zoom = 0usize;
    while let Some(r) = rest.strip_prefix('z') {
        rest = r;
        zoom += 1;
    }
    if zoom > 0 {
        if let Some(r) = rest.strip_prefix('_') {
            rest = r;
        }
    }
    let zoom = u8::try_from(zoom).ok()?;

    // The remainder must be exactly two integer tokens.
    let mut tokens = rest.split('_');
    let x: i32 = tokens.next()?.parse().ok()?;
    let y: i32 = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() {
        return None;
    }

    Some((zoom, x, y))
}
