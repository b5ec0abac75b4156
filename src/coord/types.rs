//! Tile key type definitions.

/// Key uniquely identifying one logical tile in the storage tree.
///
/// A tile is addressed by its world, map prefix, image variant suffix,
/// zoom level and (x, y) coordinates, regardless of which image encoding
/// currently backs it on disk. Keys are derived on demand and never
/// persisted as objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// World name (top-level directory in the tree)
    pub world: String,
    /// Map prefix (e.g., "flat", "surface")
    pub map_prefix: String,
    /// Image variant suffix, empty for the standard variant
    pub variant_suffix: String,
    /// Zoom level, 0 is the base of the pyramid
    pub zoom: u8,
    /// X coordinate (may be negative)
    pub x: i32,
    /// Y coordinate (may be negative)
    pub y: i32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(
        world: impl Into<String>,
        map_prefix: impl Into<String>,
        variant_suffix: impl Into<String>,
        zoom: u8,
        x: i32,
        y: i32,
    ) -> Self {
        Self {
            world: world.into(),
            map_prefix: map_prefix.into(),
            variant_suffix: variant_suffix.into(),
            zoom,
            x,
            y,
        }
    }

    /// Composite key string used by the fingerprint index.
    pub fn hash_key(&self) -> String {
        format!("{}.{}", self.world, self.map_prefix)
    }

    /// Variant discriminator for the fingerprint index.
    ///
    /// `None` for the standard (empty-suffix) variant.
    pub fn variant(&self) -> Option<&str> {
        if self.variant_suffix.is_empty() {
            None
        } else {
            Some(&self.variant_suffix)
        }
    }

    /// Key of the parent tile one zoom level up.
    ///
    /// Each tile at zoom z+1 aggregates a 2x2 block of tiles at zoom z;
    /// this returns the key of the block this tile contributes to. The
    /// y-axis is inverted relative to x in this coordinate system, so y
    /// is negated before and after the block rounding.
    pub fn zoom_out(&self) -> TileKey {
        let step = 1i32 << self.zoom;
        let xx = floor_to_block(self.x, 2 * step);
        let yy = -floor_to_block(-self.y, 2 * step);
        TileKey {
            world: self.world.clone(),
            map_prefix: self.map_prefix.clone(),
            variant_suffix: self.variant_suffix.clone(),
            zoom: self.zoom + 1,
            x: xx,
            y: yy,
        }
    }
}

/// Round `v` down to a multiple of `block` using the truncating remainder
/// with sign correction.
///
/// This is deliberately not mathematical floor division: the asymmetric
/// rounding for negative values must match sibling tiles written by
/// existing trees.
fn floor_to_block(v: i32, block: i32) -> i32 {
    if v >= 0 {
        v - v % block
    } else {
        v + v % block
    }
}
