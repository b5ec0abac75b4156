//! Zoom-out update queue contract.

use crate::coord::TileKey;

/// Collaborator notified when a zoom-0 tile changes.
///
/// The engine enqueues the changed tile's key exactly once per successful
/// zoom-0 write or delete. Deriving the parent tile (via
/// [`TileKey::zoom_out`]) and propagating further up the pyramid is the
/// collaborator's responsibility, not the engine's.
pub trait ZoomOutQueue: Send + Sync {
    /// Record that `key` changed and its parent needs re-rendering.
    fn enqueue(&self, key: TileKey);
}

/// Queue that drops all updates, for hosts without a zoom pyramid.
pub struct NoOpQueue;

impl ZoomOutQueue for NoOpQueue {
    fn enqueue(&self, _key: TileKey) {}
}
