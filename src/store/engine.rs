//! Storage engine facade and per-tile handles.
//!
//! [`TileStore`] owns the storage root, the lock table and the external
//! collaborators (fingerprint index, zoom-out queue). [`TileHandle`] is a
//! cheap, derived view of one logical tile that carries out the read and
//! write protocols.
//!
//! # Write protocol
//!
//! A tile's bytes are replaced atomically: the new content goes to a
//! `.new` sibling first (retried with backoff on failure), the existing
//! file is renamed to `.old`, the `.new` file is renamed into place, and
//! the `.old` file is removed. Under normal filesystem rename atomicity a
//! concurrent reader sees either the fully-old or fully-new bytes, never
//! a partial write.

use crate::coord::TileKey;
use crate::store::index::{MemoryHashIndex, TileHashIndex, HASH_ABSENT};
use crate::store::lock::{LockError, LockTable};
use crate::store::path;
use crate::store::queue::{NoOpQueue, ZoomOutQueue};
use crate::store::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::store::types::{FormatPair, StoreConfig, StoreError};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful tile read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRead {
    /// Whole-file tile contents
    pub data: Vec<u8>,
    /// Extension of the file actually read (not necessarily the
    /// configured primary)
    pub format: String,
    /// Current fingerprint from the index, [`HASH_ABSENT`] if none
    pub fingerprint: i64,
}

/// Storage engine for one sharded tile tree.
pub struct TileStore {
    pub(crate) root: PathBuf,
    pub(crate) formats: FormatPair,
    pub(crate) retry: RetryPolicy,
    pub(crate) locks: Arc<LockTable>,
    pub(crate) index: Arc<dyn TileHashIndex>,
    pub(crate) zoom_out: Arc<dyn ZoomOutQueue>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
}

impl TileStore {
    /// Open a store at the configured root, creating the root directory
    /// if it does not exist.
    ///
    /// Collaborators default to an in-memory fingerprint index and a
    /// no-op zoom-out queue; inject real ones with
    /// [`with_hash_index`](Self::with_hash_index) and
    /// [`with_zoom_out_queue`](Self::with_zoom_out_queue).
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        if !config.root.exists() {
            fs::create_dir_all(&config.root)?;
        }

        Ok(Self {
            root: config.root,
            formats: config.formats,
            retry: config.retry,
            locks: Arc::new(LockTable::new()),
            index: Arc::new(MemoryHashIndex::new()),
            zoom_out: Arc::new(NoOpQueue),
            sleeper: Arc::new(ThreadSleeper),
        })
    }

    /// Replace the fingerprint index collaborator.
    pub fn with_hash_index(mut self, index: Arc<dyn TileHashIndex>) -> Self {
        self.index = index;
        self
    }

    /// Replace the zoom-out update queue collaborator.
    pub fn with_zoom_out_queue(mut self, queue: Arc<dyn ZoomOutQueue>) -> Self {
        self.zoom_out = queue;
        self
    }

    /// Replace the sleeper used between write retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured image formats.
    pub fn formats(&self) -> &FormatPair {
        &self.formats
    }

    /// Lock table for this root, for host-driven interruption.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Handle for one logical tile. Derived on demand, never persisted.
    pub fn tile(&self, key: TileKey) -> TileHandle<'_> {
        let base = path::canonical_path(&key);
        TileHandle {
            store: self,
            key,
            base,
        }
    }
}

/// Handle for one logical tile within a store.
///
/// Two handles are the same storage entity iff their canonical paths are
/// equal; equality and hashing follow that contract.
pub struct TileHandle<'a> {
    store: &'a TileStore,
    key: TileKey,
    /// Canonical relative path, without extension
    base: String,
}

impl fmt::Debug for TileHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileHandle")
            .field("key", &self.key)
            .field("base", &self.base)
            .finish()
    }
}

impl fmt::Display for TileHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

impl PartialEq for TileHandle<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for TileHandle<'_> {}

impl Hash for TileHandle<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.hash(state);
    }
}

impl<'a> TileHandle<'a> {
    /// The tile's key.
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    /// Canonical relative path, without extension.
    pub fn canonical_path(&self) -> &str {
        &self.base
    }

    /// Relative URI of the tile in the configured primary format.
    pub fn uri(&self) -> String {
        path::tile_uri(&self.key, &self.store.formats.primary)
    }

    /// Handle for the parent tile one zoom level up.
    pub fn zoom_out_tile(&self) -> TileHandle<'a> {
        self.store.tile(self.key.zoom_out())
    }

    fn file_path(&self, ext: &str) -> PathBuf {
        self.store.root.join(format!("{}.{}", self.base, ext))
    }

    fn primary_path(&self) -> PathBuf {
        self.file_path(&self.store.formats.primary)
    }

    fn alternate_path(&self) -> PathBuf {
        self.file_path(&self.store.formats.alternate)
    }

    /// Existing file for this tile with the format actually found:
    /// primary first, alternate as a fallback.
    fn existing_file(&self) -> Option<(PathBuf, String)> {
        let primary = self.primary_path();
        if primary.is_file() {
            return Some((primary, self.store.formats.primary.clone()));
        }
        let alternate = self.alternate_path();
        if alternate.is_file() {
            return Some((alternate, self.store.formats.alternate.clone()));
        }
        None
    }

    /// Whether a file exists for this tile in either format.
    pub fn exists(&self) -> bool {
        self.existing_file().is_some()
    }

    /// Fast existence-and-freshness check.
    ///
    /// True iff a primary-format file exists (no alternate fallback) and
    /// the recorded fingerprint equals `hash`.
    pub fn matches_fingerprint(&self, hash: i64) -> bool {
        self.primary_path().is_file() && hash == self.current_fingerprint()
    }

    /// Read the tile's bytes, falling back to the alternate format when
    /// the primary file is absent.
    ///
    /// I/O failures are logged and yield `None`, identical to absence.
    pub fn read(&self) -> Option<TileRead> {
        let (file, format) = self.existing_file()?;
        match fs::read(&file) {
            Ok(data) => Some(TileRead {
                data,
                format,
                fingerprint: self.current_fingerprint(),
            }),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "tile read failed");
                None
            }
        }
    }

    /// Replace or delete the tile's stored bytes.
    ///
    /// `Some(data)` durably replaces the tile content and records
    /// `fingerprint`; `None` deletes the tile and records the absent
    /// sentinel. Either way the alternate-format file is removed first,
    /// so at most one format exists per tile at any quiescent moment, and
    /// a zoom-0 change is enqueued with the zoom-out queue.
    ///
    /// Returns false when the staged write still fails after the retry
    /// schedule is exhausted, or when the directory or rename plumbing
    /// fails; the tile is then left in its prior durable state.
    pub fn write(&self, fingerprint: i64, data: Option<&[u8]>) -> bool {
        let primary = self.primary_path();
        let alternate = self.alternate_path();

        // Always clean up the stale alternate-format file first.
        if alternate.exists() {
            if let Err(e) = fs::remove_file(&alternate) {
                tracing::debug!(path = %alternate.display(), error = %e,
                    "failed to remove alternate-format file");
            }
        }

        let Some(data) = data else {
            // Delete: success regardless of whether a file existed.
            if primary.exists() {
                if let Err(e) = fs::remove_file(&primary) {
                    tracing::warn!(path = %primary.display(), error = %e,
                        "failed to remove tile file");
                }
            }
            self.record_fingerprint(HASH_ABSENT);
            self.signal_zoom_out();
            return true;
        };

        if let Some(parent) = primary.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %e,
                        "failed to create tile directory");
                    return false;
                }
            }
        }

        let staged = sibling(&primary, ".new");
        let displaced = sibling(&primary, ".old");

        // Stage the full content, retrying with backoff.
        let mut retry = 0u32;
        loop {
            match fs::write(&staged, data) {
                Ok(()) => break,
                Err(e) => {
                    if retry < self.store.retry.max_retries {
                        tracing::debug!(path = %primary.display(), retry, error = %e,
                            "tile write failed, retrying");
                        self.store.sleeper.sleep(self.store.retry.backoff(retry));
                        retry += 1;
                    } else {
                        tracing::warn!(path = %primary.display(), error = %e,
                            "tile write failed after retries, giving up");
                        return false;
                    }
                }
            }
        }

        // Swap the staged file into place. A reader sees either the old
        // or the new content, never a partial write.
        if primary.exists() {
            if let Err(e) = fs::rename(&primary, &displaced) {
                tracing::debug!(path = %primary.display(), error = %e,
                    "failed to displace previous tile file");
            }
        }
        if let Err(e) = fs::rename(&staged, &primary) {
            tracing::warn!(path = %primary.display(), error = %e,
                "failed to move staged tile into place");
            // Put the prior content back if we displaced it.
            if displaced.exists() {
                let _ = fs::rename(&displaced, &primary);
            }
            return false;
        }
        if displaced.exists() {
            let _ = fs::remove_file(&displaced);
        }

        self.record_fingerprint(fingerprint);
        self.signal_zoom_out();
        true
    }

    /// Acquire the exclusive write lock for this tile. Blocks without
    /// bound; advisory only.
    pub fn acquire_write_lock(&self) -> Result<(), LockError> {
        self.store.locks.acquire_exclusive(&self.base)
    }

    /// Release this tile's write lock.
    pub fn release_write_lock(&self) -> Result<(), LockError> {
        self.store.locks.release_exclusive(&self.base)
    }

    /// Acquire a shared read lock for this tile, waiting at most
    /// `timeout` if given.
    pub fn acquire_read_lock(&self, timeout: Option<Duration>) -> Result<(), LockError> {
        self.store.locks.acquire_shared(&self.base, timeout)
    }

    /// Release one shared read lock for this tile.
    pub fn release_read_lock(&self) -> Result<(), LockError> {
        self.store.locks.release_shared(&self.base)
    }

    fn current_fingerprint(&self) -> i64 {
        self.store
            .index
            .fingerprint(&self.key.hash_key(), self.key.variant(), self.key.x, self.key.y)
    }

    fn record_fingerprint(&self, value: i64) {
        self.store.index.set_fingerprint(
            &self.key.hash_key(),
            self.key.variant(),
            self.key.x,
            self.key.y,
            value,
        );
    }

    fn signal_zoom_out(&self) {
        if self.key.zoom == 0 {
            self.store.zoom_out.enqueue(self.key.clone());
        }
    }
}

/// Sibling path with `suffix` appended to the full filename.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::StoreConfig;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl RecordingSleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    struct CollectingQueue(Mutex<Vec<TileKey>>);

    impl CollectingQueue {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn drained(&self) -> Vec<TileKey> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ZoomOutQueue for CollectingQueue {
        fn enqueue(&self, key: TileKey) {
            self.0.lock().unwrap().push(key);
        }
    }

    fn create_temp_store() -> (TileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store =
            TileStore::new(StoreConfig::default().with_root(temp_dir.path().to_path_buf()))
                .unwrap();
        (store, temp_dir)
    }

    fn create_test_key(zoom: u8, x: i32, y: i32) -> TileKey {
        TileKey::new("world", "flat", "", zoom, x, y)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 5, -3));
        let data = vec![1u8, 2, 3, 4, 5];

        assert!(tile.write(0x1234, Some(&data)));

        let read = tile.read().unwrap();
        assert_eq!(read.data, data);
        assert_eq!(read.format, "png");
        assert_eq!(read.fingerprint, 0x1234);
        assert!(tile.exists());
    }

    #[test]
    fn test_read_absent_tile() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 1, 1));

        assert!(!tile.exists());
        assert!(tile.read().is_none());
    }

    #[test]
    fn test_delete_tile() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 5, 5));

        assert!(tile.write(7, Some(&[1, 2, 3])));
        assert!(tile.write(0, None));

        assert!(!tile.exists());
        assert!(tile.read().is_none());
        assert!(!tile.matches_fingerprint(7));
    }

    #[test]
    fn test_delete_absent_tile_succeeds() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 9, 9));

        assert!(tile.write(0, None));
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 2, 2));

        assert!(tile.write(1, Some(&[1; 64])));
        assert!(tile.write(2, Some(&[2; 32])));

        let read = tile.read().unwrap();
        assert_eq!(read.data, vec![2u8; 32]);
        assert_eq!(read.fingerprint, 2);
    }

    #[test]
    fn test_write_removes_alternate_format() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 3, 3));

        // Seed an alternate-format file, as if the tree was written with
        // the formats swapped.
        let alternate = store.root().join("world/flat/0_0/3_3.jpg");
        fs::create_dir_all(alternate.parent().unwrap()).unwrap();
        fs::write(&alternate, [9u8; 8]).unwrap();
        assert!(tile.exists());

        assert!(tile.write(5, Some(&[1, 2, 3])));

        // Exactly one of the two format files remains.
        assert!(store.root().join("world/flat/0_0/3_3.png").is_file());
        assert!(!alternate.exists());
    }

    #[test]
    fn test_delete_removes_both_formats() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 4, 4));

        let alternate = store.root().join("world/flat/0_0/4_4.jpg");
        fs::create_dir_all(alternate.parent().unwrap()).unwrap();
        fs::write(&alternate, [9u8; 8]).unwrap();
        tile.write(5, Some(&[1, 2, 3]));
        fs::write(&alternate, [9u8; 8]).unwrap();

        assert!(tile.write(0, None));
        assert!(!store.root().join("world/flat/0_0/4_4.png").exists());
        assert!(!alternate.exists());
    }

    #[test]
    fn test_read_falls_back_to_alternate() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 6, 6));

        let alternate = store.root().join("world/flat/0_0/6_6.jpg");
        fs::create_dir_all(alternate.parent().unwrap()).unwrap();
        fs::write(&alternate, [7u8; 4]).unwrap();

        let read = tile.read().unwrap();
        assert_eq!(read.data, vec![7u8; 4]);
        assert_eq!(read.format, "jpg");
    }

    #[test]
    fn test_matches_fingerprint_primary_only() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 7, 7));

        assert!(tile.write(0x55, Some(&[1])));
        assert!(tile.matches_fingerprint(0x55));
        assert!(!tile.matches_fingerprint(0x56));

        // An alternate-format file alone never matches, even with the
        // right fingerprint recorded.
        let primary = store.root().join("world/flat/0_0/7_7.png");
        let alternate = store.root().join("world/flat/0_0/7_7.jpg");
        fs::rename(&primary, &alternate).unwrap();
        assert!(tile.exists());
        assert!(!tile.matches_fingerprint(0x55));
    }

    #[test]
    fn test_zoomed_tile_paths() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(2, 33, -1));

        assert!(tile.write(1, Some(&[1])));
        assert!(store.root().join("world/flat/1_-1/zz_33_-1.png").is_file());
        assert_eq!(tile.canonical_path(), "world/flat/1_-1/zz_33_-1");
        assert_eq!(tile.uri(), "flat/1_-1/zz_33_-1.png");
    }

    #[test]
    fn test_handle_identity_by_canonical_path() {
        let (store, _temp) = create_temp_store();
        let a = store.tile(create_test_key(0, 1, 2));
        let b = store.tile(create_test_key(0, 1, 2));
        let c = store.tile(create_test_key(1, 1, 2));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "world/flat/0_0/1_2");
    }

    #[test]
    fn test_zoom_zero_write_signals_zoom_out() {
        let (store, _temp) = create_temp_store();
        let queue = CollectingQueue::new();
        let store = store.with_zoom_out_queue(queue.clone());

        let key = create_test_key(0, 5, -3);
        assert!(store.tile(key.clone()).write(1, Some(&[1])));

        let enqueued = queue.drained();
        assert_eq!(enqueued, vec![key.clone()]);
        // The parent derivation on the enqueued key matches the pyramid.
        assert_eq!(enqueued[0].zoom_out(), create_test_key(1, 4, -2));
    }

    #[test]
    fn test_zoom_zero_delete_signals_zoom_out() {
        let (store, _temp) = create_temp_store();
        let queue = CollectingQueue::new();
        let store = store.with_zoom_out_queue(queue.clone());

        assert!(store.tile(create_test_key(0, 0, 0)).write(0, None));
        assert_eq!(queue.drained().len(), 1);
    }

    #[test]
    fn test_zoomed_write_does_not_signal() {
        let (store, _temp) = create_temp_store();
        let queue = CollectingQueue::new();
        let store = store.with_zoom_out_queue(queue.clone());

        assert!(store.tile(create_test_key(1, 4, -2)).write(1, Some(&[1])));
        assert!(queue.drained().is_empty());
    }

    #[test]
    fn test_write_retries_then_gives_up() {
        let (store, _temp) = create_temp_store();
        let sleeper = RecordingSleeper::new();
        let store = store.with_sleeper(sleeper.clone());
        let tile = store.tile(create_test_key(0, 8, 8));

        // Seed the prior content, then block the staging path with a
        // directory so every staged write fails.
        assert!(tile.write(1, Some(&[42u8; 16])));
        let staged = store.root().join("world/flat/0_0/8_8.png.new");
        fs::create_dir_all(&staged).unwrap();
        sleeper.0.lock().unwrap().clear();

        assert!(!tile.write(2, Some(&[0u8; 16])));

        // Exhausted the full backoff schedule.
        let millis: Vec<u64> = sleeper.sleeps().iter().map(|d| d.as_millis() as u64).collect();
        assert_eq!(millis, vec![50, 100, 200, 400, 800, 1600]);

        // The tile is left in its prior durable state.
        let read = tile.read().unwrap();
        assert_eq!(read.data, vec![42u8; 16]);
        assert_eq!(read.fingerprint, 1);
    }

    #[test]
    fn test_stale_staged_file_does_not_corrupt_read() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 9, 1));

        assert!(tile.write(1, Some(&[5u8; 8])));

        // Simulate a crash after staging but before the rename: a .new
        // sibling is left behind and must not shadow the tile.
        let staged = store.root().join("world/flat/0_0/9_1.png.new");
        fs::write(&staged, [0u8; 8]).unwrap();

        let read = tile.read().unwrap();
        assert_eq!(read.data, vec![5u8; 8]);
        assert_eq!(read.fingerprint, 1);
    }

    #[test]
    fn test_advisory_locks_via_handle() {
        let (store, _temp) = create_temp_store();
        let tile = store.tile(create_test_key(0, 1, 1));

        tile.acquire_write_lock().unwrap();
        assert_eq!(
            tile.acquire_read_lock(Some(Duration::ZERO)),
            Err(LockError::Timeout)
        );
        tile.release_write_lock().unwrap();

        tile.acquire_read_lock(None).unwrap();
        tile.release_read_lock().unwrap();
    }

    #[test]
    fn test_variant_tiles_are_distinct_entities() {
        let (store, _temp) = create_temp_store();
        let day = store.tile(TileKey::new("world", "flat", "", 0, 1, 1));
        let night = store.tile(TileKey::new("world", "flat", "_night", 0, 1, 1));

        assert_ne!(day, night);
        assert!(day.write(1, Some(&[1])));
        assert!(night.write(2, Some(&[2])));

        assert_eq!(day.read().unwrap().data, vec![1]);
        assert_eq!(night.read().unwrap().data, vec![2]);
        assert!(day.matches_fingerprint(1));
        assert!(night.matches_fingerprint(2));
    }
}
