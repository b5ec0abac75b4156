//! Core types for the storage engine.

use crate::store::lock::LockError;
use crate::store::retry::RetryPolicy;
use std::path::PathBuf;
use thiserror::Error;

/// The two image format extensions a tree may contain.
///
/// Conventionally "png" and "jpg", but the engine treats them as two
/// opaque, symmetric alternatives: writes always produce the primary
/// format and remove the alternate, reads fall back to the alternate
/// when the primary file is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPair {
    /// Extension written by the engine
    pub primary: String,
    /// Extension accepted on read as a fallback
    pub alternate: String,
}

impl Default for FormatPair {
    fn default() -> Self {
        Self {
            primary: "png".to_string(),
            alternate: "jpg".to_string(),
        }
    }
}

impl FormatPair {
    /// Create a format pair from two extensions (without the dot).
    pub fn new(primary: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            alternate: alternate.into(),
        }
    }

    /// Case-insensitive test whether `ext` is one of the two extensions.
    pub fn matches_extension(&self, ext: &str) -> bool {
        ext.eq_ignore_ascii_case(&self.primary) || ext.eq_ignore_ascii_case(&self.alternate)
    }
}

/// Storage engine configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory of the tile tree
    pub root: PathBuf,
    /// Primary and alternate image format extensions
    pub formats: FormatPair,
    /// Retry policy for failed tile writes
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tiles"),
            formats: FormatPair::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Set the storage root directory.
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// Set the primary and alternate image formats.
    pub fn with_formats(mut self, formats: FormatPair) -> Self {
        self.formats = formats;
        self
    }

    /// Set the write retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Map selector for enumeration and purge.
///
/// A map owns a path prefix and the set of variant suffixes rendered for
/// it. The standard variant is the empty suffix.
#[derive(Debug, Clone)]
pub struct MapSpec {
    /// Map path prefix (e.g., "flat")
    pub prefix: String,
    /// Variant suffixes, empty string for the standard variant
    pub variants: Vec<String>,
}

impl MapSpec {
    /// Create a map spec with only the standard variant.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            variants: vec![String::new()],
        }
    }

    /// Add a variant suffix (e.g., "_night").
    pub fn with_variant(mut self, suffix: impl Into<String>) -> Self {
        self.variants.push(suffix.into());
        self
    }
}

/// World selector for enumeration and purge.
#[derive(Debug, Clone)]
pub struct WorldSpec {
    /// World name (top-level directory)
    pub name: String,
    /// Maps rendered for this world
    pub maps: Vec<MapSpec>,
}

impl WorldSpec {
    /// Create a world spec with no maps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            maps: Vec::new(),
        }
    }

    /// Add a map to the world.
    pub fn with_map(mut self, map: MapSpec) -> Self {
        self.maps.push(map);
        self
    }
}

/// Storage-engine errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while setting up the storage root
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock table error
    #[error(transparent)]
    Lock(#[from] LockError),
}
