//! Whole-tree enumeration and purge.
//!
//! Both operations walk a map's directory tree iteratively with an
//! explicit stack and reconstruct tile coordinates purely from filenames
//! via the path codec. Non-tile entries (including `.new`/`.old` write
//! transients) fail the codec's strict extension check and are skipped
//! silently. Traversal order across sibling entries, variants and maps is
//! implementation-defined; callers must not depend on it.

use crate::coord::TileKey;
use crate::store::engine::{TileHandle, TileStore};
use crate::store::path::decode_filename;
use crate::store::types::{MapSpec, WorldSpec};
use std::fs;
use std::path::{Path, PathBuf};

impl TileStore {
    /// Invoke `callback` once for every tile stored for the world.
    ///
    /// With `map` given only that map is walked; otherwise every map of
    /// the world, each across all of its variants.
    pub fn enumerate<F>(&self, world: &WorldSpec, map: Option<&MapSpec>, mut callback: F)
    where
        F: FnMut(TileHandle<'_>),
    {
        let base = self.root.join(&world.name);
        for map in selected_maps(world, map) {
            for variant in &map.variants {
                self.enumerate_map(world, map, variant, &base, &mut callback);
            }
        }
    }

    fn enumerate_map<F>(
        &self,
        world: &WorldSpec,
        map: &MapSpec,
        variant: &str,
        base: &Path,
        callback: &mut F,
    ) where
        F: FnMut(TileHandle<'_>),
    {
        let map_dir = base.join(format!("{}{}", map.prefix, variant));
        if !map_dir.is_dir() {
            return;
        }

        let mut dirs = vec![map_dir];
        while let Some(dir) = dirs.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    dirs.push(path);
                } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if let Some((zoom, x, y)) = decode_filename(name, &self.formats) {
                        let key = TileKey::new(
                            world.name.as_str(),
                            map.prefix.as_str(),
                            variant,
                            zoom,
                            x,
                            y,
                        );
                        callback(self.tile(key));
                    }
                }
            }
        }
    }

    /// Delete every tile file and directory for the world.
    ///
    /// With `map` given only that map is purged; otherwise every map of
    /// the world across all variants. Best effort per entry: individual
    /// removal failures are logged and skipped, and purging an absent
    /// directory is a no-op.
    pub fn purge(&self, world: &WorldSpec, map: Option<&MapSpec>) {
        let base = self.root.join(&world.name);
        for map in selected_maps(world, map) {
            for variant in &map.variants {
                let map_dir = base.join(format!("{}{}", map.prefix, variant));
                purge_tree(map_dir);
            }
        }
    }
}

fn selected_maps<'a>(world: &'a WorldSpec, map: Option<&'a MapSpec>) -> Vec<&'a MapSpec> {
    match map {
        Some(map) => vec![map],
        None => world.maps.iter().collect(),
    }
}

/// Delete all files under `map_dir`, then the directories themselves in
/// strict reverse traversal order so a directory goes only after its
/// descendants.
fn purge_tree(map_dir: PathBuf) {
    if !map_dir.is_dir() {
        return;
    }

    let mut dirs = vec![map_dir];
    let mut visited: Vec<PathBuf> = Vec::new();
    while let Some(dir) = dirs.pop() {
        visited.push(dir.clone());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else if let Err(e) = fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "failed to remove tile file");
            }
        }
    }

    for dir in visited.iter().rev() {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::debug!(path = %dir.display(), error = %e, "failed to remove directory");
        }
    }
}
