//! The compiler host adapter.
//!
//! Program construction never touches the real filesystem for tracked
//! paths: every read goes through this adapter, which consults the
//! virtual source store first and only then falls back to disk. Fallback
//! reads land in the immutable dependency cache and are never re-read
//! for the remainder of the process run; ambient declaration trees under
//! `node_modules` are large, rarely change within a watch session, and
//! re-reading them would dominate check latency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use kiln_source::path::normalize;
use kiln_source::{ParseSettings, SourceUnit, VirtualSourceStore};
use tracing::trace;

/// The narrow capability set the analysis engine needs from its host.
pub trait CompilerHost {
    /// Raw text of a file, if it can be produced.
    fn read_file(&self, path: &Path) -> Option<Arc<str>>;

    /// Parsed representation of a file, if it can be produced.
    fn get_source_file(&self, path: &Path) -> Option<Arc<SourceUnit>>;

    /// Existence probe used during module resolution. May hit disk;
    /// metadata-only.
    fn file_exists(&self, path: &Path) -> bool;
}

/// Path→content caches for files assumed immutable within a process
/// lifetime (package manifests, ambient declarations). Populated lazily,
/// never invalidated.
#[derive(Debug, Default)]
pub struct AmbientCache {
    raw: DashMap<PathBuf, Arc<str>>,
    units: DashMap<PathBuf, Arc<SourceUnit>>,
}

impl AmbientCache {
    pub fn new() -> AmbientCache {
        AmbientCache::default()
    }

    pub fn len(&self) -> usize {
        self.units.len() + self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.raw.is_empty()
    }
}

/// Host implementation backed by a [`VirtualSourceStore`] with an
/// ambient-cache fallback.
pub struct StoreHost<'a> {
    store: &'a VirtualSourceStore,
    ambient: &'a AmbientCache,
    settings: ParseSettings,
}

impl<'a> StoreHost<'a> {
    pub fn new(
        store: &'a VirtualSourceStore,
        ambient: &'a AmbientCache,
        settings: ParseSettings,
    ) -> StoreHost<'a> {
        StoreHost { store, ambient, settings }
    }
}

impl CompilerHost for StoreHost<'_> {
    fn read_file(&self, path: &Path) -> Option<Arc<str>> {
        if let Some(text) = self.store.get_text(path) {
            return Some(text);
        }

        let path = normalize(path);
        if let Some(cached) = self.ambient.raw.get(&path) {
            return Some(Arc::clone(&cached));
        }

        trace!("ambient read: {}", path.display());
        let text: Arc<str> = std::fs::read_to_string(&path).ok()?.into();
        self.ambient.raw.insert(path, Arc::clone(&text));
        Some(text)
    }

    fn get_source_file(&self, path: &Path) -> Option<Arc<SourceUnit>> {
        if let Some(unit) = self.store.get_source(path) {
            return Some(unit);
        }

        let path = normalize(path);
        if let Some(cached) = self.ambient.units.get(&path) {
            return Some(Arc::clone(&cached));
        }

        trace!("ambient parse: {}", path.display());
        let text: Arc<str> = std::fs::read_to_string(&path).ok()?.into();
        let unit = Arc::new(SourceUnit::parse(&path, text, 1, self.settings));
        self.ambient.units.insert(path, Arc::clone(&unit));
        Some(unit)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.store.contains(path) || normalize(path).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn empty_store() -> VirtualSourceStore {
        VirtualSourceStore::new(ParseSettings::default())
    }

    #[tokio::test]
    async fn test_store_hit_never_reads_disk() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main.ts");
        fs::write(&main, "export const a = 1;\n").unwrap();

        let mut store = empty_store();
        store.include_file(&main);
        store.preload_sources().await.unwrap();

        // Remove the on-disk file: the tracked copy must still be served.
        fs::remove_file(&main).unwrap();

        let ambient = AmbientCache::new();
        let host = StoreHost::new(&store, &ambient, ParseSettings::default());
        assert!(host.get_source_file(&main).is_some());
        assert!(ambient.is_empty());
    }

    #[test]
    fn test_fallback_read_is_cached_forever() {
        let dir = TempDir::new().unwrap();
        let dep = dir.path().join("dep.d.ts");
        fs::write(&dep, "declare const DEP: string;\n").unwrap();

        let store = empty_store();
        let ambient = AmbientCache::new();
        let host = StoreHost::new(&store, &ambient, ParseSettings::default());

        let first = host.get_source_file(&dep).expect("disk fallback");
        // Delete the file; the cached unit must keep being served.
        fs::remove_file(&dep).unwrap();
        let second = host.get_source_file(&dep).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_read_file_caches_raw_text() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, "{\"name\": \"dep\"}\n").unwrap();

        let store = empty_store();
        let ambient = AmbientCache::new();
        let host = StoreHost::new(&store, &ambient, ParseSettings::default());

        assert!(host.read_file(&manifest).is_some());
        fs::remove_file(&manifest).unwrap();
        assert!(host.read_file(&manifest).is_some());
    }

    #[test]
    fn test_missing_everywhere_is_none() {
        let store = empty_store();
        let ambient = AmbientCache::new();
        let host = StoreHost::new(&store, &ambient, ParseSettings::default());

        assert!(host.get_source_file(Path::new("/nowhere/gone.ts")).is_none());
        assert!(!host.file_exists(Path::new("/nowhere/gone.ts")));
    }
}
