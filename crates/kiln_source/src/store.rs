//! The virtual source store.
//!
//! Owns every tracked [`SourceRecord`], decides whether a file event is a
//! real content change or a no-op touch, and answers the synchronous
//! source lookups the compiler host performs during program
//! construction. All disk I/O happens in the async ingestion methods;
//! `get_source` is a plain in-memory lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::exotic::{self, BlockLocation, ExtractedScript, TransformError};
use crate::path::normalize;
use crate::record::{RecordKind, SourceRecord};
use crate::unit::{ParseSettings, SourceUnit};

/// Outcome of feeding a file-system event into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A previously unknown path is now tracked.
    Added,
    /// Tracked content was replaced; the record's version was bumped.
    Changed,
    /// Content is byte-identical to the cached text; nothing happened.
    Unchanged,
    /// The path is outside every tracked set; nothing happened.
    Untracked,
    /// An exotic document failed to transform; the last good state (if
    /// any) was kept and the failure recorded.
    TransformFailed,
}

impl UpdateOutcome {
    /// Whether this outcome warrants scheduling a recheck.
    pub fn schedules_recheck(self) -> bool {
        matches!(self, UpdateOutcome::Added | UpdateOutcome::Changed | UpdateOutcome::TransformFailed)
    }
}

/// Errors raised by store ingestion.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern \"{pattern}\": {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// In-memory, versioned cache of every source the analysis engine may
/// request during a check pass.
///
/// Records are keyed by the path the engine sees: the on-disk path for
/// direct sources, the virtual path for exotic ones.
#[derive(Debug, Default)]
pub struct VirtualSourceStore {
    settings: ParseSettings,
    records: FxHashMap<PathBuf, SourceRecord>,
    virtual_to_real: FxHashMap<PathBuf, PathBuf>,
    real_to_virtual: FxHashMap<PathBuf, PathBuf>,
    entry_files: Vec<PathBuf>,
    exotic_patterns: Vec<glob::Pattern>,
    failed_transforms: FxHashMap<PathBuf, String>,
    revision: u64,
}

impl VirtualSourceStore {
    pub fn new(settings: ParseSettings) -> VirtualSourceStore {
        VirtualSourceStore { settings, ..VirtualSourceStore::default() }
    }

    /// Register a program root. Idempotent; entries are never removed by
    /// watch churn.
    pub fn include_file(&mut self, path: &Path) {
        let path = normalize(path);
        if !self.entry_files.contains(&path) {
            self.entry_files.push(path);
        }
    }

    pub fn include_files<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.include_file(path.as_ref());
        }
    }

    /// Resolve glob patterns to exotic files and register each one.
    ///
    /// A file that fails to read or transform is logged and skipped; the
    /// rest of the set is still registered.
    pub async fn add_exotic_sources(&mut self, patterns: &[String]) -> Result<(), StoreError> {
        for pattern in patterns {
            let compiled = glob::Pattern::new(pattern)
                .map_err(|source| StoreError::Pattern { pattern: pattern.clone(), source })?;
            self.exotic_patterns.push(compiled);

            let paths = glob::glob(pattern)
                .map_err(|source| StoreError::Pattern { pattern: pattern.clone(), source })?;
            for entry in paths {
                let real = match entry {
                    Ok(path) => normalize(&path),
                    Err(error) => {
                        warn!("skipping unreadable glob entry: {error}");
                        continue;
                    }
                };
                if let Err(error) = self.ingest_exotic(&real).await {
                    warn!("failed to register exotic source {}: {error}", real.display());
                }
            }
        }
        Ok(())
    }

    /// Eagerly read and parse every known entry and exotic file,
    /// establishing `version == 1` for each. Must complete before the
    /// first check pass.
    pub async fn preload_sources(&mut self) -> Result<(), StoreError> {
        let entries: Vec<PathBuf> = self.entry_files.clone();
        for path in entries {
            if self.records.contains_key(&path) || self.real_to_virtual.contains_key(&path) {
                continue;
            }
            if exotic::is_exotic_path(&path) {
                if let Err(error) = self.ingest_exotic(&path).await {
                    warn!("failed to preload entry {}: {error}", path.display());
                }
                continue;
            }
            match read_text(&path).await {
                Ok(text) => {
                    self.insert_direct(path, text);
                }
                Err(error) => warn!("failed to preload entry: {error}"),
            }
        }

        for record in self.records.values() {
            record.unit(self.settings);
        }
        Ok(())
    }

    /// Ingest a change/add event for `real_path`.
    pub async fn add_or_update_source(&mut self, real_path: &Path) -> Result<UpdateOutcome, StoreError> {
        let real = normalize(real_path);
        let text = read_text(&real).await?;

        if exotic::is_exotic_path(&real) {
            return Ok(self.apply_exotic_text(&real, &text));
        }

        if let Some(record) = self.records.get_mut(&real) {
            if record.update(text, None) {
                self.revision += 1;
                Ok(UpdateOutcome::Changed)
            } else {
                Ok(UpdateOutcome::Unchanged)
            }
        } else {
            self.insert_direct(real, text);
            Ok(UpdateOutcome::Added)
        }
    }

    /// Ingest a delete event. Returns whether a tracked record was
    /// actually removed; the entry-file list is left untouched.
    pub fn try_remove_source(&mut self, real_path: &Path) -> bool {
        let real = normalize(real_path);
        let had_failure = self.failed_transforms.remove(&real).is_some();

        if let Some(virtual_path) = self.real_to_virtual.remove(&real) {
            self.records.remove(&virtual_path);
            self.virtual_to_real.remove(&virtual_path);
            self.revision += 1;
            return true;
        }
        if self.records.remove(&real).is_some() {
            self.real_to_virtual.remove(&real);
            self.revision += 1;
            return true;
        }
        if had_failure {
            self.revision += 1;
        }
        had_failure
    }

    /// Synchronous lookup for the compiler host. Accepts both the
    /// engine-facing (possibly virtual) path and an exotic file's real
    /// path. Returns `None` for anything outside the tracked set.
    pub fn get_source(&self, requested: &Path) -> Option<Arc<SourceUnit>> {
        let path = normalize(requested);
        if let Some(record) = self.records.get(&path) {
            return Some(record.unit(self.settings));
        }
        let virtual_path = self.real_to_virtual.get(&path)?;
        self.records.get(virtual_path).map(|record| record.unit(self.settings))
    }

    /// Raw text lookup for the host's `read_file` path; does not force a
    /// parse.
    pub fn get_text(&self, requested: &Path) -> Option<Arc<str>> {
        let path = normalize(requested);
        if let Some(record) = self.records.get(&path) {
            return Some(record.text_arc());
        }
        let virtual_path = self.real_to_virtual.get(&path)?;
        self.records.get(virtual_path).map(SourceRecord::text_arc)
    }

    /// Whether a path (engine-facing or exotic-real) is tracked.
    pub fn contains(&self, requested: &Path) -> bool {
        let path = normalize(requested);
        self.records.contains_key(&path) || self.real_to_virtual.contains_key(&path)
    }

    /// Reverse-translate a virtual path for diagnostics rendering.
    pub fn get_real_file_path(&self, path: &Path) -> PathBuf {
        let path = normalize(path);
        self.virtual_to_real.get(&path).cloned().unwrap_or(path)
    }

    /// Current program roots, exotic entries remapped to their virtual
    /// paths.
    pub fn entry_file_paths(&self) -> Vec<PathBuf> {
        self.entry_files
            .iter()
            .map(|path| self.real_to_virtual.get(path).unwrap_or(path).clone())
            .collect()
    }

    /// The block location of an exotic record, keyed by engine path.
    pub fn block_location(&self, path: &Path) -> Option<BlockLocation> {
        self.records.get(&normalize(path)).and_then(SourceRecord::block_location)
    }

    /// Transform failures currently standing, as (real path, reason).
    pub fn failed_transforms(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.failed_transforms.iter().map(|(path, reason)| (path.as_path(), reason.as_str()))
    }

    /// Counter bumped on every accepted mutation; lets a caller detect
    /// whether a pass observed the latest store state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn tracked_len(&self) -> usize {
        self.records.len()
    }

    fn matches_exotic_glob(&self, path: &Path) -> bool {
        self.exotic_patterns.iter().any(|pattern| pattern.matches_path(path))
    }

    fn apply_exotic_text(&mut self, real: &Path, text: &str) -> UpdateOutcome {
        let tracked = self.real_to_virtual.contains_key(real)
            || self.entry_files.iter().any(|entry| entry == real);

        match exotic::extract_script(text) {
            Ok(script) => {
                self.failed_transforms.remove(real);
                let virtual_path = exotic::virtual_path_for(real);
                if let Some(record) = self.records.get_mut(&virtual_path) {
                    if record.update(Arc::from(script.content), Some(script.loc)) {
                        self.revision += 1;
                        UpdateOutcome::Changed
                    } else {
                        UpdateOutcome::Unchanged
                    }
                } else if tracked || self.matches_exotic_glob(real) {
                    self.insert_exotic(real.to_path_buf(), script);
                    UpdateOutcome::Added
                } else {
                    UpdateOutcome::Untracked
                }
            }
            Err(error) => {
                if tracked || self.matches_exotic_glob(real) {
                    warn!("transform failed for {}: {error}", real.display());
                    self.failed_transforms.insert(real.to_path_buf(), error.to_string());
                    UpdateOutcome::TransformFailed
                } else {
                    UpdateOutcome::Untracked
                }
            }
        }
    }

    async fn ingest_exotic(&mut self, real: &Path) -> Result<(), IngestError> {
        let text = read_text(real).await?;
        let script = exotic::extract_script(&text).map_err(|error| {
            self.failed_transforms.insert(real.to_path_buf(), error.to_string());
            error
        })?;
        self.failed_transforms.remove(real);
        self.insert_exotic(real.to_path_buf(), script);
        Ok(())
    }

    fn insert_exotic(&mut self, real: PathBuf, script: ExtractedScript) {
        let virtual_path = exotic::virtual_path_for(&real);
        debug!("tracking exotic source {} as {}", real.display(), virtual_path.display());

        let record = SourceRecord::new(
            virtual_path.clone(),
            real.clone(),
            RecordKind::Exotic,
            Arc::from(script.content),
            Some(script.loc),
        );
        self.records.insert(virtual_path.clone(), record);
        self.virtual_to_real.insert(virtual_path.clone(), real.clone());
        self.real_to_virtual.insert(real, virtual_path);
        self.revision += 1;
    }

    fn insert_direct(&mut self, path: PathBuf, text: Arc<str>) {
        let record =
            SourceRecord::new(path.clone(), path.clone(), RecordKind::Direct, text, None);
        self.records.insert(path, record);
        self.revision += 1;
    }
}

async fn read_text(path: &Path) -> Result<Arc<str>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Arc::from(text)),
        Err(source) => Err(StoreError::Read { path: path.to_path_buf(), source }),
    }
}

/// Internal error for exotic ingestion: read and transform failures are
/// handled identically (log and continue) by the callers.
#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error(transparent)]
    Read(#[from] StoreError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}
