//! Per-file cache records.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::exotic::BlockLocation;
use crate::unit::{ParseSettings, SourceUnit};

/// How a record entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A file analyzed as-is (`.ts`, `.tsx`, `.d.ts`).
    Direct,
    /// A virtual record extracted from an exotic document.
    Exotic,
}

/// One tracked file: current text, a version counter bumped exactly once
/// per accepted content change, and the lazily derived parsed unit.
///
/// For exotic sources `path` is the virtual path and `text` is the
/// extracted script; `real_path` always names the on-disk file.
#[derive(Debug)]
pub struct SourceRecord {
    path: PathBuf,
    real_path: PathBuf,
    kind: RecordKind,
    text: Arc<str>,
    hash: u64,
    version: u64,
    block: Option<BlockLocation>,
    parsed: OnceCell<Arc<SourceUnit>>,
}

impl SourceRecord {
    pub fn new(
        path: PathBuf,
        real_path: PathBuf,
        kind: RecordKind,
        text: Arc<str>,
        block: Option<BlockLocation>,
    ) -> SourceRecord {
        let hash = xxh3_64(text.as_bytes());
        SourceRecord {
            path,
            real_path,
            kind,
            text,
            hash,
            version: 1,
            block,
            parsed: OnceCell::new(),
        }
    }

    /// Replace the record's content.
    ///
    /// Returns `false` without touching the version when the new text is
    /// byte-identical to the current text (a no-op touch); otherwise the
    /// text is swapped, the version bumped, and the parsed unit dropped.
    pub fn update(&mut self, text: Arc<str>, block: Option<BlockLocation>) -> bool {
        let hash = xxh3_64(text.as_bytes());
        if hash == self.hash && *text == *self.text {
            return false;
        }

        self.text = text;
        self.hash = hash;
        self.version += 1;
        self.block = block;
        self.parsed.take();
        true
    }

    /// The parsed unit for the current version, derived on first use.
    pub fn unit(&self, settings: ParseSettings) -> Arc<SourceUnit> {
        self.parsed
            .get_or_init(|| {
                Arc::new(SourceUnit::parse(&self.path, Arc::clone(&self.text), self.version, settings))
            })
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_arc(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn block_location(&self) -> Option<BlockLocation> {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> SourceRecord {
        SourceRecord::new(
            PathBuf::from("/p/src/main.ts"),
            PathBuf::from("/p/src/main.ts"),
            RecordKind::Direct,
            Arc::from(text),
            None,
        )
    }

    #[test]
    fn test_new_record_starts_at_version_one() {
        let rec = record("const a = 1;\n");
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn test_identical_update_is_a_noop() {
        let mut rec = record("const a = 1;\n");
        assert!(!rec.update(Arc::from("const a = 1;\n"), None));
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn test_changed_update_bumps_version_once() {
        let mut rec = record("const a = 1;\n");
        assert!(rec.update(Arc::from("const a = 2;\n"), None));
        assert_eq!(rec.version(), 2);
        assert_eq!(rec.text(), "const a = 2;\n");
    }

    #[test]
    fn test_update_invalidates_parsed_unit() {
        let mut rec = record("const a = 1;\n");
        let before = rec.unit(ParseSettings::default());
        assert_eq!(before.version(), 1);

        rec.update(Arc::from("const a = 2;\n"), None);
        let after = rec.unit(ParseSettings::default());
        assert_eq!(after.version(), 2);
        assert_eq!(after.text(), "const a = 2;\n");
    }

    #[test]
    fn test_unit_is_memoized_per_version() {
        let rec = record("const a = 1;\n");
        let first = rec.unit(ParseSettings::default());
        let second = rec.unit(ParseSettings::default());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
