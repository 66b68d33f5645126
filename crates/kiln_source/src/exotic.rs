//! Exotic source transformation.
//!
//! Component files (`.vue`) are not directly analyzable: the checkable
//! TypeScript lives inside a `<script>` block embedded in a larger
//! document. The transformer extracts that block and records where it
//! sits in the original file so diagnostics can be mapped back.
//!
//! The virtual path presented to the analysis engine is the real path
//! with `.ts` appended (`App.vue` becomes `App.vue.ts`), which keeps the
//! engine's extension handling unchanged.

use std::path::{Path, PathBuf};

use memchr::memchr;
use memchr::memmem;

/// File extension recognized as an exotic source.
pub const EXOTIC_EXTENSION: &str = "vue";

/// Location of an extracted block within the original document.
///
/// `start_line`/`start_column` are 1-based and point at the first byte
/// of the block content (immediately after the opening tag's `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocation {
    pub start: u32,
    pub end: u32,
    pub start_line: u32,
    pub start_column: u32,
}

impl BlockLocation {
    /// Map a 1-based position inside the extracted block back to the
    /// original document.
    ///
    /// Content on the block's first line shares the opening tag's line,
    /// so its columns shift by the tag's width; every later line only
    /// shifts by the block's line offset.
    pub fn map_to_original(&self, line: u32, column: u32) -> (u32, u32) {
        if line <= 1 {
            (self.start_line, self.start_column + column - 1)
        } else {
            (self.start_line + line - 1, column)
        }
    }
}

/// Result of a successful script extraction.
#[derive(Debug, Clone)]
pub struct ExtractedScript {
    pub content: String,
    pub loc: BlockLocation,
    pub lang: Option<String>,
}

/// Failure to turn an exotic document into analyzable text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    #[error("component file has no <script> block")]
    MissingScript,

    #[error("component file has more than one <script> block (second at line {line})")]
    DuplicateScript { line: u32 },

    #[error("unclosed <script> block starting at line {line}")]
    UnclosedScript { line: u32 },

    #[error("unsupported script language \"{lang}\" (expected \"ts\")")]
    UnsupportedLang { lang: String },
}

/// Whether a path is an exotic source by extension.
pub fn is_exotic_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(EXOTIC_EXTENSION))
}

/// The synthetic path presented to the analysis engine for an exotic file.
pub fn virtual_path_for(real_path: &Path) -> PathBuf {
    let mut s = real_path.as_os_str().to_os_string();
    s.push(".ts");
    PathBuf::from(s)
}

/// Extract the `<script>` block from an exotic document.
pub fn extract_script(source: &str) -> Result<ExtractedScript, TransformError> {
    let bytes = source.as_bytes();
    let mut search_from = 0;
    let mut found: Option<ExtractedScript> = None;

    while let Some(rel) = memmem::find(&bytes[search_from..], b"<script") {
        let tag_start = search_from + rel;
        let after_name = tag_start + "<script".len();

        // Require a real tag boundary; `<scripted>` is not a script block.
        match bytes.get(after_name) {
            Some(b' ' | b'\t' | b'\r' | b'\n' | b'>') => {}
            _ => {
                search_from = after_name;
                continue;
            }
        }

        let Some(gt_rel) = memchr(b'>', &bytes[after_name..]) else {
            return Err(TransformError::UnclosedScript { line: line_at(source, tag_start) });
        };
        let content_start = after_name + gt_rel + 1;
        let attrs = &source[after_name..after_name + gt_rel];

        let Some(close_rel) = memmem::find(&bytes[content_start..], b"</script>") else {
            return Err(TransformError::UnclosedScript { line: line_at(source, tag_start) });
        };
        let content_end = content_start + close_rel;

        if found.is_some() {
            return Err(TransformError::DuplicateScript { line: line_at(source, tag_start) });
        }

        let lang = attr_value(attrs, "lang");
        if let Some(ref lang) = lang {
            if lang != "ts" {
                return Err(TransformError::UnsupportedLang { lang: lang.clone() });
            }
        }

        let (start_line, start_column) = line_col_at(source, content_start);
        found = Some(ExtractedScript {
            content: source[content_start..content_end].to_string(),
            loc: BlockLocation {
                start: content_start as u32,
                end: content_end as u32,
                start_line,
                start_column,
            },
            lang,
        });

        search_from = content_end + "</script>".len();
    }

    found.ok_or(TransformError::MissingScript)
}

/// Pull a quoted attribute value out of an opening tag's attribute text.
fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let bytes = attrs.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = memmem::find(&bytes[search_from..], name.as_bytes()) {
        let name_start = search_from + rel;
        let name_end = name_start + name.len();

        let boundary_before = name_start == 0
            || matches!(bytes[name_start - 1], b' ' | b'\t' | b'\r' | b'\n');
        let rest = attrs[name_end..].trim_start();
        if !boundary_before || !rest.starts_with('=') {
            search_from = name_end;
            continue;
        }

        let value_part = rest[1..].trim_start();
        let quote = value_part.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let value_end = value_part[1..].find(quote)?;
        return Some(value_part[1..1 + value_end].to_string());
    }

    None
}

fn line_at(source: &str, offset: usize) -> u32 {
    source.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() as u32 + 1
}

fn line_col_at(source: &str, offset: usize) -> (u32, u32) {
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
    let column = match before.iter().rposition(|&b| b == b'\n') {
        Some(newline) => offset - newline,
        None => offset + 1,
    };
    (line, column as u32)
}
