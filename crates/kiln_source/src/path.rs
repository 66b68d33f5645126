//! Path normalization for cache keys.
//!
//! Every path entering the store is normalized once at the boundary:
//! forward slashes, lexically resolved `.`/`..` segments, no trailing
//! separator. Lookups then compare keys byte-for-byte across platforms.

use std::path::{Path, PathBuf};

/// Normalize a path for use as a store key.
pub fn normalize(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy().replace('\\', "/");
    let absolute = raw.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(&s) if s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut joined = segments.join("/");
    if absolute {
        joined.insert(0, '/');
    }
    if joined.is_empty() {
        joined.push('.');
    }
    PathBuf::from(joined)
}

/// Join a relative segment onto a base directory and normalize the result.
pub fn join_normalized(base_dir: &Path, relative: &str) -> PathBuf {
    normalize(&base_dir.join(relative))
}

/// The directory portion of a normalized path.
pub fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(
            normalize(Path::new("src\\app\\main.ts")),
            PathBuf::from("src/app/main.ts")
        );
    }

    #[test]
    fn test_normalize_dot_segments() {
        assert_eq!(
            normalize(Path::new("/project/src/./app/../main.ts")),
            PathBuf::from("/project/src/main.ts")
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent_when_relative() {
        assert_eq!(normalize(Path::new("../shared/util.ts")), PathBuf::from("../shared/util.ts"));
    }

    #[test]
    fn test_normalize_trailing_separator() {
        assert_eq!(normalize(Path::new("/project/src/")), PathBuf::from("/project/src"));
    }

    #[test]
    fn test_join_normalized() {
        assert_eq!(
            join_normalized(Path::new("/project/src/pages"), "../lib/helper.ts"),
            PathBuf::from("/project/src/lib/helper.ts")
        );
    }
}
