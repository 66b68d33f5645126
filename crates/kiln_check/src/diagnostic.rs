//! Diagnostic model and rendering.
//!
//! Diagnostics are always attributed to the real on-disk file. Position
//! translation out of virtual exotic text happens before a `Diagnostic`
//! is constructed; by this point `file`/`line`/`column` are final.

use std::path::{Path, PathBuf};

/// Classification of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One positioned message ready for rendering.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Short machine-readable code ("parse", "module-not-found", ...).
    pub code: &'static str,
    pub severity: Severity,
    /// Real file path; never a virtual path.
    pub file: PathBuf,
    /// 1-based.
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn error(
        code: &'static str,
        file: PathBuf,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic { code, severity: Severity::Error, file, line, column, message: message.into() }
    }
}

/// Render diagnostics grouped under underlined file headers, in
/// first-seen file order.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut order: Vec<&Path> = Vec::new();
    for diagnostic in diagnostics {
        if !order.contains(&diagnostic.file.as_path()) {
            order.push(&diagnostic.file);
        }
    }

    let mut out = String::new();
    for file in order {
        out.push_str(&format!("\n\x1b[4m{}\x1b[0m\n", file.display()));
        for diagnostic in diagnostics.iter().filter(|d| d.file == file) {
            let (color, label) = match diagnostic.severity {
                Severity::Error => ("\x1b[31m", "error"),
                Severity::Warning => ("\x1b[33m", "warning"),
            };
            out.push_str(&format!(
                "  {color}{label}:{}:{}\x1b[0m [{}] {}\n",
                diagnostic.line, diagnostic.column, diagnostic.code, diagnostic.message
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_groups_by_file() {
        let diagnostics = vec![
            Diagnostic::error("parse", PathBuf::from("/p/a.ts"), 1, 2, "first"),
            Diagnostic::error("semantic", PathBuf::from("/p/b.ts"), 3, 4, "second"),
            Diagnostic::error("semantic", PathBuf::from("/p/a.ts"), 5, 6, "third"),
        ];

        let rendered = render_diagnostics(&diagnostics);
        let a_pos = rendered.find("/p/a.ts").unwrap();
        let b_pos = rendered.find("/p/b.ts").unwrap();
        assert!(a_pos < b_pos);
        assert!(rendered.contains("error:1:2"));
        assert!(rendered.contains("[parse] first"));
        assert!(rendered.contains("error:5:6"));
    }

    #[test]
    fn test_render_empty_is_empty() {
        assert!(render_diagnostics(&[]).is_empty());
    }
}
