//! The analyzable representation of a tracked source file.
//!
//! A `SourceUnit` is derived from a record's text exactly once per
//! version: the text is parsed with oxc, syntactic errors and module
//! specifiers are collected, and semantic analysis runs on the parsed
//! program. The AST itself is arena-allocated and does not outlive the
//! parse; everything program construction needs is extracted here so
//! that later lookups stay allocation- and I/O-free.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, Statement};
use oxc_ast_visit::{walk, Visit};
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;

/// Fixed language-level configuration shared by every parse in a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseSettings {
    /// Parse `.ts` sources with JSX enabled (tsconfig `jsx` is set).
    pub jsx: bool,
}

/// A diagnostic produced while deriving a unit (parse or semantic).
#[derive(Debug, Clone)]
pub struct UnitDiagnostic {
    pub message: String,
    /// Byte offsets into the unit's text.
    pub start: u32,
    pub end: u32,
}

/// A module specifier found in a unit, with its span (excluding quotes).
#[derive(Debug, Clone)]
pub struct ModuleSpecifier {
    pub value: String,
    pub start: u32,
    pub end: u32,
}

/// Parsed representation of a single source file.
#[derive(Debug)]
pub struct SourceUnit {
    path: PathBuf,
    text: Arc<str>,
    version: u64,
    is_declaration: bool,
    syntactic: Vec<UnitDiagnostic>,
    semantic: Vec<UnitDiagnostic>,
    specifiers: Vec<ModuleSpecifier>,
    line_starts: Vec<u32>,
}

impl SourceUnit {
    /// Parse `text` as the content of `path`.
    ///
    /// Semantic analysis only runs when the parse succeeded; a file that
    /// does not parse reports its syntax errors alone.
    pub fn parse(path: &Path, text: Arc<str>, version: u64, settings: ParseSettings) -> SourceUnit {
        let path_str = path.to_string_lossy();
        let is_declaration = path_str.ends_with(".d.ts");
        let source_type = source_type_for(&path_str, settings);

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, &text, source_type).parse();

        let syntactic: Vec<UnitDiagnostic> =
            parsed.errors.iter().map(convert_diagnostic).collect();

        let mut collector = SpecifierCollector::default();
        for statement in &parsed.program.body {
            match statement {
                Statement::ImportDeclaration(decl) => {
                    collector.push(&decl.source.value, decl.source.span.start, decl.source.span.end);
                }
                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(source) = &decl.source {
                        collector.push(&source.value, source.span.start, source.span.end);
                    }
                }
                Statement::ExportAllDeclaration(decl) => {
                    collector.push(&decl.source.value, decl.source.span.start, decl.source.span.end);
                }
                _ => {}
            }
        }
        collector.visit_program(&parsed.program);

        let semantic = if syntactic.is_empty() {
            let semantic_ret = SemanticBuilder::new()
                .with_check_syntax_error(true)
                .build(&parsed.program);
            semantic_ret.errors.iter().map(convert_diagnostic).collect()
        } else {
            Vec::new()
        };

        let line_starts = compute_line_starts(&text);

        SourceUnit {
            path: path.to_path_buf(),
            text,
            version,
            is_declaration,
            syntactic,
            semantic,
            specifiers: collector.specifiers,
            line_starts,
        }
    }

    /// The path this unit was parsed as (virtual for exotic sources).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether this is an ambient declaration file (`.d.ts`).
    pub fn is_declaration(&self) -> bool {
        self.is_declaration
    }

    pub fn syntactic_diagnostics(&self) -> &[UnitDiagnostic] {
        &self.syntactic
    }

    pub fn semantic_diagnostics(&self) -> &[UnitDiagnostic] {
        &self.semantic
    }

    pub fn module_specifiers(&self) -> &[ModuleSpecifier] {
        &self.specifiers
    }

    /// Translate a byte offset into a 1-based line/column pair.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        (line_idx as u32 + 1, offset - line_start + 1)
    }
}

fn source_type_for(path_str: &str, settings: ParseSettings) -> SourceType {
    if path_str.ends_with(".tsx") || (settings.jsx && path_str.ends_with(".ts")) {
        SourceType::tsx()
    } else {
        SourceType::ts()
    }
}

fn convert_diagnostic(error: &OxcDiagnostic) -> UnitDiagnostic {
    let (start, end) = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| (label.offset() as u32, (label.offset() + label.len()) as u32))
        .unwrap_or((0, 0));

    UnitDiagnostic { message: error.message.to_string(), start, end }
}

fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (idx, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(idx as u32 + 1);
        }
    }
    starts
}

/// Collects `import()` expressions; static imports and re-exports are
/// read straight off the program body.
#[derive(Default)]
struct SpecifierCollector {
    specifiers: Vec<ModuleSpecifier>,
}

impl SpecifierCollector {
    fn push(&mut self, value: &str, span_start: u32, span_end: u32) {
        self.specifiers.push(ModuleSpecifier {
            value: value.to_string(),
            // Skip the surrounding quotes.
            start: span_start + 1,
            end: span_end.saturating_sub(1),
        });
    }
}

impl<'a> Visit<'a> for SpecifierCollector {
    fn visit_import_expression(&mut self, expr: &oxc_ast::ast::ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            self.push(&lit.value, lit.span.start, lit.span.end);
        }
        walk::walk_import_expression(self, expr);
    }
}
