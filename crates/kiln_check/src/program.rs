//! Program construction.
//!
//! A program is the closure of the entry files over their module
//! specifiers, fetched exclusively through the compiler host. This is
//! the analysis-engine surface the checker drives: build once per pass,
//! then read per-file diagnostics off the collected units.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_source::SourceUnit;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::host::CompilerHost;
use crate::resolve::{Resolution, Resolver};

/// A relative or aliased import that resolved to nothing.
#[derive(Debug, Clone)]
pub struct ResolutionError {
    /// Engine-facing path of the importing file.
    pub importer: PathBuf,
    pub specifier: String,
    /// 1-based position of the specifier in the importer.
    pub line: u32,
    pub column: u32,
}

/// The file closure of one check pass.
#[derive(Debug, Default)]
pub struct Program {
    units: Vec<Arc<SourceUnit>>,
    missing_roots: Vec<PathBuf>,
    resolution_errors: Vec<ResolutionError>,
}

impl Program {
    /// Build the program for `roots`, walking imports breadth-first.
    ///
    /// Roots that cannot be fetched are recorded, not fatal; unresolvable
    /// imports inside ambient declaration files are the ambient world's
    /// business and stay silent.
    pub fn create(roots: &[PathBuf], resolver: &Resolver, host: &dyn CompilerHost) -> Program {
        let mut program = Program::default();
        let mut visited: FxHashSet<PathBuf> = FxHashSet::default();
        let mut queue: VecDeque<(PathBuf, bool)> = VecDeque::new();

        for root in roots {
            if visited.insert(root.clone()) {
                queue.push_back((root.clone(), true));
            }
        }

        while let Some((path, is_root)) = queue.pop_front() {
            let Some(unit) = host.get_source_file(&path) else {
                if is_root {
                    program.missing_roots.push(path);
                } else {
                    // Resolution saw the file but the fetch lost a race
                    // with a concurrent delete; the next pass settles it.
                    debug!("resolved file vanished before fetch: {}", path.display());
                }
                continue;
            };

            for specifier in unit.module_specifiers() {
                match resolver.resolve(&specifier.value, unit.path(), host) {
                    Resolution::File(resolved) => {
                        if visited.insert(resolved.clone()) {
                            queue.push_back((resolved, false));
                        }
                    }
                    Resolution::External => {}
                    Resolution::NotFound => {
                        if !unit.is_declaration() {
                            let (line, column) = unit.line_col(specifier.start);
                            program.resolution_errors.push(ResolutionError {
                                importer: unit.path().to_path_buf(),
                                specifier: specifier.value.clone(),
                                line,
                                column,
                            });
                        }
                    }
                }
            }

            program.units.push(unit);
        }

        program
    }

    /// Every unit in the program, declarations included.
    pub fn source_files(&self) -> &[Arc<SourceUnit>] {
        &self.units
    }

    /// The number of checkable (non-declaration) units.
    pub fn checked_file_count(&self) -> usize {
        self.units.iter().filter(|unit| !unit.is_declaration()).count()
    }

    pub fn missing_roots(&self) -> &[PathBuf] {
        &self.missing_roots
    }

    pub fn resolution_errors(&self) -> &[ResolutionError] {
        &self.resolution_errors
    }

    /// Look up a unit by engine path.
    pub fn unit(&self, path: &Path) -> Option<&Arc<SourceUnit>> {
        self.units.iter().find(|unit| unit.path() == path)
    }
}
