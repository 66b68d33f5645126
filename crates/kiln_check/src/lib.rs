//! # kiln_check
//!
//! Incremental TypeScript static checking for kiln projects.
//!
//! The crate drives an analysis pass over a versioned in-memory source
//! cache instead of the filesystem: a [`CheckerTool`] owns a
//! [`VirtualSourceStore`](kiln_source::VirtualSourceStore), redirects
//! the engine's file reads through a [`CompilerHost`], and in watch mode
//! coalesces bursts of file events into single debounced rechecks.
//!
//! ```text
//! +------------------------------------------------------------+
//! |                        kiln_check                           |
//! +------------------------------------------------------------+
//! |                                                             |
//! |  watch events --> VirtualSourceStore <-- StoreHost          |
//! |       |                 (kiln_source)        ^              |
//! |       v                                      |              |
//! |  Debounce --> CheckerTool::type_check --> Program::create   |
//! |                       |                                     |
//! |                       v                                     |
//! |              Diagnostic rendering (real paths)              |
//! |                                                             |
//! +------------------------------------------------------------+
//! ```

pub mod checker;
pub mod config;
pub mod diagnostic;
pub mod host;
pub mod program;
pub mod resolve;

pub use checker::{CheckError, CheckSummary, CheckerOptions, CheckerTool};
pub use config::{load_project_config, CompilerOptions, ConfigError, ProjectConfig};
pub use diagnostic::{render_diagnostics, Diagnostic, Severity};
pub use host::{AmbientCache, CompilerHost, StoreHost};
pub use program::{Program, ResolutionError};
pub use resolve::{Resolution, Resolver};
