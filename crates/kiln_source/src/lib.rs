//! # kiln_source
//!
//! The versioned source layer of the kiln checker: tracked source
//! records, the exotic-document transformer, and the virtual source
//! store that the compiler host reads from during incremental checks.
//!
//! The store is the single mutable resource shared between watch-event
//! producers and the check-pass consumer. Ingestion (glob resolution,
//! preloading, change events) is async and does the disk I/O; lookups
//! are synchronous and side-effect-free so the analysis engine can call
//! back into the store mid-construction.

pub mod exotic;
pub mod path;
pub mod record;
pub mod store;
pub mod unit;

pub use exotic::{BlockLocation, ExtractedScript, TransformError};
pub use record::{RecordKind, SourceRecord};
pub use store::{StoreError, UpdateOutcome, VirtualSourceStore};
pub use unit::{ModuleSpecifier, ParseSettings, SourceUnit, UnitDiagnostic};
