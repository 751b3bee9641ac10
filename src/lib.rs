//! xlang-canon - Cross-language normalization and behavioral equivalence
//!
//! This library normalizes data models and test suites written in different
//! languages into one canonical form, then judges whether a migrated test
//! suite still exercises the behavior of the original. It is consumed by:
//! - The CLI binary (src/bin/xcanon.rs)
//! - Migration tooling that embeds the pipeline directly
//!
//! # Architecture
//!
//! This crate follows the "Library-First" pattern:
//! - **lib.rs** (this file): Pure logic, no CLI concerns
//! - **bin/xcanon.rs**: Thin wrapper that calls the library
//!
//! Source parsing lives in the `xlang-ir` workspace crate; everything from
//! the IR onwards lives in [`core`].
//!
//! # Example
//!
//! ```rust,ignore
//! use xlang_canon::{compare, BatchPipeline, Config};
//!
//! let batch = BatchPipeline::new(Config::default()).run_paths(&["legacy/", "tests/"]);
//! for spec in &batch.entities {
//!     println!("{} {:?}", spec.entity(), spec.tags());
//! }
//!
//! let result = compare(&batch.tests[0], &migrated)?;
//! println!("{}", result.render_diff());
//! ```

pub mod core;

pub use crate::core::{
    compare, compare_many, detect, BatchError, BatchPipeline, BatchResult, BatchSummary,
    CanonError, CanonicalMapper, CanonicalSpecification, CancellationToken, Config,
    EntityCatalog, EquivalenceLevel, EquivalenceResult, ErrorCategory, PatternTag, PatternUsage,
    Result, TestSpecification,
};
pub use xlang_ir::{ParsedUnit, ParserRegistry, SourceFormat};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the version of the xlang-canon library
pub fn version() -> &'static str {
    VERSION
}
