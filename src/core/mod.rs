//! Core module for xlang-canon
//!
//! # Architecture
//!
//! - `error`: Error types using thiserror, with batch failure categories
//! - `patterns`: Pattern detection over entities and usage counting
//! - `canonical`: Canonical specifications and their persisted document
//! - `test_spec`: Test specifications (scenarios, assertions, fixtures)
//! - `mapper`: IR → canonical form, per-format statement strategies
//! - `equivalence`: Scenario alignment and equivalence verdicts
//! - `config`: `.xcanon.json` batch configuration
//! - `walker`: Source discovery with the SourceWalker trait
//! - `pipeline`: Parallel parse → catalog → map batches

pub mod canonical;
pub mod config;
pub mod equivalence;
pub mod error;
pub mod mapper;
pub mod patterns;
pub mod pipeline;
pub mod test_spec;
pub mod walker;

// Re-export commonly used types
pub use canonical::{
    CanonicalAction, CanonicalField, CanonicalSpecification, CanonicalStep, CanonicalType,
    SpecDocument, SCHEMA_VERSION,
};
pub use config::{Config, CONFIG_FILE_NAME};
pub use equivalence::{compare, compare_many, EquivalenceLevel, EquivalenceResult, MatchedPair};
pub use error::{CanonError, ErrorCategory, Result, ResultExt};
pub use mapper::{CanonicalMapper, EntityCatalog};
pub use patterns::{detect, PatternTag, PatternUsage, UsageEvent};
pub use pipeline::{BatchError, BatchPipeline, BatchResult, BatchSummary, CancellationToken};
pub use test_spec::{
    AssertionKind, ScenarioCategory, TestAssertion, TestFixture, TestScenario, TestSpecification,
    TestStep, TestType,
};
pub use walker::{DefaultWalker, SourceFile, SourceWalk, SourceWalker, WalkFailure};
