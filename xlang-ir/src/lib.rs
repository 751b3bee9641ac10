//! xlang-ir: Normalized source IR and parser registry
//!
//! This crate holds the language-neutral vocabulary shared by every parser
//! and by the canonical mapper in `xlang-canon`:
//!
//! - **IR model** (`ir`): entities, fields, methods, test modules, cases, fixtures
//! - **Parser registry** (`ParserRegistry`): format tag → pure parse function
//! - **Reference parsers** (`parsers`): Tree-sitter based readers for Python
//!   models, pytest suites and Rust structs, plus an IR JSON reader
//!
//! # Design Philosophy
//!
//! Parsers are pure functions of `(source_text, origin)`. They either return
//! deterministic IR or fail with a located `ParseError`; unknown formats fail
//! closed instead of being guessed.
//!
//! # Example
//!
//! ```rust,ignore
//! use xlang_ir::{ParserRegistry, SourceFormat};
//!
//! let registry = ParserRegistry::new();
//! let units = registry.parse(SourceFormat::Python, source, "crm/models.py")?;
//! for unit in &units {
//!     println!("{}", unit.name());
//! }
//! ```

pub mod error;
pub mod ir;
pub mod parsers;
mod registry;

pub use error::{ParseError, Result};
pub use ir::{
    singularize, to_pascal_case, to_snake_case, Parameter, ParsedEntity, ParsedField,
    ParsedFixture, ParsedMethod, ParsedTest, ParsedTestCase, ParsedUnit, SourceFormat, TypeTag,
};
pub use registry::{ParseFn, ParserRegistry};

/// Version of the IR schema
pub const IR_VERSION: &str = "1.0.0";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
