//! Parser Registry
//!
//! The registry maps a source-format tag to a pure parse function. Adding a
//! format means registering one more function; nothing else changes.

use crate::error::{ParseError, Result};
use crate::ir::{ParsedUnit, SourceFormat};
use crate::parsers;
use std::collections::BTreeMap;
use std::path::Path;

/// A parser: pure function of the source text and an origin label
///
/// The origin is used only for diagnostics and metadata.
pub type ParseFn = fn(source: &str, origin: &str) -> Result<Vec<ParsedUnit>>;

/// Registry of parse functions keyed by format
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: BTreeMap<SourceFormat, ParseFn>,
}

impl ParserRegistry {
    /// Create a registry with the built-in reference parsers
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(SourceFormat::Python, parsers::python_model::parse);
        registry.register(SourceFormat::Pytest, parsers::pytest_suite::parse);
        registry.register(SourceFormat::Rust, parsers::rust_model::parse);
        registry.register(SourceFormat::Ir, parsers::ir_json::parse);

        registry
    }

    /// Alias of [`ParserRegistry::new`]
    pub fn with_builtin_parsers() -> Self {
        Self::new()
    }

    /// Create a registry with no parsers
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Register (or replace) the parser for a format
    pub fn register(&mut self, format: SourceFormat, parser: ParseFn) {
        self.parsers.insert(format, parser);
    }

    pub fn get(&self, format: SourceFormat) -> Option<ParseFn> {
        self.parsers.get(&format).copied()
    }

    pub fn supports(&self, format: SourceFormat) -> bool {
        self.parsers.contains_key(&format)
    }

    pub fn supported_formats(&self) -> Vec<SourceFormat> {
        self.parsers.keys().copied().collect()
    }

    /// Parse source text with the parser registered for `format`
    pub fn parse(&self, format: SourceFormat, source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
        let parser = self
            .get(format)
            .ok_or(ParseError::UnsupportedFormat(format))?;
        parser(source, origin)
    }

    /// Parse a file's text, detecting the format from its path
    pub fn parse_path(&self, path: &Path, source: &str) -> Result<Vec<ParsedUnit>> {
        let format = SourceFormat::detect(path);
        self.parse(format, source, &path.to_string_lossy())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("formats", &self.supported_formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ParsedEntity;

    fn fixed_parser(_source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
        let mut entity = ParsedEntity::new("Widget", SourceFormat::Java);
        entity.metadata.insert("file_path".to_string(), origin.to_string());
        Ok(vec![ParsedUnit::Entity(entity)])
    }

    #[test]
    fn test_builtin_formats() {
        let registry = ParserRegistry::new();
        assert!(registry.supports(SourceFormat::Python));
        assert!(registry.supports(SourceFormat::Pytest));
        assert!(registry.supports(SourceFormat::Rust));
        assert!(registry.supports(SourceFormat::Ir));
        assert!(!registry.supports(SourceFormat::Java));
    }

    #[test]
    fn test_unknown_format_fails_closed() {
        let registry = ParserRegistry::new();
        let err = registry
            .parse(SourceFormat::Unknown, "whatever", "notes.txt")
            .unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat(SourceFormat::Unknown));

        let err = registry
            .parse_path(Path::new("Widget.java"), "class Widget {}")
            .unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat(SourceFormat::Java));
    }

    #[test]
    fn test_register_new_format() {
        let mut registry = ParserRegistry::empty();
        assert!(registry.supported_formats().is_empty());

        registry.register(SourceFormat::Java, fixed_parser);
        let units = registry
            .parse_path(Path::new("src/Widget.java"), "class Widget {}")
            .unwrap();
        assert_eq!(units.len(), 1);
        let entity = units[0].as_entity().unwrap();
        assert_eq!(entity.file_path(), Some("src/Widget.java"));
    }

    #[test]
    fn test_debug_lists_formats() {
        let registry = ParserRegistry::new();
        let debug = format!("{:?}", registry);
        assert!(debug.contains("Python"));
        assert!(debug.contains("Rust"));
    }
}
