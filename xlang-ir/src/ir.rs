//! Core IR (Intermediate Representation) Types
//!
//! This module defines the language-neutral structural model every parser
//! must produce and every mapper consumes. All types are designed for:
//!
//! 1. **Determinism**: ordered `Vec`s for source order, `BTreeMap` for metadata
//! 2. **Serialization**: full serde support so external parsers can emit IR as JSON
//! 3. **Deferred interpretation**: statement fragments stay opaque text here

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{ParseError, Result};

// ============================================================================
// Source Format Identification
// ============================================================================

/// Format tag for a source artifact
///
/// A format is finer-grained than a language: Python data models and pytest
/// modules share a language but are parsed into different IR units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Python,
    Pytest,
    Rust,
    TypeScript,
    Java,
    Sql,
    /// IR already serialized as JSON by an external parser
    Ir,
    Unknown,
}

impl SourceFormat {
    /// Parse an explicit format tag (as given on a command line or in IR JSON)
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "python" | "py" => Self::Python,
            "pytest" => Self::Pytest,
            "rust" | "rs" => Self::Rust,
            "typescript" | "ts" | "javascript" | "js" => Self::TypeScript,
            "java" => Self::Java,
            "sql" | "plpgsql" => Self::Sql,
            "ir" | "ir-json" => Self::Ir,
            _ => Self::Unknown,
        }
    }

    /// Detect the format of a file from its name
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if ext == "json" && stem.ends_with(".ir") {
            return Self::Ir;
        }

        match ext.as_str() {
            "py" | "pyi" if stem.starts_with("test_") || stem.ends_with("_test") => Self::Pytest,
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Self::TypeScript,
            "java" => Self::Java,
            "sql" => Self::Sql,
            _ => Self::Unknown,
        }
    }

    /// Canonical tag string
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Pytest => "pytest",
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::Sql => "sql",
            Self::Ir => "ir",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this format describes test sources rather than models
    pub fn is_test_format(&self) -> bool {
        matches!(self, Self::Pytest)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Type Tags
// ============================================================================

/// Normalized field type
///
/// `Unresolved` holds a type the parser could not normalize on its own
/// (typically a class name that may name another entity). The mapper resolves
/// it against the entities known in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Identifier,
    Json,
    Reference,
    Enumerated,
    Collection,
    Unresolved(String),
}

impl TypeTag {
    /// All resolved tags, in declaration order
    pub const RESOLVED: [TypeTag; 11] = [
        TypeTag::Text,
        TypeTag::Integer,
        TypeTag::Decimal,
        TypeTag::Boolean,
        TypeTag::Date,
        TypeTag::Timestamp,
        TypeTag::Identifier,
        TypeTag::Json,
        TypeTag::Reference,
        TypeTag::Enumerated,
        TypeTag::Collection,
    ];

    /// Parse a tag name; anything outside the closed set becomes `Unresolved`
    pub fn from_name(name: &str) -> Self {
        match name {
            "text" => Self::Text,
            "integer" => Self::Integer,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "identifier" => Self::Identifier,
            "json" => Self::Json,
            "reference" => Self::Reference,
            "enumerated" => Self::Enumerated,
            "collection" => Self::Collection,
            other => Self::Unresolved(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Identifier => "identifier",
            Self::Json => "json",
            Self::Reference => "reference",
            Self::Enumerated => "enumerated",
            Self::Collection => "collection",
            Self::Unresolved(raw) => raw,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved(_))
    }

    /// Date-like tags (used by the soft-removal pattern)
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

impl From<String> for TypeTag {
    fn from(value: String) -> Self {
        TypeTag::from_name(&value)
    }
}

impl From<TypeTag> for String {
    fn from(value: TypeTag) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A field declared on a parsed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,

    /// Normalized type tag
    #[serde(rename = "field_type")]
    pub type_tag: TypeTag,

    /// Type as written in the source, before normalization
    #[serde(default)]
    pub original_type: String,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Target entity name (reference fields only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Allowed values (enumerated fields only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<String>,
}

fn default_required() -> bool {
    true
}

impl ParsedField {
    /// Create a required field with no extras
    pub fn new(name: impl Into<String>, type_tag: TypeTag) -> Self {
        let original_type = type_tag.as_str().to_string();
        Self {
            name: name.into(),
            type_tag,
            original_type,
            required: true,
            default: None,
            reference: None,
            enum_values: Vec::new(),
            validations: Vec::new(),
        }
    }

    /// Create a reference field pointing at `target`
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        let mut field = Self::new(name, TypeTag::Reference);
        field.original_type = target.clone();
        field.reference = Some(target);
        field
    }

    /// Create an enumerated field with the given values
    pub fn enumerated<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(name, TypeTag::Enumerated);
        field.enum_values = values.into_iter().map(Into::into).collect();
        field
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_original_type(mut self, original: impl Into<String>) -> Self {
        self.original_type = original.into();
        self
    }
}

/// A method/function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_annotation: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_annotation,
        }
    }
}

/// A method declared on a parsed entity
///
/// Body statements are kept as opaque, dedented source fragments; their
/// interpretation belongs to the canonical mapper.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedMethod {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    #[serde(default)]
    pub is_async: bool,

    /// Class-level constructor-like method (`@classmethod`, `fn new() -> Self`)
    #[serde(default)]
    pub is_factory: bool,

    #[serde(default)]
    pub is_static: bool,
}

impl ParsedMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: append body statements
    pub fn with_body<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.extend(statements.into_iter().map(Into::into));
        self
    }

    /// Whether any decoration mentions `name` (e.g. `@property`)
    pub fn has_decoration(&self, name: &str) -> bool {
        self.decorations
            .iter()
            .any(|d| d.trim_start_matches('@').trim_start_matches("#[").starts_with(name))
    }
}

/// A structural source unit: class, struct, model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntity {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub fields: Vec<ParsedField>,

    #[serde(default)]
    pub methods: Vec<ParsedMethod>,

    /// Declared base classes, mixins, or implemented traits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supertypes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    pub source_format: SourceFormat,

    /// Free-form metadata (file_path, line); BTreeMap for determinism
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ParsedEntity {
    pub fn new(name: impl Into<String>, source_format: SourceFormat) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            supertypes: Vec::new(),
            decorations: Vec::new(),
            doc: None,
            source_format,
            metadata: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Origin file recorded by the parser, if any
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get("file_path").map(String::as_str)
    }

    /// Check the IR invariants for entities
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ParseError::invalid_entity("<unnamed>", "entity name is empty"));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ParseError::invalid_entity(&self.name, "field name is empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ParseError::invalid_entity(
                    &self.name,
                    format!("duplicate field '{}'", field.name),
                ));
            }
            if field.type_tag == TypeTag::Reference && field.reference.is_none() {
                return Err(ParseError::invalid_entity(
                    &self.name,
                    format!("reference field '{}' has no target", field.name),
                ));
            }
            if field.type_tag == TypeTag::Enumerated && field.enum_values.is_empty() {
                return Err(ParseError::invalid_entity(
                    &self.name,
                    format!("enumerated field '{}' has no values", field.name),
                ));
            }
        }

        if self.methods.iter().any(|m| m.name.trim().is_empty()) {
            return Err(ParseError::invalid_entity(&self.name, "method name is empty"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests Sources
// ============================================================================

/// A single test function/case
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedTestCase {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// Decorators / markers (`@pytest.mark.slow`, `#[should_panic]`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<String>,

    /// Fixture names requested by the case
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<String>,

    #[serde(default)]
    pub body: Vec<String>,

    #[serde(default)]
    pub line: usize,
}

impl ParsedTestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_body<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.extend(statements.into_iter().map(Into::into));
        self
    }
}

/// A reusable test fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFixture {
    pub name: String,

    /// Fixture scope (`function`, `module`, `session`)
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,
}

fn default_scope() -> String {
    "function".to_string()
}

/// A parsed test module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTest {
    pub name: String,

    /// Entity or subject under test
    #[serde(default)]
    pub subject: String,

    /// Framework tag (`pytest`, `unittest`, `jest`, `cargo-test`)
    #[serde(default)]
    pub framework: String,

    pub source_format: SourceFormat,

    #[serde(default)]
    pub cases: Vec<ParsedTestCase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<ParsedFixture>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ParsedTest {
    pub fn new(name: impl Into<String>, source_format: SourceFormat) -> Self {
        Self {
            name: name.into(),
            subject: String::new(),
            framework: String::new(),
            source_format,
            cases: Vec::new(),
            fixtures: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Parser Output
// ============================================================================

/// One unit produced by a parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedUnit {
    Entity(ParsedEntity),
    Test(ParsedTest),
}

impl ParsedUnit {
    pub fn name(&self) -> &str {
        match self {
            ParsedUnit::Entity(e) => &e.name,
            ParsedUnit::Test(t) => &t.name,
        }
    }

    pub fn as_entity(&self) -> Option<&ParsedEntity> {
        match self {
            ParsedUnit::Entity(e) => Some(e),
            ParsedUnit::Test(_) => None,
        }
    }

    pub fn as_test(&self) -> Option<&ParsedTest> {
        match self {
            ParsedUnit::Test(t) => Some(t),
            ParsedUnit::Entity(_) => None,
        }
    }
}

// ============================================================================
// Naming helpers shared by parsers and the pattern detector
// ============================================================================

/// Convert `camelCase` / `PascalCase` / `kebab-case` to `snake_case`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower_or_digit = false;
        } else if ch.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Convert `snake_case` to `PascalCase`
pub fn to_pascal_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Naive English singularization used to turn table names into entity names
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.ends_with("sses") || word.ends_with("xes") || word.ends_with("ches") {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::detect(Path::new("app/models.py")), SourceFormat::Python);
        assert_eq!(SourceFormat::detect(Path::new("tests/test_contact.py")), SourceFormat::Pytest);
        assert_eq!(SourceFormat::detect(Path::new("contact_test.py")), SourceFormat::Pytest);
        assert_eq!(SourceFormat::detect(Path::new("src/model.rs")), SourceFormat::Rust);
        assert_eq!(SourceFormat::detect(Path::new("fixtures/crm.ir.json")), SourceFormat::Ir);
        assert_eq!(SourceFormat::detect(Path::new("package.json")), SourceFormat::Unknown);
        assert_eq!(SourceFormat::detect(Path::new("README.md")), SourceFormat::Unknown);
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(SourceFormat::from_tag("PY"), SourceFormat::Python);
        assert_eq!(SourceFormat::from_tag("pytest"), SourceFormat::Pytest);
        assert_eq!(SourceFormat::from_tag("cobol"), SourceFormat::Unknown);
        assert_eq!(SourceFormat::Rust.to_string(), "rust");
    }

    #[test]
    fn test_type_tag_serde_unknown_becomes_unresolved() {
        let field: ParsedField =
            serde_json::from_str(r#"{"name": "owner", "field_type": "unknown_type"}"#).unwrap();
        assert_eq!(field.type_tag, TypeTag::Unresolved("unknown_type".to_string()));
        assert!(field.required);

        let json = serde_json::to_string(&ParsedField::new("age", TypeTag::Integer)).unwrap();
        assert!(json.contains(r#""field_type":"integer""#));
    }

    #[test]
    fn test_type_tag_names_round_trip() {
        for tag in TypeTag::RESOLVED.iter() {
            assert_eq!(&TypeTag::from_name(tag.as_str()), tag);
            assert!(tag.is_resolved());
        }
    }

    #[test]
    fn test_entity_validation() {
        let mut entity = ParsedEntity::new("Contact", SourceFormat::Python);
        entity.fields.push(ParsedField::new("email", TypeTag::Text));
        assert!(entity.validate().is_ok());

        entity.fields.push(ParsedField::new("email", TypeTag::Text));
        let err = entity.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate field 'email'"));
    }

    #[test]
    fn test_entity_validation_reference_and_enum() {
        let mut entity = ParsedEntity::new("Contact", SourceFormat::Python);
        entity.fields.push(ParsedField::new("company", TypeTag::Reference));
        assert!(entity.validate().is_err());

        let mut entity = ParsedEntity::new("Contact", SourceFormat::Python);
        entity.fields.push(ParsedField::new("status", TypeTag::Enumerated));
        assert!(entity.validate().is_err());

        let entity = ParsedEntity::new("  ", SourceFormat::Python);
        assert!(entity.validate().is_err());
    }

    #[test]
    fn test_parsed_unit_serde_tagging() {
        let unit = ParsedUnit::Entity(ParsedEntity::new("Contact", SourceFormat::Rust));
        let json = serde_json::to_string(&unit).unwrap();
        assert!(json.contains(r#""kind":"entity""#));
        let back: ParsedUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "Contact");
        assert!(back.as_entity().is_some());
    }

    #[test]
    fn test_naming_helpers() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("markAsPaid"), "mark_as_paid");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_pascal_case("contact_method"), "ContactMethod");
        assert_eq!(singularize("companies"), "company");
        assert_eq!(singularize("contacts"), "contact");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("status"), "status");
    }

    mod properties {
        use crate::ir::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn snake_case_is_idempotent(name in "[A-Za-z][A-Za-z0-9_]{0,24}") {
                let once = to_snake_case(&name);
                prop_assert_eq!(to_snake_case(&once), once);
            }

            #[test]
            fn unknown_type_names_stay_unresolved(name in "[A-Z][A-Za-z]{2,16}") {
                prop_assert_eq!(TypeTag::from_name(&name), TypeTag::Unresolved(name.clone()));
            }
        }
    }
}
