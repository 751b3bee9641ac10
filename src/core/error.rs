//! Error types for xlang-canon
//!
//! This module provides structured error handling using thiserror. Every
//! error maps to an [`ErrorCategory`] so batch summaries can count failures
//! without inspecting messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xlang_ir::ParseError;

/// Result type alias for canon operations
pub type Result<T> = std::result::Result<T, CanonError>;

/// Errors that can occur while mapping, validating or comparing
#[derive(Error, Debug)]
pub enum CanonError {
    /// Source text does not parse
    #[error("Syntax error in {origin} at {line}:{column}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// No parser registered for the source format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// IR references an entity or type that cannot be resolved in the batch
    #[error("Mapping error in entity '{entity}': {message}")]
    Mapping { entity: String, message: String },

    /// A canonical specification violates an invariant
    #[error("Schema error in '{entity}': {message}")]
    Schema { entity: String, message: String },

    /// Malformed test specification passed to the equivalence checker
    #[error("Invalid comparison input: {message}")]
    ComparisonInput { message: String },

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CanonError>,
    },
}

impl CanonError {
    /// Wrap an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CanonError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        CanonError::Mapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        CanonError::Schema {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn comparison_input(message: impl Into<String>) -> Self {
        CanonError::ComparisonInput {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        CanonError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Category used for batch-level failure counts
    pub fn category(&self) -> ErrorCategory {
        match self {
            CanonError::Syntax { .. } | CanonError::UnsupportedFormat { .. } => {
                ErrorCategory::Syntax
            }
            CanonError::Json(_) => ErrorCategory::Syntax,
            CanonError::Mapping { .. } => ErrorCategory::Mapping,
            CanonError::Schema { .. } => ErrorCategory::Schema,
            CanonError::ComparisonInput { .. } => ErrorCategory::ComparisonInput,
            CanonError::Io(_) => ErrorCategory::Io,
            CanonError::InvalidConfig { .. } => ErrorCategory::Config,
            CanonError::WithContext { source, .. } => source.category(),
        }
    }

    /// Entity the error is about, when known
    pub fn entity(&self) -> Option<&str> {
        match self {
            CanonError::Mapping { entity, .. } | CanonError::Schema { entity, .. } => {
                Some(entity)
            }
            CanonError::WithContext { source, .. } => source.entity(),
            _ => None,
        }
    }
}

impl From<ParseError> for CanonError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Syntax {
                origin,
                line,
                column,
                message,
            } => CanonError::Syntax {
                origin,
                line,
                column,
                message,
            },
            ParseError::UnsupportedFormat(format) => CanonError::UnsupportedFormat {
                format: format.to_string(),
            },
            ParseError::InvalidEntity { entity, message } => CanonError::Schema { entity, message },
            ParseError::TreeSitter(message) => CanonError::Syntax {
                origin: "<parser>".to_string(),
                line: 0,
                column: 0,
                message,
            },
        }
    }
}

/// Coarse failure category reported in batch summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Syntax,
    Mapping,
    Schema,
    ComparisonInput,
    Io,
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Mapping => "mapping",
            ErrorCategory::Schema => "schema",
            ErrorCategory::ComparisonInput => "comparison-input",
            ErrorCategory::Io => "io",
            ErrorCategory::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlang_ir::SourceFormat;

    #[test]
    fn test_error_display() {
        let err = CanonError::mapping("Lead", "unresolved type 'unknown_type' for field 'owner'");
        let text = err.to_string();
        assert!(text.contains("Lead"));
        assert!(text.contains("unknown_type"));
    }

    #[test]
    fn test_error_with_context_keeps_category() {
        let err = CanonError::schema("Contact", "duplicate field 'email'");
        let wrapped = err.with_context("mapping crm/models.py");
        assert!(wrapped.to_string().contains("mapping crm/models.py"));
        assert_eq!(wrapped.category(), ErrorCategory::Schema);
        assert_eq!(wrapped.entity(), Some("Contact"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: CanonError = ParseError::syntax("a.py", 3, 1, "unexpected syntax").into();
        assert!(matches!(err, CanonError::Syntax { line: 3, .. }));
        assert_eq!(err.category(), ErrorCategory::Syntax);

        let err: CanonError = ParseError::UnsupportedFormat(SourceFormat::Java).into();
        assert!(err.to_string().contains("java"));

        let err: CanonError = ParseError::invalid_entity("Deal", "field name is empty").into();
        assert_eq!(err.category(), ErrorCategory::Schema);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CanonError = io_err.into();
        assert!(matches!(err, CanonError::Io(_)));
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: CanonError = json_err.into();
        assert!(matches!(err, CanonError::Json(_)));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(CanonError::invalid_config("workers must be a number"));
        let err = result.context("loading .xcanon.json").unwrap_err();
        assert!(err.to_string().contains("loading .xcanon.json"));
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::ComparisonInput).unwrap();
        assert_eq!(json, "\"comparison-input\"");
        assert_eq!(ErrorCategory::Mapping.to_string(), "mapping");
    }
}
