//! Error types for xlang-ir
//!
//! Parsers fail closed: invalid source text is reported with its origin and
//! location rather than being skipped, and unknown formats are rejected
//! instead of guessed.

use crate::ir::SourceFormat;
use thiserror::Error;

/// Errors from parsing and IR validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Source text does not parse
    #[error("Syntax error in {origin} at {line}:{column}: {message}")]
    Syntax {
        origin: String,
        /// 1-indexed line (0 when unknown)
        line: usize,
        /// 0-indexed column
        column: usize,
        message: String,
    },

    /// No parser is registered for the format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(SourceFormat),

    /// Parsed IR violates an entity invariant
    #[error("Invalid entity '{entity}': {message}")]
    InvalidEntity { entity: String, message: String },

    /// Tree-sitter could not be set up for a grammar
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl ParseError {
    /// Create a syntax error at a known location
    pub fn syntax(
        origin: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        ParseError::Syntax {
            origin: origin.into(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn invalid_entity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError::InvalidEntity {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Location of a syntax error, if this is one
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Syntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}

/// Result type alias for ParseError
pub type Result<T> = std::result::Result<T, ParseError>;
