//! Statement decomposition strategies
//!
//! A statement strategy turns one opaque body fragment into a
//! [`StatementShape`]. The mapper classifies shapes into canonical steps;
//! strategies only know the surface syntax of their source format.

use super::brace::BraceStrategy;
use super::python::PythonStrategy;
use xlang_ir::SourceFormat;

/// Syntactic shape of one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementShape {
    Assignment {
        target: String,
        value: String,
    },
    /// `otherwise` is `None` when there is no else-branch at all
    Conditional {
        condition: String,
        then: Vec<String>,
        otherwise: Option<Vec<String>>,
    },
    Loop {
        over: String,
        body: Vec<String>,
    },
    Call {
        call: String,
    },
    Return {
        value: Option<String>,
    },
    Raise {
        error: String,
    },
    Unknown {
        text: String,
    },
}

/// Per-format statement decomposition
pub trait StatementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decompose a single statement fragment
    fn decompose(&self, fragment: &str) -> StatementShape;

    /// Split a block body into top-level statement fragments
    fn split_block(&self, block: &str) -> Vec<String>;

    /// Field name of a self-scoped assignment target (`self.status` → `status`)
    fn self_field<'a>(&self, target: &'a str) -> Option<&'a str>;
}

/// Fallback for formats without statement support: every fragment is opaque
pub struct OpaqueStrategy;

impl StatementStrategy for OpaqueStrategy {
    fn name(&self) -> &'static str {
        "opaque"
    }

    fn decompose(&self, fragment: &str) -> StatementShape {
        StatementShape::Unknown {
            text: fragment.trim().to_string(),
        }
    }

    fn split_block(&self, block: &str) -> Vec<String> {
        let block = block.trim();
        if block.is_empty() {
            Vec::new()
        } else {
            vec![block.to_string()]
        }
    }

    fn self_field<'a>(&self, _target: &'a str) -> Option<&'a str> {
        None
    }
}

static PYTHON: PythonStrategy = PythonStrategy;
static RUST: BraceStrategy = BraceStrategy::rust();
static C_LIKE: BraceStrategy = BraceStrategy::c_like();
static OPAQUE: OpaqueStrategy = OpaqueStrategy;

/// Statement strategy for a source format
pub fn strategy_for(format: SourceFormat) -> &'static dyn StatementStrategy {
    match format {
        SourceFormat::Python | SourceFormat::Pytest => &PYTHON,
        SourceFormat::Rust => &RUST,
        SourceFormat::TypeScript | SourceFormat::Java => &C_LIKE,
        SourceFormat::Sql | SourceFormat::Ir | SourceFormat::Unknown => &OPAQUE,
    }
}

// ============================================================================
// Lexical scanning shared by the strategies
// ============================================================================

/// A character outside string literals, with the bracket depth it sits at
///
/// Opening and closing brackets report the depth outside of themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodeChar {
    pub offset: usize,
    pub ch: char,
    pub depth: usize,
}

/// Characters of `text` that are code (not inside a string literal)
pub(crate) fn scan_code(text: &str) -> Vec<CodeChar> {
    let mut out = Vec::with_capacity(text.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: Option<char> = None;

    for (offset, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            prev = Some(ch);
            continue;
        }

        match ch {
            '"' | '`' => quote = Some(ch),
            // `&'a` and `<'a` are lifetimes, not character literals
            '\'' if !matches!(prev, Some('&') | Some('<')) => quote = Some(ch),
            '(' | '[' | '{' => {
                out.push(CodeChar { offset, ch, depth });
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                out.push(CodeChar { offset, ch, depth });
            }
            _ => out.push(CodeChar { offset, ch, depth }),
        }
        prev = Some(ch);
    }

    out
}

/// First top-level occurrence of `pattern` at or after byte `from`
pub(crate) fn find_top_level(text: &str, pattern: &str, from: usize) -> Option<usize> {
    scan_code(text)
        .into_iter()
        .filter(|c| c.depth == 0 && c.offset >= from)
        .map(|c| c.offset)
        .find(|&offset| text[offset..].starts_with(pattern))
}

/// Byte offset of the bracket closing the one opened at `open`
pub(crate) fn matching_close(text: &str, open: usize) -> Option<usize> {
    let chars = scan_code(text);
    let start = chars.iter().position(|c| c.offset == open)?;
    let depth = chars[start].depth;
    chars[start + 1..]
        .iter()
        .find(|c| c.depth == depth && matches!(c.ch, ')' | ']' | '}'))
        .map(|c| c.offset)
}

/// Split on a separator that occurs at bracket depth zero
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for c in scan_code(text) {
        if c.depth == 0 && c.ch == separator {
            parts.push(&text[start..c.offset]);
            start = c.offset + c.ch.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Whether the whole of `text` is one parenthesized group
pub(crate) fn is_wrapped_in_parens(text: &str) -> bool {
    text.starts_with('(') && matching_close(text, 0) == Some(text.len() - 1)
}

/// `text` without one layer of wrapping parentheses, if it has one
pub(crate) fn strip_outer_parens(text: &str) -> &str {
    let trimmed = text.trim();
    if is_wrapped_in_parens(trimmed) {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Remove the common leading indentation from every line
///
/// Indentation is counted in whitespace characters, so multibyte
/// whitespace (U+00A0, U+3000) is stripped whole.
pub(crate) fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|l| {
            let cut = l
                .char_indices()
                .take_while(|(_, c)| c.is_whitespace())
                .take(indent)
                .last()
                .map_or(0, |(i, c)| i + c.len_utf8());
            &l[cut..]
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Identifier path at the start of `text` (`foo.bar::baz`), if any
pub(crate) fn leading_path(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '!')))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

/// Whether `text` is a call expression: an identifier path followed by arguments,
/// ending in a closing parenthesis
pub(crate) fn looks_like_call(text: &str) -> bool {
    let text = text.trim();
    let path = leading_path(text);
    !path.is_empty()
        && path.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && text[path.len()..].trim_start().starts_with('(')
        && text.ends_with(')')
}
