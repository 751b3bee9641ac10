//! Reference parsers for xlang-ir
//!
//! Each parser turns Tree-sitter parse trees into the language-neutral IR.
//! They are deliberately best-effort: anything they cannot normalize is kept
//! (as an `Unresolved` type or an opaque statement fragment) rather than
//! dropped.
//!
//! - **python_model**: SQLAlchemy / Django / dataclass style model classes
//! - **pytest_suite**: pytest modules (test functions, test classes, fixtures)
//! - **rust_model**: `struct` declarations with their `impl` methods
//! - **ir_json**: IR serialized as JSON by parsers outside this crate

pub mod ir_json;
pub mod pytest_suite;
pub mod python_model;
pub mod rust_model;

use crate::error::{ParseError, Result};

/// Parse `source` with a Tree-sitter grammar, failing on any syntax error
pub(crate) fn parse_tree(
    language: &tree_sitter::Language,
    source: &str,
    origin: &str,
) -> Result<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(language)
        .map_err(|e| ParseError::TreeSitter(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::syntax(origin, 0, 0, "parser produced no tree"))?;

    if tree.root_node().has_error() {
        return Err(first_syntax_error(&tree, origin));
    }

    Ok(tree)
}

/// Locate the first error or missing node in document order
fn first_syntax_error(tree: &tree_sitter::Tree, origin: &str) -> ParseError {
    fn visit(cursor: &mut tree_sitter::TreeCursor) -> Option<(usize, usize, String)> {
        loop {
            let node = cursor.node();

            if node.is_missing() {
                let pos = node.start_position();
                return Some((pos.row + 1, pos.column, format!("missing '{}'", node.kind())));
            }
            if node.is_error() {
                let pos = node.start_position();
                return Some((pos.row + 1, pos.column, "unexpected syntax".to_string()));
            }

            if node.has_error() && cursor.goto_first_child() {
                if let Some(found) = visit(cursor) {
                    return Some(found);
                }
                cursor.goto_parent();
            }

            if !cursor.goto_next_sibling() {
                return None;
            }
        }
    }

    let mut cursor = tree.walk();
    match visit(&mut cursor) {
        Some((line, column, message)) => ParseError::syntax(origin, line, column, message),
        None => ParseError::syntax(origin, 0, 0, "unexpected syntax"),
    }
}

/// Get the text content of a Tree-sitter node
pub(crate) fn node_text<'a>(node: &tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Find a child node by its kind
#[allow(clippy::manual_find)]
pub(crate) fn find_child_by_kind<'a>(
    node: &tree_sitter::Node<'a>,
    kind: &str,
) -> Option<tree_sitter::Node<'a>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return Some(child);
        }
    }
    None
}

/// Statement text with the node's own indentation removed from every line
///
/// The first line starts at the node, so only continuation lines carry the
/// enclosing indentation.
pub(crate) fn statement_fragment(node: &tree_sitter::Node, source: &str) -> String {
    let indent = node.start_position().column;
    let text = node_text(node, source);

    let mut lines = text.lines();
    let mut out = String::with_capacity(text.len());
    if let Some(first) = lines.next() {
        out.push_str(first.trim_end());
    }
    for line in lines {
        out.push('\n');
        let strip = line
            .char_indices()
            .take_while(|(i, c)| *i < indent && c.is_whitespace())
            .count();
        out.push_str(line[strip..].trim_end());
    }
    out
}

/// Dotted module path derived from an origin label
///
/// `src/app/models/contact.py` becomes `app.models.contact`.
pub(crate) fn module_path(origin: &str) -> String {
    let normalized = origin.replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./");
    let trimmed = trimmed.strip_prefix("src/").unwrap_or(trimmed);
    let without_ext = match trimmed.rfind('.') {
        Some(dot) if !trimmed[dot..].contains('/') => &trimmed[..dot],
        _ => trimmed,
    };
    without_ext
        .split('/')
        .filter(|part| !part.is_empty() && *part != "__init__" && *part != "mod")
        .collect::<Vec<_>>()
        .join(".")
}

/// Strip matching quotes from a string literal
pub(crate) fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.len() >= 2 * quote.len() && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[quote.len()..trimmed.len() - quote.len()].to_string();
        }
    }
    trimmed.to_string()
}

/// Clean a docstring / doc comment: strip quotes and common indentation
pub(crate) fn clean_doc(text: &str) -> String {
    let text = unquote(text);
    let lines: Vec<&str> = text.lines().collect();

    let min_indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.trim().to_string()
            } else if l.len() >= min_indent {
                l[min_indent..].trim_end().to_string()
            } else {
                l.trim().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
