//! Guard inversion and self-scope stripping
//!
//! A guard clause says "reject when NOT x"; the canonical `validate` step says
//! "require x". Inversion flips a single top-level comparison where one
//! exists and otherwise wraps the whole condition in a negation, so the
//! original expression text survives intact.

use super::strategy::{is_wrapped_in_parens, scan_code};

/// Prefixes naming the receiver of a method
pub const SELF_PREFIXES: &[&str] = &["self.", "this.", "cls."];

/// Comparison operators and their inverse, longest first
const INVERSIONS: &[(&str, &str)] = &[
    (" is not ", " is "),
    (" not in ", " in "),
    ("!==", "==="),
    ("===", "!=="),
    ("!=", "=="),
    ("==", "!="),
    ("<>", "="),
    (" is ", " is not "),
    (" in ", " not in "),
    ("=", "!="),
];

/// Operators that are never inverted structurally; `:=` binds, it does not compare
const ORDERING: &[&str] = &[":=", "<=", ">=", "=>", "->", "<", ">"];

const CONNECTIVES: &[&str] = &["&&", "||", " and ", " or "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Invertible(usize),
    Other,
}

/// Top-level operators of `text`, as `(offset, operator)`
fn top_level_operators(text: &str) -> Vec<(usize, Operator)> {
    let mut found = Vec::new();
    let mut skip_until = 0usize;

    for c in scan_code(text) {
        if c.depth != 0 || c.offset < skip_until {
            continue;
        }
        let rest = &text[c.offset..];

        if let Some(len) = CONNECTIVES
            .iter()
            .find(|op| rest.starts_with(**op))
            .map(|op| op.len())
        {
            found.push((c.offset, Operator::Other));
            skip_until = c.offset + len;
            continue;
        }

        // ordering operators first, so `<=` is never read as `=`
        let ordering = ORDERING.iter().find(|op| rest.starts_with(**op));
        let invertible = INVERSIONS.iter().position(|(op, _)| rest.starts_with(op));

        match (invertible, ordering) {
            (Some(index), Some(op)) if INVERSIONS[index].0.len() > op.len() => {
                found.push((c.offset, Operator::Invertible(index)));
                skip_until = c.offset + INVERSIONS[index].0.len();
            }
            (_, Some(op)) => {
                found.push((c.offset, Operator::Other));
                skip_until = c.offset + op.len();
            }
            (Some(index), None) => {
                found.push((c.offset, Operator::Invertible(index)));
                skip_until = c.offset + INVERSIONS[index].0.len();
            }
            (None, None) => {}
        }
    }

    found
}

/// Strip a leading negation (`!x`, `not x`, `!(..)`) when it applies to the whole condition
fn strip_negation(text: &str) -> Option<&str> {
    let rest = if let Some(rest) = text.strip_prefix('!') {
        if rest.starts_with('=') {
            return None;
        }
        rest.trim_start()
    } else if let Some(rest) = text.strip_prefix("not ") {
        // `not` binds looser than comparisons, tighter than `and`/`or`
        let rest = rest.trim_start();
        let connective = top_level_operators(rest)
            .iter()
            .any(|(offset, _)| CONNECTIVES.iter().any(|op| rest[*offset..].starts_with(op)));
        return (!connective).then_some(rest);
    } else {
        return None;
    };

    if is_wrapped_in_parens(rest) {
        return Some(rest[1..rest.len() - 1].trim());
    }
    // `!x` binds tighter than any binary operator: only strip it from a lone operand
    top_level_operators(rest).is_empty().then_some(rest)
}

/// Pattern-binding condition: Rust `if let Some(x) = ..`, Python `m := f()`
pub fn is_binding(condition: &str) -> bool {
    let condition = condition.trim();
    condition.starts_with("let ")
        || top_level_operators(condition)
            .iter()
            .any(|(offset, _)| condition[*offset..].starts_with(":="))
}

/// Logically invert a guard condition
///
/// `!=`/`==` (and `!==`/`===`, `is`/`is not`, `in`/`not in`) swap; SQL `=`
/// becomes `!=` and `<>` becomes `=`. A leading negation is removed. Any other
/// condition, including a pattern binding, is wrapped as `!(condition)`.
pub fn invert_guard(condition: &str) -> String {
    let condition = condition.trim();

    if is_binding(condition) {
        return negate(condition);
    }

    if let Some(inner) = strip_negation(condition) {
        return inner.to_string();
    }

    let operators = top_level_operators(condition);
    if let [(offset, Operator::Invertible(index))] = operators.as_slice() {
        let (op, inverse) = INVERSIONS[*index];
        return format!(
            "{}{}{}",
            &condition[..*offset],
            inverse,
            &condition[offset + op.len()..]
        );
    }

    negate(condition)
}

fn negate(condition: &str) -> String {
    if is_wrapped_in_parens(condition) {
        format!("!{}", condition)
    } else {
        format!("!({})", condition)
    }
}

/// Remove receiver prefixes (`self.`, `this.`, `cls.`) outside string literals
pub fn strip_self_scope(text: &str) -> String {
    let code: Vec<usize> = scan_code(text).into_iter().map(|c| c.offset).collect();
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;

    for offset in code {
        if offset < last {
            continue;
        }
        let boundary = text[..offset]
            .chars()
            .last()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '.'));
        if !boundary {
            continue;
        }
        if let Some(prefix) = SELF_PREFIXES.iter().find(|p| text[offset..].starts_with(**p)) {
            out.push_str(&text[last..offset]);
            last = offset + prefix.len();
        }
    }
    out.push_str(&text[last..]);
    out
}
