//! Indentation-based statement strategy (Python)

use super::strategy::{
    dedent, find_top_level, looks_like_call, scan_code, split_top_level, StatementShape,
    StatementStrategy,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ASSIGNMENT: Regex = Regex::new(
        r"(?s)^(?P<target>[A-Za-z_][\w.]*(?:\[[^\]]*\])?)(?:\s*:\s*[^=]+?)?\s*(?P<op>\*\*|//|<<|>>|[-+*/%&|^@])?=(?P<value>[^=].*)$"
    )
    .unwrap();
}

pub struct PythonStrategy;

/// One `keyword header: body` clause and whatever text follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    pub header: String,
    pub body: Vec<String>,
    pub rest: String,
}

/// Split `text`, which starts with a compound-statement keyword of length
/// `keyword_len`, into header, body statements and the trailing text
pub(crate) fn split_clause(text: &str, keyword_len: usize) -> Option<Clause> {
    // the `:` of a walrus `:=` does not end the header
    let mut from = keyword_len;
    let colon = loop {
        let colon = find_top_level(text, ":", from)?;
        if !text[colon + 1..].starts_with('=') {
            break colon;
        }
        from = colon + 1;
    };
    let header = text[keyword_len..colon].trim().to_string();
    let after = &text[colon + 1..];

    let (first, remainder) = after.split_once('\n').unwrap_or((after, ""));
    let inline = first.trim();
    if !inline.is_empty() && !inline.starts_with('#') {
        return Some(Clause {
            header,
            body: split_top_level(inline, ';').into_iter().map(String::from).collect(),
            rest: remainder.to_string(),
        });
    }

    let mut body_lines = Vec::new();
    let mut rest_lines = Vec::new();
    for line in remainder.lines() {
        let indented = line.trim().is_empty() || line.starts_with(char::is_whitespace);
        if rest_lines.is_empty() && indented {
            body_lines.push(line);
        } else {
            rest_lines.push(line);
        }
    }

    Some(Clause {
        header,
        body: split_statements(&dedent(&body_lines.join("\n"))),
        rest: rest_lines.join("\n"),
    })
}

/// Split a dedented block into top-level statements
fn split_statements(block: &str) -> Vec<String> {
    let mut statements: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut open = 0usize;

    for line in block.lines() {
        let trimmed = line.trim();
        let continues = open > 0
            || current.last().is_some_and(|l| l.trim_end().ends_with('\\'))
            || line.starts_with(char::is_whitespace)
            || trimmed.is_empty()
            || starts_with_keyword(trimmed, &["elif", "else", "except", "finally"]);

        if !continues && !current.is_empty() {
            statements.push(current.join("\n"));
            current.clear();
        }
        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }
        current.push(line);
        open = bracket_balance(&current.join("\n"));
    }
    if !current.is_empty() {
        statements.push(current.join("\n"));
    }

    statements
        .into_iter()
        .map(|s| s.trim_end().to_string())
        .filter(|s| !s.is_empty() && s != "pass")
        .collect()
}

fn bracket_balance(text: &str) -> usize {
    let mut depth = 0usize;
    for c in scan_code(text) {
        match c.ch {
            '(' | '[' | '{' => depth = c.depth + 1,
            ')' | ']' | '}' => depth = c.depth,
            _ => {}
        }
    }
    depth
}

fn starts_with_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        text.strip_prefix(kw)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', ':', '(', '\t']))
    })
}

impl PythonStrategy {
    fn conditional(&self, text: &str) -> StatementShape {
        let Some(clause) = split_clause(text, "if".len()) else {
            return unknown(text);
        };

        let rest = clause.rest.trim_start_matches('\n');
        let otherwise = if let Some(elif) = rest.strip_prefix("elif") {
            Some(vec![format!("if{}", elif)])
        } else if starts_with_keyword(rest, &["else"]) {
            split_clause(rest, "else".len()).map(|c| c.body)
        } else {
            None
        };

        StatementShape::Conditional {
            condition: clause.header,
            then: clause.body,
            otherwise,
        }
    }

    fn looping(&self, text: &str, keyword_len: usize) -> StatementShape {
        match split_clause(text, keyword_len) {
            Some(clause) => StatementShape::Loop {
                over: clause.header,
                body: clause.body,
            },
            None => unknown(text),
        }
    }
}

fn unknown(text: &str) -> StatementShape {
    StatementShape::Unknown {
        text: text.to_string(),
    }
}

impl StatementStrategy for PythonStrategy {
    fn name(&self) -> &'static str {
        "python"
    }

    fn decompose(&self, fragment: &str) -> StatementShape {
        let text = fragment.trim();

        if starts_with_keyword(text, &["if"]) {
            return self.conditional(text);
        }
        if starts_with_keyword(text, &["for", "while"]) {
            let keyword = if text.starts_with("for") { "for" } else { "while" };
            return self.looping(text, keyword.len());
        }
        if let Some(rest) = text.strip_prefix("async for ") {
            return self.looping(&format!("for {}", rest), "for".len());
        }
        if text == "return" {
            return StatementShape::Return { value: None };
        }
        if let Some(value) = text.strip_prefix("return ") {
            return StatementShape::Return {
                value: Some(value.trim().to_string()),
            };
        }
        if text == "raise" {
            return StatementShape::Raise {
                error: text.to_string(),
            };
        }
        if let Some(error) = text.strip_prefix("raise ") {
            let error = match find_top_level(error, " from ", 0) {
                Some(pos) => &error[..pos],
                None => error,
            };
            return StatementShape::Raise {
                error: error.trim().to_string(),
            };
        }

        if let Some(caps) = ASSIGNMENT.captures(text) {
            let target = caps["target"].to_string();
            let value = caps["value"].trim().to_string();
            let value = match caps.name("op") {
                Some(op) => format!("{} {} {}", target, op.as_str(), value),
                None => value,
            };
            return StatementShape::Assignment { target, value };
        }

        let call = text.strip_prefix("await ").unwrap_or(text).trim();
        if looks_like_call(call) {
            return StatementShape::Call {
                call: call.to_string(),
            };
        }

        unknown(text)
    }

    fn split_block(&self, block: &str) -> Vec<String> {
        split_statements(&dedent(block))
    }

    fn self_field<'a>(&self, target: &'a str) -> Option<&'a str> {
        let field = target.strip_prefix("self.")?;
        field
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
            .then_some(field)
    }
}
