//! Brace-delimited statement strategy (Rust, TypeScript, Java)

use super::strategy::{
    find_top_level, looks_like_call, matching_close, scan_code, split_top_level,
    strip_outer_parens, StatementShape, StatementStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// Conditions are bare: `if a == b { .. }`
    Rust,
    /// Conditions are parenthesized: `if (a == b) { .. }`
    CLike,
}

pub struct BraceStrategy {
    flavor: Flavor,
}

const RAISING_MACROS: &[&str] = &["panic!", "bail!", "unreachable!", "unimplemented!", "todo!"];
const BLOCK_KEYWORDS: &[&str] = &["if", "for", "while", "loop", "match", "unsafe", "try", "switch", "do"];

impl BraceStrategy {
    pub const fn rust() -> Self {
        Self { flavor: Flavor::Rust }
    }

    pub const fn c_like() -> Self {
        Self { flavor: Flavor::CLike }
    }

    /// Split `text` (just after a keyword) into a header and the body that follows it
    ///
    /// Returns `(header, body statements, rest after the body)`.
    fn header_and_body(&self, text: &str) -> Option<(String, Vec<String>, String)> {
        let text = text.trim_start();

        let (header, after) = match self.flavor {
            Flavor::CLike if text.starts_with('(') => {
                let close = matching_close(text, 0)?;
                (text[1..close].trim().to_string(), text[close + 1..].trim_start())
            }
            _ => {
                let open = find_top_level(text, "{", 0)?;
                (text[..open].trim().to_string(), &text[open..])
            }
        };

        if after.starts_with('{') {
            let close = matching_close(after, 0)?;
            let body = self.split_block(&after[1..close]);
            return Some((header, body, after[close + 1..].trim_start().to_string()));
        }

        // braceless single statement: `if (x) return false;`
        let (statement, rest) = match find_top_level(after, ";", 0) {
            Some(semi) => (&after[..semi], &after[semi + 1..]),
            None => (after, ""),
        };
        Some((header, vec![statement.trim().to_string()], rest.trim_start().to_string()))
    }

    fn conditional(&self, text: &str) -> StatementShape {
        let Some((condition, then, rest)) = self.header_and_body(&text["if".len()..]) else {
            return unknown(text);
        };

        let otherwise = rest.strip_prefix("else").map(|branch| {
            let branch = branch.trim_start();
            if starts_with_keyword(branch, "if") {
                vec![branch.to_string()]
            } else if branch.starts_with('{') {
                match matching_close(branch, 0) {
                    Some(close) => self.split_block(&branch[1..close]),
                    None => vec![branch.to_string()],
                }
            } else {
                split_top_level(branch, ';').into_iter().map(String::from).collect()
            }
        });

        StatementShape::Conditional {
            condition: strip_outer_parens(&condition).to_string(),
            then,
            otherwise,
        }
    }

    fn looping(&self, text: &str, keyword: &str) -> StatementShape {
        match self.header_and_body(&text[keyword.len()..]) {
            Some((header, body, _)) => StatementShape::Loop {
                over: if keyword == "loop" { "true".to_string() } else { header },
                body,
            },
            None => unknown(text),
        }
    }

    fn assignment(&self, text: &str) -> Option<StatementShape> {
        let declaration = ["let mut ", "let ", "const ", "var ", "final "]
            .iter()
            .find_map(|kw| text.strip_prefix(kw));

        let body = declaration.unwrap_or(text);
        let eq = scan_code(body)
            .into_iter()
            .filter(|c| c.depth == 0 && c.ch == '=')
            .map(|c| c.offset)
            .find(|&offset| {
                let next = body[offset + 1..].chars().next();
                let prev = body[..offset].chars().last();
                next != Some('=')
                    && next != Some('>')
                    && !matches!(prev, Some('=') | Some('!') | Some('<') | Some('>'))
            })?;

        let lhs = body[..eq].trim();
        let value = body[eq + 1..].trim().to_string();

        // compound assignment: `self.count += 1`
        let (lhs, op) = match lhs.char_indices().last() {
            Some((i, c)) if "+-*/%&|^".contains(c) && declaration.is_none() => (lhs[..i].trim(), Some(c)),
            _ => (lhs, None),
        };

        let target = match declaration {
            // `let x: u32 = ..`, `const total: number = ..`
            Some(_) => lhs.split(':').next().unwrap_or(lhs).trim(),
            // `int total = ..` in Java
            None if lhs.contains(' ') && !lhs.contains('.') => lhs.rsplit(' ').next().unwrap_or(lhs),
            None => lhs,
        };

        if target.is_empty()
            || !target
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '*'))
        {
            return None;
        }

        let value = match op {
            Some(op) => format!("{} {} {}", target, op, value),
            None => value,
        };
        Some(StatementShape::Assignment {
            target: target.to_string(),
            value,
        })
    }
}

fn unknown(text: &str) -> StatementShape {
    StatementShape::Unknown {
        text: text.to_string(),
    }
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '(' || c == '{')
    })
}

/// `foo()?`, `foo().await`, `foo();` all reduce to `foo()`
fn strip_call_suffixes(text: &str) -> &str {
    let mut text = text.trim().trim_end_matches(';').trim_end();
    loop {
        let before = text;
        text = text.trim_end_matches('?');
        text = text.strip_suffix(".await").unwrap_or(text);
        text = text.strip_suffix(".unwrap()").unwrap_or(text);
        if text == before {
            return text;
        }
    }
}

impl StatementStrategy for BraceStrategy {
    fn name(&self) -> &'static str {
        match self.flavor {
            Flavor::Rust => "rust",
            Flavor::CLike => "c-like",
        }
    }

    fn decompose(&self, fragment: &str) -> StatementShape {
        let text = fragment.trim().trim_end_matches(';').trim_end();

        if starts_with_keyword(text, "if") {
            return self.conditional(text);
        }
        for keyword in ["for", "while", "loop"] {
            if starts_with_keyword(text, keyword) {
                return self.looping(text, keyword);
            }
        }
        if text == "return" {
            return StatementShape::Return { value: None };
        }
        if let Some(value) = text.strip_prefix("return ") {
            return StatementShape::Return {
                value: Some(value.trim().to_string()),
            };
        }
        if let Some(error) = text.strip_prefix("throw ") {
            let error = error.trim();
            return StatementShape::Raise {
                error: error.strip_prefix("new ").unwrap_or(error).trim().to_string(),
            };
        }
        if RAISING_MACROS.iter().any(|m| text.starts_with(m)) {
            return StatementShape::Raise {
                error: text.to_string(),
            };
        }

        if let Some(shape) = self.assignment(text) {
            return shape;
        }

        let call = strip_call_suffixes(text);
        let call = call.strip_prefix("await ").unwrap_or(call).trim();
        if looks_like_call(call) {
            return StatementShape::Call {
                call: call.to_string(),
            };
        }

        unknown(text)
    }

    fn split_block(&self, block: &str) -> Vec<String> {
        let block = block
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut statements = Vec::new();
        let mut start = 0usize;

        for c in scan_code(&block) {
            if c.depth != 0 || c.offset < start {
                continue;
            }
            let end = match c.ch {
                ';' => c.offset,
                '}' => {
                    let current = block[start..c.offset].trim_start();
                    let is_block = current.starts_with('{')
                        || BLOCK_KEYWORDS.iter().any(|kw| starts_with_keyword(current, kw));
                    let continues = block[c.offset + 1..].trim_start().starts_with("else");
                    if !is_block || continues {
                        continue;
                    }
                    c.offset + 1
                }
                _ => continue,
            };
            statements.push(block[start..end].trim().to_string());
            start = if c.ch == ';' { end + 1 } else { end };
        }

        let tail = block[start.min(block.len())..].trim();
        if !tail.is_empty() {
            statements.push(tail.to_string());
        }
        statements.retain(|s| !s.is_empty());
        statements
    }

    fn self_field<'a>(&self, target: &'a str) -> Option<&'a str> {
        let field = target
            .strip_prefix("self.")
            .or_else(|| target.strip_prefix("this."))?;
        field
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
            .then_some(field)
    }
}
