//! Assertion extraction strategies
//!
//! Each strategy recognizes the assertion idioms of one test framework and
//! turns a test-body statement into canonical [`TestAssertion`]s. Statements
//! a strategy does not recognize are left to the scenario builder as setup,
//! action or teardown steps.

use super::python::split_clause;
use super::strategy::{matching_close, scan_code, split_top_level, strip_outer_parens};
use crate::core::test_spec::{AssertionKind, TestAssertion};
use serde_json::{json, Value};
use xlang_ir::SourceFormat;

/// Result of recognizing one assertion statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub assertions: Vec<TestAssertion>,
    /// Statements executed as part of the assertion (the body of `pytest.raises`)
    pub actions: Vec<String>,
}

impl Extraction {
    fn single(assertion: TestAssertion) -> Self {
        Self {
            assertions: vec![assertion],
            actions: Vec::new(),
        }
    }
}

pub trait AssertionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the statement is not an assertion
    fn extract(&self, statement: &str) -> Option<Extraction>;
}

/// pytest `assert` statements, `pytest.raises` and unittest `self.assertX`
pub struct PythonAssertions;

/// `assert!`, `assert_eq!`, `assert_ne!`
pub struct RustAssertions;

/// Jest/Vitest `expect(..).toX(..)`
pub struct JestAssertions;

/// Tries every strategy in turn, for IR whose framework is unknown
pub struct AnyAssertions;

static PYTHON: PythonAssertions = PythonAssertions;
static RUST: RustAssertions = RustAssertions;
static JEST: JestAssertions = JestAssertions;
static ANY: AnyAssertions = AnyAssertions;

/// Assertion strategy for a test module's format and framework tag
pub fn assertion_strategy_for(format: SourceFormat, framework: &str) -> &'static dyn AssertionStrategy {
    match (format, framework.to_lowercase().as_str()) {
        (SourceFormat::Python | SourceFormat::Pytest, _) => &PYTHON,
        (SourceFormat::Rust, _) => &RUST,
        (SourceFormat::TypeScript, _) => &JEST,
        (_, "pytest" | "unittest") => &PYTHON,
        (_, "rust" | "cargo") => &RUST,
        (_, "jest" | "vitest" | "mocha") => &JEST,
        _ => &ANY,
    }
}

// ============================================================================
// Literals
// ============================================================================

/// JSON value of a source literal, if `text` is one
pub fn literal_value(text: &str) -> Option<Value> {
    let t = text.trim();
    match t {
        "None" | "null" | "undefined" | "nil" => return Some(Value::Null),
        "True" | "true" => return Some(Value::Bool(true)),
        "False" | "false" => return Some(Value::Bool(false)),
        _ => {}
    }

    let digits = t.replace('_', "");
    if let Ok(i) = digits.parse::<i64>() {
        return Some(json!(i));
    }
    if digits.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        if let Some(n) = digits.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Some(Value::Number(n));
        }
    }

    // `"x".to_string()`, `String::from("x")`
    for suffix in [".to_string()", ".to_owned()", ".into()"] {
        if let Some(inner) = t.strip_suffix(suffix) {
            return string_literal(inner).map(Value::String);
        }
    }
    if let Some(inner) = t.strip_prefix("String::from(").and_then(|r| r.strip_suffix(')')) {
        return string_literal(inner).map(Value::String);
    }

    string_literal(t).map(Value::String)
}

fn string_literal(text: &str) -> Option<String> {
    let t = text.trim();
    let body = t.trim_start_matches(['r', 'b', 'f', 'u', 'R', 'B', 'F', 'U']);
    let quote = body.chars().next().filter(|c| matches!(c, '"' | '\'' | '`'))?;
    if body.len() >= 2 && body.ends_with(quote) {
        // the literal must be one string, not `"a" + "b"`
        let inner = &body[1..body.len() - 1];
        let closes_early = scan_code(body).iter().any(|c| c.offset > 0 && c.offset < body.len() - 1);
        if !closes_early {
            return Some(inner.to_string());
        }
    }
    None
}

/// Literal value, or the expression text itself
pub fn expected_value(text: &str) -> Value {
    literal_value(text).unwrap_or_else(|| Value::String(text.trim().to_string()))
}

// ============================================================================
// Expression analysis shared by all frameworks
// ============================================================================

const COMPARISONS: &[&str] = &[
    " is not ", " not in ", "===", "!==", "==", "!=", "<=", ">=", " is ", " in ", "<", ">",
];

fn first_comparison(expr: &str) -> Option<(usize, &'static str)> {
    scan_code(expr)
        .into_iter()
        .filter(|c| c.depth == 0)
        .find_map(|c| {
            COMPARISONS
                .iter()
                .find(|op| expr[c.offset..].starts_with(**op))
                .map(|op| (c.offset, *op))
        })
}

/// `len(x)`, `x.len()`, `x.length`, `x.count()`, `x.size()`
fn counted(expr: &str) -> Option<&str> {
    let expr = expr.trim();
    if let Some(inner) = expr.strip_prefix("len(").and_then(|r| r.strip_suffix(')')) {
        return Some(inner.trim());
    }
    [".len()", ".length", ".count()", ".size()"]
        .iter()
        .find_map(|suffix| expr.strip_suffix(suffix))
}

fn is_null(text: &str) -> bool {
    matches!(literal_value(text), Some(Value::Null))
}

/// Argument list of a call whose opening parenthesis is at `open`
fn call_args(text: &str, open: usize) -> Option<Vec<&str>> {
    let close = matching_close(text, open)?;
    Some(split_top_level(&text[open + 1..close], ','))
}

fn method_call<'a>(expr: &'a str, method: &str) -> Option<(&'a str, &'a str)> {
    let pattern = format!(".{}(", method);
    let pos = expr.rfind(&pattern)?;
    let open = pos + pattern.len() - 1;
    if matching_close(expr, open)? != expr.len() - 1 {
        return None;
    }
    Some((&expr[..pos], &expr[open + 1..expr.len() - 1]))
}

/// Assertion for an expression that is asserted to hold
pub fn truth_assertion(expr: &str) -> TestAssertion {
    let expr = strip_outer_parens(expr.trim());

    if let Some(inner) = expr.strip_prefix("not ") {
        return falsity_assertion(inner);
    }
    if let Some(inner) = expr.strip_prefix('!') {
        if !inner.starts_with('=') && first_comparison(inner).is_none() {
            return falsity_assertion(inner);
        }
    }

    if let Some((offset, op)) = first_comparison(expr) {
        let left = expr[..offset].trim();
        let right = expr[offset + op.len()..].trim();
        return comparison(left, op.trim(), right);
    }

    if let Some((receiver, _)) = method_call(expr, "is_none") {
        return TestAssertion::new(AssertionKind::NullCheck, receiver, json!(true));
    }
    if let Some((receiver, _)) = method_call(expr, "is_some") {
        return TestAssertion::new(AssertionKind::NullCheck, receiver, json!(false));
    }
    if let Some((receiver, _)) = method_call(expr, "is_empty") {
        return TestAssertion::new(AssertionKind::CountCheck, receiver, json!(0));
    }
    if let Some((receiver, _)) = method_call(expr, "is_err") {
        return TestAssertion::raises(receiver, "Err");
    }
    if let Some((receiver, item)) = method_call(expr, "contains") {
        return TestAssertion::new(
            AssertionKind::Membership,
            receiver,
            expected_value(item.trim_start_matches('&')),
        );
    }
    for func in ["re.match(", "re.search(", "re.fullmatch("] {
        if let Some(args) = expr
            .strip_prefix(func)
            .and_then(|_| call_args(expr, func.len() - 1))
        {
            if let [pattern, subject, ..] = args.as_slice() {
                return TestAssertion::new(AssertionKind::PatternMatch, *subject, expected_value(pattern));
            }
        }
    }

    TestAssertion::equality(expr, json!(true))
}

fn falsity_assertion(expr: &str) -> TestAssertion {
    let expr = strip_outer_parens(expr.trim());
    match first_comparison(expr) {
        // `not a == b` is `a != b`
        Some((offset, "==")) => comparison(expr[..offset].trim(), "!=", expr[offset + 2..].trim()),
        Some((offset, " in ")) => comparison(expr[..offset].trim(), "not in", expr[offset + 4..].trim()),
        _ => TestAssertion::equality(expr, json!(false)),
    }
}

/// Assertion for `left <op> right`
pub fn comparison(left: &str, op: &str, right: &str) -> TestAssertion {
    match op {
        "==" | "===" | "is" => {
            if is_null(right) {
                return TestAssertion::new(AssertionKind::NullCheck, left, json!(true));
            }
            if let Some(collection) = counted(left) {
                return TestAssertion::new(AssertionKind::CountCheck, collection, expected_value(right));
            }
            // `assert 2 == len(x)`, `assertEqual("qualified", lead.status)`
            if literal_value(left).is_some() && literal_value(right).is_none() {
                return comparison(right, op, left);
            }
            TestAssertion::equality(left, expected_value(right))
        }
        "!=" | "!==" | "is not" => {
            if is_null(right) {
                return TestAssertion::new(AssertionKind::NullCheck, left, json!(false));
            }
            if literal_value(left).is_some() && literal_value(right).is_none() {
                return comparison(right, op, left);
            }
            TestAssertion::new(AssertionKind::Inequality, left, expected_value(right))
        }
        "in" => TestAssertion::new(AssertionKind::Membership, right, expected_value(left)),
        "not in" => TestAssertion::new(
            AssertionKind::Membership,
            right,
            json!({ "not": expected_value(left) }),
        ),
        _ => TestAssertion::new(
            AssertionKind::Ordering,
            left,
            Value::String(format!("{} {}", op, right)),
        ),
    }
}

fn unquoted(text: &str) -> String {
    match literal_value(text) {
        Some(Value::String(s)) => s,
        _ => text.trim().to_string(),
    }
}

// ============================================================================
// Python
// ============================================================================

impl PythonAssertions {
    /// `with pytest.raises(E):` / `with self.assertRaises(E):`
    fn raises_block(&self, text: &str) -> Option<Extraction> {
        let clause = split_clause(text, "with".len())?;
        let header = clause.header.split(" as ").next().unwrap_or(&clause.header).trim();
        let open = ["pytest.raises(", "self.assertRaises(", "self.assertRaisesRegex("]
            .iter()
            .find(|p| header.starts_with(**p))
            .map(|p| p.len() - 1)?;
        let args = call_args(header, open)?;
        let error = args.first().map(|e| e.trim().to_string())?;

        let target = clause.body.last().cloned().unwrap_or_default();
        Some(Extraction {
            assertions: vec![TestAssertion::raises(target, error)],
            actions: clause.body,
        })
    }

    /// `self.assertEqual(a, b)` and friends
    fn unittest_call(&self, text: &str) -> Option<TestAssertion> {
        let rest = text.strip_prefix("self.")?;
        let open = rest.find('(')?;
        let name = &rest[..open];
        if !name.starts_with("assert") {
            return None;
        }
        let args = call_args(rest, open)?;
        let arg = |i: usize| args.get(i).copied().unwrap_or("");

        let binary = |op: &str| comparison(arg(0), op, arg(1));
        let (assertion, message_at) = match name {
            "assertEqual" | "assertEquals" | "assertAlmostEqual" | "assertCountEqual"
            | "assertListEqual" | "assertDictEqual" => (binary("=="), 2),
            "assertNotEqual" | "assertNotEquals" => (binary("!="), 2),
            "assertIs" => (binary("is"), 2),
            "assertIsNot" => (binary("is not"), 2),
            "assertTrue" => (truth_assertion(arg(0)), 1),
            "assertFalse" => (falsity_assertion(arg(0)), 1),
            "assertIsNone" => (comparison(arg(0), "is", "None"), 1),
            "assertIsNotNone" => (comparison(arg(0), "is not", "None"), 1),
            "assertIn" => (binary("in"), 2),
            "assertNotIn" => (binary("not in"), 2),
            "assertGreater" => (binary(">"), 2),
            "assertGreaterEqual" => (binary(">="), 2),
            "assertLess" => (binary("<"), 2),
            "assertLessEqual" => (binary("<="), 2),
            "assertRegex" => (
                TestAssertion::new(AssertionKind::PatternMatch, arg(0), expected_value(arg(1))),
                2,
            ),
            "assertRaises" if args.len() >= 2 => {
                let call = format!("{}({})", arg(1), args[2..].join(", "));
                (TestAssertion::raises(call, arg(0)), usize::MAX)
            }
            _ => return None,
        };

        Some(match args.get(message_at) {
            Some(message) => assertion.with_message(unquoted(message.trim_start_matches("msg="))),
            None => assertion,
        })
    }
}

impl AssertionStrategy for PythonAssertions {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extract(&self, statement: &str) -> Option<Extraction> {
        let text = statement.trim();

        if let Some(body) = text.strip_prefix("assert ") {
            let parts = split_top_level(body, ',');
            let expr = parts.first().copied().unwrap_or(body);
            let mut assertion = truth_assertion(expr);
            if let Some(message) = parts.get(1) {
                assertion = assertion.with_message(unquoted(message));
            }
            return Some(Extraction::single(assertion));
        }

        if text.starts_with("with ") {
            return self.raises_block(text);
        }

        // `pytest.raises(ValueError, lead.qualify_lead)`
        if let Some(args) = text
            .strip_prefix("pytest.raises(")
            .and_then(|_| call_args(text, "pytest.raises".len()))
        {
            if let [error, func, rest @ ..] = args.as_slice() {
                let call = format!("{}({})", func, rest.join(", "));
                return Some(Extraction::single(TestAssertion::raises(call, *error)));
            }
        }

        self.unittest_call(text).map(Extraction::single)
    }
}

// ============================================================================
// Rust
// ============================================================================

impl AssertionStrategy for RustAssertions {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn extract(&self, statement: &str) -> Option<Extraction> {
        let text = statement.trim().trim_end_matches(';').trim_end();
        let text = text.strip_prefix("debug_").unwrap_or(text);

        let (name, open) = ["assert_eq!(", "assert_ne!(", "assert_matches!(", "assert!("]
            .iter()
            .find(|m| text.starts_with(**m))
            .map(|m| (&m[..m.len() - 1], m.len() - 1))?;
        let args = call_args(text, open)?;
        let arg = |i: usize| args.get(i).copied().unwrap_or("");

        let (assertion, message_at) = match name {
            "assert_eq!" => (comparison(arg(0), "==", arg(1)), 2),
            "assert_ne!" => (comparison(arg(0), "!=", arg(1)), 2),
            "assert_matches!" => (
                TestAssertion::new(AssertionKind::PatternMatch, arg(0), Value::String(arg(1).to_string())),
                2,
            ),
            _ => (truth_assertion(arg(0)), 1),
        };

        let assertion = match args.get(message_at) {
            Some(message) => assertion.with_message(unquoted(message)),
            None => assertion,
        };
        Some(Extraction::single(assertion))
    }
}

// ============================================================================
// Jest
// ============================================================================

impl AssertionStrategy for JestAssertions {
    fn name(&self) -> &'static str {
        "jest"
    }

    fn extract(&self, statement: &str) -> Option<Extraction> {
        let text = statement.trim().trim_end_matches(';').trim_end();
        let text = text.strip_prefix("await ").unwrap_or(text).trim();
        if !text.starts_with("expect(") {
            return None;
        }

        let open = "expect".len();
        let close = matching_close(text, open)?;
        let subject = text[open + 1..close].trim();
        let subject = subject
            .strip_prefix("() =>")
            .or_else(|| subject.strip_prefix("async () =>"))
            .map(str::trim)
            .unwrap_or(subject);

        // `.not.resolves.toBe(x)`: modifiers, then one matcher call
        let mut negated = false;
        let mut rejects = false;
        let mut chain = &text[close + 1..];
        let (matcher, argument) = loop {
            chain = chain.strip_prefix('.')?;
            let end = chain
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(chain.len());
            let word = &chain[..end];
            chain = &chain[end..];
            if chain.starts_with('(') {
                let args = call_args(chain, 0)?;
                break (word, args.first().map(|a| a.to_string()));
            }
            match word {
                "not" => negated = !negated,
                "rejects" => rejects = true,
                _ => {}
            }
        };
        let arg = argument.as_deref().unwrap_or("");

        // a call that must not throw is an action, not an assertion
        let throws = matches!(matcher, "toThrow" | "toThrowError") || rejects;
        if throws && negated {
            return Some(Extraction {
                assertions: Vec::new(),
                actions: vec![subject.to_string()],
            });
        }

        let assertion = match matcher {
            "toBe" | "toEqual" | "toStrictEqual" => {
                comparison(subject, if negated { "!=" } else { "==" }, arg)
            }
            "toBeNull" | "toBeUndefined" => {
                TestAssertion::new(AssertionKind::NullCheck, subject, json!(!negated))
            }
            "toBeDefined" => TestAssertion::new(AssertionKind::NullCheck, subject, json!(negated)),
            "toBeTruthy" => TestAssertion::equality(subject, json!(!negated)),
            "toBeFalsy" => TestAssertion::equality(subject, json!(negated)),
            "toContain" | "toContainEqual" | "toHaveProperty" => {
                comparison(arg, if negated { "not in" } else { "in" }, subject)
            }
            "toHaveLength" => {
                TestAssertion::new(AssertionKind::CountCheck, subject, negate_if(negated, expected_value(arg)))
            }
            "toBeGreaterThan" => comparison(subject, if negated { "<=" } else { ">" }, arg),
            "toBeGreaterThanOrEqual" => comparison(subject, if negated { "<" } else { ">=" }, arg),
            "toBeLessThan" => comparison(subject, if negated { ">=" } else { "<" }, arg),
            "toBeLessThanOrEqual" => comparison(subject, if negated { ">" } else { "<=" }, arg),
            "toMatch" => {
                TestAssertion::new(AssertionKind::PatternMatch, subject, negate_if(negated, expected_value(arg)))
            }
            "toThrow" | "toThrowError" => TestAssertion::raises(subject, error_or(arg, "Error")),
            other if rejects => TestAssertion::raises(subject, other),
            other => {
                let kind = if negated { AssertionKind::Inequality } else { AssertionKind::Equality };
                TestAssertion::new(kind, subject, Value::String(format!("{}({})", other, arg)))
            }
        };
        Some(Extraction::single(assertion))
    }
}

/// `{"not": value}` for a negated expectation, as `not in` membership is recorded
fn negate_if(negated: bool, value: Value) -> Value {
    if negated {
        json!({ "not": value })
    } else {
        value
    }
}

/// Error identifier from a matcher argument; empty or missing falls back to `default`
fn error_or(arg: &str, default: &str) -> String {
    let error = unquoted(arg);
    if error.trim().is_empty() {
        default.to_string()
    } else {
        error
    }
}

impl AssertionStrategy for AnyAssertions {
    fn name(&self) -> &'static str {
        "any"
    }

    fn extract(&self, statement: &str) -> Option<Extraction> {
        PYTHON
            .extract(statement)
            .or_else(|| RUST.extract(statement))
            .or_else(|| JEST.extract(statement))
    }
}
