//! Test module → [`TestSpecification`]

use super::assertions::{assertion_strategy_for, AssertionStrategy};
use crate::core::error::Result;
use crate::core::test_spec::{
    AssertionKind, ScenarioCategory, TestAssertion, TestFixture, TestScenario, TestSpecification,
    TestStep, TestType,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use xlang_ir::{to_snake_case, ParsedTest, ParsedTestCase};

lazy_static! {
    /// Method invoked on some receiver: `lead.qualify_lead(`
    static ref METHOD_CALL: Regex = Regex::new(r"\.([A-Za-z_]\w*)\s*\(").unwrap();

    /// Function or method a statement starts by calling
    static ref CALLEE: Regex = Regex::new(r"^(?:await\s+)?[\w.]*?([A-Za-z_]\w*)\s*\(").unwrap();

    static ref PANIC_EXPECTED: Regex = Regex::new(r#"expected\s*=\s*"([^"]*)""#).unwrap();
}

const CLEANUP_CALLS: &[&str] = &["delete", "close", "cleanup", "teardown", "rollback"];

const SECURITY_WORDS: &[&str] = &[
    "auth", "unauthorized", "unauthenticated", "permission", "permissions", "forbidden",
    "security", "injection", "xss", "csrf", "token", "access",
];
const ERROR_WORDS: &[&str] = &[
    "error", "errors", "invalid", "fail", "fails", "raises", "raise", "reject", "rejected",
    "rejects", "exception", "missing", "denied", "wrong", "bad",
];
const PERFORMANCE_WORDS: &[&str] = &["performance", "perf", "slow", "timeout", "load", "latency", "benchmark"];
const BOUNDARY_WORDS: &[&str] = &[
    "boundary", "limit", "limits", "max", "min", "maximum", "minimum", "overflow", "zero",
];
const EDGE_WORDS: &[&str] = &["edge", "corner", "empty", "unicode", "null", "none", "duplicate"];

const CRUD_FAMILIES: &[(TestType, &[&str])] = &[
    (TestType::CrudCreate, &["create", "add", "insert", "register"]),
    (TestType::CrudRead, &["get", "read", "find", "list", "fetch", "search"]),
    (TestType::CrudUpdate, &["update", "edit", "modify", "change", "rename"]),
    (TestType::CrudDelete, &["delete", "remove", "destroy", "archive"]),
];

/// Map a parsed test module to its canonical test specification
pub fn map_test(parsed: &ParsedTest) -> Result<TestSpecification> {
    let strategy = assertion_strategy_for(parsed.source_format, &parsed.framework);

    let mut spec = TestSpecification::new(&parsed.name, &parsed.subject);
    spec.scenarios = parsed
        .cases
        .iter()
        .map(|case| build_scenario(case, strategy))
        .collect();
    spec.fixtures = parsed
        .fixtures
        .iter()
        .map(|f| TestFixture {
            name: f.name.clone(),
            scope: f.scope.clone(),
        })
        .collect();
    spec.covered_actions = spec
        .scenarios
        .iter()
        .flat_map(|s| s.action.iter())
        .flat_map(|step| METHOD_CALL.captures_iter(&step.statement))
        .map(|caps| caps[1].to_string())
        .filter(|name| !name.starts_with('_'))
        .collect();
    spec.test_type = infer_test_type(&spec);

    debug!(
        test = %spec.name,
        scenarios = spec.scenarios.len(),
        assertions = spec.assertion_count(),
        test_type = spec.test_type.as_str(),
        "mapped test module"
    );
    Ok(spec)
}

fn steps(statements: impl IntoIterator<Item = String>) -> Vec<TestStep> {
    statements.into_iter().map(TestStep::new).collect()
}

fn is_cleanup(statement: &str) -> bool {
    CALLEE
        .captures(statement.trim())
        .map(|caps| caps[1].to_lowercase())
        .is_some_and(|callee| CLEANUP_CALLS.iter().any(|c| callee.starts_with(c)))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_scenario(case: &ParsedTestCase, strategy: &dyn AssertionStrategy) -> TestScenario {
    let mut setup: Vec<String> = Vec::new();
    let mut action: Vec<String> = Vec::new();
    let mut assertions: Vec<TestAssertion> = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    // last asserted value per target, with the number of actions seen at that point
    let mut asserted: BTreeMap<String, (Value, usize)> = BTreeMap::new();

    for statement in &case.body {
        let Some(extraction) = strategy.extract(statement) else {
            pending.push(statement.clone());
            continue;
        };

        if assertions.is_empty() && extraction.actions.is_empty() {
            // leading statements: setup, except the last one which is the action
            if let Some(last) = pending.pop() {
                setup.append(&mut pending);
                action.push(last);
            }
        } else if assertions.is_empty() {
            setup.append(&mut pending);
        } else {
            action.append(&mut pending);
        }
        action.extend(extraction.actions);

        for assertion in extraction.assertions {
            let assertion = match (assertion.kind, asserted.get(&assertion.target)) {
                (AssertionKind::Equality, Some((before, at)))
                    if *at < action.len() && *before != assertion.expected =>
                {
                    let actual = render(before);
                    TestAssertion {
                        kind: AssertionKind::StateTransition,
                        ..assertion
                    }
                    .with_actual(actual)
                }
                _ => assertion,
            };
            if matches!(assertion.kind, AssertionKind::Equality | AssertionKind::StateTransition) {
                asserted.insert(assertion.target.clone(), (assertion.expected.clone(), action.len()));
            }
            assertions.push(assertion);
        }
    }

    // trailing statements: cleanup calls are teardown, the rest act
    let mut teardown = Vec::new();
    if assertions.is_empty() {
        if let Some(last) = pending.pop() {
            setup.append(&mut pending);
            action.push(last);
        }
    } else {
        for statement in pending {
            if is_cleanup(&statement) {
                teardown.push(statement);
            } else {
                action.push(statement);
            }
        }
    }

    if let Some(decoration) = case.decorations.iter().find(|d| d.contains("should_panic")) {
        if !assertions.iter().any(|a| a.kind == AssertionKind::Raises) {
            let error = PANIC_EXPECTED
                .captures(decoration)
                .map(|caps| caps[1].trim().to_string())
                .filter(|expected| !expected.is_empty())
                .unwrap_or_else(|| "panic".to_string());
            let target = action.last().cloned().unwrap_or_else(|| case.name.clone());
            assertions.push(TestAssertion::raises(target, error));
        }
    }

    let method = unqualified(&case.name);
    let category = categorize(method, &assertions);
    let description = case
        .doc
        .as_deref()
        .and_then(|doc| doc.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(String::from)
        .unwrap_or_else(|| humanize(method));

    TestScenario {
        name: case.name.clone(),
        description,
        category,
        setup: steps(setup),
        action: steps(action),
        teardown: steps(teardown),
        assertions,
        fixtures: case.fixtures.clone(),
        tags: tags(&case.decorations),
    }
}

/// `TestCreate::test_valid` → `test_valid`
fn unqualified(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Lowercase word tokens of an identifier (`testQualifyLead` → `test qualify lead`)
fn tokens(name: &str) -> Vec<String> {
    to_snake_case(name)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `test_qualify_lead_happy_path` → `qualify lead happy path`
pub fn humanize(name: &str) -> String {
    let words = tokens(name);
    let words = match words.first().map(String::as_str) {
        Some("test" | "it" | "should") if words.len() > 1 => &words[1..],
        _ => &words[..],
    };
    words.join(" ")
}

/// Category from name keywords; a `raises` assertion makes the scenario an error path
pub fn categorize(name: &str, assertions: &[TestAssertion]) -> ScenarioCategory {
    let words: BTreeSet<String> = tokens(name).into_iter().collect();
    let any = |list: &[&str]| list.iter().any(|w| words.contains(*w));

    if any(SECURITY_WORDS) {
        ScenarioCategory::Security
    } else if any(ERROR_WORDS) || assertions.iter().any(|a| a.kind == AssertionKind::Raises) {
        ScenarioCategory::ErrorPath
    } else if any(PERFORMANCE_WORDS) {
        ScenarioCategory::Performance
    } else if any(BOUNDARY_WORDS) {
        ScenarioCategory::Boundary
    } else if any(EDGE_WORDS) {
        ScenarioCategory::Edge
    } else {
        ScenarioCategory::PrimaryPath
    }
}

/// Marker names (`@pytest.mark.slow` → `slow`); plain test markers are dropped
fn tags(decorations: &[String]) -> Vec<String> {
    decorations
        .iter()
        .filter_map(|d| {
            let d = d.trim().trim_start_matches('@').trim_start_matches("#[").trim_end_matches(']');
            let head = d.split('(').next().unwrap_or(d).trim();
            let last = head.rsplit(['.', ':']).next().unwrap_or(head);
            (!last.is_empty() && last != "test").then(|| last.to_string())
        })
        .collect()
}

fn infer_test_type(spec: &TestSpecification) -> TestType {
    let has_transition = spec
        .scenarios
        .iter()
        .flat_map(|s| &s.assertions)
        .any(|a| a.kind == AssertionKind::StateTransition);

    let words: BTreeSet<String> = spec
        .scenarios
        .iter()
        .map(|s| s.name.as_str())
        .chain(spec.covered_actions.iter().map(String::as_str))
        .flat_map(tokens)
        .collect();
    let any = |list: &[&str]| list.iter().any(|w| words.contains(*w));

    if has_transition || any(&["transition", "state", "status", "lifecycle"]) {
        return TestType::StateMachine;
    }

    let error_paths = spec
        .scenarios
        .iter()
        .filter(|s| s.category == ScenarioCategory::ErrorPath)
        .count();
    if any(&["validate", "validation", "valid", "invalid"])
        || (!spec.scenarios.is_empty() && error_paths * 2 > spec.scenarios.len())
    {
        return TestType::Validation;
    }

    let families: Vec<TestType> = CRUD_FAMILIES
        .iter()
        .filter(|(_, verbs)| any(*verbs))
        .map(|(test_type, _)| *test_type)
        .collect();
    match families.as_slice() {
        [single] => *single,
        _ => TestType::Workflow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use xlang_ir::{ParsedFixture, SourceFormat};

    fn suite(cases: Vec<ParsedTestCase>) -> ParsedTest {
        let mut test = ParsedTest::new("test_contact", SourceFormat::Pytest);
        test.subject = "Contact".to_string();
        test.framework = "pytest".to_string();
        test.cases = cases;
        test
    }

    #[test]
    fn test_setup_action_assertions() {
        let case = ParsedTestCase::new("test_qualify_lead_happy_path").with_body([
            "lead = Contact(status=\"lead\")",
            "result = lead.qualify_lead()",
            "assert result is True",
            "assert lead.status == \"qualified\"",
        ]);
        let spec = map_test(&suite(vec![case])).unwrap();
        let scenario = &spec.scenarios[0];

        assert_eq!(scenario.setup, vec![TestStep::new("lead = Contact(status=\"lead\")")]);
        assert_eq!(scenario.action, vec![TestStep::new("result = lead.qualify_lead()")]);
        assert_eq!(scenario.assertions.len(), 2);
        assert_eq!(scenario.category, ScenarioCategory::PrimaryPath);
        assert_eq!(scenario.description, "qualify lead happy path");
        assert!(spec.covered_actions.contains("qualify_lead"));
    }

    #[test]
    fn test_raises_block_is_error_path() {
        let case = ParsedTestCase::new("test_qualify_closed_contact").with_body([
            "lead = Contact(status=\"closed\")",
            "with pytest.raises(ValueError):\n    lead.qualify_lead()",
        ]);
        let spec = map_test(&suite(vec![case])).unwrap();
        let scenario = &spec.scenarios[0];

        assert_eq!(scenario.category, ScenarioCategory::ErrorPath);
        assert_eq!(scenario.setup.len(), 1);
        assert_eq!(scenario.action, vec![TestStep::new("lead.qualify_lead()")]);
        assert_eq!(scenario.assertions[0].error_identifier(), Some("ValueError"));
    }

    #[test]
    fn test_state_transition_detection() {
        let case = ParsedTestCase::new("test_lifecycle").with_body([
            "lead = Contact()",
            "assert lead.status == \"lead\"",
            "lead.qualify_lead()",
            "assert lead.status == \"qualified\"",
        ]);
        let spec = map_test(&suite(vec![case])).unwrap();
        let assertions = &spec.scenarios[0].assertions;

        assert_eq!(assertions[0].kind, AssertionKind::Equality);
        assert_eq!(assertions[1].kind, AssertionKind::StateTransition);
        assert_eq!(assertions[1].actual.as_deref(), Some("lead"));
        assert_eq!(assertions[1].expected, json!("qualified"));
        assert_eq!(spec.test_type, TestType::StateMachine);
    }

    #[test]
    fn test_trailing_cleanup_is_teardown() {
        let case = ParsedTestCase::new("test_save").with_body([
            "repo.save(contact)",
            "assert repo.count() == 1",
            "db.session.rollback()",
        ]);
        let scenario = &map_test(&suite(vec![case])).unwrap().scenarios[0];
        assert_eq!(scenario.teardown, vec![TestStep::new("db.session.rollback()")]);
    }

    #[test]
    fn test_categories() {
        assert_eq!(categorize("test_unauthorized_update", &[]), ScenarioCategory::Security);
        assert_eq!(categorize("test_invalid_email", &[]), ScenarioCategory::ErrorPath);
        assert_eq!(categorize("test_bulk_import_timeout", &[]), ScenarioCategory::Performance);
        assert_eq!(categorize("test_max_length_name", &[]), ScenarioCategory::Boundary);
        assert_eq!(categorize("test_empty_notes", &[]), ScenarioCategory::Edge);
        assert_eq!(
            categorize("test_qualify", &[TestAssertion::raises("x()", "E")]),
            ScenarioCategory::ErrorPath
        );
        assert_eq!(categorize("testQualifyLead", &[]), ScenarioCategory::PrimaryPath);
    }

    #[test]
    fn test_rust_should_panic_and_tags() {
        let mut case = ParsedTestCase::new("qualify_twice").with_body([
            "let mut c = Contact::new();",
            "c.qualify();",
        ]);
        case.decorations = vec!["#[test]".to_string(), "#[should_panic(expected = \"already qualified\")]".to_string()];
        let mut test = ParsedTest::new("contact_tests", SourceFormat::Rust);
        test.cases = vec![case];

        let scenario = &map_test(&test).unwrap().scenarios[0];
        assert_eq!(scenario.tags, vec!["should_panic"]);
        assert_eq!(
            scenario.assertions,
            vec![TestAssertion::raises("c.qualify();", "already qualified")]
        );
        assert_eq!(scenario.category, ScenarioCategory::ErrorPath);
    }

    #[test]
    fn test_should_panic_with_empty_message() {
        let mut case = ParsedTestCase::new("qualify_twice").with_body(["c.qualify();"]);
        case.decorations = vec!["#[should_panic(expected = \"\")]".to_string()];
        let mut test = ParsedTest::new("contact_tests", SourceFormat::Rust);
        test.cases = vec![case];

        let spec = map_test(&test).unwrap();
        assert_eq!(spec.scenarios[0].assertions, vec![TestAssertion::raises("c.qualify();", "panic")]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_class_qualified_case_description() {
        let case = ParsedTestCase::new("TestQualify::test_invalid_status")
            .with_body(["lead.qualify()", "assert lead.status == \"lead\""]);
        let scenario = &map_test(&suite(vec![case])).unwrap().scenarios[0];
        assert_eq!(scenario.name, "TestQualify::test_invalid_status");
        assert_eq!(scenario.description, "invalid status");
        assert_eq!(scenario.category, ScenarioCategory::ErrorPath);
    }

    #[test]
    fn test_fixtures_and_crud_type() {
        let mut case = ParsedTestCase::new("test_create_contact")
            .with_body(["c = repo.create(name=\"Ada\")", "assert c.id is not None"]);
        case.fixtures = vec!["repo".to_string()];
        let mut test = suite(vec![case]);
        test.fixtures = vec![ParsedFixture {
            name: "repo".to_string(),
            scope: "module".to_string(),
            body: Vec::new(),
        }];

        let spec = map_test(&test).unwrap();
        assert_eq!(spec.fixtures[0].scope, "module");
        assert_eq!(spec.scenarios[0].fixtures, vec!["repo"]);
        assert_eq!(spec.test_type, TestType::CrudCreate);
    }

    #[test]
    fn test_doc_wins_over_name() {
        let mut case = ParsedTestCase::new("test_x").with_body(["assert True"]);
        case.doc = Some("\n  Contacts start as leads.\n  More text.".to_string());
        let scenario = &map_test(&suite(vec![case])).unwrap().scenarios[0];
        assert_eq!(scenario.description, "Contacts start as leads.");
    }
}
