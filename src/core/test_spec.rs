//! Canonical test specification
//!
//! The parallel canonical form for test sources. Two of these are what the
//! equivalence checker compares.

use crate::core::error::{CanonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a test module exercises as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    CrudCreate,
    CrudRead,
    CrudUpdate,
    CrudDelete,
    Validation,
    StateMachine,
    #[default]
    Workflow,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::CrudCreate => "crud-create",
            TestType::CrudRead => "crud-read",
            TestType::CrudUpdate => "crud-update",
            TestType::CrudDelete => "crud-delete",
            TestType::Validation => "validation",
            TestType::StateMachine => "state-machine",
            TestType::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioCategory {
    #[default]
    PrimaryPath,
    ErrorPath,
    Boundary,
    Edge,
    Security,
    Performance,
}

impl ScenarioCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioCategory::PrimaryPath => "primary-path",
            ScenarioCategory::ErrorPath => "error-path",
            ScenarioCategory::Boundary => "boundary",
            ScenarioCategory::Edge => "edge",
            ScenarioCategory::Security => "security",
            ScenarioCategory::Performance => "performance",
        }
    }
}

impl std::fmt::Display for ScenarioCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    Equality,
    Inequality,
    Membership,
    Ordering,
    NullCheck,
    Raises,
    StateTransition,
    CountCheck,
    PatternMatch,
}

impl AssertionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionKind::Equality => "equality",
            AssertionKind::Inequality => "inequality",
            AssertionKind::Membership => "membership",
            AssertionKind::Ordering => "ordering",
            AssertionKind::NullCheck => "null-check",
            AssertionKind::Raises => "raises",
            AssertionKind::StateTransition => "state-transition",
            AssertionKind::CountCheck => "count-check",
            AssertionKind::PatternMatch => "pattern-match",
        }
    }
}

impl std::fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One checked expectation
///
/// For `raises`, `expected` holds the error identifier as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAssertion {
    pub kind: AssertionKind,
    pub target: String,
    #[serde(default)]
    pub expected: serde_json::Value,
    /// Before-value of a state transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestAssertion {
    pub fn new(kind: AssertionKind, target: impl Into<String>, expected: serde_json::Value) -> Self {
        Self {
            kind,
            target: target.into(),
            expected,
            actual: None,
            message: None,
        }
    }

    pub fn equality(target: impl Into<String>, expected: serde_json::Value) -> Self {
        Self::new(AssertionKind::Equality, target, expected)
    }

    /// `target` raises `error`
    pub fn raises(target: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            AssertionKind::Raises,
            target,
            serde_json::Value::String(error.into()),
        )
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Error identifier of a `raises` assertion, if non-empty
    pub fn error_identifier(&self) -> Option<&str> {
        match (&self.kind, &self.expected) {
            (AssertionKind::Raises, serde_json::Value::String(s)) if !s.trim().is_empty() => {
                Some(s.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestStep {
    pub statement: String,
}

impl TestStep {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: ScenarioCategory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<TestStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<TestStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<TestStep>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TestScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: ScenarioCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_assertion(mut self, assertion: TestAssertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_action(mut self, statement: impl Into<String>) -> Self {
        self.action.push(TestStep::new(statement));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFixture {
    pub name: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "function".to_string()
}

/// Canonical form of one test module
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestSpecification {
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub test_type: TestType,
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<TestFixture>,
    /// Entity actions exercised by the scenarios
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub covered_actions: BTreeSet<String>,
}

impl TestSpecification {
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, test_type: TestType) -> Self {
        self.test_type = test_type;
        self
    }

    pub fn with_scenario(mut self, scenario: TestScenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenario(&self, name: &str) -> Option<&TestScenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn assertion_count(&self) -> usize {
        self.scenarios.iter().map(|s| s.assertions.len()).sum()
    }

    /// Structural checks run before any comparison
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for (index, scenario) in self.scenarios.iter().enumerate() {
            if scenario.name.trim().is_empty() {
                return Err(CanonError::comparison_input(format!(
                    "'{}': scenario #{} has an empty name",
                    self.name, index
                )));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(CanonError::comparison_input(format!(
                    "'{}': duplicate scenario '{}'",
                    self.name, scenario.name
                )));
            }
            for assertion in &scenario.assertions {
                if assertion.kind == AssertionKind::Raises && assertion.error_identifier().is_none() {
                    return Err(CanonError::comparison_input(format!(
                        "'{}': raises assertion on '{}' in scenario '{}' has no error identifier",
                        self.name, assertion.target, scenario.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qualify_suite() -> TestSpecification {
        TestSpecification::new("test_contact", "Contact")
            .with_type(TestType::StateMachine)
            .with_scenario(
                TestScenario::new("test_qualify_lead_happy_path")
                    .with_description("Qualify a lead")
                    .with_action("contact.qualify_lead()")
                    .with_assertion(TestAssertion::equality("contact.status", json!("qualified")))
                    .with_assertion(TestAssertion::equality("result", json!(true))),
            )
    }

    #[test]
    fn test_valid_specification() {
        let spec = qualify_suite();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.assertion_count(), 2);
        assert!(spec.scenario("test_qualify_lead_happy_path").is_some());
    }

    #[test]
    fn test_empty_scenario_name_is_rejected() {
        let spec = qualify_suite().with_scenario(TestScenario::new("  "));
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, CanonError::ComparisonInput { .. }));
    }

    #[test]
    fn test_raises_without_identifier_is_rejected() {
        let spec = qualify_suite().with_scenario(
            TestScenario::new("test_reject")
                .with_assertion(TestAssertion::new(AssertionKind::Raises, "contact.qualify_lead()", json!(null))),
        );
        assert!(spec.validate().is_err());

        let ok = qualify_suite().with_scenario(
            TestScenario::new("test_reject")
                .with_assertion(TestAssertion::raises("contact.qualify_lead()", "ValueError")),
        );
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_duplicate_scenarios_are_rejected() {
        let spec = qualify_suite().with_scenario(TestScenario::new("test_qualify_lead_happy_path"));
        assert!(spec.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(qualify_suite()).unwrap();
        assert_eq!(value["test_type"], "state-machine");
        assert_eq!(value["scenarios"][0]["category"], "primary-path");
        assert_eq!(value["scenarios"][0]["action"][0], "contact.qualify_lead()");
        assert_eq!(value["scenarios"][0]["assertions"][0]["kind"], "equality");
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let spec = TestSpecification::from_json(
            r#"{"name": "legacy", "scenarios": [{"name": "test_a", "assertions": []}]}"#,
        )
        .unwrap();
        assert_eq!(spec.test_type, TestType::Workflow);
        assert_eq!(spec.scenarios[0].category, ScenarioCategory::PrimaryPath);
        assert!(spec.scenarios[0].description.is_empty());
    }
}
