//! Equivalence verdict tests
//!
//! End-to-end comparisons through the public API, from hand-built
//! specifications and from pytest sources mapped on the fly.

use serde_json::json;
use xlang_canon::core::equivalence::align;
use xlang_canon::core::test_spec::{AssertionKind, ScenarioCategory, TestAssertion, TestScenario};
use xlang_canon::{
    compare, compare_many, CanonicalMapper, EquivalenceLevel, ErrorCategory, ParserRegistry,
    SourceFormat, TestSpecification,
};

fn scenario(name: &str, description: &str, assertions: Vec<TestAssertion>) -> TestScenario {
    let mut s = TestScenario::new(name).with_description(description);
    s.assertions = assertions;
    s
}

fn qualify_assertions() -> Vec<TestAssertion> {
    vec![
        TestAssertion::equality("lead.status", json!("qualified")),
        TestAssertion::new(AssertionKind::NullCheck, "lead.qualified_at", json!(false)),
    ]
}

#[test]
fn test_identical_scenario_is_exact() {
    let reference = TestSpecification::new("test_lead", "Lead").with_scenario(scenario(
        "test_qualify_lead_happy_path",
        "qualify lead happy path",
        qualify_assertions(),
    ));
    let candidate = TestSpecification::new("lead_spec", "Lead").with_scenario(scenario(
        "test_qualify_lead_happy_path",
        "qualify lead happy path",
        qualify_assertions(),
    ));

    let result = compare(&reference, &candidate).unwrap();
    assert_eq!(result.level, EquivalenceLevel::Exact);
    assert!(result.missing.is_empty());
    assert!(result.extra.is_empty());
    assert_eq!(result.assertion_match["test_qualify_lead_happy_path"], 1.0);
    assert_eq!(result.coverage_delta, 0.0);
    assert_eq!(result.level.exit_code(true), 0);
}

#[test]
fn test_missing_error_path_is_strong() {
    let mut reference = TestSpecification::new("test_deal", "Deal");
    let mut candidate = TestSpecification::new("deal_spec", "Deal");
    for i in 0..10 {
        let name = format!("test_close_deal_variant_{}", i);
        let assertions = vec![TestAssertion::equality("deal.stage", json!(format!("won_{}", i)))];
        reference = reference.with_scenario(scenario(&name, "close deal", assertions.clone()));
        candidate = candidate.with_scenario(scenario(&name, "close deal", assertions));
    }
    reference = reference.with_scenario(
        scenario(
            "test_close_lost_deal_raises",
            "closing a lost deal is rejected",
            vec![TestAssertion::raises("deal.close()", "DealClosedError")],
        )
        .with_category(ScenarioCategory::ErrorPath),
    );

    let result = compare(&reference, &candidate).unwrap();
    let match_pct = result.details["match_pct"].as_f64().unwrap();
    assert!((match_pct - 10.0 / 11.0).abs() < 1e-9);
    assert_eq!(result.level, EquivalenceLevel::Strong);
    assert_eq!(result.missing, vec!["test_close_lost_deal_raises".to_string()]);
    assert!(result.is_equivalent());
}

#[test]
fn test_tie_goes_to_first_candidate() {
    let reference = vec![scenario("test_merge", "merge", vec![])];
    let candidate = vec![
        scenario("test_merge", "merge", vec![]),
        scenario("test_merge", "merge", vec![]),
    ];
    let (matched, missing, extra) = align(&reference, &candidate);
    assert_eq!(matched.len(), 1);
    assert!(missing.is_empty());
    // second of the identical twins is left over
    assert_eq!(extra.len(), 1);

    let renamed = vec![
        scenario("test_merge_a", "merge", vec![]),
        scenario("test_merge_b", "merge", vec![]),
    ];
    let (matched, _, extra) = align(&reference, &renamed);
    assert_eq!(matched[0].candidate, "test_merge_a");
    assert_eq!(extra, vec!["test_merge_b".to_string()]);
}

#[test]
fn test_zero_assertion_reference_scenario() {
    let reference = TestSpecification::new("test_smoke", "App")
        .with_scenario(scenario("test_boots", "boots", vec![]));
    let empty = reference.clone();
    let result = compare(&reference, &empty).unwrap();
    assert_eq!(result.level, EquivalenceLevel::Exact);

    // a candidate that asserts more no longer mirrors an assertion-free scenario
    let asserting = TestSpecification::new("test_smoke", "App").with_scenario(scenario(
        "test_boots",
        "boots",
        vec![TestAssertion::equality("app.ready", json!(true))],
    ));
    let result = compare(&reference, &asserting).unwrap();
    assert_eq!(result.assertion_match["test_boots"], 0.0);
    assert_eq!(result.level, EquivalenceLevel::Weak);
    assert_eq!(result.coverage_delta, 1.0);
}

#[test]
fn test_malformed_input_is_rejected() {
    let mut raises = TestAssertion::raises("lead.qualify()", "X");
    raises.expected = json!(null);
    let bad = TestSpecification::new("test_bad", "Lead")
        .with_scenario(scenario("test_qualify", "qualify", vec![raises]));
    let good = TestSpecification::new("test_good", "Lead");

    let err = compare(&good, &bad).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ComparisonInput);
    assert!(err.to_string().contains("candidate specification"));

    let unnamed = TestSpecification::new("test_bad", "Lead").with_scenario(TestScenario::new("  "));
    let err = compare(&unnamed, &good).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ComparisonInput);
}

#[test]
fn test_compare_many_keeps_order() {
    let a = TestSpecification::new("a", "A")
        .with_scenario(scenario("test_one", "one", qualify_assertions()));
    let b = TestSpecification::new("b", "B");
    let results = compare_many(&[(a.clone(), a.clone()), (a.clone(), b.clone()), (b.clone(), b)]);

    let levels: Vec<EquivalenceLevel> = results.into_iter().map(|r| r.unwrap().level).collect();
    assert_eq!(
        levels,
        vec![EquivalenceLevel::Exact, EquivalenceLevel::None, EquivalenceLevel::Exact]
    );
}

#[test]
fn test_pytest_and_unittest_styles_are_equivalent() {
    let pytest = r#"
def test_qualify_lead():
    """Qualifying a lead sets its status"""
    lead = Lead(status="lead")
    lead.qualify()
    assert lead.status == "qualified"
    assert lead.score >= 10
"#;
    let unittest = r#"
class TestLead:
    def test_qualify_lead(self):
        """Qualifying a lead sets its status"""
        lead = Lead(status="lead")
        lead.qualify()
        self.assertEqual(lead.status, "qualified")
        self.assertGreaterEqual(lead.score, 10)
"#;
    let registry = ParserRegistry::with_builtin_parsers();
    let mapper = CanonicalMapper::default();
    let spec = |source: &str| {
        let units = registry.parse(SourceFormat::Pytest, source, "tests/test_lead.py").unwrap();
        mapper.map_test(units[0].as_test().unwrap()).unwrap()
    };

    let result = compare(&spec(pytest), &spec(unittest)).unwrap();
    assert_eq!(result.level, EquivalenceLevel::Exact, "{}", result.render_diff());
}

#[test]
fn test_classes_sharing_a_method_name_compare_exact() {
    let source = r#"
class TestCreate:
    def test_valid(self):
        contact = Contact(email="a@b.c")
        assert contact.email == "a@b.c"

class TestUpdate:
    def test_valid(self):
        contact = Contact(email="a@b.c")
        contact.rename("x@y.z")
        assert contact.email == "x@y.z"
"#;
    let registry = ParserRegistry::with_builtin_parsers();
    let units = registry
        .parse(SourceFormat::Pytest, source, "tests/test_contact.py")
        .unwrap();
    let spec = CanonicalMapper::default()
        .map_test(units[0].as_test().unwrap())
        .unwrap();

    assert!(spec.validate().is_ok());
    let result = compare(&spec, &spec).unwrap();
    assert_eq!(result.level, EquivalenceLevel::Exact);
    assert_eq!(result.matched.len(), 2);
}
