//! Property tests for the canonical layer
//!
//! - Guard inversion is an involution
//! - Nullable wrapping round-trips for every type tag
//! - Comparing a specification with itself is EXACT
//! - Dropping candidate assertions never strengthens a verdict

use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use xlang_canon::core::canonical::CanonicalType;
use xlang_canon::core::mapper::guard::invert_guard;
use xlang_canon::core::test_spec::{AssertionKind, ScenarioCategory, TestAssertion, TestScenario};
use xlang_canon::{compare, TestSpecification};
use xlang_ir::TypeTag;

fn operand() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|s| format!("v_{}", s)),
        (0i64..1000).prop_map(|n| n.to_string()),
        "[a-z ]{0,8}".prop_map(|s| format!("\"{}\"", s)),
    ]
}

fn operator() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["==", "!=", "<", ">", "<=", ">="])
}

fn category() -> impl Strategy<Value = ScenarioCategory> {
    prop::sample::select(vec![
        ScenarioCategory::PrimaryPath,
        ScenarioCategory::ErrorPath,
        ScenarioCategory::Boundary,
        ScenarioCategory::Edge,
    ])
}

fn assertion() -> impl Strategy<Value = TestAssertion> {
    prop_oneof![
        ("[a-z]{1,5}\\.[a-z]{1,5}", 0i64..100)
            .prop_map(|(target, n)| TestAssertion::equality(target, json!(n))),
        "[a-z]{1,5}".prop_map(|target| TestAssertion::new(AssertionKind::NullCheck, target, json!(true))),
        ("[a-z]{1,5}\\(\\)", "[A-Z][a-z]{2,8}Error")
            .prop_map(|(target, error)| TestAssertion::raises(target, error)),
    ]
}

fn specification(min_assertions: usize) -> impl Strategy<Value = TestSpecification> {
    prop::collection::vec(
        (
            "[a-z]{2,10}",
            "[a-z ]{0,20}",
            category(),
            prop::collection::vec(assertion(), min_assertions..4),
        ),
        0..6,
    )
    .prop_map(|raw| {
        let mut seen = BTreeSet::new();
        let mut spec = TestSpecification::new("test_generated", "Subject");
        for (name, description, category, assertions) in raw {
            let name = format!("test_{}", name);
            if !seen.insert(name.clone()) {
                continue;
            }
            let mut scenario = TestScenario::new(name)
                .with_description(description)
                .with_category(category);
            scenario.assertions = assertions;
            spec = spec.with_scenario(scenario);
        }
        spec
    })
}

proptest! {
    #[test]
    fn guard_inversion_is_an_involution(left in operand(), op in operator(), right in operand()) {
        let condition = format!("{} {} {}", left, op, right);
        let inverted = invert_guard(&condition);
        prop_assert_ne!(&inverted, &condition);
        prop_assert_eq!(invert_guard(&inverted), condition);
    }

    #[test]
    fn equality_guards_swap_operator(left in operand(), right in operand()) {
        prop_assert_eq!(
            invert_guard(&format!("{} != {}", left, right)),
            format!("{} == {}", left, right)
        );
        prop_assert_eq!(
            invert_guard(&format!("{} == {}", left, right)),
            format!("{} != {}", left, right)
        );
    }

    #[test]
    fn self_comparison_is_exact(spec in specification(0)) {
        let result = compare(&spec, &spec).unwrap();
        prop_assert_eq!(result.level, xlang_canon::EquivalenceLevel::Exact);
        prop_assert!(result.missing.is_empty());
        prop_assert!(result.extra.is_empty());
        prop_assert_eq!(result.coverage_delta, 0.0);
    }

    #[test]
    fn removing_candidate_assertions_never_strengthens(
        spec in specification(1),
        pick in any::<prop::sample::Index>(),
    ) {
        let before = compare(&spec, &spec).unwrap();

        let mut candidate = spec.clone();
        let slots: Vec<(usize, usize)> = candidate
            .scenarios
            .iter()
            .enumerate()
            .flat_map(|(s, scenario)| (0..scenario.assertions.len()).map(move |a| (s, a)))
            .collect();
        prop_assume!(!slots.is_empty());
        let (s, a) = slots[pick.index(slots.len())];
        candidate.scenarios[s].assertions.remove(a);

        let after = compare(&spec, &candidate).unwrap();
        // levels are ordered strongest first
        prop_assert!(after.level >= before.level);
        prop_assert!(after.assertion_match[&spec.scenarios[s].name] < 1.0);
        prop_assert!(after.coverage_delta < 0.0);
    }
}

#[test]
fn nullable_round_trips_for_every_tag() {
    for tag in TypeTag::RESOLVED.iter() {
        let base = CanonicalType::from_tag(tag).unwrap();
        let nullable = base.clone().nullable();

        assert!(nullable.is_nullable());
        assert_eq!(nullable.clone().nullable(), nullable);
        assert_eq!(nullable.clone().unwrap_nullable(), base);
        assert_eq!(nullable.base(), &base);

        let text: String = nullable.clone().into();
        assert_eq!(CanonicalType::try_from(text).unwrap(), nullable);
    }
    assert!(CanonicalType::from_tag(&TypeTag::Unresolved("Widget".to_string())).is_none());
}
