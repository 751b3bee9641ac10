//! Equivalence Checker
//!
//! Compares a reference [`TestSpecification`] with a candidate one in three
//! steps:
//!
//! 1. **Scenario alignment**: each reference scenario, in order, takes the
//!    best-scoring candidate not yet taken (see [`similarity`]). The first
//!    candidate wins a tie. Scores below [`MATCH_THRESHOLD`] leave the
//!    reference scenario missing.
//! 2. **Assertion comparison** per aligned pair: kind, normalized target and
//!    expected value must agree. Each candidate assertion matches once.
//! 3. **Verdict** from the share of matched scenarios and the mean
//!    assertion ratio.
//!
//! The alignment is greedy, not a globally optimal assignment.

pub mod report;
pub mod similarity;

pub use report::{EquivalenceLevel, EquivalenceResult, MatchedPair};
pub use similarity::{scenario_score, similarity, MATCH_THRESHOLD};

use crate::core::error::{CanonError, Result, ResultExt};
use crate::core::mapper::guard::strip_self_scope;
use crate::core::test_spec::{TestAssertion, TestScenario, TestSpecification};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// EXACT: every reference scenario matched
pub const EXACT_MATCH_PCT: f64 = 1.0;
pub const EXACT_ASSERTION_MATCH: f64 = 0.95;
pub const STRONG_MATCH_PCT: f64 = 0.9;
pub const STRONG_ASSERTION_MATCH: f64 = 0.8;
pub const WEAK_MATCH_PCT: f64 = 0.5;

/// Prefixes dropped from assertion targets before comparison
const TARGET_PREFIXES: &[&str] = &["@", "v_", "p_"];

/// Compare `candidate` against `reference`
///
/// Fails only with a comparison-input error when either specification is
/// malformed; otherwise a poor match degrades to [`EquivalenceLevel::None`].
pub fn compare(reference: &TestSpecification, candidate: &TestSpecification) -> Result<EquivalenceResult> {
    reference.validate().context("reference specification")?;
    candidate.validate().context("candidate specification")?;

    let (matched, missing, extra) = align(&reference.scenarios, &candidate.scenarios);

    let mut assertion_match = BTreeMap::new();
    for pair in &matched {
        let (Some(r), Some(c)) = (reference.scenario(&pair.reference), candidate.scenario(&pair.candidate)) else {
            continue;
        };
        assertion_match.insert(pair.reference.clone(), assertion_ratio(&r.assertions, &c.assertions));
    }

    let total = reference.scenarios.len();
    let match_pct = if total == 0 {
        1.0
    } else {
        matched.len() as f64 / total as f64
    };
    let avg_assertion_match = if assertion_match.is_empty() {
        if total == 0 { 1.0 } else { 0.0 }
    } else {
        assertion_match.values().sum::<f64>() / assertion_match.len() as f64
    };

    let level = verdict(match_pct, avg_assertion_match, extra.len());

    let reference_assertions = reference.assertion_count();
    let candidate_assertions = candidate.assertion_count();
    let coverage_delta = coverage_delta(reference_assertions, candidate_assertions);

    let details = BTreeMap::from([
        ("reference".to_string(), json!(reference.name)),
        ("candidate".to_string(), json!(candidate.name)),
        ("match_pct".to_string(), json!(match_pct)),
        ("avg_assertion_match".to_string(), json!(avg_assertion_match)),
        ("reference_scenarios".to_string(), json!(total)),
        ("candidate_scenarios".to_string(), json!(candidate.scenarios.len())),
        ("reference_assertions".to_string(), json!(reference_assertions)),
        ("candidate_assertions".to_string(), json!(candidate_assertions)),
    ]);

    debug!(
        reference = %reference.name,
        candidate = %candidate.name,
        level = %level,
        matched = matched.len(),
        missing = missing.len(),
        extra = extra.len(),
        "compared test specifications"
    );

    Ok(EquivalenceResult {
        level,
        matched,
        missing,
        extra,
        assertion_match,
        coverage_delta,
        details,
    })
}

/// Compare many pairs on scoped worker threads; results keep the input order
pub fn compare_many(pairs: &[(TestSpecification, TestSpecification)]) -> Vec<Result<EquivalenceResult>> {
    std::thread::scope(|s| {
        let joins: Vec<_> = pairs
            .iter()
            .map(|(reference, candidate)| s.spawn(move || compare(reference, candidate)))
            .collect();
        joins
            .into_iter()
            .map(|join| {
                join.join().unwrap_or_else(|_| {
                    Err(CanonError::comparison_input("comparison worker panicked"))
                })
            })
            .collect()
    })
}

/// Greedy scenario alignment: `(matched, missing, extra)`
pub fn align(
    reference: &[TestScenario],
    candidate: &[TestScenario],
) -> (Vec<MatchedPair>, Vec<String>, Vec<String>) {
    let mut taken = vec![false; candidate.len()];
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for r in reference {
        let mut best: Option<(usize, f64)> = None;
        for (index, c) in candidate.iter().enumerate() {
            if taken[index] {
                continue;
            }
            let score = scenario_score(r, c);
            // strictly greater: the first candidate keeps a tie
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) if score >= MATCH_THRESHOLD => {
                taken[index] = true;
                matched.push(MatchedPair {
                    reference: r.name.clone(),
                    candidate: candidate[index].name.clone(),
                    score,
                });
            }
            _ => missing.push(r.name.clone()),
        }
    }

    let extra = candidate
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|(c, _)| c.name.clone())
        .collect();

    (matched, missing, extra)
}

/// Share of reference assertions with an equivalent candidate assertion
///
/// A reference without assertions matches only a candidate without assertions.
pub fn assertion_ratio(reference: &[TestAssertion], candidate: &[TestAssertion]) -> f64 {
    if reference.is_empty() {
        return if candidate.is_empty() { 1.0 } else { 0.0 };
    }

    let mut used = vec![false; candidate.len()];
    let mut hits = 0usize;
    for r in reference {
        let found = candidate
            .iter()
            .enumerate()
            .find(|(index, c)| !used[*index] && assertions_equivalent(r, c))
            .map(|(index, _)| index);
        if let Some(index) = found {
            used[index] = true;
            hits += 1;
        }
    }
    hits as f64 / reference.len() as f64
}

pub fn assertions_equivalent(a: &TestAssertion, b: &TestAssertion) -> bool {
    a.kind == b.kind
        && normalize_target(&a.target) == normalize_target(&b.target)
        && values_equal(&a.expected, &b.expected)
}

/// Lowercase, trim, drop receiver scopes and local-variable prefixes
pub fn normalize_target(target: &str) -> String {
    let mut text = strip_self_scope(target.trim()).trim().to_lowercase();
    while let Some(prefix) = TARGET_PREFIXES.iter().find(|p| text.starts_with(**p)) {
        text = text[prefix.len()..].to_string();
    }
    text.trim().to_string()
}

/// JSON equality with numbers compared numerically (`1` == `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, a)| y.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => a == b,
    }
}

fn verdict(match_pct: f64, avg_assertion_match: f64, extra: usize) -> EquivalenceLevel {
    if match_pct >= EXACT_MATCH_PCT && avg_assertion_match >= EXACT_ASSERTION_MATCH && extra == 0 {
        EquivalenceLevel::Exact
    } else if match_pct >= STRONG_MATCH_PCT && avg_assertion_match >= STRONG_ASSERTION_MATCH {
        EquivalenceLevel::Strong
    } else if match_pct >= WEAK_MATCH_PCT {
        EquivalenceLevel::Weak
    } else {
        EquivalenceLevel::None
    }
}

/// Relative change in assertion count, candidate against reference
fn coverage_delta(reference: usize, candidate: usize) -> f64 {
    match (reference, candidate) {
        (0, 0) => 0.0,
        (0, _) => 1.0,
        (r, c) => (c as f64 - r as f64) / r as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_spec::{AssertionKind, ScenarioCategory};

    fn scenario(name: &str, assertions: Vec<TestAssertion>) -> TestScenario {
        let mut s = TestScenario::new(name).with_description(name.replace('_', " "));
        s.assertions = assertions;
        s
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("  self.Status "), "status");
        assert_eq!(normalize_target("this.status"), "status");
        assert_eq!(normalize_target("@v_status"), "status");
        assert_eq!(normalize_target("p_amount"), "amount");
        assert_eq!(normalize_target("lead.status"), "lead.status");
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"not": 2}), &json!({"not": 2.0})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_assertion_ratio_uses_each_candidate_once() {
        let a = TestAssertion::equality("x", json!(1));
        assert_eq!(assertion_ratio(&[a.clone(), a.clone()], &[a.clone()]), 0.5);
        assert_eq!(assertion_ratio(&[a.clone()], &[a.clone(), a.clone()]), 1.0);
        assert_eq!(assertion_ratio(&[], &[]), 1.0);
        assert_eq!(assertion_ratio(&[], &[a]), 0.0);
    }

    #[test]
    fn test_assertion_kind_must_agree() {
        let eq = TestAssertion::equality("x", json!(1));
        let ne = TestAssertion::new(AssertionKind::Inequality, "x", json!(1));
        assert!(!assertions_equivalent(&eq, &ne));
    }

    #[test]
    fn test_alignment_tie_goes_to_first_candidate() {
        let reference = vec![scenario("test_alpha", vec![])];
        let candidate = vec![scenario("test_alphb", vec![]), scenario("test_alphc", vec![])];
        let (matched, missing, extra) = align(&reference, &candidate);
        assert_eq!(matched[0].candidate, "test_alphb");
        assert!(missing.is_empty());
        assert_eq!(extra, vec!["test_alphc"]);
    }

    #[test]
    fn test_threshold() {
        let reference = vec![scenario("test_qualify_lead", vec![])];
        let candidate = vec![scenario("zzz", vec![]).with_category(ScenarioCategory::Edge)];
        let (matched, missing, extra) = align(&reference, &candidate);
        assert!(matched.is_empty());
        assert_eq!(missing, vec!["test_qualify_lead"]);
        assert_eq!(extra, vec!["zzz"]);
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(verdict(1.0, 0.95, 0), EquivalenceLevel::Exact);
        assert_eq!(verdict(1.0, 0.95, 1), EquivalenceLevel::Strong);
        assert_eq!(verdict(0.9, 0.8, 0), EquivalenceLevel::Strong);
        assert_eq!(verdict(0.9, 0.79, 0), EquivalenceLevel::Weak);
        assert_eq!(verdict(0.5, 0.0, 3), EquivalenceLevel::Weak);
        assert_eq!(verdict(0.49, 1.0, 0), EquivalenceLevel::None);
    }

    #[test]
    fn test_coverage_delta() {
        assert_eq!(coverage_delta(0, 0), 0.0);
        assert_eq!(coverage_delta(0, 3), 1.0);
        assert_eq!(coverage_delta(4, 3), -0.25);
        assert_eq!(coverage_delta(2, 3), 0.5);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let mut bad = TestSpecification::new("bad", "Contact");
        bad.scenarios.push(scenario("", vec![]));
        let good = TestSpecification::new("good", "Contact");

        let err = compare(&bad, &good).unwrap_err();
        assert_eq!(err.category(), crate::core::error::ErrorCategory::ComparisonInput);
        assert!(compare(&good, &bad).is_err());
    }

    #[test]
    fn test_empty_specifications_are_exact() {
        let empty = TestSpecification::new("empty", "Contact");
        let result = compare(&empty, &empty).unwrap();
        assert_eq!(result.level, EquivalenceLevel::Exact);
        assert_eq!(result.coverage_delta, 0.0);
    }

    #[test]
    fn test_compare_many_keeps_order() {
        let a = TestSpecification::new("a", "X").with_scenario(scenario("test_one", vec![]));
        let b = TestSpecification::new("b", "X");
        let results = compare_many(&[(a.clone(), a.clone()), (a.clone(), b), (b_invalid(), a)]);
        assert_eq!(results[0].as_ref().unwrap().level, EquivalenceLevel::Exact);
        assert_eq!(results[1].as_ref().unwrap().level, EquivalenceLevel::None);
        assert!(results[2].is_err());
    }

    fn b_invalid() -> TestSpecification {
        let mut s = TestSpecification::new("invalid", "X");
        s.scenarios.push(scenario("dup", vec![]));
        s.scenarios.push(scenario("dup", vec![]));
        s
    }
}
