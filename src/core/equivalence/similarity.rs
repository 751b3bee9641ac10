//! Scenario similarity scoring

use crate::core::test_spec::TestScenario;

/// Weight of the name similarity in a scenario score
pub const NAME_WEIGHT: f64 = 0.5;
/// Weight of the description similarity
pub const DESCRIPTION_WEIGHT: f64 = 0.3;
/// Weight of category equality
pub const CATEGORY_WEIGHT: f64 = 0.2;
/// Minimum score for two scenarios to be aligned
pub const MATCH_THRESHOLD: f64 = 0.6;

/// Edit distance over chars
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// `1 - distance / max_len` over lowercased, trimmed text; two empty strings are identical
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(&a, &b) as f64 / max_len as f64
}

/// Weighted alignment score of a candidate scenario against a reference one
pub fn scenario_score(reference: &TestScenario, candidate: &TestScenario) -> f64 {
    let category = if reference.category == candidate.category { 1.0 } else { 0.0 };
    NAME_WEIGHT * similarity(&reference.name, &candidate.name)
        + DESCRIPTION_WEIGHT * similarity(&reference.description, &candidate.description)
        + CATEGORY_WEIGHT * category
}
