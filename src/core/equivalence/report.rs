//! Equivalence verdicts and reports

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

/// Overall verdict of a comparison, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EquivalenceLevel {
    Exact,
    Strong,
    Weak,
    None,
}

impl EquivalenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquivalenceLevel::Exact => "EXACT",
            EquivalenceLevel::Strong => "STRONG",
            EquivalenceLevel::Weak => "WEAK",
            EquivalenceLevel::None => "NONE",
        }
    }

    /// EXACT and STRONG pass; WEAK and NONE fail only in strict mode
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self {
            EquivalenceLevel::Exact | EquivalenceLevel::Strong => 0,
            EquivalenceLevel::Weak | EquivalenceLevel::None if strict => 1,
            EquivalenceLevel::Weak | EquivalenceLevel::None => 0,
        }
    }
}

impl fmt::Display for EquivalenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aligned reference/candidate scenario pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub reference: String,
    pub candidate: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceResult {
    pub level: EquivalenceLevel,
    pub matched: Vec<MatchedPair>,
    /// Reference scenarios without a counterpart
    pub missing: Vec<String>,
    /// Candidate scenarios without a counterpart
    pub extra: Vec<String>,
    /// Assertion-match ratio per matched reference scenario
    pub assertion_match: BTreeMap<String, f64>,
    pub coverage_delta: f64,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl EquivalenceResult {
    pub fn is_equivalent(&self) -> bool {
        matches!(self.level, EquivalenceLevel::Exact | EquivalenceLevel::Strong)
    }

    pub fn to_json(&self) -> crate::core::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable listing for terminals and CI logs
    pub fn render_diff(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Equivalence: {} (coverage delta {:+.1}%)",
            self.level,
            self.coverage_delta * 100.0
        );

        for pair in &self.matched {
            let ratio = self.assertion_match.get(&pair.reference).copied().unwrap_or(0.0);
            if pair.reference == pair.candidate {
                let _ = write!(out, "  = {}", pair.reference);
            } else {
                let _ = write!(out, "  ~ {} -> {}", pair.reference, pair.candidate);
            }
            let _ = writeln!(
                out,
                " (score {:.2}, assertions {:.0}%)",
                pair.score,
                ratio * 100.0
            );
        }
        for name in &self.missing {
            let _ = writeln!(out, "  - {}", name);
        }
        for name in &self.extra {
            let _ = writeln!(out, "  + {}", name);
        }

        let _ = writeln!(
            out,
            "{} matched, {} missing, {} extra",
            self.matched.len(),
            self.missing.len(),
            self.extra.len()
        );
        out
    }
}
