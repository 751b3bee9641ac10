//! Pattern Detector
//!
//! Tags entities and canonical specifications with recognized structural
//! idioms. Every predicate is a set operation over normalized name sets, so
//! the result never depends on declaration or iteration order.

use crate::core::canonical::{CanonicalSpecification, CanonicalType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use xlang_ir::{to_snake_case, ParsedEntity, TypeTag};

/// A recognized structural idiom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternTag {
    /// Created and updated timestamps
    AuditTriad,
    /// Nullable deletion timestamp instead of hard deletes
    SoftRemoval,
    /// Status/state field driven by transition methods
    StatusLifecycle,
    /// At least three data-access verbs among the methods
    BulkAccess,
    MultiTenant,
    Hierarchical,
    Versioned,
}

impl PatternTag {
    pub const ALL: [PatternTag; 7] = [
        PatternTag::AuditTriad,
        PatternTag::SoftRemoval,
        PatternTag::StatusLifecycle,
        PatternTag::BulkAccess,
        PatternTag::MultiTenant,
        PatternTag::Hierarchical,
        PatternTag::Versioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternTag::AuditTriad => "audit-triad",
            PatternTag::SoftRemoval => "soft-removal",
            PatternTag::StatusLifecycle => "status-lifecycle",
            PatternTag::BulkAccess => "bulk-access",
            PatternTag::MultiTenant => "multi-tenant",
            PatternTag::Hierarchical => "hierarchical",
            PatternTag::Versioned => "versioned",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| tag.as_str() == name)
    }
}

impl std::fmt::Display for PatternTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CREATED_NAMES: &[&str] = &["created_at", "created_on", "created", "date_created", "inserted_at"];
const UPDATED_NAMES: &[&str] = &[
    "updated_at",
    "updated_on",
    "modified_at",
    "modified_on",
    "updated",
    "modified",
    "last_modified",
];
const STATUS_NAMES: &[&str] = &["status", "state"];
const ACCESS_VERBS: &[&str] = &["create", "read", "update", "delete", "find", "save"];
const TENANT_NAMES: &[&str] = &["tenant_id", "tenant"];
const VERSION_NAMES: &[&str] = &["version", "lock_version", "revision"];

/// Normalize an identifier: snake_case, lowercase, trimmed
pub fn normalize_name(name: &str) -> String {
    to_snake_case(name.trim()).to_lowercase()
}

fn name_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Anything the detector can inspect
///
/// All sets hold normalized names (see [`normalize_name`]).
pub trait PatternSubject {
    fn subject_name(&self) -> String;

    fn field_names(&self) -> BTreeSet<String>;

    fn method_names(&self) -> BTreeSet<String>;

    /// Decorations and supertypes, split into normalized identifier tokens
    fn decoration_names(&self) -> BTreeSet<String>;

    /// Date- or timestamp-typed fields
    fn temporal_fields(&self) -> BTreeSet<String>;

    /// Fields that are both nullable and date-like
    fn nullable_temporal_fields(&self) -> BTreeSet<String>;

    fn integer_fields(&self) -> BTreeSet<String>;

    /// Normalized targets of reference fields
    fn reference_targets(&self) -> BTreeSet<String>;
}

/// Detect every pattern the subject exhibits
pub fn detect<S: PatternSubject + ?Sized>(subject: &S) -> BTreeSet<PatternTag> {
    let fields = subject.field_names();
    let methods = subject.method_names();
    let decorations = subject.decoration_names();

    let mut tags = BTreeSet::new();

    let temporal = subject.temporal_fields();
    let has_created = !temporal.is_disjoint(&name_set(CREATED_NAMES));
    let has_updated = !temporal.is_disjoint(&name_set(UPDATED_NAMES));
    let audit_mixin = decorations
        .iter()
        .any(|d| d.contains("audit") || d.contains("timestamp"));
    if (has_created && has_updated) || audit_mixin {
        tags.insert(PatternTag::AuditTriad);
    }

    if subject
        .nullable_temporal_fields()
        .iter()
        .any(|f| f.contains("deleted") || f.contains("removed"))
    {
        tags.insert(PatternTag::SoftRemoval);
    }

    let has_status = !fields.is_disjoint(&name_set(STATUS_NAMES));
    let has_transition = methods
        .iter()
        .any(|m| m.contains("transition") || m.starts_with("set_") || m.starts_with("mark_"));
    if has_status && has_transition {
        tags.insert(PatternTag::StatusLifecycle);
    }

    let verbs_present: BTreeSet<&str> = ACCESS_VERBS
        .iter()
        .copied()
        .filter(|verb| methods.iter().any(|m| m.contains(verb)))
        .collect();
    if verbs_present.len() >= 3 {
        tags.insert(PatternTag::BulkAccess);
    }

    if !fields.is_disjoint(&name_set(TENANT_NAMES)) {
        tags.insert(PatternTag::MultiTenant);
    }

    let self_name = normalize_name(&subject.subject_name());
    if fields.contains("parent_id") || subject.reference_targets().contains(&self_name) {
        tags.insert(PatternTag::Hierarchical);
    }

    if !subject.integer_fields().is_disjoint(&name_set(VERSION_NAMES)) {
        tags.insert(PatternTag::Versioned);
    }

    tags
}

/// Split decoration text (`@dataclass`, `#[derive(Debug)]`, `TimestampMixin`) into tokens
fn decoration_tokens<'a>(items: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
    items
        .flat_map(|item| {
            item.split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|token| !token.is_empty())
                .map(normalize_name)
                .collect::<Vec<_>>()
        })
        .collect()
}

impl PatternSubject for ParsedEntity {
    fn subject_name(&self) -> String {
        self.name.clone()
    }

    fn field_names(&self) -> BTreeSet<String> {
        self.fields.iter().map(|f| normalize_name(&f.name)).collect()
    }

    fn method_names(&self) -> BTreeSet<String> {
        self.methods.iter().map(|m| normalize_name(&m.name)).collect()
    }

    fn decoration_names(&self) -> BTreeSet<String> {
        decoration_tokens(self.decorations.iter().chain(self.supertypes.iter()))
    }

    fn temporal_fields(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.type_tag.is_temporal())
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn nullable_temporal_fields(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| !f.required && f.type_tag.is_temporal())
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn integer_fields(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.type_tag == TypeTag::Integer)
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn reference_targets(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter_map(|f| f.reference.as_deref())
            .map(normalize_name)
            .collect()
    }
}

impl PatternSubject for CanonicalSpecification {
    fn subject_name(&self) -> String {
        self.entity().to_string()
    }

    fn field_names(&self) -> BTreeSet<String> {
        self.fields().iter().map(|f| normalize_name(&f.name)).collect()
    }

    fn method_names(&self) -> BTreeSet<String> {
        self.actions().iter().map(|a| normalize_name(&a.name)).collect()
    }

    /// Canonical form keeps no decorations; mixin evidence lives in the tags already assigned
    fn decoration_names(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn temporal_fields(&self) -> BTreeSet<String> {
        self.fields()
            .iter()
            .filter(|f| matches!(f.field_type.base(), CanonicalType::Date | CanonicalType::Timestamp))
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn nullable_temporal_fields(&self) -> BTreeSet<String> {
        self.fields()
            .iter()
            .filter(|f| {
                f.field_type.is_nullable()
                    && matches!(f.field_type.base(), CanonicalType::Date | CanonicalType::Timestamp)
            })
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn integer_fields(&self) -> BTreeSet<String> {
        self.fields()
            .iter()
            .filter(|f| *f.field_type.base() == CanonicalType::Integer)
            .map(|f| normalize_name(&f.name))
            .collect()
    }

    fn reference_targets(&self) -> BTreeSet<String> {
        self.fields()
            .iter()
            .filter_map(|f| f.reference.as_deref())
            .map(normalize_name)
            .collect()
    }
}

// ============================================================================
// Usage counting
// ============================================================================

/// "Entity X was tagged with pattern P", emitted by mapping
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageEvent {
    pub pattern: PatternTag,
    pub entity: String,
}

/// Events for every tag on a specification
pub fn usage_events(spec: &CanonicalSpecification) -> Vec<UsageEvent> {
    spec.tags()
        .iter()
        .map(|pattern| UsageEvent {
            pattern: *pattern,
            entity: spec.qualified_name(),
        })
        .collect()
}

/// Single owner of pattern usage counters
///
/// Counters change only through [`PatternUsage::apply`], called during the
/// single-threaded reduction of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternUsage {
    counts: BTreeMap<PatternTag, usize>,
    entities: BTreeMap<PatternTag, BTreeSet<String>>,
}

impl PatternUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: UsageEvent) {
        *self.counts.entry(event.pattern).or_insert(0) += 1;
        self.entities
            .entry(event.pattern)
            .or_default()
            .insert(event.entity);
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = UsageEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    pub fn count(&self, pattern: PatternTag) -> usize {
        self.counts.get(&pattern).copied().unwrap_or(0)
    }

    pub fn entities(&self, pattern: PatternTag) -> Vec<&str> {
        self.entities
            .get(&pattern)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
