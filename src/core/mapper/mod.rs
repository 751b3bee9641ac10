//! Canonical Mapper
//!
//! Turns parsed entities into [`CanonicalSpecification`]s and parsed test
//! modules into [`TestSpecification`]s.
//!
//! # Architecture
//!
//! - `strategy`: statement decomposition per source format (`python`, `brace`)
//! - `types`: resolution of `Unresolved` field types
//! - `guard`: guard inversion and self-scope stripping
//! - `assertions`: assertion extraction per test framework
//! - `test_mapper`: scenario construction for test modules
//!
//! Body statements are classified by an ordered rule list; the first rule
//! that matches wins. A statement no rule recognizes is kept as an
//! `unclassified` external invocation, never dropped.

pub mod assertions;
pub mod brace;
pub mod guard;
pub mod python;
pub mod strategy;
pub mod test_mapper;
pub mod types;

use crate::core::canonical::{
    CanonicalAction, CanonicalField, CanonicalSpecification, CanonicalStep, CanonicalType,
};
use crate::core::error::{CanonError, Result};
use crate::core::patterns::{detect, PatternTag};
use crate::core::test_spec::TestSpecification;
use guard::{invert_guard, is_binding, strip_self_scope};
use std::collections::BTreeSet;
use strategy::{strategy_for, StatementShape, StatementStrategy};
use tracing::{debug, warn};
use types::{resolve_unresolved, type_strategy_for, TypeStrategy};
use xlang_ir::{singularize, to_snake_case, ParsedEntity, ParsedField, ParsedMethod, ParsedTest, TypeTag};

pub use assertions::{assertion_strategy_for, AssertionStrategy, Extraction};
pub use test_mapper::map_test;

/// Method names that construct rather than act
const CONSTRUCTORS: &[&str] = &["new", "__init__", "constructor", "default"];

/// Receiver parameters that are not part of an action's signature
const RECEIVERS: &[&str] = &["self", "cls", "this", "&self", "&mut self", "mut self"];

// ============================================================================
// Entity catalog
// ============================================================================

/// Entity names known in the current batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityCatalog {
    names: BTreeSet<String>,
}

/// Lookup key: lowercase, underscores removed
fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_entities<'a, I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a ParsedEntity>,
    {
        Self::from_names(entities.into_iter().map(|e| e.name.clone()))
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Catalog name for `name`: exact match, then case- and underscore-insensitive,
    /// then the singular of a table name (`companies` → `Company`)
    pub fn resolve(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if self.names.contains(name) {
            return Some(name.to_string());
        }
        let keys = [squash(name), squash(&singularize(&to_snake_case(name)))];
        self.names
            .iter()
            .find(|candidate| keys.contains(&squash(candidate)))
            .cloned()
    }

    /// Like [`resolve`](Self::resolve), but `owner` always resolves to itself
    pub fn resolve_for(&self, name: &str, owner: &str) -> Option<String> {
        if squash(name.trim()) == squash(owner) {
            return Some(owner.to_string());
        }
        self.resolve(name)
    }
}

// ============================================================================
// Mapper
// ============================================================================

/// Maps IR into canonical form against a fixed entity catalog
#[derive(Debug, Clone, Default)]
pub struct CanonicalMapper {
    catalog: EntityCatalog,
}

/// What one body statement is being classified within
struct StepContext<'a> {
    entity: &'a str,
    action: &'a str,
    fields: &'a BTreeSet<&'a str>,
    strategy: &'a dyn StatementStrategy,
}

impl CanonicalMapper {
    pub fn new(catalog: EntityCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    /// Map one entity, attaching `tags`
    pub fn map_entity(
        &self,
        parsed: &ParsedEntity,
        tags: BTreeSet<PatternTag>,
    ) -> Result<CanonicalSpecification> {
        parsed.validate()?;

        let types = type_strategy_for(parsed.source_format);
        let fields = parsed
            .fields
            .iter()
            .map(|field| self.map_field(parsed, field, &types))
            .collect::<Result<Vec<_>>>()?;

        let field_names: BTreeSet<&str> = parsed.fields.iter().map(|f| f.name.as_str()).collect();
        let strategy = strategy_for(parsed.source_format);

        let mut actions: Vec<CanonicalAction> = Vec::new();
        for method in parsed.methods.iter().filter(|m| qualifies(m)) {
            if actions.iter().any(|a| a.name == method.name) {
                debug!(entity = %parsed.name, action = %method.name, "skipping redefinition");
                continue;
            }
            let context = StepContext {
                entity: &parsed.name,
                action: &method.name,
                fields: &field_names,
                strategy,
            };
            let mut action = CanonicalAction::new(&method.name, map_steps(&context, &method.body));
            action.parameters = method
                .parameters
                .iter()
                .map(|p| p.name.clone())
                .filter(|name| !RECEIVERS.contains(&name.as_str()))
                .collect();
            actions.push(action);
        }

        let spec = CanonicalSpecification::new(
            &parsed.name,
            &parsed.namespace,
            fields,
            actions,
            parsed.source_format,
        )?
        .with_tags(tags);

        debug!(
            entity = %spec.entity(),
            fields = spec.fields().len(),
            actions = spec.actions().len(),
            unclassified = spec.unclassified_steps(),
            "mapped entity"
        );
        Ok(spec)
    }

    /// Map one entity with the tags the pattern detector finds on it
    pub fn map_detected(&self, parsed: &ParsedEntity) -> Result<CanonicalSpecification> {
        self.map_entity(parsed, detect(parsed))
    }

    pub fn map_test(&self, parsed: &ParsedTest) -> Result<TestSpecification> {
        map_test(parsed)
    }

    fn map_field(
        &self,
        entity: &ParsedEntity,
        field: &ParsedField,
        types: &TypeStrategy,
    ) -> Result<CanonicalField> {
        let (base, reference, nullable) = match &field.type_tag {
            TypeTag::Unresolved(raw) => {
                let (resolved, nullable) = resolve_unresolved(types, raw, &self.catalog, &entity.name)
                    .ok_or_else(|| {
                        CanonError::mapping(
                            &entity.name,
                            format!("unresolved type '{}' for field '{}'", raw, field.name),
                        )
                    })?;
                (resolved.canonical, resolved.reference, nullable)
            }
            TypeTag::Reference => {
                let target = field.reference.as_deref().unwrap_or_default();
                let resolved = self.catalog.resolve_for(target, &entity.name).ok_or_else(|| {
                    CanonError::mapping(
                        &entity.name,
                        format!("unknown reference target '{}' for field '{}'", target, field.name),
                    )
                })?;
                (CanonicalType::Reference, Some(resolved), false)
            }
            tag => {
                let canonical = CanonicalType::from_tag(tag).ok_or_else(|| {
                    CanonError::mapping(
                        &entity.name,
                        format!("no canonical type for '{}' on field '{}'", tag.as_str(), field.name),
                    )
                })?;
                (canonical, None, false)
            }
        };

        let required = field.required && !nullable;
        let mut canonical = CanonicalField::new(
            &field.name,
            if required { base } else { base.nullable() },
        );
        canonical.default = field.default.clone();
        canonical.reference = reference;
        canonical.enum_values = field.enum_values.clone();
        canonical.validations = field.validations.clone();
        Ok(canonical)
    }
}

/// Whether a method becomes an action
fn qualifies(method: &ParsedMethod) -> bool {
    !method.name.starts_with('_')
        && !CONSTRUCTORS.contains(&method.name.as_str())
        && !method.has_decoration("property")
}

fn map_steps(context: &StepContext<'_>, fragments: &[String]) -> Vec<CanonicalStep> {
    fragments.iter().map(|f| classify(context, f)).collect()
}

/// Classify one fragment; rule order matters
fn classify(context: &StepContext<'_>, fragment: &str) -> CanonicalStep {
    match context.strategy.decompose(fragment) {
        // 1. self-scoped assignment to a declared field
        StatementShape::Assignment { target, value } => {
            match context.strategy.self_field(&target) {
                Some(field) if context.fields.contains(field) => CanonicalStep::MutateField {
                    field: field.to_string(),
                    value: strip_self_scope(&value),
                },
                _ => unclassified(context, fragment),
            }
        }

        StatementShape::Conditional {
            condition,
            then,
            otherwise,
        } => {
            // 2. guard clause; a pattern binding (`if let`) is a branch
            if let (None, [only], false) = (&otherwise, then.as_slice(), is_binding(&condition)) {
                let error = match context.strategy.decompose(only) {
                    StatementShape::Return { value } => Some(value),
                    StatementShape::Raise { error } => Some(Some(error)),
                    _ => None,
                };
                if let Some(error) = error {
                    return CanonicalStep::Validate {
                        condition: strip_self_scope(&invert_guard(&condition)),
                        error: error.map(|e| strip_self_scope(&e)),
                    };
                }
            }
            // 3. any other conditional
            CanonicalStep::Branch {
                condition: strip_self_scope(&condition),
                then: map_steps(context, &then),
                otherwise: map_steps(context, &otherwise.unwrap_or_default()),
            }
        }

        // 4.
        StatementShape::Loop { over, body } => CanonicalStep::Iterate {
            over: strip_self_scope(&over),
            body: map_steps(context, &body),
        },

        // 5.
        StatementShape::Call { call } => CanonicalStep::InvokeExternal {
            call: strip_self_scope(&call),
            unclassified: false,
        },

        // 6.
        StatementShape::Return { value } => CanonicalStep::Return {
            value: value.map(|v| strip_self_scope(&v)),
        },

        // 7.
        StatementShape::Raise { error } => CanonicalStep::Raise {
            error: strip_self_scope(&error),
        },

        StatementShape::Unknown { .. } => unclassified(context, fragment),
    }
}

fn unclassified(context: &StepContext<'_>, fragment: &str) -> CanonicalStep {
    let text = fragment.trim();
    warn!(
        entity = %context.entity,
        action = %context.action,
        strategy = context.strategy.name(),
        statement = %text,
        "unclassified statement kept as opaque step"
    );
    CanonicalStep::unclassified(text)
}
