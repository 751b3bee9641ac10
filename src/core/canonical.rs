//! Canonical specification model
//!
//! The target-neutral form produced by the mapper. A `CanonicalSpecification`
//! is immutable once built: its fields are private, the only constructor
//! validates the schema invariants, and re-tagging returns a new value.

use crate::core::error::{CanonError, Result};
use crate::core::patterns::PatternTag;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use xlang_ir::{SourceFormat, TypeTag};

/// Current version of the persisted document schema
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// Canonical field type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CanonicalType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Identifier,
    Json,
    Reference,
    Enumerated,
    Collection,
    Nullable(Box<CanonicalType>),
}

impl CanonicalType {
    /// Lookup for resolved IR tags; `Unresolved` has no canonical type
    pub fn from_tag(tag: &TypeTag) -> Option<Self> {
        let canonical = match tag {
            TypeTag::Text => CanonicalType::Text,
            TypeTag::Integer => CanonicalType::Integer,
            TypeTag::Decimal => CanonicalType::Decimal,
            TypeTag::Boolean => CanonicalType::Boolean,
            TypeTag::Date => CanonicalType::Date,
            TypeTag::Timestamp => CanonicalType::Timestamp,
            TypeTag::Identifier => CanonicalType::Identifier,
            TypeTag::Json => CanonicalType::Json,
            TypeTag::Reference => CanonicalType::Reference,
            TypeTag::Enumerated => CanonicalType::Enumerated,
            TypeTag::Collection => CanonicalType::Collection,
            TypeTag::Unresolved(_) => return None,
        };
        Some(canonical)
    }

    /// Wrap in `Nullable` (idempotent)
    pub fn nullable(self) -> Self {
        match self {
            CanonicalType::Nullable(_) => self,
            other => CanonicalType::Nullable(Box::new(other)),
        }
    }

    /// Remove one `Nullable` wrapper, if present
    pub fn unwrap_nullable(self) -> Self {
        match self {
            CanonicalType::Nullable(inner) => *inner,
            other => other,
        }
    }

    /// Innermost base type
    pub fn base(&self) -> &CanonicalType {
        match self {
            CanonicalType::Nullable(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, CanonicalType::Nullable(_))
    }

    /// Name of the base type as used in persisted documents
    pub fn base_name(&self) -> &'static str {
        match self.base() {
            CanonicalType::Text => "text",
            CanonicalType::Integer => "integer",
            CanonicalType::Decimal => "decimal",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Date => "date",
            CanonicalType::Timestamp => "timestamp",
            CanonicalType::Identifier => "identifier",
            CanonicalType::Json => "json",
            CanonicalType::Reference => "reference",
            CanonicalType::Enumerated => "enumerated",
            CanonicalType::Collection => "collection",
            CanonicalType::Nullable(_) => "nullable",
        }
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalType::Nullable(inner) => write!(f, "nullable<{}>", inner),
            other => f.write_str(other.base_name()),
        }
    }
}

impl FromStr for CanonicalType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("nullable<").and_then(|r| r.strip_suffix('>')) {
            return Ok(inner.parse::<CanonicalType>()?.nullable());
        }
        match TypeTag::from_name(s) {
            TypeTag::Unresolved(raw) => Err(format!("unknown canonical type '{}'", raw)),
            tag => CanonicalType::from_tag(&tag).ok_or_else(|| format!("unknown canonical type '{}'", s)),
        }
    }
}

impl From<CanonicalType> for String {
    fn from(value: CanonicalType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for CanonicalType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Fields, steps, actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub name: String,
    pub field_type: CanonicalType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<String>,
}

impl CanonicalField {
    pub fn new(name: impl Into<String>, field_type: CanonicalType) -> Self {
        let required = !field_type.is_nullable();
        Self {
            name: name.into(),
            field_type,
            required,
            default: None,
            reference: None,
            enum_values: Vec::new(),
            validations: Vec::new(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One step of a canonical action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CanonicalStep {
    /// Precondition that must hold for the action to proceed
    Validate {
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    MutateField {
        field: String,
        value: String,
    },
    /// Call to anything outside the entity; `unclassified` marks the fallback
    InvokeExternal {
        call: String,
        #[serde(default, skip_serializing_if = "is_false")]
        unclassified: bool,
    },
    Branch {
        condition: String,
        then: Vec<CanonicalStep>,
        #[serde(rename = "else", default)]
        otherwise: Vec<CanonicalStep>,
    },
    Iterate {
        over: String,
        body: Vec<CanonicalStep>,
    },
    Raise {
        error: String,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl CanonicalStep {
    pub fn kind(&self) -> &'static str {
        match self {
            CanonicalStep::Validate { .. } => "validate",
            CanonicalStep::MutateField { .. } => "mutate-field",
            CanonicalStep::InvokeExternal { .. } => "invoke-external",
            CanonicalStep::Branch { .. } => "branch",
            CanonicalStep::Iterate { .. } => "iterate",
            CanonicalStep::Raise { .. } => "raise",
            CanonicalStep::Return { .. } => "return",
        }
    }

    pub fn unclassified(text: impl Into<String>) -> Self {
        CanonicalStep::InvokeExternal {
            call: text.into(),
            unclassified: true,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, CanonicalStep::InvokeExternal { unclassified: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    pub steps: Vec<CanonicalStep>,
}

impl CanonicalAction {
    pub fn new(name: impl Into<String>, steps: Vec<CanonicalStep>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            steps,
        }
    }

    /// Steps in depth-first order, including branch arms and loop bodies
    pub fn all_steps(&self) -> Vec<&CanonicalStep> {
        fn walk<'a>(steps: &'a [CanonicalStep], out: &mut Vec<&'a CanonicalStep>) {
            for step in steps {
                out.push(step);
                match step {
                    CanonicalStep::Branch { then, otherwise, .. } => {
                        walk(then, out);
                        walk(otherwise, out);
                    }
                    CanonicalStep::Iterate { body, .. } => walk(body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.steps, &mut out);
        out
    }
}

// ============================================================================
// Specification
// ============================================================================

/// Canonical, pattern-tagged form of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSpecification {
    entity: String,
    namespace: String,
    fields: Vec<CanonicalField>,
    actions: Vec<CanonicalAction>,
    tags: BTreeSet<PatternTag>,
    source_format: SourceFormat,
}

impl CanonicalSpecification {
    /// Build a specification, enforcing the schema invariants
    pub fn new(
        entity: impl Into<String>,
        namespace: impl Into<String>,
        fields: Vec<CanonicalField>,
        actions: Vec<CanonicalAction>,
        source_format: SourceFormat,
    ) -> Result<Self> {
        let spec = Self {
            entity: entity.into(),
            namespace: namespace.into(),
            fields,
            actions,
            tags: BTreeSet::new(),
            source_format,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        if self.entity.trim().is_empty() {
            return Err(CanonError::schema("<unnamed>", "entity name is empty"));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(CanonError::schema(&self.entity, "field name is empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CanonError::schema(
                    &self.entity,
                    format!("duplicate field '{}'", field.name),
                ));
            }
            match field.field_type.base() {
                CanonicalType::Reference if field.reference.is_none() => {
                    return Err(CanonError::schema(
                        &self.entity,
                        format!("reference field '{}' has no target", field.name),
                    ));
                }
                CanonicalType::Enumerated if field.enum_values.is_empty() => {
                    return Err(CanonError::schema(
                        &self.entity,
                        format!("enumerated field '{}' has no values", field.name),
                    ));
                }
                _ => {}
            }
        }

        let mut actions = BTreeSet::new();
        for action in &self.actions {
            if action.name.trim().is_empty() {
                return Err(CanonError::schema(&self.entity, "action name is empty"));
            }
            if !actions.insert(action.name.as_str()) {
                return Err(CanonError::schema(
                    &self.entity,
                    format!("duplicate action '{}'", action.name),
                ));
            }
        }

        Ok(())
    }

    /// A new specification carrying `tags`; `self` is left untouched
    pub fn with_tags(&self, tags: BTreeSet<PatternTag>) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `namespace.Entity`, or just the entity name without a namespace
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.entity.clone()
        } else {
            format!("{}.{}", self.namespace, self.entity)
        }
    }

    pub fn fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&CanonicalField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn actions(&self) -> &[CanonicalAction] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&CanonicalAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn tags(&self) -> &BTreeSet<PatternTag> {
        &self.tags
    }

    pub fn source_format(&self) -> SourceFormat {
        self.source_format
    }

    /// Number of steps that fell back to the unclassified marker
    pub fn unclassified_steps(&self) -> usize {
        self.actions
            .iter()
            .flat_map(|a| a.all_steps())
            .filter(|s| s.is_unclassified())
            .count()
    }

    // ------------------------------------------------------------------------
    // Persisted document
    // ------------------------------------------------------------------------

    pub fn to_document(&self) -> SpecDocument {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    FieldDocument {
                        field_type: f.field_type.base_name().to_string(),
                        required: f.required,
                        default: f.default.clone(),
                        reference: f.reference.clone(),
                        enum_values: f.enum_values.clone(),
                        validations: f.validations.clone(),
                    },
                )
            })
            .collect();

        SpecDocument {
            entity: self.entity.clone(),
            namespace: self.namespace.clone(),
            fields,
            actions: self.actions.clone(),
            tags: self.tags.iter().copied().collect(),
            schema_version: SCHEMA_VERSION,
            source_format: Some(self.source_format),
        }
    }

    /// Rebuild from a persisted document (fields come back ordered by name)
    pub fn from_document(doc: SpecDocument) -> Result<Self> {
        if doc.schema_version > SCHEMA_VERSION {
            return Err(CanonError::schema(
                &doc.entity,
                format!(
                    "document schema version {} is newer than supported version {}",
                    doc.schema_version, SCHEMA_VERSION
                ),
            ));
        }

        let mut fields = Vec::with_capacity(doc.fields.len());
        for (name, field) in doc.fields {
            let base: CanonicalType = field
                .field_type
                .parse()
                .map_err(|message: String| CanonError::schema(&doc.entity, message))?;
            let field_type = if field.required { base } else { base.nullable() };
            fields.push(CanonicalField {
                name,
                field_type,
                required: field.required,
                default: field.default,
                reference: field.reference,
                enum_values: field.enum_values,
                validations: field.validations,
            });
        }

        let spec = Self::new(
            doc.entity,
            doc.namespace,
            fields,
            doc.actions,
            doc.source_format.unwrap_or(SourceFormat::Unknown),
        )?;
        Ok(spec.with_tags(doc.tags.into_iter().collect()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SpecDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// SHA-256 of the compact persisted document
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.to_document()).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Persisted form of a canonical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDocument {
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<String>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Persisted canonical specification
///
/// Keys: `entity`, `namespace`, `fields`, `actions`, `_tags`, plus the
/// additive `_schema_version` and `_source_format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    pub entity: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDocument>,
    #[serde(default)]
    pub actions: Vec<CanonicalAction>,
    #[serde(rename = "_tags", default)]
    pub tags: Vec<PatternTag>,
    #[serde(rename = "_schema_version", default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(rename = "_source_format", default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<SourceFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> CanonicalSpecification {
        let mut status = CanonicalField::new("status", CanonicalType::Enumerated);
        status.enum_values = vec!["lead".to_string(), "qualified".to_string()];
        status.default = Some("lead".to_string());

        let mut company = CanonicalField::new("company_id", CanonicalType::Reference.nullable());
        company.reference = Some("Company".to_string());

        let action = CanonicalAction::new(
            "qualify_lead",
            vec![
                CanonicalStep::Validate {
                    condition: "status == \"lead\"".to_string(),
                    error: None,
                },
                CanonicalStep::MutateField {
                    field: "status".to_string(),
                    value: "\"qualified\"".to_string(),
                },
                CanonicalStep::Return {
                    value: Some("True".to_string()),
                },
            ],
        );

        CanonicalSpecification::new(
            "Contact",
            "crm.models",
            vec![
                CanonicalField::new("email", CanonicalType::Text),
                status,
                company,
            ],
            vec![action],
            SourceFormat::Python,
        )
        .unwrap()
    }

    #[test]
    fn test_nullable_wrapping() {
        let t = CanonicalType::Text.nullable();
        assert!(t.is_nullable());
        assert_eq!(t.clone().nullable(), t, "nullable is idempotent");
        assert_eq!(t.base(), &CanonicalType::Text);
        assert_eq!(t.unwrap_nullable(), CanonicalType::Text);
        assert_eq!(CanonicalType::Integer.unwrap_nullable(), CanonicalType::Integer);
    }

    #[test]
    fn test_type_display_and_parse() {
        let t = CanonicalType::Timestamp.nullable();
        assert_eq!(t.to_string(), "nullable<timestamp>");
        assert_eq!("nullable<timestamp>".parse::<CanonicalType>().unwrap(), t);
        assert!("unknown_type".parse::<CanonicalType>().is_err());
        assert_eq!(CanonicalType::from_tag(&TypeTag::Unresolved("X".to_string())), None);
    }

    #[test]
    fn test_schema_errors() {
        let dup = CanonicalSpecification::new(
            "Contact",
            "",
            vec![
                CanonicalField::new("email", CanonicalType::Text),
                CanonicalField::new("email", CanonicalType::Text),
            ],
            vec![],
            SourceFormat::Python,
        );
        assert!(matches!(dup, Err(CanonError::Schema { .. })));

        let empty = CanonicalSpecification::new("", "", vec![], vec![], SourceFormat::Python);
        assert!(empty.is_err());

        let dangling = CanonicalSpecification::new(
            "Contact",
            "",
            vec![CanonicalField::new("company", CanonicalType::Reference)],
            vec![],
            SourceFormat::Python,
        );
        assert!(dangling.unwrap_err().to_string().contains("no target"));

        let actions = CanonicalSpecification::new(
            "Contact",
            "",
            vec![],
            vec![
                CanonicalAction::new("archive", vec![]),
                CanonicalAction::new("archive", vec![]),
            ],
            SourceFormat::Python,
        );
        assert!(actions.unwrap_err().to_string().contains("duplicate action"));
    }

    #[test]
    fn test_with_tags_produces_new_value() {
        let spec = contact();
        let tagged = spec.with_tags([PatternTag::StatusLifecycle].into_iter().collect());
        assert!(spec.tags().is_empty());
        assert_eq!(tagged.tags().len(), 1);
        assert_ne!(spec.fingerprint(), tagged.fingerprint());
    }

    #[test]
    fn test_document_keys() {
        let spec = contact().with_tags([PatternTag::AuditTriad].into_iter().collect());
        let value = serde_json::to_value(spec.to_document()).unwrap();

        assert_eq!(value["entity"], "Contact");
        assert_eq!(value["namespace"], "crm.models");
        assert_eq!(value["_tags"], serde_json::json!(["audit-triad"]));
        assert_eq!(value["_schema_version"], 1);
        assert_eq!(value["fields"]["status"]["type"], "enumerated");
        assert_eq!(value["fields"]["status"]["enum_values"], serde_json::json!(["lead", "qualified"]));
        assert_eq!(value["fields"]["company_id"]["required"], false);
        assert_eq!(value["fields"]["company_id"]["reference"], "Company");
        assert_eq!(value["actions"][0]["name"], "qualify_lead");
        assert_eq!(value["actions"][0]["steps"][0]["kind"], "validate");
        assert_eq!(value["actions"][0]["steps"][1]["kind"], "mutate-field");

        let keys: Vec<_> = value["fields"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["company_id", "email", "status"]);
    }

    #[test]
    fn test_document_round_trip() {
        let spec = contact().with_tags([PatternTag::StatusLifecycle].into_iter().collect());
        let restored = CanonicalSpecification::from_json(&spec.to_json().unwrap()).unwrap();

        assert_eq!(restored.entity(), "Contact");
        assert_eq!(restored.tags(), spec.tags());
        assert_eq!(restored.actions(), spec.actions());
        assert_eq!(
            restored.field("company_id").unwrap().field_type,
            CanonicalType::Reference.nullable()
        );
        assert_eq!(restored.fingerprint(), spec.fingerprint());
    }

    #[test]
    fn test_newer_schema_version_is_rejected() {
        let mut doc = contact().to_document();
        doc.schema_version = SCHEMA_VERSION + 1;
        assert!(CanonicalSpecification::from_document(doc).is_err());
    }

    #[test]
    fn test_unclassified_step_count() {
        let spec = CanonicalSpecification::new(
            "Job",
            "",
            vec![],
            vec![CanonicalAction::new(
                "run",
                vec![CanonicalStep::Iterate {
                    over: "items".to_string(),
                    body: vec![CanonicalStep::unclassified("with lock:\n    tick()")],
                }],
            )],
            SourceFormat::Python,
        )
        .unwrap();
        assert_eq!(spec.unclassified_steps(), 1);
        assert_eq!(spec.actions()[0].all_steps().len(), 2);
    }
}
