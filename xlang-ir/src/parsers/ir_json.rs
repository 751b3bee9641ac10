//! IR JSON reader
//!
//! Lets parsers living outside this crate hand over IR as JSON: either one
//! tagged unit or an array of them. Entities are validated on the way in.

use crate::error::{ParseError, Result};
use crate::ir::ParsedUnit;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Many(Vec<ParsedUnit>),
    One(Box<ParsedUnit>),
}

/// Parse serialized IR units
pub fn parse(source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
    let document: Document = serde_json::from_str(source).map_err(|e| {
        ParseError::syntax(origin, e.line(), e.column().saturating_sub(1), e.to_string())
    })?;

    let units = match document {
        Document::Many(units) => units,
        Document::One(unit) => vec![*unit],
    };

    for unit in &units {
        if let ParsedUnit::Entity(entity) = unit {
            entity.validate()?;
        }
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TypeTag;

    #[test]
    fn test_single_and_many() {
        let one = r#"{"kind": "entity", "name": "Contact", "source_format": "python",
                      "fields": [{"name": "email", "field_type": "text"}]}"#;
        let units = parse(one, "contact.ir.json").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_entity().unwrap().fields[0].type_tag, TypeTag::Text);

        let many = r#"[
            {"kind": "entity", "name": "Contact", "source_format": "python"},
            {"kind": "test", "name": "test_contact", "source_format": "pytest"}
        ]"#;
        let units = parse(many, "crm.ir.json").unwrap();
        assert_eq!(units.len(), 2);
        assert!(units[1].as_test().is_some());
    }

    #[test]
    fn test_unknown_type_is_kept_unresolved() {
        let json = r#"{"kind": "entity", "name": "Lead", "source_format": "python",
                       "fields": [{"name": "owner", "field_type": "unknown_type"}]}"#;
        let units = parse(json, "lead.ir.json").unwrap();
        assert_eq!(
            units[0].as_entity().unwrap().fields[0].type_tag,
            TypeTag::Unresolved("unknown_type".to_string())
        );
    }

    #[test]
    fn test_malformed_json_is_a_syntax_error() {
        let err = parse("{\n  \"kind\": ", "bad.ir.json").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert_eq!(err.location().map(|(line, _)| line), Some(2));
    }

    #[test]
    fn test_invalid_entity_is_rejected() {
        let json = r#"{"kind": "entity", "name": "Deal", "source_format": "python",
                       "fields": [{"name": "stage", "field_type": "enumerated"}]}"#;
        let err = parse(json, "deal.ir.json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidEntity { .. }));
    }
}
