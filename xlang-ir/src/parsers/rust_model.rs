//! Rust Model Parser
//!
//! Extracts entities from `struct` declarations with named fields and attaches
//! the methods of every `impl` block for the same type in the file.

use super::{find_child_by_kind, module_path, node_text, parse_tree, statement_fragment};
use crate::error::Result;
use crate::ir::{
    to_snake_case, Parameter, ParsedEntity, ParsedField, ParsedMethod, ParsedUnit, SourceFormat,
    TypeTag,
};
use std::collections::BTreeMap;

/// Parse a Rust source file into entities
pub fn parse(source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
    let language: tree_sitter::Language = tree_sitter_rust::LANGUAGE.into();
    let tree = parse_tree(&language, source, origin)?;
    let root = tree.root_node();

    let mut items = Vec::new();
    collect_items(&root, &mut items);

    // Unit-only enums become enumerated value sets
    let mut enums = BTreeMap::new();
    for item in items.iter().filter(|n| n.kind() == "enum_item") {
        if let Some((name, values)) = unit_enum(item, source) {
            enums.insert(name, values);
        }
    }

    let namespace = module_path(origin).replace('.', "::");
    let mut entities: Vec<ParsedEntity> = Vec::new();

    for item in items.iter().filter(|n| n.kind() == "struct_item") {
        if let Some(entity) = extract_struct(item, source, origin, &namespace, &enums) {
            entities.push(entity);
        }
    }

    for item in items.iter().filter(|n| n.kind() == "impl_item") {
        let Some(type_name) = item
            .child_by_field_name("type")
            .map(|t| base_type_name(node_text(&t, source)))
        else {
            continue;
        };
        let Some(entity) = entities.iter_mut().find(|e| e.name == type_name) else {
            continue;
        };

        if let Some(trait_node) = item.child_by_field_name("trait") {
            let trait_name = base_type_name(node_text(&trait_node, source));
            if !entity.supertypes.contains(&trait_name) {
                entity.supertypes.push(trait_name);
            }
        }

        let Some(body) = item.child_by_field_name("body") else {
            continue;
        };
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if child.kind() == "function_item" {
                if let Some(method) = extract_method(&child, &entity.name, source) {
                    entity.methods.push(method);
                }
            }
        }
    }

    Ok(entities.into_iter().map(ParsedUnit::Entity).collect())
}

/// Items at file level and inside inline `mod` blocks, in source order
fn collect_items<'a>(node: &tree_sitter::Node<'a>, items: &mut Vec<tree_sitter::Node<'a>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "struct_item" | "enum_item" | "impl_item" => items.push(child),
            "mod_item" => {
                if let Some(body) = child.child_by_field_name("body") {
                    collect_items(&body, items);
                }
            }
            _ => {}
        }
    }
}

/// `crate::models::Contact<T>` → `Contact`
fn base_type_name(text: &str) -> String {
    let head = text.split('<').next().unwrap_or(text);
    head.rsplit("::").next().unwrap_or(head).trim().to_string()
}

fn unit_enum(item: &tree_sitter::Node, source: &str) -> Option<(String, Vec<String>)> {
    let name = node_text(&item.child_by_field_name("name")?, source).to_string();
    let body = item.child_by_field_name("body")?;

    let mut values = Vec::new();
    let mut cursor = body.walk();
    for variant in body.named_children(&mut cursor) {
        if variant.kind() != "enum_variant" {
            continue;
        }
        if variant.child_by_field_name("body").is_some() {
            return None;
        }
        let variant_name = variant.child_by_field_name("name")?;
        values.push(to_snake_case(node_text(&variant_name, source)));
    }

    (!values.is_empty()).then_some((name, values))
}

/// Attributes and `///` doc lines directly preceding an item
fn leading_annotations(node: &tree_sitter::Node, source: &str) -> (Vec<String>, Option<String>) {
    let mut attributes = Vec::new();
    let mut doc_lines = Vec::new();
    let mut prev = node.prev_named_sibling();

    while let Some(prev_node) = prev {
        match prev_node.kind() {
            "attribute_item" => attributes.insert(0, node_text(&prev_node, source).to_string()),
            "line_comment" => {
                let text = node_text(&prev_node, source);
                match text.strip_prefix("///") {
                    Some(line) => doc_lines.insert(0, line.trim().to_string()),
                    None => break,
                }
            }
            _ => break,
        }
        prev = prev_node.prev_named_sibling();
    }

    let doc = (!doc_lines.is_empty()).then(|| doc_lines.join("\n").trim().to_string());
    (attributes, doc)
}

fn extract_struct(
    item: &tree_sitter::Node,
    source: &str,
    origin: &str,
    namespace: &str,
    enums: &BTreeMap<String, Vec<String>>,
) -> Option<ParsedEntity> {
    let name = node_text(&item.child_by_field_name("name")?, source).to_string();
    let body = item.child_by_field_name("body")?;
    if body.kind() != "field_declaration_list" {
        return None;
    }

    let mut entity = ParsedEntity::new(name, SourceFormat::Rust);
    entity.namespace = namespace.to_string();
    let (decorations, doc) = leading_annotations(item, source);
    entity.decorations = decorations;
    entity.doc = doc;
    entity
        .metadata
        .insert("file_path".to_string(), origin.to_string());
    entity
        .metadata
        .insert("line".to_string(), (item.start_position().row + 1).to_string());

    let mut cursor = body.walk();
    for decl in body.named_children(&mut cursor) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let (Some(name), Some(ty)) = (
            decl.child_by_field_name("name"),
            decl.child_by_field_name("type"),
        ) else {
            continue;
        };
        let field_name = node_text(&name, source);
        if entity.has_field(field_name) {
            continue;
        }
        entity
            .fields
            .push(field_for_rust_type(field_name, node_text(&ty, source), enums));
    }

    Some(entity)
}

/// `Wrapper<inner>` → `inner` when the wrapper's last path segment is in `names`
fn generic_argument<'t>(text: &'t str, names: &[&str]) -> Option<&'t str> {
    let open = text.find('<')?;
    if !text.ends_with('>') {
        return None;
    }
    let head = text[..open].rsplit("::").next().unwrap_or(&text[..open]).trim();
    names
        .contains(&head)
        .then(|| text[open + 1..text.len() - 1].trim())
}

fn field_for_rust_type(
    name: &str,
    type_text: &str,
    enums: &BTreeMap<String, Vec<String>>,
) -> ParsedField {
    let mut trimmed = type_text.trim().trim_start_matches('&').trim_start();
    if let Some(rest) = trimmed.strip_prefix("'static") {
        trimmed = rest.trim_start();
    }
    if let Some(rest) = trimmed.strip_prefix("mut ") {
        trimmed = rest.trim_start();
    }

    if let Some(inner) = generic_argument(trimmed, &["Option"]) {
        return field_for_rust_type(name, inner, enums)
            .optional()
            .with_original_type(type_text);
    }
    if let Some(inner) = generic_argument(trimmed, &["Box", "Rc", "Arc"]) {
        return field_for_rust_type(name, inner, enums).with_original_type(type_text);
    }
    if trimmed.starts_with('[')
        || generic_argument(trimmed, &["Vec", "HashSet", "BTreeSet", "VecDeque"]).is_some()
    {
        return ParsedField::new(name, TypeTag::Collection).with_original_type(type_text);
    }
    if generic_argument(trimmed, &["HashMap", "BTreeMap"]).is_some() {
        return ParsedField::new(name, TypeTag::Json).with_original_type(type_text);
    }

    let base = base_type_name(trimmed);
    if let Some(values) = enums.get(&base) {
        return ParsedField::enumerated(name, values.clone()).with_original_type(type_text);
    }

    let tag = match base.as_str() {
        "String" | "str" | "char" => TypeTag::Text,
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => TypeTag::Integer,
        "f32" | "f64" | "Decimal" | "BigDecimal" => TypeTag::Decimal,
        "bool" => TypeTag::Boolean,
        "NaiveDate" | "Date" => TypeTag::Date,
        "DateTime" | "NaiveDateTime" | "SystemTime" | "OffsetDateTime" | "PrimitiveDateTime"
        | "Timestamp" => TypeTag::Timestamp,
        "Uuid" | "Ulid" => TypeTag::Identifier,
        "Value" | "JsonValue" => TypeTag::Json,
        other => TypeTag::Unresolved(other.to_string()),
    };
    ParsedField::new(name, tag).with_original_type(type_text)
}

fn extract_method(func: &tree_sitter::Node, owner: &str, source: &str) -> Option<ParsedMethod> {
    let name = func.child_by_field_name("name")?;
    let mut method = ParsedMethod::new(node_text(&name, source));

    let (decorations, doc) = leading_annotations(func, source);
    method.decorations = decorations;
    method.doc = doc;
    method.is_async = find_child_by_kind(func, "function_modifiers")
        .map(|m| node_text(&m, source).contains("async"))
        .unwrap_or(false);
    method.return_type = func
        .child_by_field_name("return_type")
        .map(|t| node_text(&t, source).to_string());

    let mut has_receiver = false;
    if let Some(params) = func.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "self_parameter" => has_receiver = true,
                "parameter" => {
                    let pattern = param
                        .child_by_field_name("pattern")
                        .map(|p| node_text(&p, source).trim_start_matches("mut ").to_string())
                        .unwrap_or_default();
                    let ty = param
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).to_string());
                    method.parameters.push(Parameter::new(pattern, ty));
                }
                _ => {}
            }
        }
    }

    method.is_static = !has_receiver;
    method.is_factory = method.is_static
        && method
            .return_type
            .as_deref()
            .map(|rt| returns_owner(rt, owner))
            .unwrap_or(false);

    if let Some(body) = func.child_by_field_name("body") {
        method.body = block_statements(&body, source);
    }

    Some(method)
}

/// `Self`, `Contact`, `Result<Self, E>`, `Option<Contact>`
fn returns_owner(return_type: &str, owner: &str) -> bool {
    return_type
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == "Self" || token == owner)
}

/// Block statements as fragments; a trailing expression becomes `return <expr>`
fn block_statements(block: &tree_sitter::Node, source: &str) -> Vec<String> {
    let mut cursor = block.walk();
    let children: Vec<_> = block
        .named_children(&mut cursor)
        .filter(|n| !matches!(n.kind(), "line_comment" | "block_comment" | "attribute_item"))
        .collect();

    let last = children.len().saturating_sub(1);
    let mut statements = Vec::with_capacity(children.len());

    for (index, stmt) in children.iter().enumerate() {
        let fragment = statement_fragment(stmt, source);
        let is_tail_expression = index == last
            && !matches!(
                stmt.kind(),
                "expression_statement"
                    | "let_declaration"
                    | "empty_statement"
                    | "if_expression"
                    | "match_expression"
                    | "for_expression"
                    | "while_expression"
                    | "loop_expression"
                    | "block"
                    | "unit_expression"
                    | "return_expression"
                    | "macro_invocation"
            )
            && !stmt.kind().ends_with("_item");

        if is_tail_expression {
            statements.push(format!("return {}", fragment));
        } else if stmt.kind() != "unit_expression" && stmt.kind() != "empty_statement" {
            statements.push(fragment);
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PaidInFull,
}

/// An invoice issued to a customer.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub total: f64,
    pub status: InvoiceStatus,
    pub lines: Vec<InvoiceLine>,
    pub customer: Customer,
    pub paid_at: Option<DateTime<Utc>>,
}

pub struct Point(i32, i32);

impl Invoice {
    pub fn new(number: String) -> Self {
        Self::draft(number)
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), InvoiceError> {
        if self.status != InvoiceStatus::Sent {
            return Err(InvoiceError::NotSent);
        }
        self.status = InvoiceStatus::PaidInFull;
        self.paid_at = Some(at);
        Ok(())
    }

    /// Whether the invoice still needs payment.
    pub fn is_open(&self) -> bool {
        self.paid_at.is_none()
    }

    pub async fn sync(&self, client: &Client) {
        client.push(self).await;
    }
}

impl Auditable for Invoice {}
"#;

    fn invoice() -> ParsedEntity {
        let units = parse(MODEL, "src/billing/invoice.rs").unwrap();
        assert_eq!(units.len(), 1, "tuple structs and enums are not entities");
        units[0].as_entity().unwrap().clone()
    }

    #[test]
    fn test_struct_fields() {
        let invoice = invoice();
        assert_eq!(invoice.name, "Invoice");
        assert_eq!(invoice.namespace, "billing::invoice");
        assert_eq!(invoice.doc.as_deref(), Some("An invoice issued to a customer."));
        assert_eq!(invoice.decorations, vec!["#[derive(Debug, Clone)]"]);
        assert_eq!(invoice.supertypes, vec!["Auditable"]);

        assert_eq!(invoice.field("id").unwrap().type_tag, TypeTag::Identifier);
        assert_eq!(invoice.field("number").unwrap().type_tag, TypeTag::Text);
        assert_eq!(invoice.field("total").unwrap().type_tag, TypeTag::Decimal);
        assert_eq!(invoice.field("lines").unwrap().type_tag, TypeTag::Collection);

        let status = invoice.field("status").unwrap();
        assert_eq!(status.type_tag, TypeTag::Enumerated);
        assert_eq!(status.enum_values, vec!["draft", "sent", "paid_in_full"]);

        assert_eq!(
            invoice.field("customer").unwrap().type_tag,
            TypeTag::Unresolved("Customer".to_string())
        );

        let paid_at = invoice.field("paid_at").unwrap();
        assert_eq!(paid_at.type_tag, TypeTag::Timestamp);
        assert!(!paid_at.required);
        assert_eq!(paid_at.original_type, "Option<DateTime<Utc>>");
    }

    #[test]
    fn test_methods_and_flags() {
        let invoice = invoice();
        let names: Vec<_> = invoice.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["new", "mark_paid", "is_open", "sync"]);

        let new = &invoice.methods[0];
        assert!(new.is_static);
        assert!(new.is_factory);

        let mark_paid = &invoice.methods[1];
        assert!(!mark_paid.is_static);
        assert_eq!(mark_paid.parameters.len(), 1);
        assert_eq!(mark_paid.parameters[0].name, "at");
        assert_eq!(
            mark_paid.body,
            vec![
                "if self.status != InvoiceStatus::Sent {\n    return Err(InvoiceError::NotSent);\n}",
                "self.status = InvoiceStatus::PaidInFull;",
                "self.paid_at = Some(at);",
                "return Ok(())",
            ]
        );

        let is_open = &invoice.methods[2];
        assert_eq!(is_open.doc.as_deref(), Some("Whether the invoice still needs payment."));
        assert_eq!(is_open.body, vec!["return self.paid_at.is_none()"]);

        assert!(invoice.methods[3].is_async);
    }

    #[test]
    fn test_type_helpers() {
        assert_eq!(base_type_name("crate::models::Contact<T>"), "Contact");
        assert_eq!(generic_argument("Option<String>", &["Option"]), Some("String"));
        assert_eq!(generic_argument("std::vec::Vec<u8>", &["Vec"]), Some("u8"));
        assert!(returns_owner("Result<Self, Error>", "Invoice"));
        assert!(!returns_owner("bool", "Invoice"));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = parse("pub struct Broken {\n    id: u32,\n", "broken.rs").unwrap_err();
        assert!(err.location().is_some());
    }

    #[test]
    fn test_parsing_is_deterministic() {
        assert_eq!(
            parse(MODEL, "src/billing/invoice.rs").unwrap(),
            parse(MODEL, "src/billing/invoice.rs").unwrap()
        );
    }
}
