//! Python Model Parser
//!
//! Extracts entities from Python model classes using Tree-sitter. Supports
//! SQLAlchemy (`Column`, `mapped_column`, `Mapped[...]`), Django
//! (`models.XField`) and annotation-only classes (dataclasses, pydantic).

use super::{clean_doc, find_child_by_kind, module_path, node_text, parse_tree, statement_fragment, unquote};
use crate::error::Result;
use crate::ir::{
    singularize, to_pascal_case, Parameter, ParsedEntity, ParsedField, ParsedMethod, ParsedUnit,
    SourceFormat, TypeTag,
};
use std::collections::BTreeMap;

/// Enum classes declared in the module, by name
type ModuleEnums = BTreeMap<String, Vec<String>>;

/// Parse a Python module into entities
pub fn parse(source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    let tree = parse_tree(&language, source, origin)?;
    let root = tree.root_node();

    let classes = top_level_classes(&root);

    let mut enums = ModuleEnums::new();
    for (class, _) in &classes {
        if is_enum_class(class, source) {
            if let Some(name) = class_name(class, source) {
                enums.insert(name, enum_values(class, source));
            }
        }
    }

    let namespace = module_path(origin);
    let mut units = Vec::new();

    for (class, decorators) in &classes {
        if is_enum_class(class, source) {
            continue;
        }
        let Some(entity) = extract_entity(class, decorators, source, origin, &namespace, &enums) else {
            continue;
        };
        if entity.fields.is_empty() && entity.methods.is_empty() {
            continue;
        }
        units.push(ParsedUnit::Entity(entity));
    }

    Ok(units)
}

/// Top-level class definitions with their decorator texts
fn top_level_classes<'a>(root: &tree_sitter::Node<'a>) -> Vec<(tree_sitter::Node<'a>, Vec<tree_sitter::Node<'a>>)> {
    let mut classes = Vec::new();
    let mut cursor = root.walk();

    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "class_definition" => classes.push((child, Vec::new())),
            "decorated_definition" => {
                if let Some(def) = child.child_by_field_name("definition") {
                    if def.kind() == "class_definition" {
                        let mut dcursor = child.walk();
                        let decorators = child
                            .named_children(&mut dcursor)
                            .filter(|n| n.kind() == "decorator")
                            .collect();
                        classes.push((def, decorators));
                    }
                }
            }
            _ => {}
        }
    }

    classes
}

fn class_name(class: &tree_sitter::Node, source: &str) -> Option<String> {
    class
        .child_by_field_name("name")
        .map(|n| node_text(&n, source).to_string())
}

/// Base class expressions (keyword arguments such as `metaclass=` excluded)
fn superclasses(class: &tree_sitter::Node, source: &str) -> Vec<String> {
    let Some(args) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
        .map(|n| node_text(&n, source).to_string())
        .collect()
}

fn is_enum_class(class: &tree_sitter::Node, source: &str) -> bool {
    superclasses(class, source).iter().any(|base| {
        let last = base.rsplit('.').next().unwrap_or(base.as_str());
        last.ends_with("Enum") || last == "TextChoices" || last == "IntegerChoices"
    })
}

/// Member values of an enum class (`LEAD = "lead"` yields `lead`)
fn enum_values(class: &tree_sitter::Node, source: &str) -> Vec<String> {
    let mut values = Vec::new();
    let Some(body) = class.child_by_field_name("body") else {
        return values;
    };

    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        let Some(assignment) = assignment_of(&stmt) else {
            continue;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            continue;
        };
        let member = node_text(&left, source);
        let value = match assignment.child_by_field_name("right") {
            Some(right) if right.kind() == "string" => unquote(node_text(&right, source)),
            Some(right) if right.kind() == "expression_list" => right
                .named_child(0)
                .map(|first| unquote(node_text(&first, source)))
                .unwrap_or_else(|| member.to_lowercase()),
            _ => member.to_lowercase(),
        };
        values.push(value);
    }

    values
}

/// The `assignment` inside an expression statement, if any
fn assignment_of<'a>(stmt: &tree_sitter::Node<'a>) -> Option<tree_sitter::Node<'a>> {
    if stmt.kind() != "expression_statement" {
        return None;
    }
    let inner = stmt.named_child(0)?;
    (inner.kind() == "assignment").then_some(inner)
}

fn extract_entity(
    class: &tree_sitter::Node,
    decorators: &[tree_sitter::Node],
    source: &str,
    origin: &str,
    namespace: &str,
    enums: &ModuleEnums,
) -> Option<ParsedEntity> {
    let name = class_name(class, source)?;
    let mut entity = ParsedEntity::new(name, SourceFormat::Python);
    entity.namespace = namespace.to_string();
    entity.supertypes = superclasses(class, source);
    entity.decorations = decorators
        .iter()
        .map(|d| node_text(d, source).to_string())
        .collect();
    entity
        .metadata
        .insert("file_path".to_string(), origin.to_string());
    entity.metadata.insert(
        "line".to_string(),
        (class.start_position().row + 1).to_string(),
    );

    let body = class.child_by_field_name("body")?;
    entity.doc = docstring(&body, source);

    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        match stmt.kind() {
            "expression_statement" => {
                let Some(assignment) = assignment_of(&stmt) else {
                    continue;
                };
                if let Some(table) = table_name(&assignment, source) {
                    entity.metadata.insert("table".to_string(), table);
                    continue;
                }
                if let Some(field) = extract_field(&assignment, source, enums) {
                    if !entity.has_field(&field.name) {
                        entity.fields.push(field);
                    }
                }
            }
            "function_definition" => {
                if let Some(method) = extract_method(&stmt, &[], source) {
                    entity.methods.push(method);
                }
            }
            "decorated_definition" => {
                let Some(def) = stmt.child_by_field_name("definition") else {
                    continue;
                };
                if def.kind() != "function_definition" {
                    continue;
                }
                let mut dcursor = stmt.walk();
                let decos: Vec<_> = stmt
                    .named_children(&mut dcursor)
                    .filter(|n| n.kind() == "decorator")
                    .collect();
                if let Some(method) = extract_method(&def, &decos, source) {
                    entity.methods.push(method);
                }
            }
            _ => {}
        }
    }

    Some(entity)
}

/// `__tablename__ = "contacts"`
fn table_name(assignment: &tree_sitter::Node, source: &str) -> Option<String> {
    let left = assignment.child_by_field_name("left")?;
    if node_text(&left, source) != "__tablename__" {
        return None;
    }
    let right = assignment.child_by_field_name("right")?;
    Some(unquote(node_text(&right, source)))
}

/// First statement of a block, when it is a string literal
fn docstring(block: &tree_sitter::Node, source: &str) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let cleaned = clean_doc(node_text(&string, source));
    (!cleaned.is_empty()).then_some(cleaned)
}

// ============================================================================
// Fields
// ============================================================================

/// Column constructors recognized as field declarations
fn is_column_constructor(function: &str) -> bool {
    let last = function.rsplit('.').next().unwrap_or(function);
    matches!(last, "Column" | "mapped_column")
        || last.ends_with("Field")
        || matches!(last, "ForeignKey" | "OneToOneField" | "ManyToManyField")
}

fn extract_field(
    assignment: &tree_sitter::Node,
    source: &str,
    enums: &ModuleEnums,
) -> Option<ParsedField> {
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    let name = node_text(&left, source).to_string();
    if name.starts_with("__") || name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_ascii_digit()) {
        return None;
    }

    let annotation = assignment
        .child_by_field_name("type")
        .map(|t| node_text(&t, source).to_string());
    let right = assignment.child_by_field_name("right");

    let column_call = right.filter(|r| r.kind() == "call").and_then(|call| {
        let function = call.child_by_field_name("function")?;
        let function_name = node_text(&function, source).to_string();
        is_column_constructor(&function_name).then_some((call, function_name))
    });

    match (column_call, annotation) {
        (Some((call, function_name)), annotation) => Some(field_from_column(
            &name,
            &call,
            &function_name,
            annotation.as_deref(),
            source,
            enums,
        )),
        (None, Some(annotation)) => {
            let mut field = field_from_annotation(&name, &annotation, enums);
            if let Some(right) = right {
                field.default = default_from_expression(&right, source);
            }
            Some(field)
        }
        (None, None) => None,
    }
}

/// Field from an annotation such as `Optional[str]` or `Mapped[int]`
fn field_from_annotation(name: &str, annotation: &str, enums: &ModuleEnums) -> ParsedField {
    let (inner, nullable) = unwrap_python_annotation(annotation);
    let mut field = field_for_type_name(name, &inner, enums);
    field.original_type = annotation.to_string();
    field.required = !nullable;
    field
}

/// Strip `Mapped[..]`, `Optional[..]` and `X | None`; report nullability
fn unwrap_python_annotation(annotation: &str) -> (String, bool) {
    let mut current = annotation.trim().to_string();
    let mut nullable = false;

    loop {
        if let Some(inner) = strip_generic(&current, &["Mapped", "sqlalchemy.orm.Mapped"]) {
            current = inner;
        } else if let Some(inner) = strip_generic(&current, &["Optional", "typing.Optional"]) {
            nullable = true;
            current = inner;
        } else if let Some(rest) = current
            .strip_suffix("| None")
            .or_else(|| current.strip_suffix("|None"))
        {
            nullable = true;
            current = rest.trim().to_string();
        } else if let Some(rest) = current.strip_prefix("None |") {
            nullable = true;
            current = rest.trim().to_string();
        } else {
            break;
        }
    }

    (current, nullable)
}

/// `Wrapper[inner]` → `inner` when the wrapper is one of `names`
fn strip_generic(text: &str, names: &[&str]) -> Option<String> {
    let open = text.find('[')?;
    if !text.ends_with(']') || !names.contains(&text[..open].trim()) {
        return None;
    }
    Some(text[open + 1..text.len() - 1].trim().to_string())
}

/// Build a field for a Python type name (`str`, `List[Tag]`, `Status`)
fn field_for_type_name(name: &str, type_name: &str, enums: &ModuleEnums) -> ParsedField {
    if strip_generic(type_name, &["List", "list", "Set", "set", "Sequence", "Tuple", "tuple"]).is_some() {
        return ParsedField::new(name, TypeTag::Collection).with_original_type(type_name);
    }

    if let Some(values) = enums.get(type_name) {
        return ParsedField::enumerated(name, values.clone()).with_original_type(type_name);
    }

    match normalize_python_type(type_name) {
        Some(tag) => ParsedField::new(name, tag).with_original_type(type_name),
        None => ParsedField::new(name, TypeTag::Unresolved(type_name.to_string()))
            .with_original_type(type_name),
    }
}

/// Normalize a Python / SQLAlchemy / Django type name to a tag
fn normalize_python_type(type_name: &str) -> Option<TypeTag> {
    let base = type_name.split('[').next().unwrap_or(type_name);
    let last = base.rsplit('.').next().unwrap_or(base).to_lowercase();

    let tag = match last.as_str() {
        "str" | "string" | "text" | "unicode" | "unicodetext" | "varchar" | "charfield"
        | "textfield" | "emailfield" | "slugfield" | "urlfield" => TypeTag::Text,
        "int" | "integer" | "biginteger" | "smallinteger" | "integerfield" | "bigintegerfield"
        | "smallintegerfield" | "positiveintegerfield" | "autofield" | "bigautofield" => {
            TypeTag::Integer
        }
        "float" | "decimal" | "numeric" | "real" | "decimalfield" | "floatfield" => TypeTag::Decimal,
        "bool" | "boolean" | "booleanfield" => TypeTag::Boolean,
        "date" | "datefield" => TypeTag::Date,
        "datetime" | "timestamp" | "time" | "datetimefield" => TypeTag::Timestamp,
        "uuid" | "uuidfield" => TypeTag::Identifier,
        "dict" | "json" | "jsonb" | "jsonfield" => TypeTag::Json,
        "list" | "array" | "set" | "tuple" | "arrayfield" => TypeTag::Collection,
        "foreignkey" | "onetoonefield" => TypeTag::Reference,
        "manytomanyfield" => TypeTag::Collection,
        "enum" => TypeTag::Enumerated,
        _ => return None,
    };
    Some(tag)
}

/// Positional and keyword arguments of a call
struct CallArgs<'a> {
    positional: Vec<tree_sitter::Node<'a>>,
    keywords: BTreeMap<String, tree_sitter::Node<'a>>,
}

fn call_args<'a>(call: &tree_sitter::Node<'a>, source: &str) -> CallArgs<'a> {
    let mut args = CallArgs {
        positional: Vec::new(),
        keywords: BTreeMap::new(),
    };
    let Some(list) = call.child_by_field_name("arguments") else {
        return args;
    };

    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        match child.kind() {
            "keyword_argument" => {
                if let (Some(name), Some(value)) = (
                    child.child_by_field_name("name"),
                    child.child_by_field_name("value"),
                ) {
                    args.keywords.insert(node_text(&name, source).to_string(), value);
                }
            }
            "comment" => {}
            _ => args.positional.push(child),
        }
    }
    args
}

fn field_from_column(
    name: &str,
    call: &tree_sitter::Node,
    function_name: &str,
    annotation: Option<&str>,
    source: &str,
    enums: &ModuleEnums,
) -> ParsedField {
    let args = call_args(call, source);
    let constructor = function_name.rsplit('.').next().unwrap_or(function_name);
    let is_sqlalchemy = matches!(constructor, "Column" | "mapped_column");

    let mut field = if is_sqlalchemy {
        sqlalchemy_column_type(name, &args, annotation, source, enums)
    } else {
        django_field_type(name, constructor, &args, source, enums)
    };

    // Nullability: SQLAlchemy columns default to nullable, Django fields do not
    let nullable_kw = if is_sqlalchemy { "nullable" } else { "null" };
    let annotated_nullable = annotation
        .map(|a| unwrap_python_annotation(a).1)
        .unwrap_or(false);
    let primary_key = args
        .keywords
        .get("primary_key")
        .map(|v| node_text(v, source) == "True")
        .unwrap_or(false);
    field.required = match args.keywords.get(nullable_kw).map(|v| node_text(v, source)) {
        Some("True") => false,
        Some("False") => true,
        _ if is_sqlalchemy && constructor == "mapped_column" && annotation.is_some() => !annotated_nullable,
        _ if is_sqlalchemy => primary_key,
        _ => true,
    };

    for key in ["default", "server_default"] {
        if field.default.is_none() {
            if let Some(value) = args.keywords.get(key) {
                field.default = Some(unquote(node_text(value, source)));
            }
        }
    }

    if primary_key {
        field.validations.push("primary_key".to_string());
    }
    if args.keywords.get("unique").map(|v| node_text(v, source)) == Some("True") {
        field.validations.push("unique".to_string());
    }
    if let Some(max) = args.keywords.get("max_length") {
        field.validations.push(format!("max_length:{}", node_text(max, source)));
    }

    field
}

fn sqlalchemy_column_type(
    name: &str,
    args: &CallArgs,
    annotation: Option<&str>,
    source: &str,
    enums: &ModuleEnums,
) -> ParsedField {
    // A ForeignKey anywhere among the positional arguments wins
    for arg in &args.positional {
        if arg.kind() != "call" {
            continue;
        }
        let Some(function) = arg.child_by_field_name("function") else {
            continue;
        };
        if node_text(&function, source).rsplit('.').next() == Some("ForeignKey") {
            let fk_args = call_args(arg, source);
            if let Some(target) = fk_args.positional.first() {
                let spec = unquote(node_text(target, source));
                let table = spec.split('.').next().unwrap_or(&spec);
                let entity = to_pascal_case(&singularize(table));
                return ParsedField::reference(name, entity)
                    .with_original_type(node_text(arg, source));
            }
        }
    }

    let Some(type_arg) = args.positional.first() else {
        return match annotation {
            Some(annotation) => field_from_annotation(name, annotation, enums),
            None => ParsedField::new(name, TypeTag::Unresolved("Column".to_string())),
        };
    };

    let original = node_text(type_arg, source).to_string();
    let (type_name, type_args) = match type_arg.kind() {
        "call" => {
            let function = type_arg
                .child_by_field_name("function")
                .map(|f| node_text(&f, source).to_string())
                .unwrap_or_default();
            (function, Some(call_args(type_arg, source)))
        }
        _ => (original.clone(), None),
    };

    let last = type_name.rsplit('.').next().unwrap_or(&type_name);
    if last == "Enum" {
        let values = type_args
            .as_ref()
            .map(|a| enum_literal_values(a, source, enums))
            .unwrap_or_default();
        if !values.is_empty() {
            return ParsedField::enumerated(name, values).with_original_type(original);
        }
    }

    let mut field = field_for_type_name(name, &type_name, enums).with_original_type(original);
    if field.type_tag == TypeTag::Text {
        if let Some(length) = type_args.as_ref().and_then(|a| a.positional.first()) {
            field
                .validations
                .push(format!("max_length:{}", node_text(length, source)));
        }
    }
    field
}

/// Values of `Enum("a", "b")` or `Enum(StatusEnum)`
fn enum_literal_values(args: &CallArgs, source: &str, enums: &ModuleEnums) -> Vec<String> {
    let mut values = Vec::new();
    for arg in &args.positional {
        match arg.kind() {
            "string" => values.push(unquote(node_text(arg, source))),
            "identifier" => {
                if let Some(known) = enums.get(node_text(arg, source)) {
                    values.extend(known.iter().cloned());
                }
            }
            _ => {}
        }
    }
    values
}

fn django_field_type(
    name: &str,
    constructor: &str,
    args: &CallArgs,
    source: &str,
    enums: &ModuleEnums,
) -> ParsedField {
    if matches!(constructor, "ForeignKey" | "OneToOneField") {
        let target = args
            .positional
            .first()
            .map(|t| unquote(node_text(t, source)))
            .or_else(|| args.keywords.get("to").map(|t| unquote(node_text(t, source))))
            .unwrap_or_default();
        let target = target.rsplit('.').next().unwrap_or(&target).to_string();
        return ParsedField::reference(name, target).with_original_type(constructor);
    }

    if let Some(choices) = args.keywords.get("choices") {
        let values = django_choices(choices, source, enums);
        if !values.is_empty() {
            return ParsedField::enumerated(name, values).with_original_type(constructor);
        }
    }

    match normalize_python_type(constructor) {
        Some(tag) => ParsedField::new(name, tag).with_original_type(constructor),
        None => ParsedField::new(name, TypeTag::Unresolved(constructor.to_string()))
            .with_original_type(constructor),
    }
}

/// `choices=[("lead", "Lead"), ...]` or `choices=Status.choices`
fn django_choices(choices: &tree_sitter::Node, source: &str, enums: &ModuleEnums) -> Vec<String> {
    match choices.kind() {
        "list" | "tuple" => {
            let mut values = Vec::new();
            let mut cursor = choices.walk();
            for item in choices.named_children(&mut cursor) {
                let value = match item.kind() {
                    "tuple" | "list" => item.named_child(0).map(|v| unquote(node_text(&v, source))),
                    "string" => Some(unquote(node_text(&item, source))),
                    _ => None,
                };
                values.extend(value);
            }
            values
        }
        "attribute" => choices
            .child_by_field_name("object")
            .and_then(|object| enums.get(node_text(&object, source)).cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Default from `= value`, `= field(default=...)` or `= Field(default=...)`
fn default_from_expression(right: &tree_sitter::Node, source: &str) -> Option<String> {
    if right.kind() == "call" {
        let args = call_args(right, source);
        return args
            .keywords
            .get("default")
            .map(|v| unquote(node_text(v, source)));
    }
    Some(unquote(node_text(right, source)))
}

// ============================================================================
// Methods
// ============================================================================

fn extract_method(
    func: &tree_sitter::Node,
    decorators: &[tree_sitter::Node],
    source: &str,
) -> Option<ParsedMethod> {
    let name = func.child_by_field_name("name")?;
    let mut method = ParsedMethod::new(node_text(&name, source));

    method.decorations = decorators
        .iter()
        .map(|d| node_text(d, source).to_string())
        .collect();
    method.is_factory = method.has_decoration("classmethod");
    method.is_static = method.has_decoration("staticmethod");
    method.is_async = find_child_by_kind(func, "async").is_some();
    method.return_type = func
        .child_by_field_name("return_type")
        .map(|t| node_text(&t, source).to_string());
    method.parameters = extract_parameters(func, source);

    if let Some(body) = func.child_by_field_name("body") {
        method.doc = docstring(&body, source);
        method.body = body_statements(&body, source);
    }

    Some(method)
}

/// Parameters excluding the `self` / `cls` receiver
pub(crate) fn extract_parameters(func: &tree_sitter::Node, source: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    let Some(list) = func.child_by_field_name("parameters") else {
        return params;
    };

    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        let param = match child.kind() {
            "identifier" => Some(Parameter::new(node_text(&child, source), None)),
            "typed_parameter" => {
                let type_annotation = child
                    .child_by_field_name("type")
                    .map(|t| node_text(&t, source).to_string());
                find_child_by_kind(&child, "identifier")
                    .map(|n| Parameter::new(node_text(&n, source), type_annotation))
            }
            "default_parameter" | "typed_default_parameter" => {
                let type_annotation = child
                    .child_by_field_name("type")
                    .map(|t| node_text(&t, source).to_string());
                child
                    .child_by_field_name("name")
                    .map(|n| Parameter::new(node_text(&n, source), type_annotation))
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                Some(Parameter::new(node_text(&child, source), None))
            }
            _ => None,
        };

        if let Some(param) = param {
            if param.name != "self" && param.name != "cls" {
                params.push(param);
            }
        }
    }

    params
}

/// Body statements as dedented fragments, skipping docstring, comments and `pass`
pub(crate) fn body_statements(block: &tree_sitter::Node, source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut cursor = block.walk();

    for (index, stmt) in block.named_children(&mut cursor).enumerate() {
        match stmt.kind() {
            "comment" | "pass_statement" => continue,
            "expression_statement"
                if index == 0 && stmt.named_child(0).map(|n| n.kind()) == Some("string") =>
            {
                continue
            }
            _ => statements.push(statement_fragment(&stmt, source)),
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQLALCHEMY_MODEL: &str = r#"
import enum
from sqlalchemy import Column, Integer, String, DateTime, ForeignKey, Enum

class ContactStatus(enum.Enum):
    LEAD = "lead"
    QUALIFIED = "qualified"

class Contact(Base, TimestampMixin):
    """A CRM contact."""
    __tablename__ = "contacts"

    id = Column(Integer, primary_key=True)
    email = Column(String(255), nullable=False, unique=True)
    status = Column(Enum(ContactStatus), nullable=False, default="lead")
    company_id = Column(Integer, ForeignKey("companies.id"))
    deleted_at = Column(DateTime, nullable=True)
    MAX_RETRIES = 3

    def qualify_lead(self):
        """Move a lead forward."""
        if self.status != "lead":
            return False
        self.status = "qualified"
        notify_sales(self.email)
        return True

    @classmethod
    def from_email(cls, email: str) -> "Contact":
        return cls(email=email)

    async def sync(self, client, retries: int = 3):
        await client.push(self)
"#;

    fn entities(source: &str) -> Vec<ParsedEntity> {
        parse(source, "crm/models.py")
            .unwrap()
            .into_iter()
            .filter_map(|u| u.as_entity().cloned())
            .collect()
    }

    #[test]
    fn test_sqlalchemy_entity_structure() {
        let entities = entities(SQLALCHEMY_MODEL);
        assert_eq!(entities.len(), 1, "enum classes are not entities");

        let contact = &entities[0];
        assert_eq!(contact.name, "Contact");
        assert_eq!(contact.namespace, "crm.models");
        assert_eq!(contact.doc.as_deref(), Some("A CRM contact."));
        assert_eq!(contact.supertypes, vec!["Base", "TimestampMixin"]);
        assert_eq!(contact.metadata.get("table").map(String::as_str), Some("contacts"));
        assert_eq!(contact.file_path(), Some("crm/models.py"));

        let names: Vec<_> = contact.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "status", "company_id", "deleted_at"]);
        assert!(contact.validate().is_ok());
    }

    #[test]
    fn test_sqlalchemy_field_details() {
        let contact = entities(SQLALCHEMY_MODEL).remove(0);

        let id = contact.field("id").unwrap();
        assert_eq!(id.type_tag, TypeTag::Integer);
        assert!(id.required);
        assert!(id.validations.contains(&"primary_key".to_string()));

        let email = contact.field("email").unwrap();
        assert_eq!(email.type_tag, TypeTag::Text);
        assert!(email.required);
        assert!(email.validations.contains(&"unique".to_string()));
        assert!(email.validations.contains(&"max_length:255".to_string()));

        let status = contact.field("status").unwrap();
        assert_eq!(status.type_tag, TypeTag::Enumerated);
        assert_eq!(status.enum_values, vec!["lead", "qualified"]);
        assert_eq!(status.default.as_deref(), Some("lead"));

        let company = contact.field("company_id").unwrap();
        assert_eq!(company.type_tag, TypeTag::Reference);
        assert_eq!(company.reference.as_deref(), Some("Company"));

        let deleted = contact.field("deleted_at").unwrap();
        assert_eq!(deleted.type_tag, TypeTag::Timestamp);
        assert!(!deleted.required);
    }

    #[test]
    fn test_methods_and_flags() {
        let contact = entities(SQLALCHEMY_MODEL).remove(0);
        let names: Vec<_> = contact.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["qualify_lead", "from_email", "sync"]);

        let qualify = &contact.methods[0];
        assert_eq!(qualify.doc.as_deref(), Some("Move a lead forward."));
        assert_eq!(
            qualify.body,
            vec![
                "if self.status != \"lead\":\n    return False",
                "self.status = \"qualified\"",
                "notify_sales(self.email)",
                "return True",
            ]
        );

        let factory = &contact.methods[1];
        assert!(factory.is_factory);
        assert_eq!(factory.parameters.len(), 1);
        assert_eq!(factory.parameters[0].type_annotation.as_deref(), Some("str"));

        let sync = &contact.methods[2];
        assert!(sync.is_async);
        let params: Vec<_> = sync.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["client", "retries"]);
    }

    #[test]
    fn test_django_model() {
        let source = r#"
from django.db import models

class Deal(models.Model):
    title = models.CharField(max_length=200)
    stage = models.CharField(max_length=20, choices=[("open", "Open"), ("won", "Won")])
    owner = models.ForeignKey("accounts.User", on_delete=models.CASCADE, null=True)
    amount = models.DecimalField(max_digits=10, decimal_places=2)
    closed_on = models.DateField(null=True, blank=True)
    objects = DealManager()
"#;
        let deal = entities(source).remove(0);
        let names: Vec<_> = deal.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "stage", "owner", "amount", "closed_on"]);

        assert_eq!(deal.field("stage").unwrap().enum_values, vec!["open", "won"]);
        let owner = deal.field("owner").unwrap();
        assert_eq!(owner.reference.as_deref(), Some("User"));
        assert!(!owner.required);
        assert_eq!(deal.field("amount").unwrap().type_tag, TypeTag::Decimal);
        assert!(!deal.field("closed_on").unwrap().required);
        assert!(deal.field("title").unwrap().required);
    }

    #[test]
    fn test_annotated_dataclass() {
        let source = r#"
from dataclasses import dataclass
from typing import Optional, List

@dataclass
class Invoice:
    number: str
    total: float = 0.0
    paid_at: Optional[datetime] = None
    lines: List[InvoiceLine]
    customer: Customer
"#;
        let invoice = entities(source).remove(0);
        assert_eq!(invoice.decorations, vec!["@dataclass"]);
        assert_eq!(invoice.field("total").unwrap().default.as_deref(), Some("0.0"));
        assert!(!invoice.field("paid_at").unwrap().required);
        assert_eq!(invoice.field("paid_at").unwrap().type_tag, TypeTag::Timestamp);
        assert_eq!(invoice.field("lines").unwrap().type_tag, TypeTag::Collection);
        assert_eq!(
            invoice.field("customer").unwrap().type_tag,
            TypeTag::Unresolved("Customer".to_string())
        );
    }

    #[test]
    fn test_mapped_column_nullability() {
        let source = r#"
class Account(Base):
    name: Mapped[str] = mapped_column(String(80))
    nickname: Mapped[Optional[str]] = mapped_column(String(80))
"#;
        let account = entities(source).remove(0);
        assert!(account.field("name").unwrap().required);
        assert!(!account.field("nickname").unwrap().required);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = parse("class Broken(:\n    pass\n", "broken.py").unwrap_err();
        assert!(err.location().is_some());
        assert!(err.to_string().contains("broken.py"));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let first = parse(SQLALCHEMY_MODEL, "crm/models.py").unwrap();
        let second = parse(SQLALCHEMY_MODEL, "crm/models.py").unwrap();
        assert_eq!(first, second);
    }
}
