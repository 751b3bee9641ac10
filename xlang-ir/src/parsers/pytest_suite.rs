//! Pytest Suite Parser
//!
//! Turns a pytest (or unittest-style) module into a single `ParsedTest`:
//! module-level `test_*` functions and `test_*` methods of `Test*` classes
//! become cases, `@pytest.fixture` functions become fixtures. Class methods are
//! named `Class::method` so two classes may share a method name.

use super::python_model::{body_statements, extract_parameters};
use super::{clean_doc, node_text, parse_tree, unquote};
use crate::error::Result;
use crate::ir::{to_pascal_case, ParsedFixture, ParsedTest, ParsedTestCase, ParsedUnit, SourceFormat};
use std::path::Path;

/// Parse a pytest module
pub fn parse(source: &str, origin: &str) -> Result<Vec<ParsedUnit>> {
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    let tree = parse_tree(&language, source, origin)?;
    let root = tree.root_node();

    let module_name = module_stem(origin);
    let mut suite = ParsedTest::new(module_name.clone(), SourceFormat::Pytest);
    suite.subject = subject_from_module(&module_name);
    suite.framework = "pytest".to_string();
    suite
        .metadata
        .insert("file_path".to_string(), origin.to_string());

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let (def, decorators) = unwrap_decorated(&child, source);
        let Some(def) = def else {
            continue;
        };

        match def.kind() {
            "function_definition" => visit_function(&def, &decorators, source, &mut suite, None),
            "class_definition" => visit_class(&def, source, &mut suite),
            _ => {}
        }
    }

    Ok(vec![ParsedUnit::Test(suite)])
}

/// `tests/test_contact.py` → `test_contact`
fn module_stem(origin: &str) -> String {
    Path::new(origin)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "tests".to_string())
}

/// `test_contact` → `Contact`, `invoice_line_test` → `InvoiceLine`
fn subject_from_module(module: &str) -> String {
    let stem = module
        .strip_prefix("test_")
        .or_else(|| module.strip_suffix("_test"))
        .unwrap_or(module);
    to_pascal_case(stem)
}

/// Split a (possibly decorated) definition into the definition and its decorator texts
fn unwrap_decorated<'a>(
    node: &tree_sitter::Node<'a>,
    source: &str,
) -> (Option<tree_sitter::Node<'a>>, Vec<String>) {
    match node.kind() {
        "function_definition" | "class_definition" => (Some(*node), Vec::new()),
        "decorated_definition" => {
            let mut cursor = node.walk();
            let decorators = node
                .named_children(&mut cursor)
                .filter(|n| n.kind() == "decorator")
                .map(|n| node_text(&n, source).to_string())
                .collect();
            (node.child_by_field_name("definition"), decorators)
        }
        _ => (None, Vec::new()),
    }
}

fn is_fixture(decorators: &[String]) -> bool {
    decorators.iter().any(|d| {
        let d = d.trim_start_matches('@');
        d.starts_with("pytest.fixture") || d.starts_with("fixture")
    })
}

/// `@pytest.fixture(scope="module")` → `module`
fn fixture_scope(decorators: &[String]) -> Option<String> {
    decorators.iter().find_map(|d| {
        let start = d.find("scope")?;
        let rest = d[start + "scope".len()..].trim_start().strip_prefix('=')?;
        let value: String = rest
            .trim_start()
            .chars()
            .take_while(|c| *c != ',' && *c != ')')
            .collect();
        Some(unquote(&value))
    })
}

fn visit_function(
    func: &tree_sitter::Node,
    decorators: &[String],
    source: &str,
    suite: &mut ParsedTest,
    class: Option<&str>,
) {
    let Some(name_node) = func.child_by_field_name("name") else {
        return;
    };
    let name = node_text(&name_node, source).to_string();
    let body = func.child_by_field_name("body");

    if is_fixture(decorators) {
        suite.fixtures.push(ParsedFixture {
            name,
            scope: fixture_scope(decorators).unwrap_or_else(|| "function".to_string()),
            body: body.map(|b| body_statements(&b, source)).unwrap_or_default(),
        });
        return;
    }

    // unittest lifecycle hooks behave like function-scoped fixtures
    if class.is_some() && matches!(name.as_str(), "setUp" | "tearDown" | "setup_method" | "teardown_method") {
        suite.fixtures.push(ParsedFixture {
            name,
            scope: "function".to_string(),
            body: body.map(|b| body_statements(&b, source)).unwrap_or_default(),
        });
        return;
    }

    if !name.starts_with("test") {
        return;
    }

    let mut case = match class {
        Some(class) => ParsedTestCase::new(format!("{}::{}", class, name)),
        None => ParsedTestCase::new(name),
    };
    case.line = func.start_position().row + 1;
    case.decorations = decorators.to_vec();
    case.fixtures = extract_parameters(func, source)
        .into_iter()
        .map(|p| p.name)
        .collect();
    if let Some(body) = body {
        case.doc = body
            .named_child(0)
            .filter(|first| first.kind() == "expression_statement")
            .and_then(|first| first.named_child(0))
            .filter(|string| string.kind() == "string")
            .map(|string| clean_doc(node_text(&string, source)));
        case.body = body_statements(&body, source);
    }

    suite.cases.push(case);
}

fn visit_class(class: &tree_sitter::Node, source: &str, suite: &mut ParsedTest) {
    let Some(name_node) = class.child_by_field_name("name") else {
        return;
    };
    let class_name = node_text(&name_node, source);
    if !class_name.starts_with("Test") {
        return;
    }

    if let Some(bases) = class.child_by_field_name("superclasses") {
        if node_text(&bases, source).contains("TestCase") {
            suite.framework = "unittest".to_string();
        }
    }

    let Some(body) = class.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        let (def, decorators) = unwrap_decorated(&child, source);
        if let Some(def) = def.filter(|d| d.kind() == "function_definition") {
            visit_function(&def, &decorators, source, suite, Some(class_name));
        }
    }
}
