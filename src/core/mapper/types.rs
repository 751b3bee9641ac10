//! Type-level resolution for fields the parser left `Unresolved`

use super::strategy::{find_top_level, split_top_level};
use super::EntityCatalog;
use crate::core::canonical::CanonicalType;
use xlang_ir::{SourceFormat, TypeTag};

/// Container wrappers known for one source format
#[derive(Debug, Clone, Copy)]
pub struct TypeStrategy {
    /// Wrappers that make the inner type nullable
    nullable: &'static [&'static str],
    /// Wrappers that are transparent for typing purposes
    transparent: &'static [&'static str],
    /// Wrappers that make the field a collection
    collections: &'static [&'static str],
    /// Union members that denote absence
    null_markers: &'static [&'static str],
}

const PYTHON: TypeStrategy = TypeStrategy {
    nullable: &["Optional"],
    transparent: &["Mapped", "Annotated", "Final", "ClassVar"],
    collections: &["List", "list", "Set", "set", "Sequence", "Iterable", "Tuple", "tuple", "FrozenSet"],
    null_markers: &["None"],
};

const RUST: TypeStrategy = TypeStrategy {
    nullable: &["Option"],
    transparent: &["Box", "Rc", "Arc", "Cow", "RefCell", "Cell", "Mutex", "RwLock"],
    collections: &["Vec", "HashSet", "BTreeSet", "VecDeque", "SmallVec"],
    null_markers: &[],
};

const TYPESCRIPT: TypeStrategy = TypeStrategy {
    nullable: &["Optional", "Nullable"],
    transparent: &["Readonly", "Promise"],
    collections: &["Array", "ReadonlyArray", "Set", "List", "Collection"],
    null_markers: &["null", "undefined"],
};

const JAVA: TypeStrategy = TypeStrategy {
    nullable: &["Optional"],
    transparent: &[],
    collections: &["List", "Set", "Collection", "ArrayList", "HashSet", "Iterable"],
    null_markers: &[],
};

/// Everything at once, for IR whose source syntax is unknown
const ANY: TypeStrategy = TypeStrategy {
    nullable: &["Optional", "Option", "Nullable"],
    transparent: &["Mapped", "Box", "Rc", "Arc", "Promise", "Readonly"],
    collections: &["List", "list", "Vec", "Array", "Set", "set", "HashSet", "BTreeSet", "Collection", "Sequence"],
    null_markers: &["None", "null", "undefined"],
};

pub fn type_strategy_for(format: SourceFormat) -> TypeStrategy {
    match format {
        SourceFormat::Python | SourceFormat::Pytest => PYTHON,
        SourceFormat::Rust => RUST,
        SourceFormat::TypeScript => TYPESCRIPT,
        SourceFormat::Java => JAVA,
        SourceFormat::Sql | SourceFormat::Ir | SourceFormat::Unknown => ANY,
    }
}

/// A raw type with its container wrappers removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peeled {
    pub name: String,
    pub nullable: bool,
    pub collection: bool,
}

/// Outcome of resolving an `Unresolved` type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub canonical: CanonicalType,
    pub reference: Option<String>,
}

impl TypeStrategy {
    /// Strip wrappers until a bare type name is left
    pub fn peel(&self, raw: &str) -> Peeled {
        let mut nullable = false;
        let mut text = raw.trim().to_string();

        loop {
            text = strip_decorations(&text);

            // `X | None`, `string | null`
            let members = split_top_level(&text, '|');
            if members.len() > 1 {
                let kept: Vec<&str> = members
                    .iter()
                    .copied()
                    .filter(|m| !self.null_markers.contains(m))
                    .collect();
                if kept.len() < members.len() {
                    nullable = true;
                }
                if kept.len() == 1 {
                    text = kept[0].to_string();
                    continue;
                }
                return Peeled {
                    name: text,
                    nullable,
                    collection: false,
                };
            }

            if let Some(inner) = text.strip_suffix("[]") {
                if !inner.contains('[') {
                    return Peeled {
                        name: inner.trim().to_string(),
                        nullable,
                        collection: true,
                    };
                }
            }

            let Some((outer, inner)) = split_generic(&text) else {
                return Peeled {
                    name: last_segment(&text).to_string(),
                    nullable,
                    collection: text.starts_with('['),
                };
            };

            let outer = last_segment(outer);
            if self.collections.contains(&outer) {
                return Peeled {
                    name: inner,
                    nullable,
                    collection: true,
                };
            }
            if self.nullable.contains(&outer) {
                nullable = true;
                text = inner;
            } else if self.transparent.contains(&outer) {
                text = inner;
            } else {
                return Peeled {
                    name: outer.to_string(),
                    nullable,
                    collection: false,
                };
            }
        }
    }
}

/// Quotes (forward references), `&`, `&mut`, lifetimes
fn strip_decorations(text: &str) -> String {
    let mut text = text.trim();
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
        }
    }
    let mut text = text.trim_start_matches('&').trim_start();
    if text.starts_with('\'') {
        text = text.split_once(' ').map_or(text, |(_, rest)| rest).trim_start();
    }
    text.strip_prefix("mut ").unwrap_or(text).trim().to_string()
}

/// `Outer[Inner]` / `Outer<Inner>` into `("Outer", "Inner")`
///
/// For several type arguments the first one is kept.
fn split_generic(text: &str) -> Option<(&str, String)> {
    let (open, close) = match (text.find('['), text.find('<')) {
        (Some(b), Some(a)) if a < b => (a, '>'),
        (Some(b), _) => (b, ']'),
        (None, Some(a)) => (a, '>'),
        (None, None) => return None,
    };
    if open == 0 || !text.ends_with(close) {
        return None;
    }
    let inner = &text[open + 1..text.len() - 1];
    let first = match find_top_level(inner, ",", 0) {
        Some(comma) if !inner[..comma].contains('<') => &inner[..comma],
        _ => inner,
    };
    Some((text[..open].trim(), first.trim().to_string()))
}

fn last_segment(path: &str) -> &str {
    let path = path.trim();
    let after_colons = path.rsplit("::").next().unwrap_or(path);
    after_colons.rsplit('.').next().unwrap_or(after_colons)
}

/// Resolve an `Unresolved` type: collection wrapper, known entity, or a type tag name
pub fn resolve_unresolved(
    strategy: &TypeStrategy,
    raw: &str,
    catalog: &EntityCatalog,
    owner: &str,
) -> Option<(ResolvedType, bool)> {
    let peeled = strategy.peel(raw);

    if peeled.collection {
        return Some((
            ResolvedType {
                canonical: CanonicalType::Collection,
                reference: None,
            },
            peeled.nullable,
        ));
    }

    let resolved = if let Some(entity) = catalog.resolve_for(&peeled.name, owner) {
        ResolvedType {
            canonical: CanonicalType::Reference,
            reference: Some(entity),
        }
    } else {
        let tag = TypeTag::from_name(&peeled.name.to_lowercase());
        ResolvedType {
            canonical: CanonicalType::from_tag(&tag)?,
            reference: None,
        }
    };
    Some((resolved, peeled.nullable))
}
