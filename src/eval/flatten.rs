use std::collections::{BTreeMap, HashSet};

use crate::document::{Node, Scalar};
use crate::schema::CanonicalSchema;

/// Canonical value for null, empty strings and "none".
pub const EMPTY_MARKER: &str = "";

const SIGNATURE_DELIMITER: &str = "|";

/// Dotted path to normalized scalar value.
pub type FlatDocument = BTreeMap<String, String>;

pub fn normalize_text(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if normalized == "none" || normalized == "null" {
        EMPTY_MARKER.to_string()
    } else {
        normalized
    }
}

pub fn normalize_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Null => EMPTY_MARKER.to_string(),
        Scalar::Bool(flag) => flag.to_string(),
        Scalar::Number(number) => number.to_string(),
        Scalar::Text(text) => normalize_text(text),
    }
}

/// Flattens a document into `path -> value` pairs.
///
/// Mapping or sequence elements inside sequences are left out; they are
/// scored by record matching instead. Empty containers flatten to the empty
/// marker so that `[]`, `{}` and `null` compare equal.
pub fn flatten(document: &Node) -> FlatDocument {
    let mut flat = FlatDocument::new();
    flatten_into(document, String::new(), &mut flat);
    flat
}

/// Flattens the field sections of a document for field-level scoring.
///
/// Record sections are left out whatever they hold (empty, null, a bare
/// mapping or a list); they are scored only by record matching.
pub fn flatten_fields(document: &Node, schema: &CanonicalSchema) -> FlatDocument {
    let record_sections = schema
        .record_sections()
        .map(|section| section.name)
        .collect::<HashSet<&str>>();

    let Some(entries) = document.as_mapping() else {
        return flatten(document);
    };
    let mut flat = FlatDocument::new();
    for (key, value) in entries {
        if !record_sections.contains(key.as_str()) {
            flatten_into(value, key.clone(), &mut flat);
        }
    }
    flat
}

fn flatten_into(node: &Node, path: String, flat: &mut FlatDocument) {
    match node {
        Node::Scalar(value) => {
            flat.insert(path, normalize_scalar(value));
        }
        Node::Mapping(entries) if entries.is_empty() => {
            flat.insert(path, EMPTY_MARKER.to_string());
        }
        Node::Sequence(items) if items.is_empty() => {
            flat.insert(path, EMPTY_MARKER.to_string());
        }
        Node::Mapping(entries) => {
            for (key, value) in entries {
                flatten_into(value, join_path(&path, key), flat);
            }
        }
        Node::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                if let Node::Scalar(value) = item {
                    flat.insert(join_path(&path, &index.to_string()), normalize_scalar(value));
                }
            }
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Elements of a named section: missing or null is empty, a lone value is a
/// one-element list.
pub fn extract_records<'a>(document: &'a Node, section: &str) -> Vec<&'a Node> {
    match document.get(section) {
        None => Vec::new(),
        Some(value) if value.is_null() => Vec::new(),
        Some(Node::Sequence(items)) => items.iter().collect(),
        Some(value) => vec![value],
    }
}

/// Order-independent text form of a record, used only for fuzzy matching.
///
/// Fields with an empty value are dropped so all-null records have an empty
/// signature.
pub fn signature(record: &Node) -> String {
    match record {
        Node::Scalar(value) => normalize_scalar(value),
        Node::Mapping(entries) => {
            let mut pairs = entries
                .iter()
                .filter_map(|(field, value)| {
                    let rendered = match value {
                        Node::Mapping(_) => {
                            let inner = signature(value);
                            if inner == EMPTY_MARKER {
                                inner
                            } else {
                                format!("{{{inner}}}")
                            }
                        }
                        _ => signature(value),
                    };
                    if rendered == EMPTY_MARKER {
                        None
                    } else {
                        Some((field.trim().to_lowercase(), rendered))
                    }
                })
                .collect::<Vec<(String, String)>>();
            pairs.sort();
            pairs
                .iter()
                .map(|(field, value)| format!("{field}:{value}"))
                .collect::<Vec<String>>()
                .join(SIGNATURE_DELIMITER)
        }
        Node::Sequence(items) => {
            let rendered = items
                .iter()
                .map(signature)
                .filter(|item| item != EMPTY_MARKER)
                .collect::<Vec<String>>();
            if rendered.is_empty() {
                EMPTY_MARKER.to_string()
            } else {
                format!("[{}]", rendered.join(","))
            }
        }
    }
}
