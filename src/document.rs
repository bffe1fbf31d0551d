//! Generic configuration documents.
//!
//! Cluster configurations, process arguments and workload descriptions are
//! free-form JSON documents. The provider echoes back far more fields than a
//! test declares, so readiness checks compare documents structurally: every
//! key the test declares must be present with a matching value, anything else
//! the provider reports is ignored.

use serde_json::Value;

/// A free-form configuration document.
pub type Document = Value;

/// An empty mapping document (`{}`).
pub fn empty_document() -> Document {
    Value::Object(serde_json::Map::new())
}

/// Check whether a document carries no configuration at all.
///
/// `null` and `{}` are both treated as empty.
pub fn is_empty_document(doc: &Document) -> bool {
    match doc {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Check that `expected` is a structural subset of `actual`.
///
/// Mappings recurse key by key; keys present only in `actual` are ignored.
/// Sequences and scalars must be equal, with numbers compared by value so
/// `3` matches `3.0`. A mapping expectation never matches a non-mapping.
pub fn is_subset(actual: &Document, expected: &Document) -> bool {
    subset_mismatch(actual, expected).is_none()
}

/// Find the first location where `expected` is not a subset of `actual`.
///
/// Returns the dotted path of the offending key (`"$"` for the root), or
/// `None` when the documents match. An empty expectation (`null` or `{}`)
/// declares nothing and matches any document; a nested `null` value is still
/// compared as a scalar.
pub fn subset_mismatch(actual: &Document, expected: &Document) -> Option<String> {
    if is_empty_document(expected) {
        return None;
    }
    mismatch_at(actual, expected, "$")
}

fn mismatch_at(actual: &Document, expected: &Document, path: &str) -> Option<String> {
    match expected {
        Value::Object(expected_map) => {
            let Value::Object(actual_map) = actual else {
                return Some(path.to_string());
            };
            expected_map.iter().find_map(|(key, expected_value)| {
                let child = format!("{path}.{key}");
                match actual_map.get(key) {
                    Some(actual_value) => mismatch_at(actual_value, expected_value, &child),
                    None => Some(child),
                }
            })
        }
        _ if scalar_eq(actual, expected) => None,
        _ => Some(path.to_string()),
    }
}

fn scalar_eq(actual: &Document, expected: &Document) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(a), Some(e)) => a == e,
            _ => a == e,
        },
        (Value::Array(a), Value::Array(e)) => {
            a.len() == e.len() && a.iter().zip(e).all(|(a, e)| scalar_eq(a, e))
        }
        _ => actual == expected,
    }
}
