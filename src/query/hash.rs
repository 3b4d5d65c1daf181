//! Query identity hashing.
//!
//! The identity of a node is a djb2 digest of its canonical JSON text: object
//! keys sorted, `hash` fields left out, and parameter markers replaced by their
//! id. Two trees differing only in key order or in bound parameter values share
//! an identity. This is a cache key, not a cryptographic digest.

use std::fmt::Write;

use serde_json::Value;

use super::node::{Encoding, QueryNode};

/// Identity hash of `node`, as decimal text.
pub fn hash_query(node: &QueryNode) -> String {
    djb2(&canonical_json(node)).to_string()
}

/// The canonical value the identity hash is computed over.
pub fn canonical_value(node: &QueryNode) -> Value {
    node.encode(Encoding::Canonical)
}

/// Compact JSON text of [`canonical_value`], with object keys sorted.
pub fn canonical_json(node: &QueryNode) -> String {
    to_sorted_json(&canonical_value(node))
}

/// Compact JSON with the keys of every object in lexicographic order.
///
/// Arrays keep their order.
pub fn to_sorted_json(value: &Value) -> String {
    let mut out = String::new();
    write_sorted(value, &mut out);
    out
}

fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display of a JSON string value writes it quoted and escaped
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_sorted(item, out);
            }
            out.push('}');
        }
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

/// djb2 (xor variant) over the UTF-16 code units of `text`.
pub fn djb2(text: &str) -> u32 {
    text.encode_utf16()
        .fold(5381u32, |h, unit| h.wrapping_mul(33) ^ u32::from(unit))
}
