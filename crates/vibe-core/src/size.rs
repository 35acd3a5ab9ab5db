//! Serialized-size estimation
//!
//! A byte-count proxy for how large a value would be as compact JSON.
//! Walks the value tree with a depth guard; a tree deeper than
//! [`MAX_DEPTH`] is treated as unmeasurable and reported as size 0.

use serde::Serialize;
use serde_json::Value;

/// Deepest nesting the estimator will walk
pub const MAX_DEPTH: usize = 64;

/// Rough bytes-per-token ratio used when converting sizes to token counts
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate the compact JSON size of any serializable value
///
/// Serialization failures and over-deep trees both yield 0.
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_value(value).map_or(0, |v| estimate_json_size(&v))
}

/// Estimate the compact JSON size of an already-built value tree
pub fn estimate_json_size(value: &Value) -> usize {
    walk(value, 0).unwrap_or(0)
}

fn walk(value: &Value, depth: usize) -> Option<usize> {
    if depth > MAX_DEPTH {
        return None;
    }

    let size = match value {
        Value::Null | Value::Bool(true) => 4,
        Value::Bool(false) => 5,
        Value::Number(n) => n.to_string().len(),
        Value::String(s) => string_size(s),
        Value::Array(items) => {
            let mut total = 2 + items.len().saturating_sub(1);
            for item in items {
                total += walk(item, depth + 1)?;
            }
            total
        }
        Value::Object(map) => {
            let mut total = 2 + map.len().saturating_sub(1);
            for (key, item) in map {
                // quoted key plus colon
                total += string_size(key) + 1;
                total += walk(item, depth + 1)?;
            }
            total
        }
    };

    Some(size)
}

fn string_size(s: &str) -> usize {
    let escapes = s.chars().filter(|c| matches!(c, '"' | '\\' | '\n' | '\r' | '\t')).count();
    s.len() + escapes + 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_compact_json_length_for_plain_values() {
        let value = serde_json::json!({"a": [1, 2, 3], "b": "text", "c": null, "d": true});
        let exact = serde_json::to_string(&value).unwrap().len();
        assert_eq!(estimate_json_size(&value), exact);
    }

    #[test]
    fn counts_escapes() {
        let value = serde_json::json!("say \"hi\"");
        let exact = serde_json::to_string(&value).unwrap().len();
        assert_eq!(estimate_json_size(&value), exact);
    }

    #[test]
    fn over_deep_tree_reports_zero() {
        let mut value = serde_json::json!(1);
        for _ in 0..=MAX_DEPTH + 1 {
            value = Value::Array(vec![value]);
        }
        assert_eq!(estimate_json_size(&value), 0);
    }

    #[test]
    fn empty_containers() {
        assert_eq!(estimate_json_size(&serde_json::json!([])), 2);
        assert_eq!(estimate_json_size(&serde_json::json!({})), 2);
    }
}
