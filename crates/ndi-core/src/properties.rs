//! Dot-path access into the open property tree.
//!
//! Documents carry an arbitrary nested key→value tree (`serde_json::Value`
//! with insertion order preserved). Well-known namespaces have typed
//! accessors on [`Document`](crate::document::Document); everything else is
//! reached through these helpers with paths such as `"element.name"`.

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Splits a dot path into its segments, rejecting empty segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, CoreError> {
    if path.is_empty() {
        return Err(CoreError::invalid("property path is empty"));
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(CoreError::invalid(format!(
            "property path '{}' has an empty segment",
            path
        )));
    }
    Ok(parts)
}

/// Looks up `path` in `root`. Missing keys and non-object intermediates
/// yield `None`.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = root;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// Fails if an intermediate segment already holds a non-object value.
pub fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), CoreError> {
    let parts = split_path(path)?;
    let (last, intermediate) = match parts.split_last() {
        Some(split) => split,
        None => return Err(CoreError::invalid("property path is empty")),
    };

    let mut current = root;
    for part in intermediate {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::invalid(format!(
                    "cannot assign '{}': '{}' is not an object",
                    path, part
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Flattens a tree into `(dot.path, leaf)` pairs. Arrays are leaves.
pub fn flatten(root: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((prefix, value)) = stack.pop() {
        match value {
            Value::Object(map) => {
                // Reverse so the output keeps insertion order.
                for (key, child) in map.iter().rev() {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    stack.push((path, child));
                }
            }
            leaf => out.push((prefix, leaf.clone())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_nested_value() {
        let tree = json!({"a": {"b": {"c": 3}}});
        assert_eq!(get_path(&tree, "a.b.c"), Some(&json!(3)));
        assert_eq!(get_path(&tree, "a.b"), Some(&json!({"c": 3})));
    }

    #[test]
    fn get_missing_or_through_leaf_is_none() {
        let tree = json!({"a": {"b": 1}});
        assert_eq!(get_path(&tree, "a.x"), None);
        assert_eq!(get_path(&tree, "a.b.c"), None);
        assert_eq!(get_path(&tree, ""), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut map = Map::new();
        set_path(&mut map, "x.y.z", json!("v")).unwrap();
        assert_eq!(Value::Object(map), json!({"x": {"y": {"z": "v"}}}));
    }

    #[test]
    fn set_through_leaf_fails() {
        let mut map = Map::new();
        set_path(&mut map, "x", json!(1)).unwrap();
        let err = set_path(&mut map, "x.y", json!(2)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn split_rejects_empty_segments() {
        assert!(split_path("a..b").is_err());
        assert!(split_path("").is_err());
        assert_eq!(split_path("a.b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn flatten_preserves_order() {
        let tree = json!({"b": {"y": 1, "x": 2}, "a": [1, 2]});
        let flat = flatten(&tree);
        let keys: Vec<&str> = flat.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b.y", "b.x", "a"]);
    }
}
