//! Deep merge of configuration trees.
//!
//! Objects combine key-by-key; arrays and scalars from the higher-priority
//! layer replace the lower one wholesale. Arrays are never concatenated.

use serde_json::Value;

/// `overlay` layered over `base`.
///
/// Nested objects combine key by key. Any other overlay value replaces the
/// base value outright, except `null`, which counts as "not specified".
///
/// ```
/// use serde_json::json;
/// use portfolio_config::config::deep_merge;
///
/// let merged = deep_merge(
///     json!({"theme": {"primaryColor": "#111", "font": "Inter"}, "tags": ["a"]}),
///     json!({"theme": {"primaryColor": "#222"}, "tags": ["b", "c"]}),
/// );
/// assert_eq!(merged, json!({"theme": {"primaryColor": "#222", "font": "Inter"}, "tags": ["b", "c"]}));
/// ```
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

/// Layers folded lowest priority first.
pub fn deep_merge_all(layers: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Null;
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

/// Merge `overlay` into `target` in place.
pub fn merge_into(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (_, Value::Null) => {}
        (Value::Object(fields), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match fields.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        fields.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
