//! Response envelope normalization.
//!
//! The backend wraps payloads inconsistently: bare arrays, `{data: [...]}`,
//! `{info: {data: [...]}}`, `{success, <resource>: [...]}`. Each known shape
//! is one [`UnwrapStrategy`]; strategies are tried in a fixed order and the
//! first match wins. Shapes nobody recognizes normalize to an empty
//! sequence, never an error.

use serde_json::Value;

/// Caller-supplied context for unwrapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwrapHints<'a> {
    /// Field some endpoints nest their collection under (`matriculas`).
    pub resource: Option<&'a str>,
}

/// One recognized collection shape.
pub struct UnwrapStrategy {
    pub name: &'static str,
    pub apply: for<'v> fn(&'v Value, &UnwrapHints<'_>) -> Option<&'v Vec<Value>>,
}

/// Collection strategies, in priority order.
pub const COLLECTION_STRATEGIES: &[UnwrapStrategy] = &[
    UnwrapStrategy {
        name: "bare",
        apply: |v, _| v.as_array(),
    },
    UnwrapStrategy {
        name: "data",
        apply: |v, _| v.get("data")?.as_array(),
    },
    UnwrapStrategy {
        name: "info.data",
        apply: |v, _| v.get("info")?.get("data")?.as_array(),
    },
    UnwrapStrategy {
        name: "data.data",
        apply: |v, _| v.get("data")?.get("data")?.as_array(),
    },
    UnwrapStrategy {
        name: "resource",
        apply: |v, hints| v.get(hints.resource?)?.as_array(),
    },
    UnwrapStrategy {
        name: "success.<field>",
        apply: |v, _| {
            let obj = v.as_object()?;
            obj.get("success")?;
            obj.iter()
                .filter(|(k, _)| k.as_str() != "success")
                .find_map(|(_, field)| field.as_array())
        },
    },
];

/// Normalize a collection response to its inner sequence.
pub fn unwrap_collection(value: &Value, hints: &UnwrapHints<'_>) -> Vec<Value> {
    match match_collection(value, hints) {
        Some((_, items)) => items.clone(),
        None => Vec::new(),
    }
}

/// The winning strategy name and its sequence, if any.
pub fn match_collection<'v>(
    value: &'v Value,
    hints: &UnwrapHints<'_>,
) -> Option<(&'static str, &'v Vec<Value>)> {
    COLLECTION_STRATEGIES
        .iter()
        .find_map(|s| (s.apply)(value, hints).map(|items| (s.name, items)))
}

/// Normalize a single-record response.
///
/// Tries `{info: {data: {..}}}`, then `{data: {..}}`, then the object
/// itself. Non-objects normalize to `null`.
pub fn unwrap_record(value: &Value) -> Value {
    let nested = value
        .get("info")
        .and_then(|info| info.get("data"))
        .filter(|v| v.is_object())
        .or_else(|| value.get("data").filter(|v| v.is_object()));
    match nested {
        Some(inner) => inner.clone(),
        None if value.is_object() => value.clone(),
        None => Value::Null,
    }
}
