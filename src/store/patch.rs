//! JSON merge patch (RFC 7386)

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Merge patch turning `base` into `target`.
///
/// Removed keys become `null`; arrays and scalars are replaced whole.
pub fn merge_patch_diff(base: &Value, target: &Value) -> Value {
    match (base, target) {
        (Value::Object(base), Value::Object(target)) => {
            let mut patch = Map::new();
            for key in base.keys() {
                if !target.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, value) in target {
                match base.get(key) {
                    Some(old) if old == value => {}
                    Some(old @ Value::Object(_)) if value.is_object() => {
                        patch.insert(key.clone(), merge_patch_diff(old, value));
                    }
                    _ => {
                        patch.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(patch)
        }
        _ => target.clone(),
    }
}

/// Apply a merge patch in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in patch {
            if value.is_null() {
                map.remove(key);
            } else {
                apply_merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// The patch changes nothing
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Server-owned metadata a client patch never carries
const SERVER_FIELDS: &[&str] = &[
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
    "deletionTimestamp",
    "managedFields",
];

/// Merge patch of metadata and spec between two objects.
///
/// The status subresource and server-owned metadata are left out.
pub fn object_patch<T: Serialize>(base: &T, obj: &T) -> Result<Value> {
    let mut patch = merge_patch_diff(&serde_json::to_value(base)?, &serde_json::to_value(obj)?);
    if let Value::Object(map) = &mut patch {
        map.remove("status");
        map.remove("apiVersion");
        map.remove("kind");
        let metadata_empty = match map.get_mut("metadata") {
            Some(Value::Object(metadata)) => {
                for field in SERVER_FIELDS {
                    metadata.remove(*field);
                }
                metadata.is_empty()
            }
            _ => false,
        };
        if metadata_empty {
            map.remove("metadata");
        }
    }
    Ok(patch)
}
