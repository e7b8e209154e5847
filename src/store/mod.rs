//! Domain views over the cache
//!
//! Each view owns one well-known path and lays its data out as a JSON object
//! keyed by name. Views borrow the cache and never talk to the remote except
//! where noted (session saves flush eagerly, backups write directly).

pub mod backup;
pub mod collections;
pub mod memory;
pub mod sessions;
pub mod stats;
pub mod users;

pub use backup::{create_backup, BackupReport};
pub use collections::Collections;
pub use memory::{Memory, DEFAULT_CATEGORY};
pub use sessions::{SessionPayload, Sessions};
pub use stats::{collect_stats, VaultStats};
pub use users::Users;

use serde_json::{Map, Value};

/// View `value` as an object, replacing anything else with `{}`
pub fn as_map(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Get the object stored under `key`, creating `{}` when it is missing or
/// not an object
pub fn ensure_map<'a>(value: &'a mut Value, key: &str) -> &'a mut Map<String, Value> {
    let slot = as_map(value)
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    as_map(slot)
}

/// Object stored under `key`, if any
pub(crate) fn child_map<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Map<String, Value>> {
    value?.get(key)?.as_object()
}

/// Mutable object stored under `key`, if any. Never creates anything.
pub(crate) fn child_map_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
    value.get_mut(key)?.as_object_mut()
}

/// Current time in the format stored in records
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_map_creates_nested_object() {
        let mut value = Value::Null;
        ensure_map(&mut value, "users").insert("u1".to_string(), json!(1));
        assert_eq!(value, json!({"users": {"u1": 1}}));
    }

    #[test]
    fn ensure_map_keeps_existing_entries() {
        let mut value = json!({"users": {"u1": 1}, "other": true});
        ensure_map(&mut value, "users").insert("u2".to_string(), json!(2));
        assert_eq!(value, json!({"users": {"u1": 1, "u2": 2}, "other": true}));
    }

    #[test]
    fn ensure_map_replaces_non_object() {
        let mut value = json!({"users": [1, 2]});
        assert!(ensure_map(&mut value, "users").is_empty());
        assert_eq!(value, json!({"users": {}}));
    }

    #[test]
    fn child_map_does_not_create() {
        let mut value = json!({"a": {"x": 1}, "b": 3});
        assert!(child_map(Some(&value), "a").is_some());
        assert!(child_map(Some(&value), "b").is_none());
        assert!(child_map_mut(&mut value, "missing").is_none());
        assert_eq!(value, json!({"a": {"x": 1}, "b": 3}));
    }
}
