//! Categorized key/value memory in `data/memory.json`

use super::{child_map, child_map_mut, ensure_map, timestamp};
use crate::cache::VersionedCache;
use crate::config::schema::MEMORY_PATH;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Category used when the caller has none
pub const DEFAULT_CATEGORY: &str = "general";

pub struct Memory<'a> {
    cache: &'a VersionedCache,
}

impl<'a> Memory<'a> {
    pub fn new(cache: &'a VersionedCache) -> Self {
        Self { cache }
    }

    /// Store `value` under `key`, replacing any earlier record and its
    /// access statistics
    pub async fn remember(&self, key: &str, value: Value, category: &str) {
        let record = json!({
            "value": value,
            "remembered_at": timestamp(),
            "access_count": 0,
        });
        self.cache
            .update(MEMORY_PATH, |memory| {
                ensure_map(memory, category).insert(key.to_string(), record);
            })
            .await;
    }

    /// Value stored under `key`. Counts as an access.
    pub async fn recall(&self, key: &str, category: &str) -> Option<Value> {
        let mut found = None;
        self.cache
            .update_if(MEMORY_PATH, |memory| {
                let Some(record) = child_map_mut(memory, category)
                    .and_then(|c| c.get_mut(key))
                    .and_then(Value::as_object_mut)
                else {
                    return false;
                };
                let count = record
                    .get("access_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                record.insert("access_count".to_string(), json!(count + 1));
                record.insert("last_accessed".to_string(), json!(timestamp()));
                found = Some(record.get("value").cloned().unwrap_or(Value::Null));
                true
            })
            .await;
        found
    }

    pub async fn forget(&self, key: &str, category: &str) -> bool {
        self.cache
            .update_if(MEMORY_PATH, |memory| {
                child_map_mut(memory, category).is_some_and(|c| c.remove(key).is_some())
            })
            .await
    }

    /// Every value in `category`, keyed by name. Not counted as accesses.
    pub async fn recall_all(&self, category: &str) -> Map<String, Value> {
        self.cache
            .inspect(MEMORY_PATH, |memory| {
                child_map(memory, category)
                    .map(|c| {
                        c.iter()
                            .map(|(key, record)| {
                                let value = record.get("value").cloned().unwrap_or(Value::Null);
                                (key.clone(), value)
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .await
    }

    /// Number of memories in each category
    pub async fn categories(&self) -> BTreeMap<String, usize> {
        self.cache
            .inspect(MEMORY_PATH, |memory| {
                memory
                    .and_then(Value::as_object)
                    .map(|m| {
                        m.iter()
                            .map(|(name, items)| {
                                (name.clone(), items.as_object().map_or(0, Map::len))
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .await
    }
}
