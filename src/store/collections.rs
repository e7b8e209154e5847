//! Named collections of keyed JSON values in `data/database.json`

use super::{child_map, child_map_mut, ensure_map};
use crate::cache::VersionedCache;
use crate::config::schema::DATABASE_PATH;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub struct Collections<'a> {
    cache: &'a VersionedCache,
}

impl<'a> Collections<'a> {
    pub fn new(cache: &'a VersionedCache) -> Self {
        Self { cache }
    }

    /// Copy of a whole collection, creating it empty if it does not exist
    pub async fn collection(&self, name: &str) -> Map<String, Value> {
        self.cache
            .update_if(DATABASE_PATH, |db| {
                if child_map(Some(&*db), name).is_some() {
                    return false;
                }
                ensure_map(db, name);
                true
            })
            .await;
        self.cache
            .inspect(DATABASE_PATH, |db| child_map(db, name).cloned())
            .await
            .unwrap_or_default()
    }

    pub async fn set_value(&self, collection: &str, key: &str, value: Value) {
        self.cache
            .update(DATABASE_PATH, |db| {
                ensure_map(db, collection).insert(key.to_string(), value);
            })
            .await;
    }

    pub async fn get_value(&self, collection: &str, key: &str) -> Option<Value> {
        self.cache
            .inspect(DATABASE_PATH, |db| {
                child_map(db, collection).and_then(|c| c.get(key)).cloned()
            })
            .await
    }

    pub async fn delete_value(&self, collection: &str, key: &str) -> bool {
        self.cache
            .update_if(DATABASE_PATH, |db| {
                child_map_mut(db, collection).is_some_and(|c| c.remove(key).is_some())
            })
            .await
    }

    pub async fn list_keys(&self, collection: &str) -> Vec<String> {
        self.cache
            .inspect(DATABASE_PATH, |db| {
                child_map(db, collection)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .await
    }

    /// Object values in `collection` whose fields equal every field of
    /// `query`. Each match carries its key under `_key`.
    pub async fn search(&self, collection: &str, query: &Map<String, Value>) -> Vec<Value> {
        self.cache
            .inspect(DATABASE_PATH, |db| {
                let Some(items) = child_map(db, collection) else {
                    return Vec::new();
                };
                items
                    .iter()
                    .filter_map(|(key, value)| {
                        let fields = value.as_object()?;
                        let matches = query.iter().all(|(qk, qv)| fields.get(qk) == Some(qv));
                        if !matches {
                            return None;
                        }
                        let mut hit = Map::with_capacity(fields.len() + 1);
                        hit.insert("_key".to_string(), Value::String(key.clone()));
                        hit.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                        Some(Value::Object(hit))
                    })
                    .collect()
            })
            .await
    }

    /// Number of entries in each collection
    pub async fn sizes(&self) -> BTreeMap<String, usize> {
        self.cache
            .inspect(DATABASE_PATH, |db| {
                db.and_then(Value::as_object)
                    .map(|db| {
                        db.iter()
                            .map(|(name, items)| {
                                let len = match items {
                                    Value::Object(map) => map.len(),
                                    Value::Array(list) => list.len(),
                                    _ => 0,
                                };
                                (name.clone(), len)
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .await
    }
}
