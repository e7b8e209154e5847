//! User records in `data/users.json`

use super::{as_map, timestamp};
use crate::cache::VersionedCache;
use crate::config::schema::USERS_PATH;
use serde_json::{Map, Value};

pub struct Users<'a> {
    cache: &'a VersionedCache,
}

impl<'a> Users<'a> {
    pub fn new(cache: &'a VersionedCache) -> Self {
        Self { cache }
    }

    /// Merge `fields` into the user's record and stamp `updated_at`
    pub async fn save(&self, user_id: &str, fields: Map<String, Value>) {
        self.cache
            .update(USERS_PATH, |users| {
                let record = as_map(users)
                    .entry(user_id.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                let record = as_map(record);
                record.extend(fields);
                record.insert("updated_at".to_string(), Value::String(timestamp()));
            })
            .await;
    }

    pub async fn get(&self, user_id: &str) -> Option<Value> {
        self.cache
            .inspect(USERS_PATH, |users| users?.get(user_id).cloned())
            .await
    }

    pub async fn all(&self) -> Map<String, Value> {
        self.cache
            .inspect(USERS_PATH, |users| {
                users.and_then(Value::as_object).cloned().unwrap_or_default()
            })
            .await
    }

    pub async fn delete(&self, user_id: &str) -> bool {
        self.cache
            .update_if(USERS_PATH, |users| {
                users
                    .as_object_mut()
                    .is_some_and(|u| u.remove(user_id).is_some())
            })
            .await
    }

    pub async fn count(&self) -> usize {
        self.cache
            .inspect(USERS_PATH, |users| users.and_then(Value::as_object).map_or(0, Map::len))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryTransport, RemoteClient, RetryPolicy};
    use serde_json::json;
    use std::sync::Arc;

    fn cache() -> VersionedCache {
        let transport = Arc::new(MemoryTransport::new());
        VersionedCache::new(RemoteClient::new(transport, RetryPolicy::default()))
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn save_merges_fields() {
        let cache = cache();
        let users = Users::new(&cache);

        users.save("u1", fields(json!({"name": "Ada", "role": "admin"}))).await;
        users.save("u1", fields(json!({"role": "owner"}))).await;

        let user = users.get("u1").await.unwrap();
        assert_eq!(user["name"], json!("Ada"));
        assert_eq!(user["role"], json!("owner"));
        assert!(user["updated_at"].is_string());
    }

    #[tokio::test]
    async fn delete_and_count() {
        let cache = cache();
        let users = Users::new(&cache);
        users.save("u1", Map::new()).await;
        users.save("u2", Map::new()).await;
        assert_eq!(users.count().await, 2);

        assert!(users.delete("u1").await);
        assert!(!users.delete("u1").await);
        assert_eq!(users.all().await.keys().collect::<Vec<_>>(), vec!["u2"]);
        assert!(users.get("u1").await.is_none());
    }
}
