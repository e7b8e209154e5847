//! Saved sessions in `data/sessions.json`
//!
//! Sessions are flushed as soon as they are saved, so `save` reports whether
//! the write reached the remote. A failed flush leaves the path dirty for the
//! background cycle.

use super::{as_map, timestamp};
use crate::cache::VersionedCache;
use crate::config::schema::SESSIONS_PATH;
use crate::error::VaultResult;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Session content as saved by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPayload {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PayloadKind {
    Bytes,
    String,
    Json,
}

/// Stored shape: `{"type": ..., "data": ..., "saved_at": ...}`
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(rename = "type")]
    kind: PayloadKind,
    data: Value,
    saved_at: String,
}

impl SessionRecord {
    fn wrap(payload: SessionPayload) -> Self {
        let (kind, data) = match payload {
            SessionPayload::Bytes(bytes) => (PayloadKind::Bytes, Value::String(STANDARD.encode(bytes))),
            SessionPayload::Text(text) => (PayloadKind::String, Value::String(text)),
            SessionPayload::Json(value) => (PayloadKind::Json, value),
        };
        Self {
            kind,
            data,
            saved_at: timestamp(),
        }
    }

    fn into_payload(self) -> VaultResult<SessionPayload> {
        Ok(match (self.kind, self.data) {
            (PayloadKind::Bytes, Value::String(encoded)) => {
                SessionPayload::Bytes(STANDARD.decode(encoded.as_bytes())?)
            }
            (PayloadKind::String, Value::String(text)) => SessionPayload::Text(text),
            (_, data) => SessionPayload::Json(data),
        })
    }
}

pub struct Sessions<'a> {
    cache: &'a VersionedCache,
}

impl<'a> Sessions<'a> {
    pub fn new(cache: &'a VersionedCache) -> Self {
        Self { cache }
    }

    /// Store a session and flush it. Returns `true` once it is durable.
    pub async fn save(&self, name: &str, payload: SessionPayload) -> VaultResult<bool> {
        let record = serde_json::to_value(SessionRecord::wrap(payload))?;
        self.cache
            .update(SESSIONS_PATH, |sessions| {
                as_map(sessions).insert(name.to_string(), record);
            })
            .await;

        match self.cache.flush_one(SESSIONS_PATH).await {
            Ok(_) => {
                info!("Saved session {}", name);
                Ok(true)
            }
            Err(e) => {
                warn!("Session {} kept locally, flush failed: {}", name, e);
                Ok(false)
            }
        }
    }

    /// Load a session. Entries not in record form come back as JSON.
    pub async fn load(&self, name: &str) -> VaultResult<Option<SessionPayload>> {
        let stored = self
            .cache
            .inspect(SESSIONS_PATH, |sessions| sessions?.get(name).cloned())
            .await;
        let Some(stored) = stored else {
            return Ok(None);
        };

        match serde_json::from_value::<SessionRecord>(stored.clone()) {
            Ok(record) => record.into_payload().map(Some),
            Err(_) => Ok(Some(SessionPayload::Json(stored))),
        }
    }

    pub async fn delete(&self, name: &str) -> bool {
        self.cache
            .update_if(SESSIONS_PATH, |sessions| {
                sessions
                    .as_object_mut()
                    .is_some_and(|s| s.remove(name).is_some())
            })
            .await
    }

    pub async fn list(&self) -> Vec<String> {
        self.cache
            .inspect(SESSIONS_PATH, |sessions| {
                sessions
                    .and_then(Value::as_object)
                    .map(|s| s.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .await
    }
}
