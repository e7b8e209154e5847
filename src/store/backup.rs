//! Point-in-time copies of every cached path

use crate::cache::{encode_value, FlushFailure, VersionedCache};
use crate::error::VaultResult;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Root under which backups are written
pub const BACKUP_ROOT: &str = "data/backup";

/// Result of one backup run
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub timestamp: String,
    pub written: Vec<String>,
    pub failed: Vec<FlushFailure>,
}

/// Where `path` is copied for the backup taken at `timestamp`
pub fn backup_path(path: &str, timestamp: &str) -> String {
    match path.strip_prefix("data/") {
        Some(rest) => format!("{}/{}/{}", BACKUP_ROOT, timestamp, rest),
        None => format!("{}/{}/{}", BACKUP_ROOT, timestamp, path),
    }
}

/// Copy every cached value under `data/backup/{timestamp}/`.
///
/// Writes go straight to the remote and never touch the cache. A failed path
/// is reported and the rest are still attempted.
pub async fn create_backup(cache: &VersionedCache) -> VaultResult<BackupReport> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let message = format!("backup {}", timestamp);
    let mut report = BackupReport {
        timestamp: timestamp.clone(),
        written: Vec::new(),
        failed: Vec::new(),
    };

    for (path, value) in cache.snapshot().await {
        let target = backup_path(&path, &timestamp);
        let content = encode_value(&value)?;
        match cache
            .client()
            .write_with_message(&target, &content, None, &message)
            .await
        {
            Ok(_) => report.written.push(target),
            Err(e) => {
                warn!("Backup of {} failed: {}", path, e);
                report.failed.push(FlushFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        timestamp = %report.timestamp,
        written = report.written.len(),
        failed = report.failed.len(),
        "Backup created"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::decode_content;
    use crate::remote::{MemoryTransport, RemoteClient, RetryPolicy};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn backup_paths_replace_data_prefix() {
        assert_eq!(
            backup_path("data/users.json", "20260101_120000"),
            "data/backup/20260101_120000/users.json"
        );
        assert_eq!(
            backup_path("notes.txt", "20260101_120000"),
            "data/backup/20260101_120000/notes.txt"
        );
    }

    #[tokio::test]
    async fn copies_every_cached_path() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = VersionedCache::new(RemoteClient::new(transport.clone(), RetryPolicy::default()));
        cache.set("data/users.json", json!({"u1": {}})).await;
        cache.set("data/memory.json", json!({"general": {}})).await;

        let report = create_backup(&cache).await.unwrap();

        assert_eq!(report.written.len(), 2);
        assert!(report.failed.is_empty());
        let copy = backup_path("data/users.json", &report.timestamp);
        let stored = transport.get(&copy).unwrap();
        assert_eq!(decode_content(&copy, &stored).unwrap(), json!({"u1": {}}));
        // Backups leave the cache untouched
        assert_eq!(cache.paths().await.len(), 2);
        assert_eq!(cache.dirty_count().await, 2);
    }
}
