//! In-memory mirror of remote paths with write-back flushing

use crate::error::{VaultError, VaultResult};
use crate::remote::{Fingerprint, RemoteClient, WriteReceipt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Cached copy of one remote object
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Last fingerprint seen for the path, `None` if never written
    fingerprint: Option<Fingerprint>,
    /// Bumped on every local mutation
    revision: u64,
}

impl CacheEntry {
    fn empty_object() -> Self {
        Self {
            value: Value::Object(Map::new()),
            fingerprint: None,
            revision: 0,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<String, CacheEntry>,
    dirty: BTreeSet<String>,
    /// One write at a time per path
    in_flight: BTreeMap<String, Arc<Mutex<()>>>,
}

/// Path whose flush failed
#[derive(Debug, Clone, Serialize)]
pub struct FlushFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of flushing several paths
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushReport {
    pub flushed: Vec<String>,
    pub failed: Vec<FlushFailure>,
}

impl FlushReport {
    /// Nothing was attempted
    pub fn is_empty(&self) -> bool {
        self.flushed.is_empty() && self.failed.is_empty()
    }

    /// Every attempted path was written
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Serialize a cached value the way it is stored remotely
pub fn encode_value(value: &Value) -> VaultResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Parse remote content: JSON when possible, plain text otherwise
pub fn decode_content(path: &str, content: &[u8]) -> VaultResult<Value> {
    if let Ok(value) = serde_json::from_slice(content) {
        return Ok(value);
    }
    match std::str::from_utf8(content) {
        Ok(text) => Ok(Value::String(text.to_string())),
        Err(_) => Err(VaultError::UndecodableContent {
            path: path.to_string(),
        }),
    }
}

/// Write-back cache over a [`RemoteClient`].
///
/// One mutex guards the entries and the dirty set. It is only ever held for
/// in-memory work; every remote call happens with the lock released.
pub struct VersionedCache {
    client: RemoteClient,
    state: Mutex<CacheState>,
}

impl VersionedCache {
    pub fn new(client: RemoteClient) -> Self {
        Self {
            client,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Read each path through from the remote, replacing any cached copy.
    ///
    /// Absent paths are materialized as `{}` and written back right away so
    /// every process sees the same object. If that write fails the path stays
    /// dirty for the next flush. A read that cannot complete is an error:
    /// creating the object blind could overwrite data we failed to read.
    pub async fn load<S: AsRef<str>>(&self, paths: &[S]) -> VaultResult<()> {
        for path in paths {
            let path = path.as_ref();
            match self.client.read(path).await? {
                Some(object) => {
                    let value = decode_content(path, &object.content)?;
                    self.install(path, value, Some(object.fingerprint), false)
                        .await;
                    info!("Loaded {}", path);
                }
                None => {
                    let value = Value::Object(Map::new());
                    let content = encode_value(&value)?;
                    let message = format!("create {}", path);
                    match self
                        .client
                        .write_with_message(path, &content, None, &message)
                        .await
                    {
                        Ok(receipt) => {
                            self.install(path, value, Some(receipt.fingerprint), false)
                                .await;
                            info!("Created {}", path);
                        }
                        Err(e) => {
                            warn!("Could not create {}, will retry on flush: {}", path, e);
                            self.install(path, value, None, true).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn install(&self, path: &str, value: Value, fingerprint: Option<Fingerprint>, dirty: bool) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let revision = state.entries.get(path).map_or(0, |e| e.revision + 1);
        state.entries.insert(
            path.to_string(),
            CacheEntry {
                value,
                fingerprint,
                revision,
            },
        );
        if dirty {
            state.dirty.insert(path.to_string());
        } else {
            state.dirty.remove(path);
        }
    }

    /// Cached value at `path`. Never reads through to the remote.
    pub async fn get(&self, path: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .entries
            .get(path)
            .map(|e| e.value.clone())
    }

    /// Borrow the cached value without cloning it
    pub async fn inspect<R>(&self, path: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let state = self.state.lock().await;
        f(state.entries.get(path).map(|e| &e.value))
    }

    /// Replace the value at `path` and mark it dirty
    pub async fn set(&self, path: &str, value: Value) {
        self.update(path, |current| *current = value).await;
    }

    /// Replace the value at `path` and flush it immediately.
    ///
    /// On failure the path stays dirty and the background flush retries it.
    pub async fn set_and_flush(&self, path: &str, value: Value) -> VaultResult<WriteReceipt> {
        self.set(path, value).await;
        self.flush_one(path).await
    }

    /// Mutate the value at `path` in place and mark it dirty.
    ///
    /// An uncached path starts out as `{}`.
    pub async fn update<R>(&self, path: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let entry = state
            .entries
            .entry(path.to_string())
            .or_insert_with(CacheEntry::empty_object);
        let result = f(&mut entry.value);
        entry.revision += 1;
        state.dirty.insert(path.to_string());
        result
    }

    /// Like [`update`](Self::update), but only marks the path dirty when the
    /// closure reports a change. An uncached path is only inserted on change.
    pub async fn update_if(&self, path: &str, f: impl FnOnce(&mut Value) -> bool) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let changed = match state.entries.get_mut(path) {
            Some(entry) => {
                let changed = f(&mut entry.value);
                if changed {
                    entry.revision += 1;
                }
                changed
            }
            None => {
                let mut entry = CacheEntry::empty_object();
                let changed = f(&mut entry.value);
                if changed {
                    entry.revision = 1;
                    state.entries.insert(path.to_string(), entry);
                }
                changed
            }
        };

        if changed {
            state.dirty.insert(path.to_string());
        }
        changed
    }

    /// Write the current value of `path` to the remote.
    ///
    /// Flushes of the same path are serialized, so a later flush always
    /// snapshots after the earlier write has landed and can never be
    /// overwritten by it. On success the new fingerprint is recorded and the
    /// path is marked clean, unless it was modified again while the write was
    /// in flight. On failure the path is (re)marked dirty.
    pub async fn flush_one(&self, path: &str) -> VaultResult<WriteReceipt> {
        let slot = {
            let mut state = self.state.lock().await;
            Arc::clone(state.in_flight.entry(path.to_string()).or_default())
        };
        let _writing = slot.lock().await;

        let (content, expected, revision) = {
            let state = self.state.lock().await;
            let entry = state
                .entries
                .get(path)
                .ok_or_else(|| VaultError::NotCached(path.to_string()))?;
            (
                encode_value(&entry.value)?,
                entry.fingerprint.clone(),
                entry.revision,
            )
        };

        let result = self.client.write(path, &content, expected).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match &result {
            Ok(receipt) => {
                if let Some(entry) = state.entries.get_mut(path) {
                    entry.fingerprint = Some(receipt.fingerprint.clone());
                    if entry.revision == revision {
                        state.dirty.remove(path);
                    } else {
                        state.dirty.insert(path.to_string());
                    }
                }
                info!("Saved {}", path);
            }
            Err(e) => {
                if state.entries.contains_key(path) {
                    state.dirty.insert(path.to_string());
                }
                if e.is_retryable() {
                    warn!("Failed to save {}, will retry: {}", path, e);
                } else {
                    error!("Failed to save {}: {}", path, e);
                }
            }
        }
        result
    }

    /// Flush every dirty path.
    ///
    /// The dirty set is swapped out under the lock, then each path is written
    /// with the lock released. Failed paths are marked dirty again; one
    /// failure never stops the remaining paths from being attempted.
    pub async fn flush_all(&self) -> FlushReport {
        let paths: Vec<String> = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.dirty).into_iter().collect()
        };
        if !paths.is_empty() {
            debug!(count = paths.len(), "Flushing dirty paths");
        }
        self.flush_paths(paths).await
    }

    /// Flush every cached path whether dirty or not
    pub async fn force_flush_all(&self) -> FlushReport {
        let paths: Vec<String> = {
            let state = self.state.lock().await;
            state.entries.keys().cloned().collect()
        };
        let report = self.flush_paths(paths).await;
        info!(
            flushed = report.flushed.len(),
            failed = report.failed.len(),
            "Forced flush complete"
        );
        report
    }

    async fn flush_paths(&self, paths: Vec<String>) -> FlushReport {
        let mut report = FlushReport::default();
        for path in paths {
            match self.flush_one(&path).await {
                Ok(_) => report.flushed.push(path),
                Err(VaultError::NotCached(_)) => {
                    // Removed while the flush was running
                }
                Err(e) => report.failed.push(FlushFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    /// Drop `path` from the cache and delete it remotely
    pub async fn remove(&self, path: &str) -> VaultResult<bool> {
        {
            let mut state = self.state.lock().await;
            state.entries.remove(path);
            state.dirty.remove(path);
            state.in_flight.remove(path);
        }
        self.client.delete(path).await
    }

    /// Copy of every cached path and value
    pub async fn snapshot(&self) -> Vec<(String, Value)> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect()
    }

    /// Cached paths in order
    pub async fn paths(&self) -> Vec<String> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    /// Paths waiting to be flushed
    pub async fn dirty_paths(&self) -> Vec<String> {
        self.state.lock().await.dirty.iter().cloned().collect()
    }

    pub async fn dirty_count(&self) -> usize {
        self.state.lock().await.dirty.len()
    }

    pub async fn is_dirty(&self, path: &str) -> bool {
        self.state.lock().await.dirty.contains(path)
    }

    /// Last fingerprint recorded for `path`
    pub async fn fingerprint(&self, path: &str) -> Option<Fingerprint> {
        self.state
            .lock()
            .await
            .entries
            .get(path)
            .and_then(|e| e.fingerprint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{Fault, MemoryTransport, Operation};
    use crate::remote::{RetryPolicy, TransportError};
    use serde_json::json;
    use std::sync::Arc;

    const PATH: &str = "data/database.json";

    fn cache_over(transport: &Arc<MemoryTransport>) -> VersionedCache {
        VersionedCache::new(RemoteClient::new(transport.clone(), RetryPolicy::default()))
    }

    fn fail_puts(transport: &MemoryTransport, times: usize) {
        for _ in 0..times {
            transport.inject(
                Operation::Put,
                Fault::Error(TransportError::Network("unreachable".to_string())),
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_before_flush() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        let value = json!({"users": {"u1": {"name": "Ada"}}});

        cache.set(PATH, value.clone()).await;

        assert_eq!(cache.get(PATH).await, Some(value));
        assert!(cache.is_dirty(PATH).await);
        assert_eq!(transport.puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flushed_value_is_seen_by_fresh_cache() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        cache.load(&[PATH]).await.unwrap();

        cache.set(PATH, json!({"k": [1, 2, 3]})).await;
        cache.flush_one(PATH).await.unwrap();
        assert!(!cache.is_dirty(PATH).await);

        let fresh = cache_over(&transport);
        fresh.load(&[PATH]).await.unwrap();
        assert_eq!(fresh.get(PATH).await, Some(json!({"k": [1, 2, 3]})));
    }

    #[tokio::test(start_paused = true)]
    async fn second_flush_all_writes_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        cache.set("data/a.json", json!(1)).await;
        cache.set("data/b.json", json!(2)).await;

        let first = cache.flush_all().await;
        assert_eq!(first.flushed.len(), 2);
        let puts = transport.puts();

        let second = cache.flush_all().await;
        assert!(second.is_empty());
        assert_eq!(transport.puts(), puts);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_writer_converges_after_one_retry() {
        let transport = Arc::new(MemoryTransport::new());
        let writer_a = cache_over(&transport);
        let writer_b = cache_over(&transport);
        writer_a.load(&[PATH]).await.unwrap();
        writer_b.load(&[PATH]).await.unwrap();

        writer_a.set(PATH, json!({"by": "a"})).await;
        writer_a.flush_one(PATH).await.unwrap();

        writer_b.set(PATH, json!({"by": "b"})).await;
        let receipt = writer_b.flush_one(PATH).await.unwrap();

        assert_eq!(receipt.conflicts, 1);
        let stored = transport.get(PATH).unwrap();
        assert_eq!(decode_content(PATH, &stored).unwrap(), json!({"by": "b"}));
        assert_eq!(writer_b.fingerprint(PATH).await, transport.fingerprint(PATH));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_stays_dirty_and_retries_next_cycle() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        cache.set("data/a.json", json!({"x": 1})).await;
        cache.set("data/b.json", json!({"y": 2})).await;
        // Exhaust a.json's budget; b.json is attempted regardless
        fail_puts(&transport, 3);

        let report = cache.flush_all().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "data/a.json");
        assert_eq!(report.flushed, vec!["data/b.json".to_string()]);
        assert_eq!(cache.dirty_paths().await, vec!["data/a.json".to_string()]);

        let retry = cache.flush_all().await;
        assert!(retry.is_clean());
        assert_eq!(retry.flushed, vec!["data/a.json".to_string()]);
        assert_eq!(cache.dirty_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_during_flush_keeps_path_dirty() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = Arc::new(cache_over(&transport));
        cache.set(PATH, json!({"v": 1})).await;
        transport.inject(Operation::Put, Fault::Stall(std::time::Duration::from_secs(5)));

        let flusher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush_one(PATH).await })
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        cache.set(PATH, json!({"v": 2})).await;
        flusher.await.unwrap().unwrap();

        // The remote has v1, the cache still owes v2
        assert!(cache.is_dirty(PATH).await);
        cache.flush_all().await;
        let stored = transport.get(PATH).unwrap();
        assert_eq!(decode_content(PATH, &stored).unwrap(), json!({"v": 2}));
    }

    #[tokio::test(start_paused = true)]
    async fn eager_flush_during_background_flush_keeps_newer_value() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = Arc::new(cache_over(&transport));
        cache.set(PATH, json!({"v": 1})).await;
        transport.inject(Operation::Put, Fault::Stall(std::time::Duration::from_secs(5)));

        let background = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush_all().await })
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        cache.set_and_flush(PATH, json!({"v": 2})).await.unwrap();

        let report = background.await.unwrap();
        assert!(report.is_clean());
        let stored = transport.get(PATH).unwrap();
        assert_eq!(decode_content(PATH, &stored).unwrap(), json!({"v": 2}));
        assert_eq!(cache.get(PATH).await, Some(json!({"v": 2})));
        assert!(!cache.is_dirty(PATH).await);
        assert_eq!(transport.puts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_flushes_of_one_path_run_in_order() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = Arc::new(cache_over(&transport));
        cache.set(PATH, json!({"v": 1})).await;
        transport.inject(Operation::Put, Fault::Stall(std::time::Duration::from_secs(5)));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush_one(PATH).await })
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let second = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush_one(PATH).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        // The second write was based on the first one's fingerprint
        assert_eq!(second.conflicts, 0);
        assert_ne!(first.fingerprint, second.fingerprint);
        assert_eq!(cache.fingerprint(PATH).await, Some(second.fingerprint));
        assert_eq!(transport.fingerprint(PATH), cache.fingerprint(PATH).await);
    }

    #[tokio::test(start_paused = true)]
    async fn load_creates_missing_paths() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);

        cache.load(&["data/users.json"]).await.unwrap();

        assert_eq!(cache.get("data/users.json").await, Some(json!({})));
        assert!(transport.get("data/users.json").is_some());
        assert!(!cache.is_dirty("data/users.json").await);
    }

    #[tokio::test(start_paused = true)]
    async fn load_keeps_uncreated_path_dirty() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        fail_puts(&transport, 3);

        cache.load(&["data/users.json"]).await.unwrap();

        assert!(cache.is_dirty("data/users.json").await);
        assert!(transport.get("data/users.json").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn load_fails_when_read_fails() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert(PATH, br#"{"keep": true}"#);
        for _ in 0..3 {
            transport.inject(Operation::Fetch, Fault::Error(TransportError::Timeout));
        }
        let cache = cache_over(&transport);

        assert!(cache.load(&[PATH]).await.is_err());
        assert_eq!(transport.puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_falls_back_to_text() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("notes.txt", b"plain words");
        let cache = cache_over(&transport);

        cache.load(&["notes.txt"]).await.unwrap();
        assert_eq!(cache.get("notes.txt").await, Some(json!("plain words")));
    }

    #[tokio::test(start_paused = true)]
    async fn update_if_only_dirties_on_change() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);

        assert!(!cache.update_if(PATH, |_| false).await);
        assert!(cache.get(PATH).await.is_none());
        assert_eq!(cache.dirty_count().await, 0);

        let changed = cache
            .update_if(PATH, |v| {
                v["k"] = json!(1);
                true
            })
            .await;
        assert!(changed);
        assert_eq!(cache.get(PATH).await, Some(json!({"k": 1})));
        assert!(cache.is_dirty(PATH).await);
    }

    #[tokio::test(start_paused = true)]
    async fn force_flush_writes_clean_paths_too() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        cache.load(&["data/a.json", "data/b.json"]).await.unwrap();
        let puts = transport.puts();

        let report = cache.force_flush_all().await;

        assert_eq!(report.flushed.len(), 2);
        assert_eq!(transport.puts(), puts + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_one_unknown_path_errors() {
        let transport = Arc::new(MemoryTransport::new());
        let err = cache_over(&transport).flush_one("nope").await.unwrap_err();
        assert!(matches!(err, VaultError::NotCached(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_deletes_remote_object() {
        let transport = Arc::new(MemoryTransport::new());
        let cache = cache_over(&transport);
        cache.load(&[PATH]).await.unwrap();

        assert!(cache.remove(PATH).await.unwrap());
        assert!(cache.get(PATH).await.is_none());
        assert!(transport.get(PATH).is_none());
    }
}
