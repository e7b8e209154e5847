//! In-process remote store
//!
//! Mirrors the GitHub contents API's concurrency rules: updating an existing
//! path needs its current fingerprint, a stale one is a conflict, and every
//! write issues a new fingerprint. Faults can be queued per operation to
//! exercise the client's retry paths.

use super::transport::{
    DeleteRequest, Fingerprint, PutRequest, RemoteObject, Reply, Transport, TransportError,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Operation a queued fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Put,
    Delete,
}

/// Failure returned instead of running the next call of an operation
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return this reply without touching the store
    Reply(Reply),
    /// Fail before any reply
    Error(TransportError),
    /// Sleep, then run the call normally
    Stall(Duration),
}

/// Process-local content repository
#[derive(Default)]
pub struct MemoryTransport {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    faults: Mutex<HashMap<Operation, VecDeque<Fault>>>,
    revision: AtomicU64,
    fetches: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault for the next call of `operation`
    pub fn inject(&self, operation: Operation, fault: Fault) {
        lock(&self.faults)
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Write directly, as another process would
    pub fn insert(&self, path: &str, content: &[u8]) -> Fingerprint {
        let fingerprint = self.next_fingerprint(content);
        lock(&self.objects).insert(
            path.to_string(),
            RemoteObject {
                content: content.to_vec(),
                fingerprint: fingerprint.clone(),
            },
        );
        fingerprint
    }

    /// Delete directly, as another process would
    pub fn remove(&self, path: &str) -> bool {
        lock(&self.objects).remove(path).is_some()
    }

    /// Current content at `path`
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).map(|o| o.content.clone())
    }

    /// Current fingerprint at `path`
    pub fn fingerprint(&self, path: &str) -> Option<Fingerprint> {
        lock(&self.objects).get(path).map(|o| o.fingerprint.clone())
    }

    /// All stored paths in order
    pub fn paths(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Number of fetch calls received, faults included
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of put calls received, faults included
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of delete calls received, faults included
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn next_fingerprint(&self, content: &[u8]) -> Fingerprint {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(revision.to_be_bytes());
        hasher.update(content);
        let digest = hex::encode(hasher.finalize());
        Fingerprint::new(&digest[..40])
    }

    /// Apply a queued fault. `Some` short-circuits the call.
    async fn take_fault(&self, operation: Operation) -> Option<Result<Reply, TransportError>> {
        let fault = lock(&self.faults)
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front());

        match fault? {
            Fault::Reply(reply) => Some(Ok(reply)),
            Fault::Error(e) => Some(Err(e)),
            Fault::Stall(duration) => {
                tokio::time::sleep(duration).await;
                None
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch(&self, path: &str) -> Result<Reply, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.take_fault(Operation::Fetch).await {
            return outcome;
        }

        Ok(match lock(&self.objects).get(path) {
            Some(object) => Reply::Found(object.clone()),
            None => Reply::NotFound,
        })
    }

    async fn put(&self, path: &str, request: PutRequest<'_>) -> Result<Reply, TransportError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.take_fault(Operation::Put).await {
            return outcome;
        }

        let mut objects = lock(&self.objects);
        let current = objects.get(path).map(|o| &o.fingerprint);
        match (current, request.expected) {
            (Some(_), None) => {
                return Ok(Reply::Unprocessable(
                    "\"sha\" wasn't supplied".to_string(),
                ))
            }
            (Some(current), Some(expected)) if current != expected => return Ok(Reply::Conflict),
            (None, Some(_)) => {
                return Ok(Reply::Unprocessable(
                    "sha does not match any object".to_string(),
                ))
            }
            _ => {}
        }

        let fingerprint = self.next_fingerprint(request.content);
        objects.insert(
            path.to_string(),
            RemoteObject {
                content: request.content.to_vec(),
                fingerprint: fingerprint.clone(),
            },
        );
        Ok(Reply::Written(fingerprint))
    }

    async fn delete(
        &self,
        path: &str,
        request: DeleteRequest<'_>,
    ) -> Result<Reply, TransportError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.take_fault(Operation::Delete).await {
            return outcome;
        }

        let mut objects = lock(&self.objects);
        match objects.get(path) {
            None => Ok(Reply::NotFound),
            Some(object) if &object.fingerprint != request.expected => Ok(Reply::Conflict),
            Some(_) => {
                objects.remove(path);
                Ok(Reply::Deleted)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Lock a mutex, recovering the data if a panicking test poisoned it
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
