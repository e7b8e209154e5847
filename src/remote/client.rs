//! Retrying request wrapper over a [`Transport`]
//!
//! Every call runs under a fixed timeout. Replies are handled as follows:
//!
//! | Reply | Handling | Budget |
//! |-------|----------|--------|
//! | success | returned | - |
//! | not found | `None` / `false` | - |
//! | conflict, unprocessable | pause, re-read fingerprint, retry | conflicts |
//! | rate limited | wait for reset (capped), retry | rate-limit waits |
//! | timeout, network error | pause, retry | attempts |
//! | other server error | log, retry | attempts |
//!
//! Each budget holds `max_attempts`, so a throttled or contended path can
//! never spin forever, and neither can eat into the other's allowance.

use super::transport::{
    DeleteRequest, Fingerprint, PutRequest, RemoteObject, Reply, Transport, TransportError,
};
use crate::config::schema::ClientConfig;
use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Shortest wait honoured for a rate-limited reply
const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Timing and budget knobs for [`RemoteClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub conflict_pause: Duration,
    pub transient_pause: Duration,
    pub rate_limit_fallback: Duration,
    pub rate_limit_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            conflict_pause: Duration::from_millis(config.conflict_pause_ms),
            transient_pause: Duration::from_millis(config.transient_pause_ms),
            rate_limit_fallback: Duration::from_secs(config.rate_limit_fallback_secs),
            rate_limit_cap: Duration::from_secs(config.rate_limit_cap_secs),
        }
    }
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Fingerprint issued by the remote for the new content
    pub fingerprint: Fingerprint,
    /// Fingerprint refreshes needed before the write was accepted
    pub conflicts: u32,
    /// Rate-limit windows waited out
    pub rate_limit_waits: u32,
    /// Timeouts, network and server errors absorbed
    pub transient_failures: u32,
}

/// Per-call retry bookkeeping
struct Attempts<'a> {
    operation: &'static str,
    path: &'a str,
    budget: u32,
    failures: u32,
    conflicts: u32,
    rate_limit_waits: u32,
    last_error: String,
}

impl<'a> Attempts<'a> {
    fn new(operation: &'static str, path: &'a str, budget: u32) -> Self {
        Self {
            operation,
            path,
            budget: budget.max(1),
            failures: 0,
            conflicts: 0,
            rate_limit_waits: 0,
            last_error: String::new(),
        }
    }

    fn fail(&mut self, error: String) -> VaultResult<()> {
        self.failures += 1;
        self.last_error = error;
        if self.failures >= self.budget {
            return Err(self.exhausted());
        }
        Ok(())
    }

    fn conflict(&mut self, error: String) -> VaultResult<()> {
        self.conflicts += 1;
        self.last_error = error;
        if self.conflicts > self.budget {
            return Err(self.exhausted());
        }
        Ok(())
    }

    fn rate_limited(&mut self) -> VaultResult<()> {
        self.rate_limit_waits += 1;
        self.last_error = "rate limited".to_string();
        if self.rate_limit_waits > self.budget {
            return Err(self.exhausted());
        }
        Ok(())
    }

    fn exhausted(&self) -> VaultError {
        VaultError::RetriesExhausted {
            operation: self.operation,
            path: self.path.to_string(),
            attempts: self.failures + self.conflicts + self.rate_limit_waits,
            last_error: self.last_error.clone(),
        }
    }
}

/// Stateless-per-call client for the remote store
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.transport.backend_name()
    }

    /// Read the object at `path`, `None` if it does not exist.
    ///
    /// The returned fingerprint is the one to pass to the next write.
    pub async fn read(&self, path: &str) -> VaultResult<Option<RemoteObject>> {
        let mut attempts = Attempts::new("read", path, self.policy.max_attempts);

        loop {
            let outcome = self.call(self.transport.fetch(path)).await;
            let Some(reply) = self.absorb(outcome, &mut attempts).await? else {
                continue;
            };

            match reply {
                Reply::Found(object) => {
                    debug!(path, fingerprint = %object.fingerprint, "Read object");
                    return Ok(Some(object));
                }
                Reply::NotFound => return Ok(None),
                other => attempts.fail(other.describe())?,
            }
        }
    }

    /// Create or update `path` with the default commit message
    pub async fn write(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<Fingerprint>,
    ) -> VaultResult<WriteReceipt> {
        let message = format!("update {} - {}", path, Utc::now().to_rfc3339());
        self.write_with_message(path, content, expected, &message).await
    }

    /// Create or update `path`.
    ///
    /// `expected` is the last known fingerprint; `None` means create. A stale
    /// or missing fingerprint is refreshed from the remote and the write is
    /// retried, so the content written here wins over whatever it replaced.
    pub async fn write_with_message(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<Fingerprint>,
        message: &str,
    ) -> VaultResult<WriteReceipt> {
        let mut expected = expected;
        let mut attempts = Attempts::new("write", path, self.policy.max_attempts);

        loop {
            let request = PutRequest {
                content,
                expected: expected.as_ref(),
                message,
            };
            let outcome = self.call(self.transport.put(path, request)).await;
            let Some(reply) = self.absorb(outcome, &mut attempts).await? else {
                continue;
            };

            match reply {
                Reply::Written(fingerprint) => {
                    debug!(path, fingerprint = %fingerprint, bytes = content.len(), "Wrote object");
                    return Ok(WriteReceipt {
                        fingerprint,
                        conflicts: attempts.conflicts,
                        rate_limit_waits: attempts.rate_limit_waits,
                        transient_failures: attempts.failures,
                    });
                }
                stale @ (Reply::Conflict | Reply::Unprocessable(_)) => {
                    attempts.conflict(stale.describe())?;
                    warn!(path, reply = %stale.describe(), "Write rejected, refreshing fingerprint");
                    sleep(self.policy.conflict_pause).await;
                    expected = self.read(path).await?.map(|object| object.fingerprint);
                }
                other => attempts.fail(other.describe())?,
            }
        }
    }

    /// Delete `path`. Returns `false` if nothing was there.
    pub async fn delete(&self, path: &str) -> VaultResult<bool> {
        let message = format!("delete {}", path);
        let mut attempts = Attempts::new("delete", path, self.policy.max_attempts);

        let Some(mut current) = self.read(path).await?.map(|object| object.fingerprint) else {
            return Ok(false);
        };

        loop {
            let request = DeleteRequest {
                expected: &current,
                message: &message,
            };
            let outcome = self.call(self.transport.delete(path, request)).await;
            let Some(reply) = self.absorb(outcome, &mut attempts).await? else {
                continue;
            };

            match reply {
                Reply::Deleted => {
                    debug!(path, "Deleted object");
                    return Ok(true);
                }
                Reply::NotFound => return Ok(false),
                stale @ (Reply::Conflict | Reply::Unprocessable(_)) => {
                    attempts.conflict(stale.describe())?;
                    sleep(self.policy.conflict_pause).await;
                    match self.read(path).await? {
                        Some(object) => current = object.fingerprint,
                        None => return Ok(false),
                    }
                }
                other => attempts.fail(other.describe())?,
            }
        }
    }

    async fn call<F>(&self, request: F) -> Result<Reply, TransportError>
    where
        F: Future<Output = Result<Reply, TransportError>>,
    {
        match tokio::time::timeout(self.policy.request_timeout, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Handle the outcomes every operation retries the same way.
    ///
    /// Returns `Ok(None)` when the request should be sent again and
    /// `Ok(Some(reply))` for replies the operation must interpret itself.
    async fn absorb(
        &self,
        outcome: Result<Reply, TransportError>,
        attempts: &mut Attempts<'_>,
    ) -> VaultResult<Option<Reply>> {
        match outcome {
            Ok(Reply::RateLimited { reset_at }) => {
                attempts.rate_limited()?;
                let wait = self.rate_limit_wait(reset_at);
                warn!(
                    path = attempts.path,
                    wait_secs = wait.as_secs(),
                    "Rate limited, waiting for quota reset"
                );
                sleep(wait).await;
                Ok(None)
            }
            Ok(Reply::ServerError { status, message }) => {
                error!(
                    path = attempts.path,
                    status,
                    "{} failed: {}",
                    attempts.operation,
                    truncate(&message, 200)
                );
                attempts.fail(format!("HTTP {}: {}", status, truncate(&message, 200)))?;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    path = attempts.path,
                    attempt = attempts.failures + 1,
                    budget = attempts.budget,
                    "{} failed: {}",
                    attempts.operation,
                    e
                );
                attempts.fail(e.to_string())?;
                sleep(self.policy.transient_pause).await;
                Ok(None)
            }
            Ok(reply) => Ok(Some(reply)),
        }
    }

    /// Time to wait before retrying a rate-limited request
    fn rate_limit_wait(&self, reset_at: Option<DateTime<Utc>>) -> Duration {
        let wait = match reset_at {
            Some(reset) => (reset - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => self.policy.rate_limit_fallback,
        };
        wait.max(MIN_RATE_LIMIT_WAIT).min(self.policy.rate_limit_cap)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{Fault, MemoryTransport, Operation};
    use tokio::time::Instant;

    fn client(transport: &Arc<MemoryTransport>) -> RemoteClient {
        RemoteClient::new(transport.clone(), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn read_missing_is_none_without_retry() {
        let transport = Arc::new(MemoryTransport::new());
        let result = client(&transport).read("data/none.json").await.unwrap();
        assert!(result.is_none());
        assert_eq!(transport.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_then_read_returns_fresh_fingerprint() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport);

        let receipt = client.write("data/a.json", b"{}", None).await.unwrap();
        let object = client.read("data/a.json").await.unwrap().unwrap();

        assert_eq!(object.fingerprint, receipt.fingerprint);
        assert_eq!(object.content, b"{}");
        assert_eq!(receipt.conflicts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fingerprint_is_refreshed_once() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport);
        let original = transport.insert("data/a.json", b"\"first\"");
        transport.insert("data/a.json", b"\"second\"");

        let receipt = client
            .write("data/a.json", b"\"mine\"", Some(original))
            .await
            .unwrap();

        assert_eq!(receipt.conflicts, 1);
        assert_eq!(transport.get("data/a.json").unwrap(), b"\"mine\"");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fingerprint_on_existing_path_is_unprocessable_then_succeeds() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("data/a.json", b"1");

        let receipt = client(&transport)
            .write("data/a.json", b"2", None)
            .await
            .unwrap();

        assert_eq!(receipt.conflicts, 1);
        assert_eq!(transport.get("data/a.json").unwrap(), b"2");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_until_reset_not_cap() {
        let transport = Arc::new(MemoryTransport::new());
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let client = RemoteClient::new(transport.clone(), policy);
        transport.inject(
            Operation::Put,
            Fault::Reply(Reply::RateLimited {
                reset_at: Some(Utc::now() + chrono::Duration::seconds(5)),
            }),
        );

        let started = Instant::now();
        let receipt = client.write("data/a.json", b"{}", None).await.unwrap();
        let waited = started.elapsed();

        assert!(waited >= Duration::from_secs(4), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(6), "waited {:?}", waited);
        assert_eq!(receipt.rate_limit_waits, 1);
        assert_eq!(receipt.transient_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_reset_uses_capped_fallback() {
        let transport = Arc::new(MemoryTransport::new());
        transport.inject(
            Operation::Fetch,
            Fault::Reply(Reply::RateLimited { reset_at: None }),
        );

        let started = Instant::now();
        client(&transport).read("data/a.json").await.unwrap();
        assert_eq!(started.elapsed().as_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_budget() {
        let transport = Arc::new(MemoryTransport::new());
        for _ in 0..3 {
            transport.inject(
                Operation::Put,
                Fault::Error(TransportError::Network("connection reset".to_string())),
            );
        }

        let err = client(&transport)
            .write("data/a.json", b"{}", None)
            .await
            .unwrap_err();

        match err {
            VaultError::RetriesExhausted {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "write");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(transport.get("data/a.json").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let transport = Arc::new(MemoryTransport::new());
        transport.inject(Operation::Fetch, Fault::Stall(Duration::from_secs(45)));
        transport.insert("data/a.json", b"[]");

        let started = Instant::now();
        let object = client(&transport).read("data/a.json").await.unwrap();

        assert!(object.is_some());
        // 30s timeout plus the 2s transient pause
        assert_eq!(started.elapsed().as_secs(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_retries_then_succeeds() {
        let transport = Arc::new(MemoryTransport::new());
        transport.inject(
            Operation::Put,
            Fault::Reply(Reply::ServerError {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        );

        let receipt = client(&transport)
            .write("data/a.json", b"{}", None)
            .await
            .unwrap();
        assert_eq!(receipt.transient_failures, 1);
        assert_eq!(transport.puts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_existing_and_missing() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport);
        transport.insert("data/a.json", b"{}");

        assert!(client.delete("data/a.json").await.unwrap());
        assert!(!client.delete("data/a.json").await.unwrap());
        assert!(transport.get("data/a.json").is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
