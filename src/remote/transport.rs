//! Remote store transport abstraction
//!
//! Provides a trait for the three per-path operations a content repository
//! exposes, so the retry policy in [`RemoteClient`](super::RemoteClient) can
//! run against GitHub or an in-process store alike.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque version token identifying one content revision at a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One object as stored remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub content: Vec<u8>,
    pub fingerprint: Fingerprint,
}

/// Create-or-update request
#[derive(Debug, Clone)]
pub struct PutRequest<'a> {
    pub content: &'a [u8],
    /// Current fingerprint when updating, `None` when creating
    pub expected: Option<&'a Fingerprint>,
    pub message: &'a str,
}

/// Delete request
#[derive(Debug, Clone)]
pub struct DeleteRequest<'a> {
    pub expected: &'a Fingerprint,
    pub message: &'a str,
}

/// Classified reply from the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Read succeeded
    Found(RemoteObject),
    /// Create or update succeeded
    Written(Fingerprint),
    /// Delete succeeded
    Deleted,
    /// No object at the path
    NotFound,
    /// Expected fingerprint no longer matches the remote
    Conflict,
    /// Request rejected as unprocessable, usually a missing or stale fingerprint
    Unprocessable(String),
    /// Request quota exhausted until `reset_at`
    RateLimited { reset_at: Option<DateTime<Utc>> },
    /// Any other failure status
    ServerError { status: u16, message: String },
}

impl Reply {
    /// Short label for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            Reply::Found(_) => "found".to_string(),
            Reply::Written(_) => "written".to_string(),
            Reply::Deleted => "deleted".to_string(),
            Reply::NotFound => "not found".to_string(),
            Reply::Conflict => "version conflict".to_string(),
            Reply::Unprocessable(msg) => format!("unprocessable: {}", msg),
            Reply::RateLimited { .. } => "rate limited".to_string(),
            Reply::ServerError { status, message } => format!("HTTP {}: {}", status, message),
        }
    }
}

/// Failure to obtain any reply at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

/// Abstract content repository interface
///
/// Implementations only translate requests and classify replies; they never
/// retry. Retrying is the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the object at `path`
    async fn fetch(&self, path: &str) -> Result<Reply, TransportError>;

    /// Create or update the object at `path`
    async fn put(&self, path: &str, request: PutRequest<'_>) -> Result<Reply, TransportError>;

    /// Delete the object at `path`
    async fn delete(&self, path: &str, request: DeleteRequest<'_>)
        -> Result<Reply, TransportError>;

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}
