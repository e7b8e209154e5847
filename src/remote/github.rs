//! GitHub contents API transport
//!
//! Each path is one file in a repository branch:
//!
//! - `GET  /repos/{owner}/{repo}/contents/{path}?ref={branch}`
//! - `PUT  /repos/{owner}/{repo}/contents/{path}` with `{message, content, branch, sha?}`
//! - `DELETE` on the same URL with `{message, sha, branch}`
//!
//! `ureq` is blocking, so requests run on tokio's blocking pool.

use super::transport::{
    DeleteRequest, Fingerprint, PutRequest, RemoteObject, Reply, Transport, TransportError,
};
use crate::config::non_empty_env;
use crate::config::schema::{ClientConfig, RemoteConfig};
use crate::error::{VaultError, VaultResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";

/// Largest response body accepted (GitHub caps files at 100 MiB)
const MAX_BODY_BYTES: u64 = 128 * 1024 * 1024;

/// File metadata returned by the contents endpoint
#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Response to a create-or-update
#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutResponseContent,
}

#[derive(Debug, Deserialize)]
struct PutResponseContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// Rate-limit headers of a failed response
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RateLimitHeaders {
    remaining: Option<String>,
    reset: Option<String>,
    retry_after: Option<String>,
}

/// Transport backed by a GitHub repository branch
pub struct GitHubTransport {
    agent: ureq::Agent,
    contents_url: String,
    branch: String,
    auth_header: String,
}

impl GitHubTransport {
    pub fn new(
        api_url: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        token: &str,
        timeout: Duration,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            contents_url: format!(
                "{}/repos/{}/{}/contents",
                api_url.trim_end_matches('/'),
                owner,
                repo
            ),
            branch: branch.to_string(),
            auth_header: format!("token {}", token),
        }
    }

    /// Build a transport from configuration and the token environment variable
    pub fn from_config(remote: &RemoteConfig, client: &ClientConfig) -> VaultResult<Self> {
        let owner = remote.owner.as_deref().ok_or_else(|| {
            VaultError::missing_setting(
                "remote.owner",
                "Set remote.owner in the config file or export GITHUB_REPO_OWNER",
            )
        })?;
        let repo = remote.repo.as_deref().ok_or_else(|| {
            VaultError::missing_setting(
                "remote.repo",
                "Set remote.repo in the config file or export GITHUB_REPO_NAME",
            )
        })?;
        let token = non_empty_env(&remote.token_env).ok_or_else(|| {
            VaultError::missing_setting(
                remote.token_env.clone(),
                "Export a GitHub token with contents read/write access",
            )
        })?;

        Ok(Self::new(
            &remote.api_url,
            owner,
            repo,
            &remote.branch,
            &token,
            Duration::from_secs(client.request_timeout_secs),
        ))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.contents_url, encode_path(path))
    }
}

#[async_trait]
impl Transport for GitHubTransport {
    async fn fetch(&self, path: &str) -> Result<Reply, TransportError> {
        let agent = self.agent.clone();
        let url = format!("{}?ref={}", self.object_url(path), encode_segment(&self.branch));
        let auth = self.auth_header.clone();
        debug!(path, "GET contents");

        run_blocking(move || fetch_blocking(&agent, &url, &auth)).await
    }

    async fn put(&self, path: &str, request: PutRequest<'_>) -> Result<Reply, TransportError> {
        let body = PutBody {
            message: request.message,
            content: STANDARD.encode(request.content),
            branch: &self.branch,
            sha: request.expected.map(Fingerprint::as_str),
        };
        let body = serde_json::to_string(&body)
            .map_err(|e| TransportError::Network(format!("encoding request: {}", e)))?;
        let agent = self.agent.clone();
        let url = self.object_url(path);
        let auth = self.auth_header.clone();
        debug!(path, bytes = request.content.len(), "PUT contents");

        run_blocking(move || put_blocking(&agent, &url, &auth, &body)).await
    }

    async fn delete(
        &self,
        path: &str,
        request: DeleteRequest<'_>,
    ) -> Result<Reply, TransportError> {
        let body = DeleteBody {
            message: request.message,
            sha: request.expected.as_str(),
            branch: &self.branch,
        };
        let body = serde_json::to_string(&body)
            .map_err(|e| TransportError::Network(format!("encoding request: {}", e)))?;
        let agent = self.agent.clone();
        let url = self.object_url(path);
        let auth = self.auth_header.clone();
        debug!(path, "DELETE contents");

        run_blocking(move || delete_blocking(&agent, &url, &auth, &body)).await
    }

    fn backend_name(&self) -> &'static str {
        "github"
    }
}

async fn run_blocking<F>(job: F) -> Result<Reply, TransportError>
where
    F: FnOnce() -> Result<Reply, TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| TransportError::Network(format!("request task failed: {}", e)))?
}

fn fetch_blocking(agent: &ureq::Agent, url: &str, auth: &str) -> Result<Reply, TransportError> {
    let mut response = agent
        .get(url)
        .header("Authorization", auth)
        .header("Accept", ACCEPT_JSON)
        .call()
        .map_err(transport_error)?;

    let status = response.status().as_u16();
    let headers = rate_limit_headers(response.headers());
    let body = read_body(response.body_mut())?;
    if status != 200 {
        return Ok(classify_failure(status, &headers, &body, Utc::now()));
    }

    let file: ContentsFile = match serde_json::from_slice(&body) {
        Ok(file) => file,
        Err(e) => {
            return Ok(Reply::ServerError {
                status,
                message: format!("not a file response: {}", e),
            })
        }
    };

    // Files above 1 MiB come back without inline content
    let content = if file.encoding.as_deref() == Some("none") {
        fetch_raw_blocking(agent, url, auth)?
    } else {
        match decode_inline(&file.content) {
            Ok(content) => content,
            Err(e) => {
                return Ok(Reply::ServerError {
                    status,
                    message: format!("invalid base64 content: {}", e),
                })
            }
        }
    };

    Ok(Reply::Found(RemoteObject {
        content,
        fingerprint: Fingerprint::new(file.sha),
    }))
}

fn fetch_raw_blocking(agent: &ureq::Agent, url: &str, auth: &str) -> Result<Vec<u8>, TransportError> {
    let mut response = agent
        .get(url)
        .header("Authorization", auth)
        .header("Accept", ACCEPT_RAW)
        .call()
        .map_err(transport_error)?;

    let status = response.status().as_u16();
    let body = read_body(response.body_mut())?;
    if status != 200 {
        return Err(TransportError::Network(format!(
            "raw download failed with HTTP {}",
            status
        )));
    }
    Ok(body)
}

fn put_blocking(
    agent: &ureq::Agent,
    url: &str,
    auth: &str,
    body: &str,
) -> Result<Reply, TransportError> {
    let mut response = agent
        .put(url)
        .header("Authorization", auth)
        .header("Accept", ACCEPT_JSON)
        .header("Content-Type", "application/json")
        .send(body)
        .map_err(transport_error)?;

    let status = response.status().as_u16();
    let headers = rate_limit_headers(response.headers());
    let body = read_body(response.body_mut())?;
    if status != 200 && status != 201 {
        return Ok(classify_failure(status, &headers, &body, Utc::now()));
    }

    Ok(match serde_json::from_slice::<PutResponse>(&body) {
        Ok(parsed) => Reply::Written(Fingerprint::new(parsed.content.sha)),
        Err(e) => Reply::ServerError {
            status,
            message: format!("unexpected write response: {}", e),
        },
    })
}

fn delete_blocking(
    agent: &ureq::Agent,
    url: &str,
    auth: &str,
    body: &str,
) -> Result<Reply, TransportError> {
    let mut response = agent
        .delete(url)
        .header("Authorization", auth)
        .header("Accept", ACCEPT_JSON)
        .header("Content-Type", "application/json")
        .force_send_body()
        .send(body)
        .map_err(transport_error)?;

    let status = response.status().as_u16();
    let headers = rate_limit_headers(response.headers());
    let body = read_body(response.body_mut())?;
    if status == 200 {
        return Ok(Reply::Deleted);
    }
    Ok(classify_failure(status, &headers, &body, Utc::now()))
}

fn read_body(body: &mut ureq::Body) -> Result<Vec<u8>, TransportError> {
    body.with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_vec()
        .map_err(transport_error)
}

fn transport_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        other => TransportError::Network(other.to_string()),
    }
}

fn rate_limit_headers(headers: &ureq::http::HeaderMap) -> RateLimitHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };
    RateLimitHeaders {
        remaining: get("x-ratelimit-remaining"),
        reset: get("x-ratelimit-reset"),
        retry_after: get("retry-after"),
    }
}

/// Map a non-success status to a reply
fn classify_failure(
    status: u16,
    headers: &RateLimitHeaders,
    body: &[u8],
    now: DateTime<Utc>,
) -> Reply {
    let message = error_message(body);
    let throttled = headers.remaining.as_deref() == Some("0") || headers.retry_after.is_some();

    match status {
        404 => Reply::NotFound,
        409 => Reply::Conflict,
        422 => Reply::Unprocessable(message),
        429 => Reply::RateLimited {
            reset_at: reset_time(headers, now),
        },
        403 if throttled => Reply::RateLimited {
            reset_at: reset_time(headers, now),
        },
        _ => Reply::ServerError { status, message },
    }
}

/// When the quota resets: `Retry-After` seconds win over the epoch reset header
fn reset_time(headers: &RateLimitHeaders, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(secs) = headers.retry_after.as_deref().and_then(|v| v.parse::<i64>().ok()) {
        return Some(now + chrono::Duration::seconds(secs));
    }
    headers
        .reset
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
}

/// Pull `message` out of a GitHub error body, falling back to the raw text
fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}

/// GitHub wraps inline base64 at 60 columns
fn decode_inline(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.split_whitespace().collect();
    STANDARD.decode(compact)
}

fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode everything outside RFC 3986 unreserved characters
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
