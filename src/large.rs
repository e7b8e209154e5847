//! Large object storage
//!
//! Values whose serialized form stays under the single-object limit are
//! written to `{prefix}/{name}.json`. Anything bigger is split into
//! base64-wrapped chunks plus a manifest:
//!
//! ```text
//! {prefix}/{name}_chunk_0.json   {"chunk": 0, "data": "<base64>"}
//! {prefix}/{name}_chunk_1.json
//! {prefix}/{name}_meta.json      {"name", "total_chunks", "total_size", "created_at", "sha256"}
//! ```
//!
//! Chunks go first and the manifest last. If any write fails, every object
//! written so far is deleted again and the encode reports
//! [`VaultError::PartialChunkWrite`].

use crate::config::schema::LargeConfig;
use crate::error::{VaultError, VaultResult};
use crate::remote::{RemoteClient, WriteReceipt};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Size thresholds for chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Payloads of this many bytes or more are chunked
    pub single_object_max: usize,
    pub chunk_size: usize,
}

impl From<&LargeConfig> for ChunkLimits {
    fn from(config: &LargeConfig) -> Self {
        Self {
            single_object_max: usize::try_from(config.single_object_max_bytes)
                .unwrap_or(usize::MAX),
            chunk_size: usize::try_from(config.chunk_size_bytes)
                .unwrap_or(usize::MAX)
                .max(1),
        }
    }
}

/// Describes how a chunked payload was split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub name: String,
    pub total_chunks: usize,
    /// Byte length of the serialized payload before chunking
    pub total_size: usize,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the serialized payload
    pub sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    chunk: usize,
    data: String,
}

/// Where an encoded value ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeLayout {
    Single,
    Chunked { chunks: usize },
}

/// Byte ranges of each chunk for a payload of `len` bytes
pub fn plan_chunks(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect()
}

fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Chunking codec over a [`RemoteClient`]. Bypasses the cache.
pub struct LargeObjectStore {
    client: RemoteClient,
    prefix: String,
    limits: ChunkLimits,
}

impl LargeObjectStore {
    pub fn new(client: RemoteClient, prefix: impl Into<String>, limits: ChunkLimits) -> Self {
        let prefix: String = prefix.into();
        Self {
            client,
            prefix: prefix.trim_end_matches('/').to_string(),
            limits,
        }
    }

    pub fn from_config(client: RemoteClient, config: &LargeConfig) -> Self {
        Self::new(client, config.prefix.clone(), ChunkLimits::from(config))
    }

    pub fn limits(&self) -> ChunkLimits {
        self.limits
    }

    pub fn single_path(&self, name: &str) -> String {
        format!("{}/{}.json", self.prefix, name)
    }

    pub fn meta_path(&self, name: &str) -> String {
        format!("{}/{}_meta.json", self.prefix, name)
    }

    pub fn chunk_path(&self, name: &str, index: usize) -> String {
        format!("{}/{}_chunk_{}.json", self.prefix, name, index)
    }

    /// Serialize `value` as compact JSON and store it under `name`
    pub async fn encode<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> VaultResult<LargeLayout> {
        let payload = serde_json::to_vec(value)?;
        self.encode_bytes(name, &payload).await
    }

    /// Store an already serialized payload under `name`
    pub async fn encode_bytes(&self, name: &str, payload: &[u8]) -> VaultResult<LargeLayout> {
        if payload.len() < self.limits.single_object_max {
            let path = self.single_path(name);
            self.overwrite(&path, payload).await?;
            // Chunks left from an earlier chunked encode are shadowed now
            if let Some(previous) = self.previous_manifest(name).await {
                self.delete_quietly(&self.meta_path(name)).await;
                self.discard_chunks(name, 0, previous.total_chunks).await;
            }
            info!("Saved {} ({} bytes)", path, payload.len());
            return Ok(LargeLayout::Single);
        }

        let previous = self.previous_manifest(name).await;

        let ranges = plan_chunks(payload.len(), self.limits.chunk_size);
        let total_chunks = ranges.len();
        info!(
            name,
            size = payload.len(),
            chunks = total_chunks,
            "Splitting large object"
        );

        let mut written = Vec::with_capacity(total_chunks + 1);
        for (index, range) in ranges.into_iter().enumerate() {
            let path = self.chunk_path(name, index);
            let record = ChunkRecord {
                chunk: index,
                data: STANDARD.encode(&payload[range]),
            };
            let content = serde_json::to_vec(&record)?;
            if let Err(e) = self.overwrite(&path, &content).await {
                return Err(self.abandon(name, &path, e, &written, previous.as_ref()).await);
            }
            debug!("Saved chunk {}/{} of {}", index + 1, total_chunks, name);
            written.push(path);
        }

        let manifest = ChunkManifest {
            name: name.to_string(),
            total_chunks,
            total_size: payload.len(),
            created_at: Utc::now(),
            sha256: sha256_hex(payload),
        };
        let meta_path = self.meta_path(name);
        let content = serde_json::to_vec_pretty(&manifest)?;
        if let Err(e) = self.overwrite(&meta_path, &content).await {
            return Err(self
                .abandon(name, &meta_path, e, &written, previous.as_ref())
                .await);
        }

        // A leftover single object would shadow the chunked one on decode
        self.delete_quietly(&self.single_path(name)).await;
        if let Some(previous) = previous {
            self.discard_chunks(name, total_chunks, previous.total_chunks)
                .await;
        }

        info!("Saved {} in {} chunks", name, total_chunks);
        Ok(LargeLayout::Chunked {
            chunks: total_chunks,
        })
    }

    /// Load and deserialize the value stored under `name`
    pub async fn decode<T: DeserializeOwned>(&self, name: &str) -> VaultResult<Option<T>> {
        match self.decode_bytes(name).await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    /// Load the serialized payload stored under `name`
    pub async fn decode_bytes(&self, name: &str) -> VaultResult<Option<Vec<u8>>> {
        if let Some(object) = self.client.read(&self.single_path(name)).await? {
            return Ok(Some(object.content));
        }
        let Some(manifest) = self.manifest(name).await? else {
            return Ok(None);
        };

        let corrupt = |reason: String| VaultError::LargeObjectCorrupt {
            name: name.to_string(),
            reason,
        };

        let mut payload = Vec::with_capacity(manifest.total_size);
        for index in 0..manifest.total_chunks {
            let path = self.chunk_path(name, index);
            let object = self
                .client
                .read(&path)
                .await?
                .ok_or_else(|| VaultError::MissingChunk {
                    name: name.to_string(),
                    index,
                    total: manifest.total_chunks,
                })?;
            let record: ChunkRecord = serde_json::from_slice(&object.content)
                .map_err(|e| corrupt(format!("{}: {}", path, e)))?;
            if record.chunk != index {
                return Err(corrupt(format!(
                    "{} holds chunk {}, expected {}",
                    path, record.chunk, index
                )));
            }
            payload.extend(STANDARD.decode(record.data.as_bytes())?);
        }

        if payload.len() != manifest.total_size {
            return Err(corrupt(format!(
                "reassembled {} bytes, manifest says {}",
                payload.len(),
                manifest.total_size
            )));
        }
        if sha256_hex(&payload) != manifest.sha256 {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        debug!(name, chunks = manifest.total_chunks, "Reassembled large object");
        Ok(Some(payload))
    }

    /// Manifest of a chunked object, `None` when `name` is not chunked
    pub async fn manifest(&self, name: &str) -> VaultResult<Option<ChunkManifest>> {
        let meta_path = self.meta_path(name);
        match self.client.read(&meta_path).await? {
            Some(object) => serde_json::from_slice(&object.content)
                .map(Some)
                .map_err(|e| VaultError::LargeObjectCorrupt {
                    name: name.to_string(),
                    reason: format!("{}: {}", meta_path, e),
                }),
            None => Ok(None),
        }
    }

    /// Delete every object stored under `name`. Returns `false` if none existed.
    pub async fn remove(&self, name: &str) -> VaultResult<bool> {
        let mut removed = self.client.delete(&self.single_path(name)).await?;
        if let Some(manifest) = self.manifest(name).await? {
            removed |= self.client.delete(&self.meta_path(name)).await?;
            for index in 0..manifest.total_chunks {
                removed |= self.client.delete(&self.chunk_path(name, index)).await?;
            }
        }
        Ok(removed)
    }

    /// Write `content` to `path`, replacing whatever is there
    async fn overwrite(&self, path: &str, content: &[u8]) -> VaultResult<WriteReceipt> {
        let expected = self.client.read(path).await?.map(|object| object.fingerprint);
        self.client.write(path, content, expected).await
    }

    /// Manifest already stored under `name`, if it can be read
    async fn previous_manifest(&self, name: &str) -> Option<ChunkManifest> {
        match self.manifest(name).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable manifest for {}: {}", name, e);
                None
            }
        }
    }

    async fn delete_quietly(&self, path: &str) {
        if let Err(e) = self.client.delete(path).await {
            warn!("Could not delete {}: {}", path, e);
        }
    }

    /// Delete chunk objects `from..to` of `name`
    async fn discard_chunks(&self, name: &str, from: usize, to: usize) {
        for index in from..to {
            self.delete_quietly(&self.chunk_path(name, index)).await;
        }
    }

    /// Delete what an encode managed to write and build its error.
    ///
    /// A previous object survives untouched unless one of its chunks was
    /// already overwritten; then it is dropped whole.
    async fn abandon(
        &self,
        name: &str,
        failed_path: &str,
        cause: VaultError,
        written: &[String],
        previous: Option<&ChunkManifest>,
    ) -> VaultError {
        warn!(
            name,
            failed_path,
            written = written.len(),
            "Chunked write failed, rolling back"
        );
        for path in written {
            self.delete_quietly(path).await;
        }
        if !written.is_empty() {
            if let Some(previous) = previous {
                self.delete_quietly(&self.meta_path(name)).await;
                self.discard_chunks(name, written.len(), previous.total_chunks)
                    .await;
            }
        }
        VaultError::PartialChunkWrite {
            name: name.to_string(),
            failed_path: failed_path.to_string(),
            reason: cause.to_string(),
        }
    }
}
