//! Remote store access
//!
//! [`Transport`] implementations speak to a content repository; the
//! [`RemoteClient`] layered on top owns retry, rate-limit and conflict
//! handling. [`create_transport`] picks the backend named in config.

mod client;
pub mod github;
pub mod memory;
mod transport;

pub use client::{RemoteClient, RetryPolicy, WriteReceipt};
pub use github::GitHubTransport;
pub use memory::MemoryTransport;
pub use transport::{
    DeleteRequest, Fingerprint, PutRequest, RemoteObject, Reply, Transport, TransportError,
};

use crate::config::{Backend, Config};
use crate::error::VaultResult;
use std::sync::Arc;
use tracing::debug;

/// Create the transport selected by `remote.backend`
pub fn create_transport(config: &Config) -> VaultResult<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.remote.backend {
        Backend::Github => Arc::new(GitHubTransport::from_config(
            &config.remote,
            &config.client,
        )?),
        Backend::Memory => Arc::new(MemoryTransport::new()),
    };
    debug!("Using {} remote store", transport.backend_name());
    Ok(transport)
}
