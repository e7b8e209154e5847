//! The vault service
//!
//! Built once per process from [`Config`] and passed down by reference.
//! [`Vault::shutdown`] must be awaited before exit: it stops the background
//! flush and force-flushes every cached path.

use crate::cache::{FlushReport, FlushTask, VersionedCache};
use crate::config::Config;
use crate::error::VaultResult;
use crate::large::LargeObjectStore;
use crate::remote::{create_transport, RemoteClient, RetryPolicy, Transport};
use crate::store::{
    collect_stats, create_backup, BackupReport, Collections, Memory, Sessions, Users, VaultStats,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Vault {
    cache: Arc<VersionedCache>,
    large: LargeObjectStore,
    flusher: FlushTask,
}

impl Vault {
    /// Connect to the configured remote, preload paths and start flushing
    pub async fn open(config: &Config) -> VaultResult<Self> {
        let transport = create_transport(config)?;
        Self::with_transport(transport, config).await
    }

    /// Like [`open`](Self::open) over an existing transport
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> VaultResult<Self> {
        let client = RemoteClient::new(transport, RetryPolicy::from(&config.client));
        let cache = Arc::new(VersionedCache::new(client.clone()));
        cache.load(&config.cache.preload).await?;

        let flusher = FlushTask::start(Arc::clone(&cache), config.cache.flush_interval());
        info!(
            backend = client.backend_name(),
            preloaded = config.cache.preload.len(),
            "Vault open"
        );

        Ok(Self {
            cache,
            large: LargeObjectStore::from_config(client, &config.large),
            flusher,
        })
    }

    pub fn cache(&self) -> &VersionedCache {
        &self.cache
    }

    pub fn collections(&self) -> Collections<'_> {
        Collections::new(&self.cache)
    }

    pub fn sessions(&self) -> Sessions<'_> {
        Sessions::new(&self.cache)
    }

    pub fn memory(&self) -> Memory<'_> {
        Memory::new(&self.cache)
    }

    pub fn users(&self) -> Users<'_> {
        Users::new(&self.cache)
    }

    pub fn large(&self) -> &LargeObjectStore {
        &self.large
    }

    pub async fn create_backup(&self) -> VaultResult<BackupReport> {
        create_backup(&self.cache).await
    }

    pub async fn stats(&self) -> VaultStats {
        collect_stats(&self.cache).await
    }

    /// Write every cached path now, dirty or not
    pub async fn flush(&self) -> FlushReport {
        self.cache.force_flush_all().await
    }

    /// Stop the background flush and force-flush everything
    pub async fn shutdown(self) -> FlushReport {
        self.flusher.stop().await;
        let report = self.cache.force_flush_all().await;
        if report.is_clean() {
            info!(flushed = report.flushed.len(), "Vault closed");
        } else {
            warn!(
                failed = report.failed.len(),
                "Vault closed with unsaved paths"
            );
        }
        report
    }
}
