//! Summary counts across the cache and views

use super::{Collections, Memory, Sessions, Users};
use crate::cache::VersionedCache;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    pub total_files: usize,
    pub dirty_files: usize,
    /// Entries per collection
    pub collections: BTreeMap<String, usize>,
    pub sessions_count: usize,
    pub memory_categories: usize,
    pub total_memories: usize,
    pub users_count: usize,
}

pub async fn collect_stats(cache: &VersionedCache) -> VaultStats {
    let categories = Memory::new(cache).categories().await;
    VaultStats {
        total_files: cache.paths().await.len(),
        dirty_files: cache.dirty_count().await,
        collections: Collections::new(cache).sizes().await,
        sessions_count: Sessions::new(cache).list().await.len(),
        memory_categories: categories.len(),
        total_memories: categories.values().sum(),
        users_count: Users::new(cache).count().await,
    }
}
