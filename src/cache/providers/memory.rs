//! In-memory cache provider backed by `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::cache::errors::CacheResult;
use crate::cache::traits::CacheGateway;

/// Process-local cache for tests and local development.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl CacheGateway for InMemoryCache {
    async fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_overwrites_previous_value() {
        let cache = InMemoryCache::new();
        cache.write("form:a", b"one").await.unwrap();
        cache.write("form:a", b"two").await.unwrap();

        assert_eq!(cache.read("form:a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let cache = InMemoryCache::new();
        cache.delete("form:missing").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = InMemoryCache::new();
        let other = cache.clone();
        cache.write("form:b", b"{}").await.unwrap();

        assert!(other.contains_key("form:b"));
    }
}
