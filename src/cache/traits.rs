//! Cache gateway trait definition

use async_trait::async_trait;

use super::errors::CacheResult;

/// Key/value cache holding serialized forms.
///
/// Implemented by the Redis provider and the in-memory provider. Entries
/// never expire; they are overwritten on update and removed on delete.
#[async_trait]
pub trait CacheGateway: Send + Sync + 'static {
    /// Store `value` under `key`, replacing any previous entry
    async fn write(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss
    async fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}
