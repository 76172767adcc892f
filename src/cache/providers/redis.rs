//! Redis cache provider
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections
//! with automatic reconnection.

use async_trait::async_trait;
use tracing::debug;

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::CacheGateway;
use crate::config::redact_url;

/// Redis-backed form cache
#[derive(Clone)]
pub struct RedisCacheGateway {
    connection_manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisCacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheGateway")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisCacheGateway {
    /// Open a client for `url` and establish the managed connection
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| {
                CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
            })?;

        debug!(url = %redact_url(url), "Redis cache gateway connected");

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl CacheGateway for RedisCacheGateway {
    async fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis SET failed: {}", e)))?;

        debug!(key = key, bytes = value.len(), "Cache SET");
        Ok(())
    }

    async fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let result: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis GET failed: {}", e)))?;

        if result.is_some() {
            debug!(key = key, "Cache HIT");
        } else {
            debug!(key = key, "Cache MISS");
        }

        Ok(result)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis DEL failed: {}", e)))?;

        debug!(key = key, "Cache DEL");
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
