//! # Health Checks
//!
//! Every long-lived backend handle reports liveness through [`HealthCheck`].
//! [`HealthRegistry`] aggregates them; the service is healthy only when all
//! registered checks pass. An erroring check counts as unhealthy.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error};

use crate::cache::CacheGateway;
use crate::messaging::{ConsumptionEngine, NotificationGateway};
use crate::persistence::FormRepository;

#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name used in logs when the check fails
    fn name(&self) -> &str;

    async fn is_healthy(&self) -> bool;
}

/// Aggregate of named health checks
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|check| check.name()))
            .finish()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Arc<dyn HealthCheck>) {
        self.checks.push(check);
    }

    pub fn with(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.register(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check; failures are logged by name
    pub async fn check_all(&self) -> bool {
        let results = join_all(self.checks.iter().map(|check| async move {
            let healthy = check.is_healthy().await;
            if !healthy {
                error!(component = check.name(), "❌ Health check failed");
            }
            healthy
        }))
        .await;

        let healthy = results.into_iter().all(|ok| ok);
        debug!(healthy = healthy, checks = self.checks.len(), "Health checks evaluated");
        healthy
    }
}

/// Persistence liveness
pub struct RepositoryHealth(pub Arc<dyn FormRepository>);

#[async_trait]
impl HealthCheck for RepositoryHealth {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn is_healthy(&self) -> bool {
        self.0.health_check().await.unwrap_or(false)
    }
}

pub struct CacheHealth(pub Arc<dyn CacheGateway>);

#[async_trait]
impl HealthCheck for CacheHealth {
    fn name(&self) -> &str {
        "cache"
    }

    async fn is_healthy(&self) -> bool {
        self.0.health_check().await.unwrap_or(false)
    }
}

pub struct NotifierHealth(pub Arc<dyn NotificationGateway>);

#[async_trait]
impl HealthCheck for NotifierHealth {
    fn name(&self) -> &str {
        "notifications"
    }

    async fn is_healthy(&self) -> bool {
        self.0.health_check().await.unwrap_or(false)
    }
}

#[async_trait]
impl HealthCheck for ConsumptionEngine {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn is_healthy(&self) -> bool {
        ConsumptionEngine::is_healthy(self).await
    }
}
