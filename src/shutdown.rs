//! # Shutdown
//!
//! Ordered teardown of backend handles. [`CloserGroup`] closes every member
//! even when an earlier one fails; individual failures are logged and the
//! first one is returned.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{FormServiceError, Result};
use crate::messaging::{BrokerPublisher, ConsumptionEngine};
use crate::persistence::PostgresFormRepository;

#[async_trait]
pub trait Closeable: Send + Sync {
    fn component(&self) -> &str;

    async fn close(&self) -> Result<()>;
}

#[derive(Default)]
pub struct CloserGroup {
    members: Vec<Arc<dyn Closeable>>,
}

impl std::fmt::Debug for CloserGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|m| m.component()))
            .finish()
    }
}

impl CloserGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members close in registration order
    pub fn push(&mut self, member: Arc<dyn Closeable>) {
        self.members.push(member);
    }

    pub fn with(mut self, member: Arc<dyn Closeable>) -> Self {
        self.push(member);
        self
    }

    pub async fn close(&self) -> Result<()> {
        let mut first_error = None;

        for member in &self.members {
            match member.close().await {
                Ok(()) => info!(component = member.component(), "🛑 Closed"),
                Err(e) => {
                    error!(component = member.component(), error = %e, "Failed to close");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Closeable for ConsumptionEngine {
    fn component(&self) -> &str {
        "consumer"
    }

    async fn close(&self) -> Result<()> {
        ConsumptionEngine::close(self)
            .await
            .map_err(|e| FormServiceError::shutdown("consumer", e.to_string()))
    }
}

#[async_trait]
impl Closeable for BrokerPublisher {
    fn component(&self) -> &str {
        "publisher"
    }

    async fn close(&self) -> Result<()> {
        BrokerPublisher::close(self)
            .await
            .map_err(|e| FormServiceError::shutdown("publisher", e.to_string()))
    }
}

#[async_trait]
impl Closeable for PostgresFormRepository {
    fn component(&self) -> &str {
        "persistence"
    }

    async fn close(&self) -> Result<()> {
        PostgresFormRepository::close(self).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Member {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Closeable for Member {
        fn component(&self) -> &str {
            self.name
        }

        async fn close(&self) -> Result<()> {
            self.log.lock().push(self.name);
            if self.fail {
                Err(FormServiceError::shutdown(self.name, "boom"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_closes_all_and_returns_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let member = |name, fail| -> Arc<dyn Closeable> {
            Arc::new(Member {
                name,
                fail,
                log: log.clone(),
            })
        };

        let group = CloserGroup::new()
            .with(member("a", false))
            .with(member("b", true))
            .with(member("c", true));

        let err = group.close().await.unwrap_err();
        assert!(matches!(err, FormServiceError::Shutdown { ref component, .. } if component == "b"));
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_group_closes_cleanly() {
        assert!(CloserGroup::new().close().await.is_ok());
    }
}
