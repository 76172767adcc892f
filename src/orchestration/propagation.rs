//! # Propagation Group
//!
//! The non-critical half of a mutation: refresh the cache entry and announce
//! the change. Both tasks start together, each retried under the same
//! [`RetryPolicy`] with every single call bounded by a timeout. The group
//! waits for both and reports the first failure in fixed order, cache before
//! notification, so a failing cache never hides behind a failing publish.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use super::errors::PropagationError;
use crate::cache::{CacheError, CacheGateway};
use crate::events::FormEvent;
use crate::messaging::{MessagingError, NotificationGateway};
use crate::models::FormId;
use crate::resilience::RetryPolicy;

/// What happens to the cached copy of a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEffect {
    /// Overwrite the entry with these serialized bytes
    Write(Vec<u8>),
    /// Remove the entry
    Remove,
}

/// Runs cache and notification propagation for one mutation
#[derive(Clone)]
pub struct Propagator {
    cache: Arc<dyn CacheGateway>,
    notifier: Arc<dyn NotificationGateway>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("cache", &self.cache.provider_name())
            .field("policy", &self.policy)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Propagator {
    pub fn new(
        cache: Arc<dyn CacheGateway>,
        notifier: Arc<dyn NotificationGateway>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            notifier,
            policy,
            call_timeout,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Apply `effect` to the cache entry of `form_id` and publish `payload`
    /// as `event`, concurrently. Returns once both tasks have finished.
    pub async fn propagate(
        &self,
        form_id: &FormId,
        effect: CacheEffect,
        payload: &Value,
        event: FormEvent,
    ) -> Result<(), PropagationError> {
        let key = form_id.cache_key();

        let (cache_result, notify_result) = tokio::join!(
            self.refresh_cache(&key, &effect),
            self.announce(payload, event)
        );

        let outcome = collect_first_failure([
            cache_result.map_err(PropagationError::Cache),
            notify_result.map_err(PropagationError::Notification),
        ]);

        match &outcome {
            Ok(()) => debug!(form_id = %form_id, event = %event, "Propagation complete"),
            Err(err) => error!(form_id = %form_id, event = %event, error = %err, "❌ Propagation failed"),
        }
        outcome
    }

    async fn refresh_cache(&self, key: &str, effect: &CacheEffect) -> Result<(), CacheError> {
        let cache = self.cache.as_ref();
        let limit = self.call_timeout;

        match effect {
            CacheEffect::Write(bytes) => {
                let bytes = bytes.as_slice();
                self.policy
                    .execute("cache_write", || async move {
                        tokio::time::timeout(limit, cache.write(key, bytes))
                            .await
                            .map_err(|_| cache_timeout("write", key, limit))?
                    })
                    .await
            }
            CacheEffect::Remove => {
                self.policy
                    .execute("cache_delete", || async move {
                        tokio::time::timeout(limit, cache.delete(key))
                            .await
                            .map_err(|_| cache_timeout("delete", key, limit))?
                    })
                    .await
            }
        }
    }

    async fn announce(&self, payload: &Value, event: FormEvent) -> Result<(), MessagingError> {
        let notifier = self.notifier.as_ref();
        let limit = self.call_timeout;

        self.policy
            .execute("notification_publish", || async move {
                tokio::time::timeout(limit, notifier.publish(payload, event))
                    .await
                    .map_err(|_| MessagingError::timeout("publish", limit.as_millis() as u64))?
            })
            .await
    }
}

fn cache_timeout(operation: &str, key: &str, limit: Duration) -> CacheError {
    CacheError::Timeout(format!("{operation} {key} exceeded {}ms", limit.as_millis()))
}

/// First error in slice order; results are listed in priority order
fn collect_first_failure<E, const N: usize>(results: [Result<(), E>; N]) -> Result<(), E> {
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_prefers_earlier_failures() {
        let all_ok: [Result<(), &str>; 2] = [Ok(()), Ok(())];
        assert!(collect_first_failure(all_ok).is_ok());

        assert_eq!(collect_first_failure([Err("cache"), Err("notify")]), Err("cache"));
        assert_eq!(collect_first_failure([Ok(()), Err("notify")]), Err("notify"));
    }
}
