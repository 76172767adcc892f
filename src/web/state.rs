//! Shared state of the health endpoint

use std::sync::Arc;

use crate::health::HealthRegistry;

#[derive(Debug, Clone)]
pub struct WebState {
    pub health: Arc<HealthRegistry>,
}

impl WebState {
    pub fn new(health: HealthRegistry) -> Self {
        Self {
            health: Arc::new(health),
        }
    }
}
