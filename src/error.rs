//! Error types for the form coordinator.
//!
//! Each subsystem owns a `thiserror` enum (`PersistenceError`, `CacheError`,
//! `MessagingError`, `ConfigurationError`, `OrchestrationError`). This module
//! ties them together for callers that span subsystems, such as the binary
//! and the shutdown path.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::orchestration::OrchestrationError;
use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum FormServiceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
    #[error("Health endpoint error: {0}")]
    HealthEndpoint(String),
    #[error("Shutdown error: {component}: {message}")]
    Shutdown { component: String, message: String },
}

impl FormServiceError {
    pub fn shutdown(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shutdown {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for FormServiceError {
    fn from(err: std::io::Error) -> Self {
        FormServiceError::HealthEndpoint(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FormServiceError>;
