//! Orchestration error types
//!
//! Every mutation outcome is a returned value. The variants separate "nothing
//! was written" (`InvalidArgument`, `PersistenceFailed`) from "written but not
//! fully propagated" (`PostWriteFetchFailed`, `PropagationFailed`).

use thiserror::Error;

use crate::cache::CacheError;
use crate::messaging::MessagingError;
use crate::models::FormId;
use crate::persistence::PersistenceError;

/// Failure of one propagation task after its retries were exhausted
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("cache propagation failed: {0}")]
    Cache(#[source] CacheError),

    #[error("notification propagation failed: {0}")]
    Notification(#[source] MessagingError),
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Persistence failed during {operation}: {source}")]
    PersistenceFailed {
        operation: &'static str,
        #[source]
        source: PersistenceError,
    },

    #[error("Form {form_id} was written but could not be read back: {source}")]
    PostWriteFetchFailed {
        form_id: FormId,
        #[source]
        source: PersistenceError,
    },

    #[error("Form {form_id} was written but not propagated: {source}")]
    PropagationFailed {
        form_id: FormId,
        #[source]
        source: PropagationError,
    },
}

impl OrchestrationError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn persistence_failed(operation: &'static str, source: PersistenceError) -> Self {
        Self::PersistenceFailed { operation, source }
    }

    pub fn post_write_fetch_failed(form_id: &FormId, source: PersistenceError) -> Self {
        Self::PostWriteFetchFailed {
            form_id: form_id.clone(),
            source,
        }
    }

    pub fn propagation_failed(form_id: &FormId, source: PropagationError) -> Self {
        Self::PropagationFailed {
            form_id: form_id.clone(),
            source,
        }
    }

    /// True when the durable write happened even though the call failed
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            Self::PostWriteFetchFailed { .. } | Self::PropagationFailed { .. }
        )
    }

    /// Cache error behind a propagation failure, if that is what failed
    pub fn cache_cause(&self) -> Option<&CacheError> {
        match self {
            Self::PropagationFailed {
                source: PropagationError::Cache(err),
                ..
            } => Some(err),
            _ => None,
        }
    }

    pub fn notification_cause(&self) -> Option<&MessagingError> {
        match self {
            Self::PropagationFailed {
                source: PropagationError::Notification(err),
                ..
            } => Some(err),
            _ => None,
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_classification() {
        let id = FormId::new("f1");

        assert!(!OrchestrationError::invalid_argument("form is required").is_committed());
        assert!(!OrchestrationError::persistence_failed(
            "create_form",
            PersistenceError::Connection("down".into())
        )
        .is_committed());
        assert!(OrchestrationError::post_write_fetch_failed(&id, PersistenceError::not_found(&id))
            .is_committed());

        let err = OrchestrationError::propagation_failed(
            &id,
            PropagationError::Cache(CacheError::ConnectionError("refused".into())),
        );
        assert!(err.is_committed());
        assert!(err.cache_cause().is_some());
        assert!(err.notification_cause().is_none());
    }

    #[test]
    fn test_display_names_the_form() {
        let id = FormId::new("f1");
        let err = OrchestrationError::propagation_failed(
            &id,
            PropagationError::Notification(MessagingError::timeout("publish", 10)),
        );
        assert!(err.to_string().starts_with("Form f1 was written but not propagated"));
    }
}
