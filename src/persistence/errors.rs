//! Persistence error types

use thiserror::Error;

use crate::models::FormId;

/// PostgreSQL SQLSTATE codes the repository maps to domain errors
pub(crate) mod pg_error_code {
    /// Duplicate key (form id, or order number within a form)
    pub const UNIQUE_VIOLATION: &str = "23505";
    /// Question referencing a missing form
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Form not found: {form_id}")]
    NotFound { form_id: FormId },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid data for {field}: {message}")]
    InvalidData { field: String, message: String },

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {operation}: {message}")]
    Query { operation: String, message: String },
}

impl PersistenceError {
    pub fn not_found(form_id: &FormId) -> Self {
        Self::NotFound {
            form_id: form_id.clone(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_data(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Map a driver error for `operation`, classifying integrity violations
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(pg_error_code::UNIQUE_VIOLATION) => {
                    Self::conflict(format!("{operation}: {}", db_err.message()))
                }
                Some(pg_error_code::FOREIGN_KEY_VIOLATION) => {
                    Self::invalid_data("form_id", format!("{operation}: {}", db_err.message()))
                }
                _ => Self::query(operation, err.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(format!("{operation}: {err}"))
            }
            _ => Self::query(operation, err.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_form() {
        let err = PersistenceError::not_found(&FormId::new("f1"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Form not found: f1");
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = PersistenceError::from_sqlx("get", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, PersistenceError::Connection(_)));

        let err = PersistenceError::from_sqlx("get", sqlx::Error::RowNotFound);
        assert!(matches!(err, PersistenceError::Query { .. }));
    }
}
