//! # Messaging Error Types
//!
//! Broker-facing failures: connecting, declaring topology, publishing,
//! consuming, and encoding or decoding envelopes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Broker channel is closed")]
    ChannelClosed,

    #[error("Topology declaration failed: {object}: {message}")]
    Topology { object: String, message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Consume failed: {queue_name}: {message}")]
    Consume { queue_name: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("Network timeout: operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a topology (exchange, queue or binding) declaration error
    pub fn topology(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Topology {
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn invalid_envelope(reason: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure means the connection must be re-established
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection { .. } | MessagingError::ChannelClosed
        )
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin::Error to MessagingError
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                MessagingError::ChannelClosed
            }
            _ => MessagingError::connection(err.to_string()),
        }
    }
}

/// Result type for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
