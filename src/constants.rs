//! # System Constants
//!
//! Fixed names and default tunables shared across the coordinator.

use std::time::Duration;

/// Prefix for every cache key holding a serialized form (`form:<id>`)
pub const FORM_CACHE_KEY_PREFIX: &str = "form:";

/// Attempts made by the retry executor for propagation calls
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between propagation attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for a single cache or notification call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between failed broker reconnection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval of the connection health probe while consuming
pub const DEFAULT_HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the bounded queue between the consumer and the dispatcher
pub const DEFAULT_DELIVERY_QUEUE_CAPACITY: usize = 100;

/// Outbound domain event names
pub mod events {
    pub const FORM_CREATED: &str = "form.created";
    pub const FORM_UPDATED: &str = "form.updated";
    pub const FORM_DELETED: &str = "form.deleted";
}

/// Default inbound envelope types
pub mod request_types {
    pub const CREATION: &str = "creation";
    pub const QUESTION_CREATION: &str = "question-creation";
    pub const UPDATE: &str = "update";
    pub const STATUS_UPDATE: &str = "status-update";
    pub const FIELD_UPDATE: &str = "field-update";
    pub const DESCRIPTION_UPDATE: &str = "description-update";
    pub const FORM_DELETION: &str = "form-deletion";
    pub const QUESTION_DELETION: &str = "question-deletion";
}

/// System-level identifiers
pub mod system {
    pub const SERVICE_NAME: &str = "form-coordinator";
    pub const CONFIG_FILE_STEM: &str = "form-coordinator";
    pub const ENV_PREFIX: &str = "FORM";
}
