//! # Domain Events
//!
//! Outbound notifications announced after a form mutation has been persisted.
//! Event names are fixed strings consumed by downstream services; they are not
//! configurable per call.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::events;

/// Domain-change notification kinds published to the output exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormEvent {
    /// A new form was persisted
    #[serde(rename = "form.created")]
    Created,
    /// An existing form (or one of its questions) changed
    #[serde(rename = "form.updated")]
    Updated,
    /// A form and its questions were removed
    #[serde(rename = "form.deleted")]
    Deleted,
}

impl FormEvent {
    /// Wire name, also used as the routing key when publishing
    pub fn as_str(&self) -> &'static str {
        match self {
            FormEvent::Created => events::FORM_CREATED,
            FormEvent::Updated => events::FORM_UPDATED,
            FormEvent::Deleted => events::FORM_DELETED,
        }
    }
}

impl fmt::Display for FormEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        assert_eq!(FormEvent::Created.as_str(), "form.created");
        assert_eq!(FormEvent::Updated.as_str(), "form.updated");
        assert_eq!(FormEvent::Deleted.to_string(), "form.deleted");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&FormEvent::Updated).unwrap();
        assert_eq!(json, "\"form.updated\"");

        let parsed: FormEvent = serde_json::from_str("\"form.deleted\"").unwrap();
        assert_eq!(parsed, FormEvent::Deleted);
    }
}
