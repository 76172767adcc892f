//! # Envelope
//!
//! The unit exchanged on the broker in both directions. Inbound requests are
//! routed by `type`; outbound events carry the event name as `type`.
//!
//! Wire format is JSON `{"id", "payload", "type", "timestamp"}` where
//! `payload` is the base64 (standard alphabet, padded) encoding of the raw
//! payload bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};

/// Immutable broker message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    id: String,
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,
    #[serde(rename = "type")]
    envelope_type: String,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// New envelope with a fresh UUID v4 id and the current time
    pub fn new(envelope_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            envelope_type: envelope_type.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build from explicit parts; no validation is performed
    pub fn from_parts(
        id: impl Into<String>,
        envelope_type: impl Into<String>,
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            payload,
            envelope_type: envelope_type.into(),
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn envelope_type(&self) -> &str {
        &self.envelope_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Valid iff id, payload and type are all non-empty
    pub fn validate(&self) -> MessagingResult<()> {
        if self.id.is_empty() {
            return Err(MessagingError::invalid_envelope("id is empty"));
        }
        if self.payload.is_empty() {
            return Err(MessagingError::invalid_envelope("payload is empty"));
        }
        if self.envelope_type.is_empty() {
            return Err(MessagingError::invalid_envelope("type is empty"));
        }
        Ok(())
    }

    /// Decode a raw delivery body and validate it
    pub fn from_wire(body: &[u8]) -> MessagingResult<Self> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn to_wire(&self) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    /// Deserialize the payload bytes as JSON
    pub fn payload_json<T: serde::de::DeserializeOwned>(&self) -> MessagingResult<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        // null is how peers encode an absent byte slice
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_envelope_is_valid() {
        let envelope = Envelope::new("creation", br#"{"title":"Survey"}"#.to_vec());
        envelope.validate().unwrap();
        assert!(Uuid::parse_str(envelope.id()).is_ok());
        assert_eq!(envelope.envelope_type(), "creation");
    }

    #[test]
    fn test_payload_is_base64_on_the_wire() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let envelope = Envelope::from_parts("e-1", "form.created", b"hello".to_vec(), timestamp);

        let wire: serde_json::Value = serde_json::from_slice(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(wire["payload"], json!("aGVsbG8="));
        assert_eq!(wire["type"], json!("form.created"));
        assert_eq!(wire["id"], json!("e-1"));
    }

    #[test]
    fn test_from_wire_decodes_peer_message() {
        let body = json!({
            "id": "3f0c",
            "payload": "eyJmb3JtX2lkIjoiZjEifQ==",
            "type": "form-deletion",
            "timestamp": "2024-05-01T10:00:00.123456789+02:00"
        });

        let envelope = Envelope::from_wire(body.to_string().as_bytes()).unwrap();
        assert_eq!(envelope.payload(), br#"{"form_id":"f1"}"#);
        assert_eq!(envelope.envelope_type(), "form-deletion");

        let payload: serde_json::Value = envelope.payload_json().unwrap();
        assert_eq!(payload["form_id"], "f1");
    }

    #[test]
    fn test_from_wire_rejects_invalid_envelopes() {
        let cases = [
            json!({"id": "", "payload": "eA==", "type": "update", "timestamp": "2024-05-01T10:00:00Z"}),
            json!({"id": "a", "payload": null, "type": "update", "timestamp": "2024-05-01T10:00:00Z"}),
            json!({"id": "a", "payload": "eA==", "type": "", "timestamp": "2024-05-01T10:00:00Z"}),
        ];
        for case in cases {
            let err = Envelope::from_wire(case.to_string().as_bytes()).unwrap_err();
            assert!(matches!(err, MessagingError::InvalidEnvelope { .. }), "{case}");
        }
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        let err = Envelope::from_wire(b"not json at all").unwrap_err();
        assert!(matches!(err, MessagingError::MessageDeserialization { .. }));

        let body = json!({"id": "a", "payload": "%%%", "type": "update", "timestamp": "2024-05-01T10:00:00Z"});
        assert!(Envelope::from_wire(body.to_string().as_bytes()).is_err());
    }
}
