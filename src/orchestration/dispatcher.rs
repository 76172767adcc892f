//! # Envelope Dispatcher
//!
//! Drains the delivery queue filled by the consumption engine and turns each
//! envelope into one orchestrator call. Payloads are decoded per envelope
//! type; column updates are validated into a [`FieldSet`] here, before the
//! orchestrator sees them.
//!
//! | type (default)       | payload                                   | operation            |
//! |----------------------|-------------------------------------------|----------------------|
//! | `creation`           | form (id optional)                        | `create_form`        |
//! | `question-creation`  | `{form_id, content, order_number}`        | `create_question`    |
//! | `update`             | form object with `id`                     | `update_fields`      |
//! | `status-update`      | `{form_id, closed}`                       | `update_status`      |
//! | `field-update`       | `{form_id, fields: {column: value}}`      | `update_fields`      |
//! | `description-update` | `{form_id, description}`                  | `update_description` |
//! | `form-deletion`      | `{form_id}`                               | `delete_form`        |
//! | `question-deletion`  | `{form_id, order_number}`                 | `delete_question`    |
//!
//! Failures are logged per envelope and never stop the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::OrchestrationError;
use super::form_orchestrator::FormOrchestrator;
use crate::config::RequestTypesConfig;
use crate::messaging::Envelope;
use crate::models::{FieldSet, FieldUpdateError, FormDraft, FormFieldUpdate, FormId, Question};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown envelope type '{0}'")]
    UnknownType(String),

    #[error("Malformed {envelope_type} payload: {message}")]
    MalformedPayload {
        envelope_type: String,
        message: String,
    },

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

impl DispatchError {
    fn malformed(envelope_type: &str, message: impl ToString) -> Self {
        Self::MalformedPayload {
            envelope_type: envelope_type.to_string(),
            message: message.to_string(),
        }
    }
}

/// Orchestrator operation an envelope type routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Creation,
    QuestionCreation,
    Update,
    StatusUpdate,
    FieldUpdate,
    DescriptionUpdate,
    FormDeletion,
    QuestionDeletion,
}

#[derive(Debug, Deserialize)]
struct QuestionCreationRequest {
    form_id: FormId,
    content: String,
    order_number: u32,
}

#[derive(Debug, Deserialize)]
struct FormUpdateRequest {
    #[serde(alias = "form_id")]
    id: FormId,
    title: Option<String>,
    description: Option<String>,
    author: Option<String>,
    closed: Option<bool>,
}

impl FormUpdateRequest {
    fn into_parts(self) -> Result<(FormId, FieldSet), FieldUpdateError> {
        let updates = [
            self.title.map(FormFieldUpdate::Title),
            self.description.map(FormFieldUpdate::Description),
            self.author.map(FormFieldUpdate::Author),
            self.closed.map(FormFieldUpdate::Closed),
        ];
        let fields = FieldSet::new(updates.into_iter().flatten().collect())?;
        Ok((self.id, fields))
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    form_id: FormId,
    closed: bool,
}

#[derive(Debug, Deserialize)]
struct FieldUpdateRequest {
    form_id: FormId,
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DescriptionUpdateRequest {
    form_id: FormId,
    description: String,
}

#[derive(Debug, Deserialize)]
struct FormDeletionRequest {
    form_id: FormId,
}

#[derive(Debug, Deserialize)]
struct QuestionDeletionRequest {
    form_id: FormId,
    order_number: u32,
}

/// Dispatcher counters
#[derive(Debug, Default)]
struct DispatchCounters {
    handled: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
}

/// Snapshot of [`EnvelopeDispatcher`] counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub failed: u64,
    pub ignored: u64,
}

pub struct EnvelopeDispatcher {
    orchestrator: Arc<FormOrchestrator>,
    routes: HashMap<String, RequestKind>,
    counters: DispatchCounters,
}

impl std::fmt::Debug for EnvelopeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeDispatcher")
            .field("routes", &self.routes)
            .finish()
    }
}

impl EnvelopeDispatcher {
    pub fn new(orchestrator: Arc<FormOrchestrator>, request_types: &RequestTypesConfig) -> Self {
        let routes = [
            (&request_types.creation, RequestKind::Creation),
            (&request_types.question_creation, RequestKind::QuestionCreation),
            (&request_types.update, RequestKind::Update),
            (&request_types.status_update, RequestKind::StatusUpdate),
            (&request_types.field_update, RequestKind::FieldUpdate),
            (&request_types.description_update, RequestKind::DescriptionUpdate),
            (&request_types.form_deletion, RequestKind::FormDeletion),
            (&request_types.question_deletion, RequestKind::QuestionDeletion),
        ]
        .into_iter()
        .map(|(name, kind)| (name.clone(), kind))
        .collect();

        Self {
            orchestrator,
            routes,
            counters: DispatchCounters::default(),
        }
    }

    pub fn route(&self, envelope_type: &str) -> Option<RequestKind> {
        self.routes.get(envelope_type).copied()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            handled: self.counters.handled.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
        }
    }

    /// Decode `envelope` and run the matching orchestrator operation
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let envelope_type = envelope.envelope_type();
        let kind = self
            .route(envelope_type)
            .ok_or_else(|| DispatchError::UnknownType(envelope_type.to_string()))?;
        let orchestrator = &self.orchestrator;

        match kind {
            RequestKind::Creation => {
                let draft: FormDraft = decode(envelope)?;
                orchestrator.create_form(Some(draft.into_form())).await?;
            }
            RequestKind::QuestionCreation => {
                let req: QuestionCreationRequest = decode(envelope)?;
                let question = Question::new(req.form_id, req.content, req.order_number);
                orchestrator.create_question(Some(question)).await?;
            }
            RequestKind::Update => {
                let req: FormUpdateRequest = decode(envelope)?;
                let (form_id, fields) = req
                    .into_parts()
                    .map_err(|e| DispatchError::malformed(envelope_type, e))?;
                orchestrator.update_fields(form_id, fields).await?;
            }
            RequestKind::StatusUpdate => {
                let req: StatusUpdateRequest = decode(envelope)?;
                orchestrator.update_status(req.form_id, req.closed).await?;
            }
            RequestKind::FieldUpdate => {
                let req: FieldUpdateRequest = decode(envelope)?;
                let fields = FieldSet::try_from_map(&req.fields)
                    .map_err(|e| DispatchError::malformed(envelope_type, e))?;
                orchestrator.update_fields(req.form_id, fields).await?;
            }
            RequestKind::DescriptionUpdate => {
                let req: DescriptionUpdateRequest = decode(envelope)?;
                orchestrator
                    .update_description(req.form_id, req.description)
                    .await?;
            }
            RequestKind::FormDeletion => {
                let req: FormDeletionRequest = decode(envelope)?;
                orchestrator.delete_form(req.form_id).await?;
            }
            RequestKind::QuestionDeletion => {
                let req: QuestionDeletionRequest = decode(envelope)?;
                orchestrator
                    .delete_question(req.form_id, req.order_number)
                    .await?;
            }
        }
        Ok(())
    }

    /// Process envelopes until `cancel` fires or the queue closes
    pub async fn run(&self, mut deliveries: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
        info!(routes = self.routes.len(), "🚦 Envelope dispatcher started");

        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = deliveries.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.handle(&envelope).await;
        }

        info!(stats = ?self.stats(), "🚦 Envelope dispatcher stopped");
    }

    async fn handle(&self, envelope: &Envelope) {
        match self.dispatch(envelope).await {
            Ok(()) => {
                self.counters.handled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    envelope_id = %envelope.id(),
                    envelope_type = %envelope.envelope_type(),
                    "Envelope handled"
                );
            }
            Err(DispatchError::UnknownType(envelope_type)) => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                warn!(
                    envelope_id = %envelope.id(),
                    envelope_type = %envelope_type,
                    "Ignoring envelope of unknown type"
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let committed = matches!(&err, DispatchError::Orchestration(e) if e.is_committed());
                error!(
                    envelope_id = %envelope.id(),
                    envelope_type = %envelope.envelope_type(),
                    committed = committed,
                    error = %err,
                    "❌ Envelope handling failed"
                );
            }
        }
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, DispatchError> {
    serde_json::from_slice(envelope.payload())
        .map_err(|e| DispatchError::malformed(envelope.envelope_type(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_collects_present_fields() {
        let req: FormUpdateRequest = serde_json::from_value(json!({
            "id": "f1",
            "title": "New",
            "closed": true,
            "questions": []
        }))
        .unwrap();

        let (id, fields) = req.into_parts().unwrap();
        assert_eq!(id, FormId::new("f1"));
        assert_eq!(fields.columns(), vec!["title", "closed"]);
    }

    #[test]
    fn test_update_request_without_fields_is_rejected() {
        let req: FormUpdateRequest = serde_json::from_value(json!({"form_id": "f1"})).unwrap();
        assert_eq!(req.into_parts().unwrap_err(), FieldUpdateError::Empty);
    }
}
