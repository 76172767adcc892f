//! # Form Orchestrator
//!
//! One operation per form mutation, each following the same two phases:
//!
//! 1. **Critical**: a single persistence call. A failure aborts the mutation
//!    before any cache or broker traffic and is never retried here.
//! 2. **Propagation**: re-read the committed form (except for create and
//!    delete, which already know their payload), then refresh the cache and
//!    publish the domain event concurrently through a [`Propagator`].
//!
//! A committed write whose propagation fails is still reported as an error,
//! see [`OrchestrationError::is_committed`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::errors::{OrchestrationError, OrchestrationResult, PropagationError};
use super::propagation::{CacheEffect, Propagator};
use crate::cache::{CacheError, CacheGateway};
use crate::config::RetryConfig;
use crate::constants::DEFAULT_CALL_TIMEOUT;
use crate::events::FormEvent;
use crate::messaging::NotificationGateway;
use crate::models::{FieldSet, Form, FormFieldUpdate, FormId, Question};
use crate::persistence::FormRepository;
use crate::resilience::RetryPolicy;

#[derive(Clone)]
pub struct FormOrchestrator {
    repository: Arc<dyn FormRepository>,
    propagator: Propagator,
}

impl std::fmt::Debug for FormOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormOrchestrator")
            .field("propagator", &self.propagator)
            .finish()
    }
}

impl FormOrchestrator {
    /// Orchestrator with the default retry policy (3 attempts, 5s apart)
    pub fn new(
        repository: Arc<dyn FormRepository>,
        cache: Arc<dyn CacheGateway>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self::with_policy(
            repository,
            cache,
            notifier,
            RetryPolicy::default(),
            DEFAULT_CALL_TIMEOUT,
        )
    }

    pub fn with_policy(
        repository: Arc<dyn FormRepository>,
        cache: Arc<dyn CacheGateway>,
        notifier: Arc<dyn NotificationGateway>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            propagator: Propagator::new(cache, notifier, policy, call_timeout),
        }
    }

    pub fn from_config(
        repository: Arc<dyn FormRepository>,
        cache: Arc<dyn CacheGateway>,
        notifier: Arc<dyn NotificationGateway>,
        retry: &RetryConfig,
    ) -> Self {
        Self::with_policy(repository, cache, notifier, retry.policy(), retry.call_timeout())
    }

    pub fn repository(&self) -> &Arc<dyn FormRepository> {
        &self.repository
    }

    /// Persist a new form with its questions and announce `form.created`.
    ///
    /// The cached and published form is the input itself; no re-read.
    #[instrument(skip_all)]
    pub async fn create_form(&self, form: Option<Form>) -> OrchestrationResult<()> {
        let mut form = form.ok_or_else(|| OrchestrationError::invalid_argument("form is required"))?;
        if form.id.is_empty() {
            return Err(OrchestrationError::invalid_argument("form id must not be empty"));
        }
        form.sort_questions();

        self.repository
            .create_form(&form)
            .await
            .map_err(|e| OrchestrationError::persistence_failed("create_form", e))?;
        info!(form_id = %form.id, questions = form.questions.len(), "📝 Form created");

        self.propagate_form(&form, FormEvent::Created).await
    }

    /// Add one question to an existing form; announces `form.updated`
    #[instrument(skip_all)]
    pub async fn create_question(&self, question: Option<Question>) -> OrchestrationResult<()> {
        let question =
            question.ok_or_else(|| OrchestrationError::invalid_argument("question is required"))?;
        if question.form_id.is_empty() {
            return Err(OrchestrationError::invalid_argument("question form id must not be empty"));
        }

        let stored = self
            .repository
            .create_question(&question)
            .await
            .map_err(|e| OrchestrationError::persistence_failed("create_question", e))?;
        info!(
            form_id = %stored.form_id,
            question_id = stored.id,
            order_number = stored.order_number,
            "📝 Question created"
        );

        self.refresh_and_propagate(&stored.form_id).await
    }

    #[instrument(skip_all, fields(form_id = %form_id))]
    pub async fn update_status(&self, form_id: FormId, closed: bool) -> OrchestrationResult<()> {
        self.repository
            .update_field(&form_id, &FormFieldUpdate::Closed(closed))
            .await
            .map_err(|e| OrchestrationError::persistence_failed("update_status", e))?;
        info!(form_id = %form_id, closed = closed, "📝 Form status updated");

        self.refresh_and_propagate(&form_id).await
    }

    /// Apply several column updates in one write
    #[instrument(skip_all, fields(form_id = %form_id, columns = ?fields.columns()))]
    pub async fn update_fields(&self, form_id: FormId, fields: FieldSet) -> OrchestrationResult<()> {
        if fields.is_empty() {
            return Err(OrchestrationError::invalid_argument("field set must not be empty"));
        }

        self.repository
            .update_fields(&form_id, &fields)
            .await
            .map_err(|e| OrchestrationError::persistence_failed("update_fields", e))?;
        info!(form_id = %form_id, columns = ?fields.columns(), "📝 Form fields updated");

        self.refresh_and_propagate(&form_id).await
    }

    #[instrument(skip_all, fields(form_id = %form_id))]
    pub async fn update_description(
        &self,
        form_id: FormId,
        description: String,
    ) -> OrchestrationResult<()> {
        self.repository
            .update_field(&form_id, &FormFieldUpdate::Description(description))
            .await
            .map_err(|e| OrchestrationError::persistence_failed("update_description", e))?;
        info!(form_id = %form_id, "📝 Form description updated");

        self.refresh_and_propagate(&form_id).await
    }

    /// Remove a form, drop its cache entry and announce `form.deleted`
    /// with a `{"form_id": ...}` payload
    #[instrument(skip_all, fields(form_id = %form_id))]
    pub async fn delete_form(&self, form_id: FormId) -> OrchestrationResult<()> {
        self.repository
            .delete_form(&form_id)
            .await
            .map_err(|e| OrchestrationError::persistence_failed("delete_form", e))?;
        info!(form_id = %form_id, "🗑️ Form deleted");

        let payload = json!({ "form_id": form_id.as_str() });
        self.propagator
            .propagate(&form_id, CacheEffect::Remove, &payload, FormEvent::Deleted)
            .await
            .map_err(|e| OrchestrationError::propagation_failed(&form_id, e))
    }

    #[instrument(skip_all, fields(form_id = %form_id))]
    pub async fn delete_question(&self, form_id: FormId, order_number: u32) -> OrchestrationResult<()> {
        self.repository
            .delete_question(&form_id, order_number)
            .await
            .map_err(|e| OrchestrationError::persistence_failed("delete_question", e))?;
        info!(form_id = %form_id, order_number = order_number, "🗑️ Question deleted");

        self.refresh_and_propagate(&form_id).await
    }

    async fn refresh_and_propagate(&self, form_id: &FormId) -> OrchestrationResult<()> {
        let form = self.repository.get(form_id).await.map_err(|e| {
            warn!(form_id = %form_id, error = %e, "Committed form could not be read back");
            OrchestrationError::post_write_fetch_failed(form_id, e)
        })?;

        self.propagate_form(&form, FormEvent::Updated).await
    }

    async fn propagate_form(&self, form: &Form, event: FormEvent) -> OrchestrationResult<()> {
        let (payload, bytes) = serialize_form(form)
            .map_err(|e| OrchestrationError::propagation_failed(&form.id, PropagationError::Cache(e)))?;

        self.propagator
            .propagate(&form.id, CacheEffect::Write(bytes), &payload, event)
            .await
            .map_err(|e| OrchestrationError::propagation_failed(&form.id, e))
    }
}

/// Notification payload and cache bytes for `form`
fn serialize_form(form: &Form) -> Result<(Value, Vec<u8>), CacheError> {
    let payload = serde_json::to_value(form)?;
    let bytes = serde_json::to_vec(&payload)?;
    Ok((payload, bytes))
}
