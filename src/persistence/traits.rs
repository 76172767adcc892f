//! Persistence gateway trait definition

use async_trait::async_trait;

use super::errors::PersistenceResult;
use crate::models::{FieldSet, Form, FormFieldUpdate, FormId, Question};

/// Durable store for forms and their questions; the source of truth.
///
/// Deletes are idempotent: removing something that does not exist succeeds.
/// Updates of a missing form fail with `NotFound`.
#[async_trait]
pub trait FormRepository: Send + Sync + 'static {
    /// Insert a form together with its questions; `Conflict` if the id exists
    async fn create_form(&self, form: &Form) -> PersistenceResult<()>;

    /// Insert a question and return it with its assigned id. `NotFound` if
    /// the form is missing, `Conflict` if the order number is taken.
    async fn create_question(&self, question: &Question) -> PersistenceResult<Question>;

    /// Load a form with its questions sorted by order number
    async fn get(&self, id: &FormId) -> PersistenceResult<Form>;

    async fn update_field(&self, id: &FormId, update: &FormFieldUpdate) -> PersistenceResult<()>;

    /// Apply every update of `fields` in one statement
    async fn update_fields(&self, id: &FormId, fields: &FieldSet) -> PersistenceResult<()>;

    /// Remove a form; its questions go with it
    async fn delete_form(&self, id: &FormId) -> PersistenceResult<()>;

    async fn delete_question(&self, id: &FormId, order_number: u32) -> PersistenceResult<()>;

    async fn health_check(&self) -> PersistenceResult<bool>;
}
