//! In-process [`FormRepository`] used by tests and local runs without a
//! database. Mirrors the PostgreSQL semantics: unique form ids, unique
//! order numbers per form, cascading form deletes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::errors::{PersistenceError, PersistenceResult};
use super::traits::FormRepository;
use crate::models::{FieldSet, Form, FormFieldUpdate, FormId, Question};

#[derive(Debug, Clone, Default)]
pub struct InMemoryFormRepository {
    forms: Arc<DashMap<FormId, Form>>,
    next_question_id: Arc<AtomicI64>,
}

impl InMemoryFormRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn contains(&self, id: &FormId) -> bool {
        self.forms.contains_key(id)
    }

    fn assign_id(&self) -> i64 {
        self.next_question_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn apply(form: &mut Form, update: &FormFieldUpdate) {
    match update {
        FormFieldUpdate::Title(value) => form.title = value.clone(),
        FormFieldUpdate::Description(value) => form.description = value.clone(),
        FormFieldUpdate::Author(value) => form.author = value.clone(),
        FormFieldUpdate::Closed(value) => form.closed = *value,
    }
}

#[async_trait]
impl FormRepository for InMemoryFormRepository {
    async fn create_form(&self, form: &Form) -> PersistenceResult<()> {
        let mut stored = form.clone();
        stored.sort_questions();
        if stored
            .questions
            .windows(2)
            .any(|pair| pair[0].order_number == pair[1].order_number)
        {
            return Err(PersistenceError::conflict(format!(
                "create_form: duplicate order number in form {}",
                form.id
            )));
        }
        for question in &mut stored.questions {
            question.id = self.assign_id();
            question.form_id = form.id.clone();
        }

        match self.forms.entry(form.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(PersistenceError::conflict(format!(
                "create_form: form {} already exists",
                form.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(())
            }
        }
    }

    async fn create_question(&self, question: &Question) -> PersistenceResult<Question> {
        let mut form = self
            .forms
            .get_mut(&question.form_id)
            .ok_or_else(|| PersistenceError::not_found(&question.form_id))?;

        if form
            .questions
            .iter()
            .any(|q| q.order_number == question.order_number)
        {
            return Err(PersistenceError::conflict(format!(
                "create_question: order number {} taken in form {}",
                question.order_number, question.form_id
            )));
        }

        let mut stored = question.clone();
        stored.id = self.assign_id();
        form.questions.push(stored.clone());
        form.sort_questions();
        Ok(stored)
    }

    async fn get(&self, id: &FormId) -> PersistenceResult<Form> {
        self.forms
            .get(id)
            .map(|form| form.value().clone())
            .ok_or_else(|| PersistenceError::not_found(id))
    }

    async fn update_field(&self, id: &FormId, update: &FormFieldUpdate) -> PersistenceResult<()> {
        let mut form = self
            .forms
            .get_mut(id)
            .ok_or_else(|| PersistenceError::not_found(id))?;
        apply(&mut form, update);
        Ok(())
    }

    async fn update_fields(&self, id: &FormId, fields: &FieldSet) -> PersistenceResult<()> {
        let mut form = self
            .forms
            .get_mut(id)
            .ok_or_else(|| PersistenceError::not_found(id))?;
        for update in fields {
            apply(&mut form, update);
        }
        Ok(())
    }

    async fn delete_form(&self, id: &FormId) -> PersistenceResult<()> {
        self.forms.remove(id);
        Ok(())
    }

    async fn delete_question(&self, id: &FormId, order_number: u32) -> PersistenceResult<()> {
        if let Some(mut form) = self.forms.get_mut(id) {
            form.questions.retain(|q| q.order_number != order_number);
        }
        Ok(())
    }

    async fn health_check(&self) -> PersistenceResult<bool> {
        Ok(true)
    }
}
