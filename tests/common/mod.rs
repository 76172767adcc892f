//! Recording gateways for orchestration tests.
//!
//! Each double delegates to an in-memory implementation, records every call
//! in order and can be told to fail a number of times (or always).

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use form_coordinator::cache::{CacheError, CacheGateway, CacheResult, InMemoryCache};
use form_coordinator::events::FormEvent;
use form_coordinator::messaging::{MessagingError, MessagingResult, NotificationGateway};
use form_coordinator::models::{FieldSet, Form, FormFieldUpdate, FormId, Question};
use form_coordinator::orchestration::FormOrchestrator;
use form_coordinator::persistence::{
    FormRepository, InMemoryFormRepository, PersistenceError, PersistenceResult,
};
use form_coordinator::resilience::RetryPolicy;

pub const ALWAYS: u32 = u32::MAX;

/// Failure budget: `ALWAYS` never runs out
#[derive(Debug, Default)]
pub struct FailurePlan {
    remaining: AtomicU32,
}

impl FailurePlan {
    pub fn set(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    CreateForm(Form),
    CreateQuestion(Question),
    Get(FormId),
    UpdateField(FormId, FormFieldUpdate),
    UpdateFields(FormId, FieldSet),
    DeleteForm(FormId),
    DeleteQuestion(FormId, u32),
}

#[derive(Debug, Default)]
pub struct RecordingRepository {
    inner: InMemoryFormRepository,
    calls: Mutex<Vec<RepoCall>>,
    pub write_failures: FailurePlan,
    pub read_failures: FailurePlan,
}

impl RecordingRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().clone()
    }

    pub fn inner(&self) -> &InMemoryFormRepository {
        &self.inner
    }

    fn record(&self, call: RepoCall) {
        self.calls.lock().push(call);
    }

    fn write_gate(&self) -> PersistenceResult<()> {
        if self.write_failures.should_fail() {
            return Err(PersistenceError::Connection("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FormRepository for RecordingRepository {
    async fn create_form(&self, form: &Form) -> PersistenceResult<()> {
        self.record(RepoCall::CreateForm(form.clone()));
        self.write_gate()?;
        self.inner.create_form(form).await
    }

    async fn create_question(&self, question: &Question) -> PersistenceResult<Question> {
        self.record(RepoCall::CreateQuestion(question.clone()));
        self.write_gate()?;
        self.inner.create_question(question).await
    }

    async fn get(&self, id: &FormId) -> PersistenceResult<Form> {
        self.record(RepoCall::Get(id.clone()));
        if self.read_failures.should_fail() {
            return Err(PersistenceError::Connection("injected read failure".into()));
        }
        self.inner.get(id).await
    }

    async fn update_field(&self, id: &FormId, update: &FormFieldUpdate) -> PersistenceResult<()> {
        self.record(RepoCall::UpdateField(id.clone(), update.clone()));
        self.write_gate()?;
        self.inner.update_field(id, update).await
    }

    async fn update_fields(&self, id: &FormId, fields: &FieldSet) -> PersistenceResult<()> {
        self.record(RepoCall::UpdateFields(id.clone(), fields.clone()));
        self.write_gate()?;
        self.inner.update_fields(id, fields).await
    }

    async fn delete_form(&self, id: &FormId) -> PersistenceResult<()> {
        self.record(RepoCall::DeleteForm(id.clone()));
        self.write_gate()?;
        self.inner.delete_form(id).await
    }

    async fn delete_question(&self, id: &FormId, order_number: u32) -> PersistenceResult<()> {
        self.record(RepoCall::DeleteQuestion(id.clone(), order_number));
        self.write_gate()?;
        self.inner.delete_question(id, order_number).await
    }

    async fn health_check(&self) -> PersistenceResult<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Write { key: String, value: Vec<u8> },
    Read { key: String },
    Delete { key: String },
}

#[derive(Debug, Default)]
pub struct RecordingCache {
    inner: InMemoryCache,
    calls: Mutex<Vec<CacheCall>>,
    pub failures: FailurePlan,
    hang: AtomicBool,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(count: u32) -> Arc<Self> {
        let cache = Self::default();
        cache.failures.set(count);
        Arc::new(cache)
    }

    /// Every call blocks forever
    pub fn hanging() -> Arc<Self> {
        let cache = Self::default();
        cache.hang.store(true, Ordering::SeqCst);
        Arc::new(cache)
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CacheCall::Write { key, value } => Some((key, value)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CacheCall::Delete { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn inner(&self) -> &InMemoryCache {
        &self.inner
    }

    async fn gate(&self) -> CacheResult<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failures.should_fail() {
            return Err(CacheError::ConnectionError("injected cache failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheGateway for RecordingCache {
    async fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.calls.lock().push(CacheCall::Write {
            key: key.to_string(),
            value: value.to_vec(),
        });
        self.gate().await?;
        self.inner.write(key, value).await
    }

    async fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.calls.lock().push(CacheCall::Read {
            key: key.to_string(),
        });
        self.gate().await?;
        self.inner.read(key).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.calls.lock().push(CacheCall::Delete {
            key: key.to_string(),
        });
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(Value, FormEvent)>>,
    pub failures: FailurePlan,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(count: u32) -> Arc<Self> {
        let notifier = Self::default();
        notifier.failures.set(count);
        Arc::new(notifier)
    }

    pub fn calls(&self) -> Vec<(Value, FormEvent)> {
        self.calls.lock().clone()
    }

    pub fn events(&self) -> Vec<FormEvent> {
        self.calls().into_iter().map(|(_, event)| event).collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    async fn publish(&self, payload: &Value, event: FormEvent) -> MessagingResult<()> {
        self.calls.lock().push((payload.clone(), event));
        if self.failures.should_fail() {
            return Err(MessagingError::connection("injected publish failure"));
        }
        Ok(())
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }
}

/// Recording collaborators wired into an orchestrator
pub struct Harness {
    pub repository: Arc<RecordingRepository>,
    pub cache: Arc<RecordingCache>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: FormOrchestrator,
}

impl Harness {
    /// Default policy: 3 attempts, 5s apart, 10s per call
    pub fn new() -> Self {
        Self::with(RecordingRepository::new(), RecordingCache::new(), RecordingNotifier::new())
    }

    pub fn with(
        repository: Arc<RecordingRepository>,
        cache: Arc<RecordingCache>,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        let orchestrator = FormOrchestrator::new(repository.clone(), cache.clone(), notifier.clone());
        Self {
            repository,
            cache,
            notifier,
            orchestrator,
        }
    }

    pub fn with_policy(policy: RetryPolicy, call_timeout: Duration) -> Self {
        let repository = RecordingRepository::new();
        let cache = RecordingCache::new();
        let notifier = RecordingNotifier::new();
        let orchestrator = FormOrchestrator::with_policy(
            repository.clone(),
            cache.clone(),
            notifier.clone(),
            policy,
            call_timeout,
        );
        Self {
            repository,
            cache,
            notifier,
            orchestrator,
        }
    }
}

/// Form `{id: "f1", title: "T", author: "A"}`
pub fn sample_form(id: &str) -> Form {
    let mut form = Form::new("T", "", "A");
    form.id = FormId::new(id);
    form
}
