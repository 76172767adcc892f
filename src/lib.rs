#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Form Coordinator
//!
//! Event-driven CRUD coordinator for forms and their ordered questions.
//!
//! Change requests arrive as envelopes on a RabbitMQ queue. Each one becomes
//! a mutation that is written to PostgreSQL, mirrored into a Redis
//! read-through cache and announced as a domain event on the output
//! exchange. The database write is authoritative; cache refresh and event
//! publication are retried but best-effort.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ ──> ConsumptionEngine ──(bounded mpsc)──> EnvelopeDispatcher
//!                                                          │
//!                                                   FormOrchestrator
//!                                    ┌─────────────────────┼─────────────────────┐
//!                              FormRepository        CacheGateway        NotificationGateway
//!                               (PostgreSQL)            (Redis)              (RabbitMQ)
//! ```
//!
//! ## Module Organization
//!
//! - [`orchestration`] - mutation protocol, propagation group, dispatcher, cache read-through
//! - [`messaging`] - envelopes, broker transport, consumption engine, publisher
//! - [`persistence`] - form repository over PostgreSQL
//! - [`cache`] - form cache over Redis
//! - [`resilience`] - fixed-delay retry
//! - [`config`] - layered configuration
//! - [`health`], [`web`] - health checks and the `GET /health` endpoint
//! - [`shutdown`] - ordered teardown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use form_coordinator::cache::InMemoryCache;
//! use form_coordinator::messaging::{BrokerPublisher, InMemoryBroker};
//! use form_coordinator::models::Form;
//! use form_coordinator::orchestration::FormOrchestrator;
//! use form_coordinator::persistence::InMemoryFormRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = InMemoryBroker::new();
//! let orchestrator = FormOrchestrator::new(
//!     Arc::new(InMemoryFormRepository::new()),
//!     Arc::new(InMemoryCache::new()),
//!     Arc::new(BrokerPublisher::new(broker.transport(), "form.events")),
//! );
//!
//! orchestrator.create_form(Some(Form::new("Survey", "Quarterly", "ana"))).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod resilience;
pub mod shutdown;
pub mod web;

pub use config::{ConfigManager, FormCoordinatorConfig};
pub use error::{FormServiceError, Result};
pub use events::FormEvent;
pub use messaging::{ConsumptionEngine, Envelope};
pub use models::{FieldSet, Form, FormFieldUpdate, FormId, Question};
pub use orchestration::{EnvelopeDispatcher, FormOrchestrator, FormReader, OrchestrationError};
