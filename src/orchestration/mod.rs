//! # Orchestration
//!
//! Sequences every form mutation as "persist, then propagate":
//!
//! ```text
//! Envelope --> EnvelopeDispatcher --> FormOrchestrator --> FormRepository   (critical)
//!                                             |
//!                                             +--> Propagator --+--> CacheGateway         (retried)
//!                                                               +--> NotificationGateway  (retried)
//! ```
//!
//! [`FormReader`] is the read side: cache first, persistence on miss.

pub mod dispatcher;
pub mod errors;
pub mod form_orchestrator;
pub mod propagation;
pub mod reader;

pub use dispatcher::{DispatchError, DispatchStats, EnvelopeDispatcher, RequestKind};
pub use errors::{OrchestrationError, OrchestrationResult, PropagationError};
pub use form_orchestrator::FormOrchestrator;
pub use propagation::{CacheEffect, Propagator};
pub use reader::FormReader;
