//! # Persistence
//!
//! The form store behind the orchestrator. [`FormRepository`] is the seam;
//! [`PostgresFormRepository`] is the production implementation and
//! [`InMemoryFormRepository`] backs tests.

pub mod errors;
mod in_memory;
pub mod postgres;
pub mod traits;

pub use errors::{PersistenceError, PersistenceResult};
pub use in_memory::InMemoryFormRepository;
pub use postgres::PostgresFormRepository;
pub use traits::FormRepository;
