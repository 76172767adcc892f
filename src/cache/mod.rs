//! # Form Cache
//!
//! Read-through cache of serialized forms keyed by `form:<id>`.
//!
//! ```text
//! CacheGateway (trait, Arc<dyn ..>)
//!   ├── RedisCacheGateway   <- ConnectionManager-based async Redis
//!   └── InMemoryCache       <- DashMap-backed, for tests and local runs
//! ```
//!
//! Writes are driven by the orchestrator's propagation phase and wrapped in
//! its retry policy; this module itself never retries.

pub mod errors;
pub mod providers;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use providers::{InMemoryCache, RedisCacheGateway};
pub use traits::CacheGateway;
