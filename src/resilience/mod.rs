//! # Resilience Module
//!
//! Retry primitives shared by the mutation orchestrator (cache and
//! notification propagation) and the binary (backend dialing at startup).
//!
//! ```rust,no_run
//! use form_coordinator::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(3, Duration::from_secs(5));
//! let value = policy
//!     .execute("cache_write", || async { Ok::<_, String>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{connect_with_retry, RetryPolicy};
