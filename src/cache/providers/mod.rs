//! Cache provider implementations

mod memory;
pub mod redis;

pub use memory::InMemoryCache;
pub use self::redis::RedisCacheGateway;
