//! Pub/sub broker client for the price notification gateway.
//!
//! Wraps a single publish/subscribe channel behind the [`Broker`] and
//! [`BrokerSubscription`] traits:
//!
//! - [`RedisBroker`]: Redis pub/sub, one dedicated connection per subscription
//! - [`MemoryBroker`]: in-process broadcast channels, for tests and local runs
//!
//! No business logic lives here; payloads are opaque strings.

pub mod broker;
pub mod error;
pub mod memory;
pub mod redis_broker;

pub use broker::{Broker, BrokerEvent, BrokerSubscription};
pub use error::{BrokerError, Result};
pub use memory::MemoryBroker;
pub use redis_broker::{RedisBroker, RedisSubscription};
