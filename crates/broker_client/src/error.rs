//! Broker client error types.

use thiserror::Error;

/// Broker client error type.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The underlying subscription stream ended.
    #[error("Broker subscription closed")]
    Closed,

    /// The broker refused the subscription.
    #[error("Subscription rejected: {0}")]
    Rejected(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
