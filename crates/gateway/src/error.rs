//! Gateway error types.

use broker_client::BrokerError;
use thiserror::Error;

/// Gateway error type.
///
/// Every variant is owned by exactly one unit: the session (malformed input,
/// transport failures) or a single subscription (broker failures).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client sent a command that failed validation.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Reading from the client connection failed.
    #[error("Transport read failed: {0}")]
    TransportRead(axum::Error),

    /// Writing to the client connection failed.
    #[error("Transport write failed: {0}")]
    TransportWrite(axum::Error),

    /// Broker refused or failed the subscribe call.
    #[error("Broker subscribe failed: {0}")]
    BrokerSubscribe(BrokerError),

    /// A broker payload could not be decoded as a price update.
    #[error("Broker payload decode failed: {0}")]
    BrokerDecode(serde_json::Error),

    /// Broker connection error while relaying.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
