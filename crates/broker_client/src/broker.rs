//! Broker traits shared by every backend.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Event produced by [`BrokerSubscription::receive_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker confirmed the subscription. Always the first event.
    Subscribed,
    /// A payload published on the channel.
    Message(String),
    /// Nothing arrived within the wait interval.
    Timeout,
}

/// A publish/subscribe broker exposing a set of named channels.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Acquire a new subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>>;

    /// Publish a raw payload, returning the number of receivers reached.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize>;
}

/// One live subscription on a broker channel.
///
/// `unsubscribe` consumes the handle, so a subscription can only be
/// released once.
#[async_trait]
pub trait BrokerSubscription: Send {
    /// Wait at most `wait` for the next event.
    async fn receive_timeout(&mut self, wait: Duration) -> Result<BrokerEvent>;

    /// Release the subscription.
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}
