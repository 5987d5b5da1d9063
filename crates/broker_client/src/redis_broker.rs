//! Redis pub/sub backend.

use crate::broker::{Broker, BrokerEvent, BrokerSubscription};
use crate::error::{BrokerError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed broker.
///
/// Subscriptions need a dedicated connection each (a connection in
/// subscriber mode cannot issue other commands); publishes share a
/// multiplexed connection.
#[derive(Clone)]
pub struct RedisBroker {
    client: Arc<redis::Client>,
}

impl RedisBroker {
    /// Create a new Redis broker. No connection is opened until first use.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get a multiplexed async connection.
    pub async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis reachable");
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        // Resolves once the server has confirmed the SUBSCRIBE.
        pubsub.subscribe(channel).await?;
        debug!("Subscribed to Redis channel '{}'", channel);

        Ok(Box::new(RedisSubscription {
            pubsub,
            channel: channel.to_string(),
            pending_ack: true,
        }))
    }

    /// The gateway itself never publishes; this serves outside tooling
    /// such as the price producer or manual testing.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }
}

/// A single Redis channel subscription on its own connection.
pub struct RedisSubscription {
    pubsub: redis::aio::PubSub,
    channel: String,
    pending_ack: bool,
}

#[async_trait]
impl BrokerSubscription for RedisSubscription {
    async fn receive_timeout(&mut self, wait: Duration) -> Result<BrokerEvent> {
        if std::mem::take(&mut self.pending_ack) {
            return Ok(BrokerEvent::Subscribed);
        }

        let mut messages = std::pin::pin!(self.pubsub.on_message());
        match tokio::time::timeout(wait, messages.next()).await {
            Err(_) => Ok(BrokerEvent::Timeout),
            Ok(None) => Err(BrokerError::Closed),
            Ok(Some(msg)) => {
                let payload: String = msg.get_payload()?;
                Ok(BrokerEvent::Message(payload))
            }
        }
    }

    async fn unsubscribe(mut self: Box<Self>) -> Result<()> {
        let channel = std::mem::take(&mut self.channel);
        self.pubsub.unsubscribe(&channel).await?;
        debug!("Unsubscribed from Redis channel '{}'", channel);
        Ok(())
    }
}
