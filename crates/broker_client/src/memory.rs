//! In-process broker backed by tokio broadcast channels.

use crate::broker::{Broker, BrokerEvent, BrokerSubscription};
use crate::error::{BrokerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

/// Buffered messages per channel before slow subscribers start lagging.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    reject_subscriptions: AtomicBool,
}

/// In-process broker.
///
/// Keeps counters of acquired and released subscriptions so callers can
/// verify that every subscription is released exactly once.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Total subscriptions acquired.
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribes.load(Ordering::SeqCst)
    }

    /// Total subscriptions released.
    pub fn unsubscribe_count(&self) -> usize {
        self.inner.unsubscribes.load(Ordering::SeqCst)
    }

    /// Subscriptions acquired and not yet released.
    pub fn active_subscriptions(&self) -> usize {
        // Releases never outnumber acquisitions, so read releases first.
        let released = self.unsubscribe_count();
        self.subscribe_count().saturating_sub(released)
    }

    /// Make subsequent `subscribe` calls fail (or succeed again).
    pub fn reject_subscriptions(&self, reject: bool) {
        self.inner
            .reject_subscriptions
            .store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>> {
        if self.inner.reject_subscriptions.load(Ordering::SeqCst) {
            return Err(BrokerError::Rejected(format!(
                "subscriptions to '{}' are disabled",
                channel
            )));
        }

        let rx = self.sender(channel).subscribe();
        self.inner.subscribes.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySubscription {
            rx,
            pending_ack: true,
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        // A send error only means nobody is listening.
        Ok(self.sender(channel).send(payload.to_string()).unwrap_or(0))
    }
}

/// Subscription on a [`MemoryBroker`] channel.
pub struct MemorySubscription {
    rx: broadcast::Receiver<String>,
    pending_ack: bool,
    inner: Arc<Inner>,
}

#[async_trait]
impl BrokerSubscription for MemorySubscription {
    async fn receive_timeout(&mut self, wait: Duration) -> Result<BrokerEvent> {
        if std::mem::take(&mut self.pending_ack) {
            return Ok(BrokerEvent::Subscribed);
        }

        loop {
            match tokio::time::timeout(wait, self.rx.recv()).await {
                Err(_) => return Ok(BrokerEvent::Timeout),
                Ok(Ok(payload)) => return Ok(BrokerEvent::Message(payload)),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!("Memory subscription lagged, skipped {} messages", skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(BrokerError::Closed),
            }
        }
    }

    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        self.inner.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
