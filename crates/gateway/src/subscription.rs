//! Price subscriptions and their relay tasks.
//!
//! A [`Subscription`] owns one broker subscription and one spawned relay
//! task. The relay forwards broker events to the client through the
//! session's [`Outbound`] until it is cancelled or hits a fatal error, then
//! releases the broker subscription and confirms the unsubscription.

use crate::config::{ForwardPolicy, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::outbound::Outbound;
use crate::protocol::{Confirmation, Criteria, PriceUpdate, SubscriptionKey};
use broker_client::{Broker, BrokerEvent, BrokerSubscription};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Settings shared by every relay task.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broker channel carrying price updates.
    pub channel: String,
    /// Bounded wait for each broker poll.
    pub poll_interval: Duration,
    pub forward_policy: ForwardPolicy,
}

impl From<&GatewayConfig> for RelayConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            poll_interval: config.poll_interval,
            forward_policy: config.forward_policy,
        }
    }
}

/// A live subscription owned by one session.
///
/// Dropping it cancels the relay task.
pub struct Subscription {
    key: SubscriptionKey,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl Subscription {
    /// Acquire a broker subscription and start its relay task.
    pub async fn create(
        session: Uuid,
        criteria: Criteria,
        outbound: Outbound,
        broker: &dyn Broker,
        config: Arc<RelayConfig>,
    ) -> Result<Self> {
        let key = criteria.key();
        let handle = broker
            .subscribe(&config.channel)
            .await
            .map_err(GatewayError::BrokerSubscribe)?;

        counter!("gateway_subscriptions_total").increment(1);
        debug!("Session {} acquired broker subscription for `{}`", session, key);

        let cancel = CancellationToken::new();
        let relay = Relay {
            session,
            key: key.clone(),
            criteria,
            outbound,
            config,
            cancel: cancel.clone(),
            acknowledged: false,
        };
        let task = tokio::spawn(relay.run(handle));

        Ok(Self {
            key,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Ask the relay task to stop. Repeated calls have no further effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the relay task has exited (cancelled or failed).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait until the relay has released its broker subscription.
    pub async fn join(self) {
        let Subscription { key, cancel, task, .. } = self;
        cancel.cancel();
        if let Err(e) = task.await {
            warn!("Relay task for `{}` did not complete: {}", key, e);
        }
    }
}

enum RelayExit {
    Cancelled,
    Failed(GatewayError),
}

struct Relay {
    session: Uuid,
    key: SubscriptionKey,
    criteria: Criteria,
    outbound: Outbound,
    config: Arc<RelayConfig>,
    cancel: CancellationToken,
    acknowledged: bool,
}

impl Relay {
    async fn run(mut self, mut handle: Box<dyn BrokerSubscription>) {
        match self.relay(handle.as_mut()).await {
            RelayExit::Cancelled => {
                debug!("Relay for `{}` in session {} cancelled", self.key, self.session);
            }
            RelayExit::Failed(e) => {
                counter!("gateway_relay_errors_total").increment(1);
                warn!(
                    "Relay for `{}` in session {} failed: {}",
                    self.key, self.session, e
                );
            }
        }

        self.terminate(handle).await;
    }

    async fn relay(&mut self, handle: &mut dyn BrokerSubscription) -> RelayExit {
        let wait = self.config.poll_interval;

        loop {
            // Cancellation wins over a ready event; a timeout just loops.
            let event = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return RelayExit::Cancelled,

                event = handle.receive_timeout(wait) => event,
            };

            let outcome = match event {
                Ok(BrokerEvent::Timeout) => Ok(()),
                Ok(BrokerEvent::Subscribed) => self.acknowledge().await,
                Ok(BrokerEvent::Message(payload)) => self.forward(payload).await,
                Err(e) => Err(GatewayError::Broker(e)),
            };

            if let Err(e) = outcome {
                return RelayExit::Failed(e);
            }
        }
    }

    /// Confirm the subscription to the client, once.
    async fn acknowledge(&mut self) -> Result<()> {
        if self.acknowledged {
            return Ok(());
        }
        self.acknowledged = true;

        self.outbound
            .send(&Confirmation::subscribed(&self.key))
            .await?;
        info!("Session {} subscribed to `{}`", self.session, self.key);
        Ok(())
    }

    async fn forward(&mut self, payload: String) -> Result<()> {
        let update = PriceUpdate::decode(&payload).map_err(GatewayError::BrokerDecode)?;

        if self.config.forward_policy == ForwardPolicy::Matching
            && !self.criteria.is_satisfied_by(&update)
        {
            return Ok(());
        }

        // Data never reaches the client ahead of the confirmation.
        self.acknowledge().await?;
        self.outbound.send_text(payload).await?;

        counter!("gateway_messages_forwarded_total").increment(1);
        Ok(())
    }

    async fn terminate(self, handle: Box<dyn BrokerSubscription>) {
        if let Err(e) = handle.unsubscribe().await {
            warn!(
                "Failed to release broker subscription for `{}`: {}",
                self.key, e
            );
            return;
        }

        match self
            .outbound
            .send(&Confirmation::unsubscribed(&self.key))
            .await
        {
            Ok(()) => info!("Session {} unsubscribed from `{}`", self.session, self.key),
            Err(e) => debug!(
                "Could not confirm unsubscription of `{}` to session {}: {}",
                self.key, self.session, e
            ),
        }
    }
}
