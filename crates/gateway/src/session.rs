//! Connection session: the lifetime of one client connection.
//!
//! The session is the only reader of the connection and the only writer of
//! its subscription map. Relay tasks share nothing with it but the
//! [`Outbound`] write handle.

use crate::counter::{ConnectionCounter, ConnectionGuard};
use crate::error::{GatewayError, Result};
use crate::outbound::Outbound;
use crate::protocol::{Command, CommandKind, Confirmation, SubscriptionKey};
use crate::subscription::{RelayConfig, Subscription};
use axum::extract::ws::Message;
use broker_client::Broker;
use futures::{Stream, StreamExt};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Poll intervals teardown waits for relays before detaching them.
const TEARDOWN_GRACE_POLLS: u32 = 4;

/// State for a single connected client.
pub struct Session {
    id: Uuid,
    outbound: Outbound,
    broker: Arc<dyn Broker>,
    relay: Arc<RelayConfig>,
    subscriptions: HashMap<SubscriptionKey, Subscription>,
    _connection: ConnectionGuard,
}

impl Session {
    /// Open a session, counting it as an active connection.
    pub fn open(
        outbound: Outbound,
        broker: Arc<dyn Broker>,
        relay: Arc<RelayConfig>,
        counter: &Arc<ConnectionCounter>,
    ) -> Self {
        counter!("gateway_connections_total").increment(1);
        Self {
            id: Uuid::new_v4(),
            outbound,
            broker,
            relay,
            subscriptions: HashMap::new(),
            _connection: counter.register(),
        }
    }

    /// Serve client commands until the connection ends, then tear down.
    pub async fn run<S>(mut self, mut inbound: S)
    where
        S: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin,
    {
        info!("Session {} opened", self.id);

        match self.read_loop(&mut inbound).await {
            Ok(()) => debug!("Session {} closed by client", self.id),
            Err(e @ GatewayError::MalformedCommand(_)) => {
                counter!("gateway_malformed_commands_total").increment(1);
                warn!("Session {} sent invalid payload: {}", self.id, e);
            }
            Err(e) => warn!("Session {} failed: {}", self.id, e),
        }

        self.close().await;
    }

    async fn read_loop<S>(&mut self, inbound: &mut S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            let frame = frame.map_err(GatewayError::TransportRead)?;

            let parsed = match &frame {
                Message::Text(text) => Command::from_slice(text.as_str().as_bytes()),
                Message::Binary(data) => Command::from_slice(data),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Ok(()),
            };

            let command = match parsed {
                Ok(command) => command,
                Err(e) => {
                    // The rejection is best-effort; the session ends either way.
                    if let Err(write) = self.outbound.send(&Confirmation::bad_request()).await {
                        debug!("Session {} could not send rejection: {}", self.id, write);
                    }
                    return Err(e);
                }
            };

            self.dispatch(command).await?;
        }

        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        // A relay that died on its own must not block a fresh subscription.
        self.subscriptions.retain(|_, sub| !sub.is_finished());

        let criteria = command.criteria();
        let key = criteria.key();

        match command.kind {
            CommandKind::Subscription => {
                if self.subscriptions.contains_key(&key) {
                    return self.outbound.send(&Confirmation::already_subscribed()).await;
                }

                match Subscription::create(
                    self.id,
                    criteria,
                    self.outbound.clone(),
                    self.broker.as_ref(),
                    Arc::clone(&self.relay),
                )
                .await
                {
                    Ok(subscription) => {
                        self.subscriptions.insert(key, subscription);
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Session {} could not subscribe to `{}`: {}", self.id, key, e);
                        self.outbound.send(&Confirmation::subscribe_failed()).await
                    }
                }
            }
            CommandKind::Unsubscription => match self.subscriptions.remove(&key) {
                // The relay confirms once it has released the broker side.
                Some(subscription) => {
                    subscription.cancel();
                    Ok(())
                }
                None => self.outbound.send(&Confirmation::not_subscribed()).await,
            },
        }
    }

    /// Cancel every subscription and give the relays a bounded grace period
    /// to release the broker, then close the connection. Relays still running
    /// after the grace period finish in the background. The counter is
    /// decremented when the connection guard drops at the end.
    async fn close(self) {
        let Session {
            id,
            outbound,
            relay,
            subscriptions,
            _connection,
            ..
        } = self;

        let live = subscriptions.len();
        for subscription in subscriptions.values() {
            subscription.cancel();
        }

        let grace = relay.poll_interval * TEARDOWN_GRACE_POLLS;
        let released =
            futures::future::join_all(subscriptions.into_values().map(Subscription::join));
        if tokio::time::timeout(grace, released).await.is_err() {
            warn!(
                "Session {} relays did not release within {:?}, detaching",
                id, grace
            );
        }

        outbound.close().await;
        info!("Session {} closed ({} subscriptions cancelled)", id, live);
    }
}
