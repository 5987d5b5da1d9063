//! Serialized write half of a client connection.

use crate::error::{GatewayError, Result};
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type BoxSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Write handle shared by a session and all of its relay tasks.
///
/// The transport allows a single writer; every frame is written while
/// holding the lock, so frames from different tasks never interleave.
#[derive(Clone)]
pub struct Outbound {
    sink: Arc<Mutex<BoxSink>>,
}

impl Outbound {
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self {
            sink: Arc::new(Mutex::new(Box::pin(sink))),
        }
    }

    /// Serialize `msg` as JSON and send it as one text frame.
    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.send_text(json).await
    }

    /// Send pre-encoded text as one frame.
    pub async fn send_text(&self, text: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(GatewayError::TransportWrite)
    }

    /// Close the connection. Errors mean it is already gone.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Close on finished connection: {}", e);
        }
    }
}
