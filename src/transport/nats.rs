/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! NATS-backed [`Publish`] and [`Subscribe`].
//!
//! Channel keys map to NATS subjects by replacing the namespace separator
//! `:` with `.`, so `EX_REQ:*` subscribes to `EX_REQ.*`. Publishes are
//! queued to a single forwarding task so they reach the server in call
//! order. NATS core has no durable lists; pair this with a
//! [`LogStore`](super::LogStore) such as the file store.

use super::{InboundMessage, Publish, Subscribe, TransportError};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Pub/sub over a NATS connection.
///
/// Must be created inside a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use exch_relay::transport::{NatsTransport, Publish};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats = NatsTransport::connect("nats://127.0.0.1:4222").await?;
/// nats.publish("EX_EVT:T", r#"{"market_id":"mkt1","bid":null,"ask":null}"#)?;
/// # Ok(())
/// # }
/// ```
pub struct NatsTransport {
    client: async_nats::Client,
    outbound: mpsc::UnboundedSender<(String, Bytes)>,
    subscriptions: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl NatsTransport {
    /// Connects to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        debug!(url, "connected to nats");
        Ok(Self::from_client(client))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        let (outbound, mut rx) = mpsc::unbounded_channel::<(String, Bytes)>();
        let publisher = client.clone();
        // Exits once the transport, and with it `outbound`, is dropped.
        tokio::spawn(async move {
            while let Some((subject, payload)) = rx.recv().await {
                if let Err(e) = publisher.publish(subject.clone(), payload).await {
                    warn!(%subject, error = %e, "nats publish failed");
                }
            }
        });
        Self {
            client,
            outbound,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }
}

/// Maps a channel key or pattern to a NATS subject.
#[must_use]
pub fn to_subject(channel: &str) -> String {
    match channel.rsplit_once(':') {
        Some((namespace, tag)) => format!("{namespace}.{tag}"),
        None => channel.to_string(),
    }
}

/// Maps a NATS subject back to a channel key.
#[must_use]
pub fn to_channel(subject: &str) -> String {
    match subject.rsplit_once('.') {
        Some((namespace, tag)) => format!("{namespace}:{tag}"),
        None => subject.to_string(),
    }
}

impl Publish for NatsTransport {
    fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        self.outbound
            .send((to_subject(channel), Bytes::from(payload.to_string())))
            .map_err(|_| TransportError::Unavailable("nats forwarder stopped".to_string()))
    }
}

impl Subscribe for NatsTransport {
    fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let subject = to_subject(pattern);
        let confirmed = pattern.to_string();

        let task = tokio::spawn(async move {
            let mut subscriber = match client.subscribe(subject.clone()).await {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    error!(%subject, error = %e, "nats subscribe failed");
                    return;
                }
            };
            if tx
                .send(InboundMessage::Subscribed {
                    pattern: confirmed.clone(),
                })
                .is_err()
            {
                return;
            }
            while let Some(message) = subscriber.next().await {
                let Ok(payload) = String::from_utf8(message.payload.to_vec()) else {
                    warn!(subject = %message.subject, "dropping non utf-8 payload");
                    continue;
                };
                let inbound = InboundMessage::Message {
                    pattern: confirmed.clone(),
                    channel: to_channel(message.subject.as_str()),
                    payload,
                };
                if tx.send(inbound).is_err() {
                    break;
                }
            }
        });

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(pattern.to_string())
            .or_default()
            .push(task);
        Ok(rx)
    }

    fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        let tasks = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pattern);
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for NatsTransport {
    fn drop(&mut self) {
        let subscriptions = self
            .subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in subscriptions.drain().flat_map(|(_, tasks)| tasks) {
            task.abort();
        }
    }
}
