/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Fan-out of responses and market events.

use crate::config::ChannelConfig;
use crate::protocol::{Outbound, OutboundKind};
use crate::transport::Publish;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

/// Counters describing publisher activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherMetrics {
    /// Messages handed to the transport.
    pub published: u64,
    /// Messages the transport refused or that failed to serialize.
    pub failed: u64,
    /// Messages dropped while suspended.
    pub suppressed: u64,
}

#[derive(Debug, Default)]
struct PublisherStats {
    published: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
}

/// Serializes outbound messages to JSON and publishes each on the channel
/// fixed for its [`OutboundKind`].
///
/// Fire-and-forget: nothing is acknowledged, retried or buffered, and a
/// message published with no subscriber is lost. Cloning is cheap.
///
/// # Examples
///
/// ```
/// use exch_relay::config::ChannelConfig;
/// use exch_relay::protocol::{MarketCreatedEvt, MarketId};
/// use exch_relay::relay::Publisher;
/// use exch_relay::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// let transport = Arc::new(InMemoryTransport::new());
/// let publisher = Publisher::new(transport.clone(), &ChannelConfig::default());
///
/// publisher.publish(&MarketCreatedEvt {
///     market_id: MarketId::new("mkt1").unwrap(),
///     symbol: "BTC/USD".to_string(),
///     tick_size: 1,
/// });
/// assert_eq!(transport.published_on("EX_EVT:M").len(), 1);
/// ```
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Publish>,
    channels: Arc<[String; 9]>,
    suspended: Arc<AtomicBool>,
    stats: Arc<PublisherStats>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("channels", &self.channels)
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Creates an active publisher using the outbound namespaces in `channels`.
    #[must_use]
    pub fn new(transport: Arc<dyn Publish>, channels: &ChannelConfig) -> Self {
        let table = OutboundKind::ALL
            .map(|kind| kind.channel(&channels.response_namespace, &channels.event_namespace));
        Self {
            transport,
            channels: Arc::new(table),
            suspended: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PublisherStats::default()),
        }
    }

    /// Returns the channel key used for `kind`.
    #[must_use]
    pub fn channel(&self, kind: OutboundKind) -> &str {
        &self.channels[kind.index()]
    }

    /// Publishes `message` on its kind's channel.
    ///
    /// Returns `true` if the transport accepted the request. Failures are
    /// logged and counted, never returned.
    pub fn publish<M: Outbound>(&self, message: &M) -> bool {
        let channel = self.channel(M::KIND);
        if self.is_suspended() {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(channel, "publisher suspended, message dropped");
            return false;
        }
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(channel, error = %e, "cannot serialize outbound message");
                return false;
            }
        };
        match self.transport.publish(channel, &payload) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(channel, error = %e, "publish failed, message lost");
                false
            }
        }
    }

    /// Stops publishing until [`resume`](Self::resume) is called.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Resumes publishing.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> PublisherMetrics {
        PublisherMetrics {
            published: self.stats.published.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            suppressed: self.stats.suppressed.load(Ordering::Relaxed),
        }
    }
}
