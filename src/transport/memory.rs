/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! In-memory transport backend.
//!
//! Implements [`LogStore`], [`Publish`] and [`Subscribe`] over process
//! memory. Suitable for tests, benchmarks and embedding the relay in a single
//! process. Every publish is also recorded so tests can assert on outbound
//! traffic, and appends or publishes can be made to fail on demand.

use super::{InboundMessage, LogStore, Publish, Subscribe, TransportError, pattern_matches};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug)]
struct PatternSubscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

/// Process-local list store and pub/sub hub.
///
/// # Examples
///
/// ```
/// use exch_relay::transport::{InMemoryTransport, LogStore, Publish};
///
/// let transport = InMemoryTransport::new();
/// transport.append("CMD", "S:mkt1,ord1,1,1,B,100,5").unwrap();
/// assert_eq!(transport.read_range("CMD", 0, None).unwrap().len(), 1);
///
/// transport.publish("EX_EVT:F", "{}").unwrap();
/// assert_eq!(transport.published_on("EX_EVT:F"), vec!["{}".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    lists: DashMap<String, Vec<String>>,
    subscribers: Mutex<Vec<PatternSubscriber>>,
    published: Mutex<Vec<(String, String)>>,
    failing_appends: AtomicUsize,
    failing_publishes: AtomicUsize,
}

impl InMemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport whose list at `key` already holds `records`.
    #[must_use]
    pub fn with_records<I, S>(key: &str, records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Self::new();
        transport
            .lists
            .insert(key.to_string(), records.into_iter().map(Into::into).collect());
        transport
    }

    /// Makes the next `count` appends fail with [`TransportError::Unavailable`].
    pub fn fail_next_appends(&self, count: usize) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` publishes fail with [`TransportError::Unavailable`].
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Returns a copy of the list at `key`.
    #[must_use]
    pub fn records(&self, key: &str) -> Vec<String> {
        self.lists
            .get(key)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// Returns every `(channel, payload)` published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.published).clone()
    }

    /// Returns the payloads published on `channel`, in order.
    #[must_use]
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        lock(&self.published)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Returns the number of live pattern subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        lock(&self.subscribers)
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }
}

/// Takes the counter down by one if it is positive; returns whether it was.
fn consume_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LogStore for InMemoryTransport {
    fn append(&self, key: &str, record: &str) -> Result<(), TransportError> {
        if consume_failure(&self.failing_appends) {
            return Err(TransportError::Unavailable(format!(
                "injected append failure on {key:?}"
            )));
        }
        self.lists
            .entry(key.to_string())
            .or_default()
            .push(record.to_string());
        Ok(())
    }

    fn read_range(
        &self,
        key: &str,
        start: usize,
        stop: Option<usize>,
    ) -> Result<Vec<String>, TransportError> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let end = stop.map_or(list.len(), |s| s.saturating_add(1).min(list.len()));
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(list.value()[start..end].to_vec())
    }

    fn len(&self, key: &str) -> Result<usize, TransportError> {
        Ok(self.lists.get(key).map_or(0, |list| list.len()))
    }
}

impl Publish for InMemoryTransport {
    fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        if consume_failure(&self.failing_publishes) {
            return Err(TransportError::Unavailable(format!(
                "injected publish failure on {channel:?}"
            )));
        }
        // One lock over record + fan-out keeps delivery order equal to call order.
        let mut subscribers = lock(&self.subscribers);
        lock(&self.published).push((channel.to_string(), payload.to_string()));
        subscribers.retain(|sub| {
            if !pattern_matches(&sub.pattern, channel) {
                return !sub.tx.is_closed();
            }
            sub.tx
                .send(InboundMessage::Message {
                    pattern: sub.pattern.clone(),
                    channel: channel.to_string(),
                    payload: payload.to_string(),
                })
                .is_ok()
        });
        trace!(channel, "published");
        Ok(())
    }
}

impl Subscribe for InMemoryTransport {
    fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(InboundMessage::Subscribed {
            pattern: pattern.to_string(),
        })
        .map_err(|_| TransportError::Unavailable("subscriber dropped".to_string()))?;
        lock(&self.subscribers).push(PatternSubscriber {
            pattern: pattern.to_string(),
            tx,
        });
        Ok(rx)
    }

    fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        lock(&self.subscribers).retain(|sub| sub.pattern != pattern);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_range_bounds() {
        let t = InMemoryTransport::with_records("CMD", ["a", "b", "c", "d"]);
        assert_eq!(t.read_range("CMD", 0, None).unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(t.read_range("CMD", 1, Some(2)).unwrap(), vec!["b", "c"]);
        assert_eq!(t.read_range("CMD", 2, Some(99)).unwrap(), vec!["c", "d"]);
        assert!(t.read_range("CMD", 4, None).unwrap().is_empty());
        assert!(t.read_range("MISSING", 0, None).unwrap().is_empty());
        assert_eq!(t.len("CMD").unwrap(), 4);
    }

    #[test]
    fn test_injected_append_failures_are_consumed() {
        let t = InMemoryTransport::new();
        t.fail_next_appends(2);
        assert!(t.append("CMD", "x").is_err());
        assert!(t.append("CMD", "x").is_err());
        assert!(t.append("CMD", "y").is_ok());
        assert_eq!(t.records("CMD"), vec!["y"]);
    }

    #[test]
    fn test_subscription_confirms_then_delivers_matching_only() {
        let t = InMemoryTransport::new();
        let mut rx = t.psubscribe("EX_REQ:*").unwrap();

        t.publish("EX_RESP:S", "ignored").unwrap();
        t.publish("EX_REQ:S", "payload").unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::Subscribed {
                pattern: "EX_REQ:*".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::Message {
                pattern: "EX_REQ:*".to_string(),
                channel: "EX_REQ:S".to_string(),
                payload: "payload".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_closes_receiver() {
        let t = InMemoryTransport::new();
        let mut rx = t.psubscribe("EX_REQ:*").unwrap();
        assert_eq!(t.subscription_count(), 1);

        t.punsubscribe("EX_REQ:*").unwrap();
        t.punsubscribe("EX_REQ:*").unwrap();
        assert_eq!(t.subscription_count(), 0);

        assert!(matches!(rx.try_recv(), Ok(InboundMessage::Subscribed { .. })));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_recorded_and_lost() {
        let t = InMemoryTransport::new();
        t.publish("EX_EVT:T", "top").unwrap();
        assert_eq!(t.published(), vec![("EX_EVT:T".to_string(), "top".to_string())]);
    }
}
