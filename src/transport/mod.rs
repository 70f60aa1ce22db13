/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Transport capabilities.
//!
//! The relay needs four primitives from its backend: append to a durable
//! keyed list, read a range of that list, publish to a channel, and
//! pattern-subscribe to channels. They are split into three traits so each
//! component depends only on what it uses:
//!
//! - [`LogStore`]: `append` and `read_range`
//! - [`Publish`]: fire-and-forget `publish`
//! - [`Subscribe`]: pattern subscriptions delivering [`InboundMessage`]s
//!
//! [`InMemoryTransport`] implements all three and is the default backend for
//! tests. `FileLogStore` (feature `journal`) and `NatsTransport` (feature
//! `nats`) are the durable and networked adapters.

pub mod memory;

#[cfg(feature = "journal")]
pub mod file;

#[cfg(feature = "nats")]
pub mod nats;

pub use memory::InMemoryTransport;

#[cfg(feature = "journal")]
pub use file::FileLogStore;

#[cfg(feature = "nats")]
pub use nats::NatsTransport;

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a transport backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend refused or could not serve the request.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// An I/O operation on a keyed log failed.
    #[error("i/o error on log {key:?}: {source}")]
    Io {
        /// The log key.
        key: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record failed its integrity check.
    #[error("corrupt record in log {key:?} at position {position}: {reason}")]
    Corrupt {
        /// The log key.
        key: String,
        /// Zero-based record position.
        position: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The record cannot be stored by this backend.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// A message delivered on a pattern subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Confirmation that the pattern subscription is active. Not a data message.
    Subscribed {
        /// The confirmed pattern.
        pattern: String,
    },

    /// A payload published on a channel matching the pattern.
    Message {
        /// The subscribed pattern that matched.
        pattern: String,
        /// The concrete channel the payload was published on.
        channel: String,
        /// The payload text.
        payload: String,
    },
}

/// Durable, append-only keyed lists of text records.
pub trait LogStore: Send + Sync {
    /// Appends `record` to the end of the list at `key`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the record was not stored.
    fn append(&self, key: &str, record: &str) -> Result<(), TransportError>;

    /// Returns records `start..=stop` of the list at `key` in append order.
    ///
    /// `stop = None` reads to the current end. A missing key reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the list cannot be read.
    fn read_range(
        &self,
        key: &str,
        start: usize,
        stop: Option<usize>,
    ) -> Result<Vec<String>, TransportError>;

    /// Returns the number of records at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the list cannot be read.
    fn len(&self, key: &str) -> Result<usize, TransportError> {
        Ok(self.read_range(key, 0, None)?.len())
    }
}

/// Fire-and-forget channel publishing.
pub trait Publish: Send + Sync {
    /// Publishes `payload` on `channel`. Delivery is not acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the publish request could not be issued.
    fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;
}

/// Pattern subscriptions.
pub trait Subscribe: Send + Sync {
    /// Subscribes to every channel matching `pattern`.
    ///
    /// The first message delivered is [`InboundMessage::Subscribed`]. The
    /// receiver closes when the pattern is unsubscribed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the subscription could not be requested.
    fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, TransportError>;

    /// Drops every subscription on `pattern`. Unknown patterns are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the request could not be issued.
    fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError>;
}

/// Glob match supporting `*` (any run) and `?` (any single character).
///
/// # Examples
///
/// ```
/// use exch_relay::transport::pattern_matches;
///
/// assert!(pattern_matches("EX_REQ:*", "EX_REQ:S"));
/// assert!(!pattern_matches("EX_REQ:*", "EX_RESP:S"));
/// assert!(pattern_matches("EX_?VT:F", "EX_EVT:F"));
/// ```
#[must_use]
pub fn pattern_matches(pattern: &str, channel: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = channel.chars().collect();
    let (mut pi, mut ci) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ci));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ci = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&ch| ch == '*')
}

#[cfg(test)]
mod tests {
    use super::pattern_matches;

    #[test]
    fn test_star_matches_empty_and_long_suffixes() {
        assert!(pattern_matches("EX_REQ:*", "EX_REQ:"));
        assert!(pattern_matches("EX_REQ:*", "EX_REQ:SUBMIT"));
        assert!(pattern_matches("*", ""));
    }

    #[test]
    fn test_inner_star_backtracks() {
        assert!(pattern_matches("a*b*c", "axxbyyc"));
        assert!(!pattern_matches("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_exact_match_without_wildcards() {
        assert!(pattern_matches("EX_EVT:F", "EX_EVT:F"));
        assert!(!pattern_matches("EX_EVT:F", "EX_EVT:FF"));
    }
}
