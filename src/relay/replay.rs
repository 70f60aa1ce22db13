/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Bootstrap replay of the durable command log.
//!
//! [`BootstrapReplayer`] reads the whole command log in one range fetch and
//! feeds each record, in append order, to the same [`RequestHandler`] that
//! will later receive live traffic. A successful replay yields a
//! [`ReplayCompleted`] value, which is the only way to obtain a live
//! subscription: no live command can be dispatched or persisted before every
//! record present at startup has been consumed.
//!
//! # Examples
//!
//! ```no_run
//! use exch_relay::relay::{BootstrapReplayer, RequestHandler};
//! use exch_relay::transport::InMemoryTransport;
//! use std::sync::Arc;
//!
//! # fn example(engine: &mut impl RequestHandler) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryTransport::new());
//! let replayer = BootstrapReplayer::new(store, "CMD");
//! let completed = replayer.replay(engine)?;
//! println!("replayed {} commands", completed.processed());
//! # Ok(())
//! # }
//! ```

use super::handler::RequestHandler;
use crate::protocol::{CodecError, Command, split_log_record};
use crate::transport::{LogStore, TransportError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Errors that abort a bootstrap replay.
///
/// Every variant is fatal: history that cannot be read or understood cannot
/// be trusted to rebuild engine state.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The command log could not be read.
    #[error("cannot read command log: {0}")]
    Transport(#[from] TransportError),

    /// A record's leading tag is unknown, or names a kind that is never logged.
    #[error("cannot bootstrap: unsupported record at position {position}: {record:?}")]
    UnsupportedRecord {
        /// Zero-based position in the log.
        position: usize,
        /// The raw record.
        record: String,
    },

    /// A record's tag is valid but its body does not decode.
    #[error("cannot bootstrap: malformed record at position {position}: {record:?}: {source}")]
    Malformed {
        /// Zero-based position in the log.
        position: usize,
        /// The raw record.
        record: String,
        /// The decode failure.
        #[source]
        source: CodecError,
    },
}

/// Proof that bootstrap replay ran to completion.
///
/// Only [`BootstrapReplayer`] can construct it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a completed replay is required to go live"]
pub struct ReplayCompleted {
    processed: u64,
    elapsed: Duration,
}

impl ReplayCompleted {
    /// Number of commands dispatched.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Wall-clock time spent dispatching.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Rebuilds engine state by replaying the command log into a handler.
#[derive(Clone)]
pub struct BootstrapReplayer {
    store: Arc<dyn LogStore>,
    key: String,
}

impl std::fmt::Debug for BootstrapReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapReplayer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl BootstrapReplayer {
    /// Creates a replayer over the command log at `key`.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Replays every record currently in the log.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::Transport`] if the log cannot be read
    /// - [`ReplayError::UnsupportedRecord`] on an unknown or non-loggable tag
    /// - [`ReplayError::Malformed`] on a record that does not decode
    ///
    /// Commands before the failing record have already been dispatched.
    pub fn replay<H: RequestHandler + ?Sized>(
        &self,
        handler: &mut H,
    ) -> Result<ReplayCompleted, ReplayError> {
        self.replay_with_progress(handler, |_, _| {})
    }

    /// Replays with a callback invoked after each dispatched record.
    ///
    /// The callback receives `(commands_applied, total_records)`.
    ///
    /// # Errors
    ///
    /// Same as [`replay`](Self::replay).
    pub fn replay_with_progress<H: RequestHandler + ?Sized>(
        &self,
        handler: &mut H,
        mut progress: impl FnMut(u64, usize),
    ) -> Result<ReplayCompleted, ReplayError> {
        let records = self.store.read_range(&self.key, 0, None)?;
        let total = records.len();
        let start = Instant::now();
        let mut processed = 0u64;

        for (position, record) in records.into_iter().enumerate() {
            let command = decode(position, record).inspect_err(|e| {
                error!(key = %self.key, position, error = %e, "bootstrap replay aborted");
            })?;
            command.dispatch(handler);
            processed = processed.saturating_add(1);
            progress(processed, total);
        }

        let elapsed = start.elapsed();
        info!(
            key = %self.key,
            processed,
            elapsed_ms = elapsed.as_millis() as u64,
            "processed existing commands"
        );
        Ok(ReplayCompleted { processed, elapsed })
    }
}

fn decode(position: usize, record: String) -> Result<Command, ReplayError> {
    let (tag, body) = match split_log_record(&record) {
        Ok((tag, body)) if tag.is_persistable() => (tag, body),
        _ => return Err(ReplayError::UnsupportedRecord { position, record }),
    };
    match Command::from_compact(tag, body) {
        Ok(command) => Ok(command),
        Err(source) => Err(ReplayError::Malformed {
            position,
            record,
            source,
        }),
    }
}

#[cfg(test)]
impl ReplayCompleted {
    /// Stands in for a replay of an empty log.
    pub(crate) fn empty() -> Self {
        Self {
            processed: 0,
            elapsed: Duration::ZERO,
        }
    }
}
