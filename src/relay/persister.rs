/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Appends accepted commands and generated fills to the durable logs.
//!
//! Commands go to the command log as `<tag>:<compact body>`; fills go to the
//! fill log as an un-tagged compact body. Append order is replay order, so
//! every clone of a [`Persister`] writes through the same store handle and
//! callers must persist from a single dispatch path.

use crate::config::StorageConfig;
use crate::protocol::{Command, CompactRecord, Fill};
use crate::transport::{LogStore, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// What to do when a log append fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AckMode {
    /// One attempt. A failure is logged and counted, and the caller proceeds
    /// as if the record had been stored.
    #[default]
    FireAndForget,

    /// Up to `max_attempts` attempts with linear backoff of
    /// `backoff_ms * attempt` between them. The blocking calls sleep the
    /// thread while backing off; the `_async` calls and the live listener's
    /// [`run`](super::LiveSession::run) await a tokio timer instead.
    /// Exhaustion is reported to the caller.
    Retry {
        /// Total attempts, at least one.
        max_attempts: u32,
        /// Base backoff in milliseconds.
        backoff_ms: u64,
    },

    /// One attempt whose failure is reported to the caller.
    Confirm,
}

/// Errors reported by [`Persister`] under [`AckMode::Retry`] and [`AckMode::Confirm`].
#[derive(Debug, Error)]
pub enum PersistError {
    /// The single confirmed append failed.
    #[error("append to {key:?} failed: {source}")]
    Transport {
        /// Log key.
        key: String,
        /// Backend error.
        #[source]
        source: TransportError,
    },

    /// Every retry attempt failed.
    #[error("append to {key:?} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Log key.
        key: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: TransportError,
    },
}

/// Result of a persist call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The record was appended.
    Appended,
    /// The command kind is never persisted (market details, log, halt).
    Skipped,
    /// The persister is suspended for bootstrap replay.
    Suppressed,
    /// The append failed and [`AckMode::FireAndForget`] dropped the record.
    Dropped,
}

/// Counters describing persister activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersisterMetrics {
    /// Records appended.
    pub appended: u64,
    /// Records lost or reported as failed.
    pub failed: u64,
    /// Extra attempts made under [`AckMode::Retry`].
    pub retried: u64,
    /// Persist calls ignored while suspended.
    pub suppressed: u64,
}

#[derive(Debug, Default)]
struct PersisterStats {
    appended: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    suppressed: AtomicU64,
}

enum Pending {
    Write(String),
    Done(PersistOutcome),
}

enum Step {
    Finished(Result<PersistOutcome, PersistError>),
    Backoff(Duration),
}

/// Writes commands and fills to the durable logs under an [`AckMode`] policy.
///
/// Cloning is cheap; clones share the store, the counters and the
/// suspended flag.
///
/// # Examples
///
/// ```
/// use exch_relay::config::StorageConfig;
/// use exch_relay::protocol::Command;
/// use exch_relay::relay::{AckMode, PersistOutcome, Persister};
/// use exch_relay::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryTransport::new());
/// let persister = Persister::new(store.clone(), &StorageConfig::default(), AckMode::Confirm);
///
/// let cancel = Command::from_log_record("C:mkt1,ord1,7,3").unwrap();
/// assert_eq!(persister.persist(&cancel).unwrap(), PersistOutcome::Appended);
/// assert_eq!(persister.persist(&Command::Halt).unwrap(), PersistOutcome::Skipped);
/// assert_eq!(store.records("CMD"), vec!["C:mkt1,ord1,7,3"]);
/// ```
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn LogStore>,
    command_key: Arc<str>,
    fill_key: Arc<str>,
    mode: AckMode,
    suspended: Arc<AtomicBool>,
    stats: Arc<PersisterStats>,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("command_key", &self.command_key)
            .field("fill_key", &self.fill_key)
            .field("mode", &self.mode)
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}

impl Persister {
    /// Creates an active persister writing to the logs named in `storage`.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, storage: &StorageConfig, mode: AckMode) -> Self {
        Self {
            store,
            command_key: Arc::from(storage.command_log_key.as_str()),
            fill_key: Arc::from(storage.fill_log_key.as_str()),
            mode,
            suspended: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PersisterStats::default()),
        }
    }

    /// Returns the configured failure policy.
    #[must_use]
    pub fn mode(&self) -> AckMode {
        self.mode
    }

    /// Stops writing until [`resume`](Self::resume) is called.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Resumes writing.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Appends a state-mutating command to the command log.
    ///
    /// Under [`AckMode::Retry`] the backoff blocks the calling thread; inside
    /// a tokio runtime use [`persist_async`](Self::persist_async).
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when the append fails under
    /// [`AckMode::Retry`] or [`AckMode::Confirm`].
    pub fn persist(&self, command: &Command) -> Result<PersistOutcome, PersistError> {
        match self.command_record(command) {
            Pending::Write(record) => self.append_blocking(&self.command_key, &record),
            Pending::Done(outcome) => Ok(outcome),
        }
    }

    /// Same as [`persist`](Self::persist), but backs off with
    /// [`tokio::time::sleep`] so the runtime keeps making progress.
    ///
    /// # Errors
    ///
    /// Same as [`persist`](Self::persist).
    pub async fn persist_async(&self, command: &Command) -> Result<PersistOutcome, PersistError> {
        match self.command_record(command) {
            Pending::Write(record) => self.append_async(&self.command_key, &record).await,
            Pending::Done(outcome) => Ok(outcome),
        }
    }

    /// Appends a fill to the fill log.
    ///
    /// # Errors
    ///
    /// Same as [`persist`](Self::persist).
    pub fn persist_fill(&self, fill: &Fill) -> Result<PersistOutcome, PersistError> {
        if self.suppress("fill") {
            return Ok(PersistOutcome::Suppressed);
        }
        self.append_blocking(&self.fill_key, &fill.to_compact())
    }

    /// Async counterpart of [`persist_fill`](Self::persist_fill).
    ///
    /// # Errors
    ///
    /// Same as [`persist`](Self::persist).
    pub async fn persist_fill_async(&self, fill: &Fill) -> Result<PersistOutcome, PersistError> {
        if self.suppress("fill") {
            return Ok(PersistOutcome::Suppressed);
        }
        self.append_async(&self.fill_key, &fill.to_compact()).await
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> PersisterMetrics {
        PersisterMetrics {
            appended: self.stats.appended.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            retried: self.stats.retried.load(Ordering::Relaxed),
            suppressed: self.stats.suppressed.load(Ordering::Relaxed),
        }
    }

    fn suppress(&self, what: &'static str) -> bool {
        if !self.is_suspended() {
            return false;
        }
        self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
        debug!(what, "persister suspended, record not written");
        true
    }

    fn command_record(&self, command: &Command) -> Pending {
        if !command.tag().is_persistable() {
            return Pending::Done(PersistOutcome::Skipped);
        }
        if self.suppress("command") {
            return Pending::Done(PersistOutcome::Suppressed);
        }
        Pending::Write(command.to_log_record())
    }

    fn append_blocking(&self, key: &str, record: &str) -> Result<PersistOutcome, PersistError> {
        let mut attempt = 1;
        loop {
            match self.attempt(key, record, attempt) {
                Step::Finished(result) => return result,
                Step::Backoff(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn append_async(&self, key: &str, record: &str) -> Result<PersistOutcome, PersistError> {
        let mut attempt = 1;
        loop {
            match self.attempt(key, record, attempt) {
                Step::Finished(result) => return result,
                Step::Backoff(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Makes append attempt number `attempt` (1-based) under the ack mode.
    fn attempt(&self, key: &str, record: &str, attempt: u32) -> Step {
        let source = match self.store.append(key, record) {
            Ok(()) => return Step::Finished(Ok(self.appended())),
            Err(e) => e,
        };
        match self.mode {
            AckMode::FireAndForget => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %source, record, "append failed, record dropped");
                Step::Finished(Ok(PersistOutcome::Dropped))
            }
            AckMode::Confirm => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(key, error = %source, "confirmed append failed");
                Step::Finished(Err(PersistError::Transport {
                    key: key.to_string(),
                    source,
                }))
            }
            AckMode::Retry {
                max_attempts,
                backoff_ms,
            } => {
                let attempts = max_attempts.max(1);
                if attempt >= attempts {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(key, attempts, error = %source, "append retries exhausted");
                    return Step::Finished(Err(PersistError::Exhausted {
                        key: key.to_string(),
                        attempts,
                        source,
                    }));
                }
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(key, attempt, error = %source, "append failed, retrying");
                Step::Backoff(Duration::from_millis(
                    backoff_ms.saturating_mul(u64::from(attempt)),
                ))
            }
        }
    }

    fn appended(&self) -> PersistOutcome {
        self.stats.appended.fetch_add(1, Ordering::Relaxed);
        PersistOutcome::Appended
    }
}
