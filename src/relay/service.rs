/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Startup orchestration: replay, then go live.

use super::handler::RequestHandler;
use super::listener::{ListenerError, LiveListener, LiveSession};
use super::persister::Persister;
use super::publisher::Publisher;
use super::replay::{BootstrapReplayer, ReplayError};
use crate::config::{ConfigError, RelayConfig};
use crate::transport::{LogStore, Publish, Subscribe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Errors raised while building or starting a [`Relay`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bootstrap replay failed; the relay did not go live.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// The live subscription could not be established.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Wires the four components over shared transports.
///
/// The persister and publisher start suspended so that handlers running
/// during replay cannot re-append history or re-announce it. Hand clones of
/// both to the engine before calling [`start`](Self::start).
///
/// # Examples
///
/// ```no_run
/// use exch_relay::config::RelayConfig;
/// use exch_relay::relay::{Relay, RequestHandler};
/// use exch_relay::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// # async fn example<H: RequestHandler>(make_engine: impl FnOnce(exch_relay::relay::Persister, exch_relay::relay::Publisher) -> H)
/// # -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(InMemoryTransport::new());
/// let relay = Relay::new(RelayConfig::default(), transport.clone(), transport)?;
/// let engine = make_engine(relay.persister(), relay.publisher());
/// let mut session = relay.start(engine)?;
/// session.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    config: RelayConfig,
    log: Arc<dyn LogStore>,
    subscriber: Arc<dyn Subscribe>,
    persister: Persister,
    publisher: Publisher,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("persister", &self.persister)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Creates a relay whose publishes and subscriptions share one backend.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `config` fails validation.
    pub fn new<T>(
        config: RelayConfig,
        log: Arc<dyn LogStore>,
        pubsub: Arc<T>,
    ) -> Result<Self, RelayError>
    where
        T: Publish + Subscribe + 'static,
    {
        let subscriber: Arc<dyn Subscribe> = pubsub.clone();
        Self::with_transports(config, log, pubsub, subscriber)
    }

    /// Creates a relay over separate publish and subscribe backends.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `config` fails validation.
    pub fn with_transports(
        config: RelayConfig,
        log: Arc<dyn LogStore>,
        publish: Arc<dyn Publish>,
        subscriber: Arc<dyn Subscribe>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let persister = Persister::new(log.clone(), &config.storage, config.persistence);
        let publisher = Publisher::new(publish, &config.channels);
        persister.suspend();
        publisher.suspend();
        Ok(Self {
            config,
            log,
            subscriber,
            persister,
            publisher,
        })
    }

    /// Returns a handle to the shared persister.
    #[must_use]
    pub fn persister(&self) -> Persister {
        self.persister.clone()
    }

    /// Returns a handle to the shared publisher.
    #[must_use]
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Replays the command log into `handler`, then goes live.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Replay`] if the log cannot be replayed; nothing is
    ///   subscribed and the persister and publisher stay suspended
    /// - [`RelayError::Listener`] if the subscription is refused; the
    ///   persister and publisher stay suspended
    pub fn start<H: RequestHandler>(self, mut handler: H) -> Result<LiveSession<H>, RelayError> {
        let replayer = BootstrapReplayer::new(self.log.clone(), &self.config.storage.command_log_key);
        let replayed = replayer.replay(&mut handler).inspect_err(|e| {
            error!(error = %e, "bootstrap failed, relay not started");
        })?;

        let persister = self.persister.clone();
        let publisher = self.publisher.clone();
        let session = LiveListener::new(self.subscriber, &self.config.channels.request_namespace)
            .with_persister(self.persister)
            .subscribe(handler, replayed)
            .inspect_err(|e| error!(error = %e, "live subscription refused, relay not started"))?;

        persister.resume();
        publisher.resume();
        info!(
            replayed = replayed.processed(),
            mode = ?persister.mode(),
            "bootstrap complete, going live"
        );
        Ok(session)
    }
}
