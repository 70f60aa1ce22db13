/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Live request dispatch.
//!
//! [`LiveListener`] pattern-subscribes to `<request-namespace>:*` and hands
//! back a [`LiveSession`] that owns the handler. Each inbound message is
//! routed by the tag in its channel key, decoded from JSON, optionally
//! written ahead to the command log, and delivered to exactly one handler
//! callback.
//!
//! Failures fall in two classes. A message on a channel outside the
//! namespace, or with an unknown tag, is a protocol violation and stops the
//! session. A payload that does not decode, or a command the persister
//! refused, only rejects that message.

use super::handler::RequestHandler;
use super::persister::{PersistError, Persister};
use super::replay::ReplayCompleted;
use crate::protocol::{ChannelKey, CodecError, Command, CommandTag, namespace_pattern};
use crate::transport::{InboundMessage, Subscribe, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

/// Errors raised while dispatching one inbound message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The channel is outside the subscribed namespace.
    #[error("message on foreign channel {channel:?}, expected namespace {expected:?}")]
    ForeignChannel {
        /// The channel the message arrived on.
        channel: String,
        /// The subscribed namespace.
        expected: String,
    },

    /// The channel's tag is not a known command character.
    #[error("unknown command tag {tag:?} on channel {channel:?}")]
    UnknownTag {
        /// The channel the message arrived on.
        channel: String,
        /// The raw tag.
        tag: String,
    },

    /// The channel name has no `<namespace>:<tag>` shape.
    #[error("malformed channel {0:?}")]
    MalformedChannel(String),

    /// The payload does not decode as the tagged request.
    #[error("malformed {tag} payload: {source}")]
    Malformed {
        /// The command tag.
        tag: CommandTag,
        /// The decode failure.
        #[source]
        source: CodecError,
    },

    /// The write-ahead append was refused by the persist policy.
    #[error("{tag} command not persisted: {source}")]
    PersistFailed {
        /// The command tag.
        tag: CommandTag,
        /// The persist failure.
        #[source]
        source: PersistError,
    },
}

impl DispatchError {
    /// Returns `true` for protocol violations that must stop the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ForeignChannel { .. } | Self::UnknownTag { .. } | Self::MalformedChannel(_)
        )
    }

    /// Returns the command tag, when the channel resolved to one.
    #[must_use]
    pub fn tag(&self) -> Option<CommandTag> {
        match self {
            Self::Malformed { tag, .. } | Self::PersistFailed { tag, .. } => Some(*tag),
            _ => None,
        }
    }
}

/// Errors that end or prevent a live session.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The transport refused a subscription or ended it underneath the session.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol violation stopped the session.
    #[error("live dispatch stopped: {0}")]
    Dispatch(#[from] DispatchError),
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A subscription confirmation, discarded.
    Confirmation,
    /// Delivered to the handler for this tag.
    Dispatched(CommandTag),
    /// Rejected without reaching the handler.
    Rejected(CommandTag),
}

/// Counters describing a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerMetrics {
    /// Messages delivered to the handler.
    pub dispatched: u64,
    /// Messages rejected without reaching the handler.
    pub rejected: u64,
    /// Subscription confirmations discarded.
    pub confirmations: u64,
}

/// Builds a live session over a request namespace.
///
/// # Examples
///
/// ```no_run
/// use exch_relay::relay::{LiveListener, ReplayCompleted, RequestHandler};
/// use exch_relay::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// # async fn example<H: RequestHandler>(engine: H, replayed: ReplayCompleted)
/// # -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(InMemoryTransport::new());
/// let mut session = LiveListener::new(transport, "EX_REQ").subscribe(engine, replayed)?;
/// session.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LiveListener {
    transport: Arc<dyn Subscribe>,
    namespace: String,
    persister: Option<Persister>,
}

impl std::fmt::Debug for LiveListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveListener")
            .field("namespace", &self.namespace)
            .field("persister", &self.persister)
            .finish_non_exhaustive()
    }
}

impl LiveListener {
    /// Creates a listener for `<namespace>:*`.
    #[must_use]
    pub fn new(transport: Arc<dyn Subscribe>, namespace: impl Into<String>) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            persister: None,
        }
    }

    /// Writes every state-mutating command to the command log before its
    /// handler runs.
    #[must_use]
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Binds `handler` and subscribes to the request namespace.
    ///
    /// Requires proof that bootstrap replay has completed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Transport`] if the subscription is refused.
    pub fn subscribe<H: RequestHandler>(
        self,
        handler: H,
        replayed: ReplayCompleted,
    ) -> Result<LiveSession<H>, ListenerError> {
        let pattern = namespace_pattern(&self.namespace);
        let receiver = self.transport.psubscribe(&pattern)?;
        info!(
            pattern = %pattern,
            replayed = replayed.processed(),
            write_ahead = self.persister.is_some(),
            "live listener subscribed"
        );
        Ok(LiveSession {
            guard: SubscriptionGuard {
                transport: self.transport,
                pattern,
                active: true,
            },
            namespace: self.namespace,
            receiver,
            handler,
            persister: self.persister,
            stats: ListenerMetrics::default(),
            replayed,
        })
    }
}

/// Unsubscribes its pattern when dropped.
struct SubscriptionGuard {
    transport: Arc<dyn Subscribe>,
    pattern: String,
    active: bool,
}

impl SubscriptionGuard {
    fn release(&mut self) -> Result<(), TransportError> {
        if self.active {
            self.transport.punsubscribe(&self.pattern)?;
            self.active = false;
            info!(pattern = %self.pattern, "live listener unsubscribed");
        }
        Ok(())
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(pattern = %self.pattern, error = %e, "unsubscribe on drop failed");
        }
    }
}

/// An active subscription bound to a handler.
///
/// Messages are processed one at a time in arrival order. Dropping the
/// session unsubscribes.
pub struct LiveSession<H> {
    guard: SubscriptionGuard,
    namespace: String,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    handler: H,
    persister: Option<Persister>,
    stats: ListenerMetrics,
    replayed: ReplayCompleted,
}

impl<H> std::fmt::Debug for LiveSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("pattern", &self.guard.pattern)
            .field("subscribed", &self.guard.active)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<H: RequestHandler> LiveSession<H> {
    /// Routes one message received on `channel` to its handler.
    ///
    /// Non-fatal failures are logged and counted before being returned.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`]; see [`DispatchError::is_fatal`].
    pub fn dispatcher(&mut self, channel: &str, message: &str) -> Result<CommandTag, DispatchError> {
        let result = self.route(channel, message);
        self.tally(channel, result)
    }

    /// Async counterpart of [`dispatcher`](Self::dispatcher). A write-ahead
    /// append under [`AckMode::Retry`](super::AckMode::Retry) awaits its
    /// backoff instead of blocking the thread.
    ///
    /// # Errors
    ///
    /// Same as [`dispatcher`](Self::dispatcher).
    pub async fn dispatcher_async(
        &mut self,
        channel: &str,
        message: &str,
    ) -> Result<CommandTag, DispatchError> {
        let result = self.route_async(channel, message).await;
        self.tally(channel, result)
    }

    /// Processes one inbound message.
    ///
    /// # Errors
    ///
    /// Returns only fatal [`DispatchError`]s; rejections are reported as
    /// [`Delivery::Rejected`].
    pub fn handle(&mut self, message: InboundMessage) -> Result<Delivery, DispatchError> {
        match message {
            InboundMessage::Subscribed { pattern } => Ok(self.confirmed(&pattern)),
            InboundMessage::Message {
                channel, payload, ..
            } => delivery(self.dispatcher(&channel, &payload)),
        }
    }

    /// Async counterpart of [`handle`](Self::handle).
    ///
    /// # Errors
    ///
    /// Same as [`handle`](Self::handle).
    pub async fn handle_async(&mut self, message: InboundMessage) -> Result<Delivery, DispatchError> {
        match message {
            InboundMessage::Subscribed { pattern } => Ok(self.confirmed(&pattern)),
            InboundMessage::Message {
                channel, payload, ..
            } => delivery(self.dispatcher_async(&channel, &payload).await),
        }
    }

    /// Processes messages until the subscription closes.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::Dispatch`] on a protocol violation; the session
    ///   unsubscribes first
    /// - [`ListenerError::Transport`] if the transport ends the stream while
    ///   the session is still subscribed
    pub async fn run(&mut self) -> Result<(), ListenerError> {
        while let Some(message) = self.receiver.recv().await {
            let result = self.handle_async(message).await;
            self.stop_on_fatal(result)?;
        }
        self.closed()
    }

    /// Processes every message already queued, without waiting.
    ///
    /// Returns the number of messages taken from the queue.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn try_drain(&mut self) -> Result<usize, ListenerError> {
        let mut taken = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    taken += 1;
                    let result = self.handle(message);
                    self.stop_on_fatal(result)?;
                }
                Err(TryRecvError::Empty) => return Ok(taken),
                Err(TryRecvError::Disconnected) => return self.closed().map(|()| taken),
            }
        }
    }

    fn stop_on_fatal(&mut self, result: Result<Delivery, DispatchError>) -> Result<(), ListenerError> {
        if let Err(e) = result {
            error!(pattern = %self.guard.pattern, error = %e, "protocol violation, stopping");
            if let Err(unsub) = self.unsubscribe() {
                warn!(error = %unsub, "unsubscribe after protocol violation failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn route(&mut self, channel: &str, message: &str) -> Result<CommandTag, DispatchError> {
        let (tag, command) = self.decode(channel, message)?;
        if let Some(persister) = &self.persister {
            persister
                .persist(&command)
                .map_err(|source| DispatchError::PersistFailed { tag, source })?;
        }
        command.dispatch(&mut self.handler);
        Ok(tag)
    }

    async fn route_async(&mut self, channel: &str, message: &str) -> Result<CommandTag, DispatchError> {
        let (tag, command) = self.decode(channel, message)?;
        if let Some(persister) = &self.persister {
            persister
                .persist_async(&command)
                .await
                .map_err(|source| DispatchError::PersistFailed { tag, source })?;
        }
        command.dispatch(&mut self.handler);
        Ok(tag)
    }
}

fn delivery(result: Result<CommandTag, DispatchError>) -> Result<Delivery, DispatchError> {
    match result {
        Ok(tag) => Ok(Delivery::Dispatched(tag)),
        Err(e) => match e.tag() {
            Some(tag) if !e.is_fatal() => Ok(Delivery::Rejected(tag)),
            _ => Err(e),
        },
    }
}

impl<H> LiveSession<H> {
    fn tally(
        &mut self,
        channel: &str,
        result: Result<CommandTag, DispatchError>,
    ) -> Result<CommandTag, DispatchError> {
        match &result {
            Ok(tag) => {
                self.stats.dispatched += 1;
                debug!(channel, %tag, "dispatched");
            }
            Err(e) if !e.is_fatal() => {
                self.stats.rejected += 1;
                warn!(channel, error = %e, "message rejected");
            }
            Err(_) => {}
        }
        result
    }

    fn confirmed(&mut self, pattern: &str) -> Delivery {
        self.stats.confirmations += 1;
        debug!(pattern, "subscription confirmed");
        Delivery::Confirmation
    }

    fn decode(&self, channel: &str, message: &str) -> Result<(CommandTag, Command), DispatchError> {
        let key = ChannelKey::parse(channel)
            .map_err(|_| DispatchError::MalformedChannel(channel.to_string()))?;
        if key.namespace() != self.namespace {
            return Err(DispatchError::ForeignChannel {
                channel: channel.to_string(),
                expected: self.namespace.clone(),
            });
        }
        let tag = key.command_tag().map_err(|_| DispatchError::UnknownTag {
            channel: channel.to_string(),
            tag: key.raw_tag().to_string(),
        })?;
        let command = Command::from_structured(tag, message)
            .map_err(|source| DispatchError::Malformed { tag, source })?;
        Ok((tag, command))
    }

    /// The stream ended. Fine after `unsubscribe`; otherwise the transport
    /// dropped the subscription underneath the session.
    fn closed(&mut self) -> Result<(), ListenerError> {
        if !self.guard.active {
            return Ok(());
        }
        error!(pattern = %self.guard.pattern, "subscription stream ended while subscribed");
        if let Err(e) = self.unsubscribe() {
            warn!(error = %e, "unsubscribe after lost subscription failed");
        }
        Err(ListenerError::Transport(TransportError::Unavailable(format!(
            "subscription {} closed by transport",
            self.guard.pattern
        ))))
    }

    /// Tears down the subscription. Messages already queued can still be
    /// drained. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport refuses the request; the
    /// session stays subscribed and the call may be retried.
    pub fn unsubscribe(&mut self) -> Result<(), TransportError> {
        self.guard.release()?;
        self.receiver.close();
        Ok(())
    }

    /// Returns `true` until [`unsubscribe`](Self::unsubscribe) succeeds or
    /// the session stops.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.guard.active
    }

    /// Returns the subscribed pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.guard.pattern
    }

    /// Returns the bound handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the bound handler mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Unsubscribes and returns the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ListenerMetrics {
        self.stats
    }

    /// Returns the bootstrap replay this session was opened after.
    #[must_use]
    pub fn replay_report(&self) -> ReplayCompleted {
        self.replayed
    }
}
