/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # exch-relay
//!
//! Durable command log and live request dispatch for a matching engine.
//!
//! The engine's state is a pure function of the ordered sequence of accepted
//! commands. This crate keeps that sequence in an append-only log, rebuilds
//! state at startup by replaying it through the engine's handlers, and then
//! switches to live traffic arriving on `<namespace>:<tag>` channels. Engine
//! responses and market events are fanned out on fixed outbound channels.
//!
//! ## Modules
//!
//! - [`protocol`]: commands, the compact log codec, channel keys, outbound messages
//! - [`transport`]: the `LogStore`, `Publish` and `Subscribe` capabilities and their backends
//! - [`relay`]: replay, live listening, persistence, publishing and the [`Relay`] orchestrator
//! - [`config`]: serde-backed [`RelayConfig`]
//!
//! ## Features
//!
//! - `journal`: `transport::FileLogStore`, a checksummed file-backed command log
//! - `nats`: `transport::NatsTransport`, publish and subscribe over NATS core
//!
//! ## Logging
//!
//! Every component reports through [`tracing`]. The crate never installs a
//! subscriber.

pub mod config;
pub mod protocol;
pub mod relay;
pub mod transport;

pub use config::{ConfigError, RelayConfig};
pub use protocol::{Command, CommandTag};
pub use relay::{
    AckMode, BootstrapReplayer, LiveListener, LiveSession, Persister, Publisher, Relay,
    RelayError, ReplayCompleted, RequestHandler,
};
pub use transport::{InMemoryTransport, LogStore, Publish, Subscribe};
