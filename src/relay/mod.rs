/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Command log replay and live request dispatch.
//!
//! Four components sit between the transport and the engine:
//!
//! - [`BootstrapReplayer`] rebuilds engine state from the command log
//! - [`LiveListener`] routes live requests to the engine's [`RequestHandler`]
//! - [`Persister`] appends accepted commands and fills to the durable logs
//! - [`Publisher`] fans out responses and market events
//!
//! [`Relay`] wires them in the only safe order: the persister and publisher
//! stay suspended while the log is replayed, and the live subscription can
//! only be opened with the [`ReplayCompleted`] value replay returns.
//!
//! # Examples
//!
//! ```
//! use exch_relay::config::RelayConfig;
//! use exch_relay::protocol::{
//!     CancelReq, CreateMarketReq, LogReq, MarketDetailsReq, ReplaceReq, SubmitReq,
//! };
//! use exch_relay::relay::{Relay, RequestHandler};
//! use exch_relay::transport::{InMemoryTransport, Publish};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Counter(usize);
//!
//! impl RequestHandler for Counter {
//!     fn create_market(&mut self, _: CreateMarketReq) { self.0 += 1; }
//!     fn submit(&mut self, _: SubmitReq) { self.0 += 1; }
//!     fn cancel(&mut self, _: CancelReq) { self.0 += 1; }
//!     fn replace(&mut self, _: ReplaceReq) { self.0 += 1; }
//!     fn market_details(&mut self, _: MarketDetailsReq) {}
//!     fn log(&mut self, _: LogReq) {}
//!     fn halt(&mut self) {}
//! }
//!
//! let transport = Arc::new(InMemoryTransport::with_records(
//!     "CMD",
//!     ["M:mkt1,1,7,BTC/USD,1"],
//! ));
//! let relay = Relay::new(RelayConfig::default(), transport.clone(), transport.clone()).unwrap();
//! let mut session = relay.start(Counter::default()).unwrap();
//! assert_eq!(session.handler().0, 1);
//!
//! transport
//!     .publish("EX_REQ:C", r#"{"market_id":"mkt1","order_id":"o1","req_id":2,"user_id":7}"#)
//!     .unwrap();
//! session.try_drain().unwrap();
//! assert_eq!(session.handler().0, 2);
//! assert_eq!(transport.records("CMD").len(), 2);
//! ```

pub mod handler;
pub mod listener;
pub mod persister;
pub mod publisher;
pub mod replay;
pub mod service;

#[cfg(test)]
mod tests;

pub use handler::RequestHandler;
pub use listener::{
    Delivery, DispatchError, ListenerError, ListenerMetrics, LiveListener, LiveSession,
};
pub use persister::{AckMode, PersistError, PersistOutcome, Persister, PersisterMetrics};
pub use publisher::{Publisher, PublisherMetrics};
pub use replay::{BootstrapReplayer, ReplayCompleted, ReplayError};
pub use service::{Relay, RelayError};
