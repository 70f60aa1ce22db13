/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Outbound responses and market events.
//!
//! Every outbound message type implements [`Outbound`], which ties it to one
//! [`OutboundKind`] and therefore to one fixed channel. [`Fill`] is also a
//! [`CompactRecord`] because fills are written to the fill log.

use super::codec::{CodecError, CompactReader, CompactRecord, CompactWriter};
use super::command::{
    CancelReq, CreateMarketReq, MarketId, OrderId, ReplaceReq, Side, SubmitReq,
};
use super::tag::channel_key;
use serde::{Deserialize, Serialize};

/// Default namespace of response channels.
pub const DEFAULT_RESPONSE_NAMESPACE: &str = "EX_RESP";

/// Default namespace of event channels.
pub const DEFAULT_EVENT_NAMESPACE: &str = "EX_EVT";

/// Whether an outbound kind is a response or an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundNamespace {
    /// Replies to a specific request.
    Response,
    /// Market-wide notifications.
    Event,
}

/// The nine kinds of outbound message, one channel each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundKind {
    /// Reply to a create-market request.
    CreateMarketResp,
    /// Reply to a submit request.
    SubmitResp,
    /// Reply to a cancel request.
    CancelResp,
    /// Reply to a replace request.
    ReplaceResp,
    /// Reply to a market-details request.
    MarketDetailsResp,
    /// A market was opened.
    MarketCreatedEvt,
    /// Best bid or ask changed.
    TopOfBookEvt,
    /// A price level changed.
    BookUpdateEvt,
    /// Two orders traded.
    FillEvt,
}

impl OutboundKind {
    /// All kinds, in channel-table order.
    pub const ALL: [OutboundKind; 9] = [
        Self::CreateMarketResp,
        Self::SubmitResp,
        Self::CancelResp,
        Self::ReplaceResp,
        Self::MarketDetailsResp,
        Self::MarketCreatedEvt,
        Self::TopOfBookEvt,
        Self::BookUpdateEvt,
        Self::FillEvt,
    ];

    /// Position of this kind in [`Self::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Tag character following the namespace in the channel key.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::CreateMarketResp | Self::MarketCreatedEvt => 'M',
            Self::SubmitResp => 'S',
            Self::CancelResp => 'C',
            Self::ReplaceResp => 'R',
            Self::MarketDetailsResp => 'D',
            Self::TopOfBookEvt => 'T',
            Self::BookUpdateEvt => 'B',
            Self::FillEvt => 'F',
        }
    }

    /// Namespace the channel lives under.
    #[must_use]
    pub const fn namespace(self) -> OutboundNamespace {
        match self {
            Self::CreateMarketResp
            | Self::SubmitResp
            | Self::CancelResp
            | Self::ReplaceResp
            | Self::MarketDetailsResp => OutboundNamespace::Response,
            Self::MarketCreatedEvt | Self::TopOfBookEvt | Self::BookUpdateEvt | Self::FillEvt => {
                OutboundNamespace::Event
            }
        }
    }

    /// Channel key under the given namespaces.
    #[must_use]
    pub fn channel(self, response_namespace: &str, event_namespace: &str) -> String {
        let namespace = match self.namespace() {
            OutboundNamespace::Response => response_namespace,
            OutboundNamespace::Event => event_namespace,
        };
        channel_key(namespace, self.tag())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A message the publisher can emit.
///
/// Sealed: the set of outbound kinds is closed.
pub trait Outbound: Serialize + sealed::Sealed {
    /// The channel this message type is published on.
    const KIND: OutboundKind;
}

macro_rules! outbound {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Outbound for $ty {
                const KIND: OutboundKind = OutboundKind::$kind;
            }
        )*
    };
}

outbound! {
    CreateMarketResp => CreateMarketResp,
    SubmitResp => SubmitResp,
    CancelResp => CancelResp,
    ReplaceResp => ReplaceResp,
    MarketDetailsResp => MarketDetailsResp,
    MarketCreatedEvt => MarketCreatedEvt,
    TopOfBookEvt => TopOfBookEvt,
    BookUpdateEvt => BookUpdateEvt,
    Fill => FillEvt,
}

/// Outcome carried by every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The request was applied.
    Accepted,
    /// The request was refused by the engine.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

impl ResponseStatus {
    /// Builds a rejection.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`ResponseStatus::Accepted`].
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Aggregate quantity resting at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price in ticks.
    pub price: u64,
    /// Total quantity at the price.
    pub quantity: u64,
}

/// Reply to [`CreateMarketReq`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMarketResp {
    /// Request id being answered.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
    /// Market the request named.
    pub market_id: MarketId,
    /// Accepted, or rejected with a reason.
    pub status: ResponseStatus,
}

impl CreateMarketResp {
    /// Builds the reply to `req`.
    #[must_use]
    pub fn for_request(req: &CreateMarketReq, status: ResponseStatus) -> Self {
        Self {
            req_id: req.req_id,
            user_id: req.user_id,
            market_id: req.market_id.clone(),
            status,
        }
    }
}

macro_rules! order_response {
    ($(#[$meta:meta])* $name:ident, $req:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            /// Request id being answered.
            pub req_id: u64,
            /// Requesting user.
            pub user_id: u64,
            /// Market the order belongs to.
            pub market_id: MarketId,
            /// Client-assigned order id.
            pub order_id: OrderId,
            /// Accepted, or rejected with a reason.
            pub status: ResponseStatus,
        }

        impl $name {
            /// Builds the reply to `req`.
            #[must_use]
            pub fn for_request(req: &$req, status: ResponseStatus) -> Self {
                Self {
                    req_id: req.req_id,
                    user_id: req.user_id,
                    market_id: req.market_id.clone(),
                    order_id: req.order_id.clone(),
                    status,
                }
            }
        }
    };
}

order_response! {
    /// Reply to [`SubmitReq`].
    SubmitResp, SubmitReq
}

order_response! {
    /// Reply to [`CancelReq`].
    CancelResp, CancelReq
}

order_response! {
    /// Reply to [`ReplaceReq`].
    ReplaceResp, ReplaceReq
}

/// Reply to a market-details request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDetailsResp {
    /// Request id being answered.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
    /// Market the request named.
    pub market_id: MarketId,
    /// Rejected when the market is unknown.
    pub status: ResponseStatus,
    /// Trading symbol, if the market exists.
    pub symbol: Option<String>,
    /// Highest resting bid.
    pub best_bid: Option<BookLevel>,
    /// Lowest resting ask.
    pub best_ask: Option<BookLevel>,
    /// Orders resting on both sides.
    pub open_orders: u64,
}

/// A market was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCreatedEvt {
    /// The new market.
    pub market_id: MarketId,
    /// Trading symbol.
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: u64,
}

/// Best bid and ask after a change at the top of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBookEvt {
    /// Market whose top changed.
    pub market_id: MarketId,
    /// Best bid, or `None` when the bid side is empty.
    pub bid: Option<BookLevel>,
    /// Best ask, or `None` when the ask side is empty.
    pub ask: Option<BookLevel>,
}

/// New aggregate quantity at one price level; zero means the level is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdateEvt {
    /// Market of the level.
    pub market_id: MarketId,
    /// Book side of the level.
    pub side: Side,
    /// Level price in ticks.
    pub price: u64,
    /// Aggregate quantity now resting at the level.
    pub quantity: u64,
}

/// A trade between an incoming (taker) order and a resting (maker) order.
///
/// Fills are published as events and appended, un-tagged, to the fill log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Market the trade happened in.
    pub market_id: MarketId,
    /// Engine-assigned, increasing per engine.
    pub fill_id: u64,
    /// Engine time of the trade, in nanoseconds.
    pub timestamp_ns: u64,
    /// The incoming order.
    pub taker_order_id: OrderId,
    /// The resting order.
    pub maker_order_id: OrderId,
    /// Side of the taker.
    pub side: Side,
    /// Execution price in ticks, the maker's price.
    pub price: u64,
    /// Quantity traded.
    pub quantity: u64,
}

impl CompactRecord for Fill {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push(self.fill_id)
            .push(self.timestamp_ns)
            .push_str(self.taker_order_id.as_str())
            .push_str(self.maker_order_id.as_str())
            .push(self.side)
            .push(self.price)
            .push(self.quantity);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            fill_id: r.parse("fill_id")?,
            timestamp_ns: r.parse("timestamp_ns")?,
            taker_order_id: r.parse("taker_order_id")?,
            maker_order_id: r.parse("maker_order_id")?,
            side: r.parse("side")?,
            price: r.parse("price")?,
            quantity: r.parse("quantity")?,
        })
    }
}
