/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Tests for the relay module.
//!
//! [`Recorder`] logs every callback it receives; [`ToyExchange`] is a small
//! price-time matching engine used where engine state matters.


use crate::protocol::{
    CancelReq, CancelResp, Command, CommandTag, CreateMarketReq, CreateMarketResp, Fill, LogReq,
    MarketCreatedEvt, MarketDetailsReq, MarketDetailsResp, MarketId, OrderId, ReplaceReq,
    ReplaceResp, ResponseStatus, Side, SubmitReq, SubmitResp,
};
use crate::relay::{Persister, Publisher, RequestHandler};
use crate::transport::{InboundMessage, Subscribe, TransportError};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn market(id: &str) -> MarketId {
    MarketId::new(id).unwrap()
}

pub(crate) fn order(id: &str) -> OrderId {
    OrderId::new(id).unwrap()
}

pub(crate) fn create_market(id: &str, req_id: u64) -> Command {
    Command::CreateMarket(CreateMarketReq {
        market_id: market(id),
        req_id,
        user_id: 1,
        symbol: format!("{id}/USD"),
        tick_size: 1,
    })
}

pub(crate) fn submit(mkt: &str, ord: &str, side: Side, price: u64, quantity: u64) -> Command {
    Command::Submit(SubmitReq {
        market_id: market(mkt),
        order_id: order(ord),
        req_id: 0,
        user_id: 1,
        side,
        price,
        quantity,
    })
}

pub(crate) fn cancel(mkt: &str, ord: &str) -> Command {
    Command::Cancel(CancelReq {
        market_id: market(mkt),
        order_id: order(ord),
        req_id: 0,
        user_id: 1,
    })
}

pub(crate) fn replace(mkt: &str, ord: &str, price: u64, quantity: u64) -> Command {
    Command::Replace(ReplaceReq {
        market_id: market(mkt),
        order_id: order(ord),
        req_id: 0,
        user_id: 1,
        price,
        quantity,
    })
}

/// A subscriber whose backend loses every subscription, or refuses it.
///
/// An accepted subscription delivers its confirmation and `messages`, then
/// the sending side goes away as if the server had dropped the stream.
#[derive(Debug, Default)]
pub(crate) struct LossySubscriber {
    pub(crate) refuse: bool,
    pub(crate) messages: Vec<(String, String)>,
}

impl Subscribe for LossySubscriber {
    fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, TransportError> {
        if self.refuse {
            return Err(TransportError::Unavailable("subscriptions refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(InboundMessage::Subscribed {
            pattern: pattern.to_string(),
        });
        for (channel, payload) in &self.messages {
            let _ = tx.send(InboundMessage::Message {
                pattern: pattern.to_string(),
                channel: channel.clone(),
                payload: payload.clone(),
            });
        }
        Ok(rx)
    }

    fn punsubscribe(&self, _pattern: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Records every callback in arrival order.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub calls: Vec<Command>,
}

impl Recorder {
    pub fn tags(&self) -> Vec<CommandTag> {
        self.calls.iter().map(Command::tag).collect()
    }
}

impl RequestHandler for Recorder {
    fn create_market(&mut self, req: CreateMarketReq) {
        self.calls.push(Command::CreateMarket(req));
    }

    fn submit(&mut self, req: SubmitReq) {
        self.calls.push(Command::Submit(req));
    }

    fn cancel(&mut self, req: CancelReq) {
        self.calls.push(Command::Cancel(req));
    }

    fn replace(&mut self, req: ReplaceReq) {
        self.calls.push(Command::Replace(req));
    }

    fn market_details(&mut self, req: MarketDetailsReq) {
        self.calls.push(Command::MarketDetails(req));
    }

    fn log(&mut self, req: LogReq) {
        self.calls.push(Command::Log(req));
    }

    fn halt(&mut self) {
        self.calls.push(Command::Halt);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resting {
    pub side: Side,
    pub price: u64,
    pub quantity: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ToyMarket {
    pub symbol: String,
    pub resting: BTreeMap<String, Resting>,
}

/// Price-time matching over limit orders, one book per market.
#[derive(Debug, Default)]
pub(crate) struct ToyExchange {
    pub markets: BTreeMap<String, ToyMarket>,
    pub fills: Vec<Fill>,
    pub halted: bool,
    seq: u64,
    persister: Option<Persister>,
    publisher: Option<Publisher>,
}

impl ToyExchange {
    pub fn wired(persister: Persister, publisher: Publisher) -> Self {
        Self {
            persister: Some(persister),
            publisher: Some(publisher),
            ..Self::default()
        }
    }

    /// Everything that must be identical after replay and live feeding.
    pub fn state(&self) -> (BTreeMap<String, ToyMarket>, Vec<Fill>) {
        (self.markets.clone(), self.fills.clone())
    }

    pub fn open_orders(&self, mkt: &str) -> usize {
        self.markets.get(mkt).map_or(0, |m| m.resting.len())
    }

    fn publish<M: crate::protocol::Outbound>(&self, message: &M) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(message);
        }
    }

    fn record_fill(&mut self, fill: Fill) {
        if let Some(persister) = &self.persister {
            persister.persist_fill(&fill).unwrap();
        }
        self.publish(&fill);
        self.fills.push(fill);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

impl RequestHandler for ToyExchange {
    fn create_market(&mut self, req: CreateMarketReq) {
        let status = if self.markets.contains_key(req.market_id.as_str()) {
            ResponseStatus::rejected("market exists")
        } else {
            self.markets.insert(
                req.market_id.to_string(),
                ToyMarket {
                    symbol: req.symbol.clone(),
                    resting: BTreeMap::new(),
                },
            );
            self.publish(&MarketCreatedEvt {
                market_id: req.market_id.clone(),
                symbol: req.symbol.clone(),
                tick_size: req.tick_size,
            });
            ResponseStatus::Accepted
        };
        self.publish(&CreateMarketResp::for_request(&req, status));
    }

    fn submit(&mut self, req: SubmitReq) {
        if !self.markets.contains_key(req.market_id.as_str()) {
            self.publish(&SubmitResp::for_request(
                &req,
                ResponseStatus::rejected("unknown market"),
            ));
            return;
        }
        let seq = self.next_seq();
        let mut remaining = req.quantity;
        let mut fills = Vec::new();
        if let Some(book) = self.markets.get_mut(req.market_id.as_str()) {
            let mut makers: Vec<(String, Resting)> = book
                .resting
                .iter()
                .filter(|(_, r)| {
                    r.side == req.side.opposite()
                        && match req.side {
                            Side::Buy => r.price <= req.price,
                            Side::Sell => r.price >= req.price,
                        }
                })
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect();
            makers.sort_by_key(|(_, r)| match req.side {
                Side::Buy => (r.price, r.seq),
                Side::Sell => (u64::MAX - r.price, r.seq),
            });
            for (maker_id, maker) in makers {
                if remaining == 0 {
                    break;
                }
                let traded = remaining.min(maker.quantity);
                remaining -= traded;
                if traded == maker.quantity {
                    book.resting.remove(&maker_id);
                } else if let Some(r) = book.resting.get_mut(&maker_id) {
                    r.quantity -= traded;
                }
                fills.push((maker_id, maker.price, traded));
            }
            if remaining > 0 {
                book.resting.insert(
                    req.order_id.to_string(),
                    Resting {
                        side: req.side,
                        price: req.price,
                        quantity: remaining,
                        seq,
                    },
                );
            }
        }
        for (maker_id, price, quantity) in fills {
            let fill_id = self.fills.len() as u64 + 1;
            self.record_fill(Fill {
                market_id: req.market_id.clone(),
                fill_id,
                timestamp_ns: fill_id * 1_000,
                taker_order_id: req.order_id.clone(),
                maker_order_id: order(&maker_id),
                side: req.side,
                price,
                quantity,
            });
        }
        self.publish(&SubmitResp::for_request(&req, ResponseStatus::Accepted));
    }

    fn cancel(&mut self, req: CancelReq) {
        let removed = self
            .markets
            .get_mut(req.market_id.as_str())
            .and_then(|m| m.resting.remove(req.order_id.as_str()));
        let status = match removed {
            Some(_) => ResponseStatus::Accepted,
            None => ResponseStatus::rejected("unknown order"),
        };
        self.publish(&CancelResp::for_request(&req, status));
    }

    fn replace(&mut self, req: ReplaceReq) {
        let seq = self.next_seq();
        let replaced = self
            .markets
            .get_mut(req.market_id.as_str())
            .and_then(|m| m.resting.get_mut(req.order_id.as_str()))
            .map(|r| {
                r.price = req.price;
                r.quantity = req.quantity;
                r.seq = seq;
            });
        let status = match replaced {
            Some(()) => ResponseStatus::Accepted,
            None => ResponseStatus::rejected("unknown order"),
        };
        self.publish(&ReplaceResp::for_request(&req, status));
    }

    fn market_details(&mut self, req: MarketDetailsReq) {
        let details = self.markets.get(req.market_id.as_str());
        self.publish(&MarketDetailsResp {
            req_id: req.req_id,
            user_id: req.user_id,
            market_id: req.market_id.clone(),
            status: match details {
                Some(_) => ResponseStatus::Accepted,
                None => ResponseStatus::rejected("unknown market"),
            },
            symbol: details.map(|m| m.symbol.clone()),
            best_bid: None,
            best_ask: None,
            open_orders: details.map_or(0, |m| m.resting.len() as u64),
        });
    }

    fn log(&mut self, _req: LogReq) {}

    fn halt(&mut self) {
        self.halted = true;
    }
}
