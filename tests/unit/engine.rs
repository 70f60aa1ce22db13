/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! A minimal engine driving the relay through its public surface.

use exch_relay::protocol::{
    CancelReq, CancelResp, CreateMarketReq, CreateMarketResp, LogReq, MarketCreatedEvt,
    MarketDetailsReq, ReplaceReq, ReplaceResp, ResponseStatus, SubmitReq, SubmitResp,
    order_key,
};
use exch_relay::relay::{Publisher, RequestHandler};
use std::collections::{BTreeMap, BTreeSet};

/// Tracks markets and open orders, keyed by `<market>:<order>`.
#[derive(Debug, Default)]
pub struct BookKeeper {
    pub markets: BTreeSet<String>,
    pub open: BTreeMap<String, (u64, u64)>,
    pub journal: Vec<String>,
    pub halted: bool,
    publisher: Option<Publisher>,
}

impl BookKeeper {
    pub fn publishing(publisher: Publisher) -> Self {
        Self {
            publisher: Some(publisher),
            ..Self::default()
        }
    }

    pub fn open_in(&self, market: &str) -> usize {
        let prefix = format!("{market}:");
        self.open.keys().filter(|k| k.starts_with(&prefix)).count()
    }

    fn status(ok: bool, reason: &str) -> ResponseStatus {
        if ok {
            ResponseStatus::Accepted
        } else {
            ResponseStatus::rejected(reason)
        }
    }
}

impl RequestHandler for BookKeeper {
    fn create_market(&mut self, req: CreateMarketReq) {
        self.journal.push(format!("M {}", req.market_id));
        let created = self.markets.insert(req.market_id.to_string());
        if let Some(publisher) = &self.publisher {
            if created {
                publisher.publish(&MarketCreatedEvt {
                    market_id: req.market_id.clone(),
                    symbol: req.symbol.clone(),
                    tick_size: req.tick_size,
                });
            }
            publisher.publish(&CreateMarketResp::for_request(
                &req,
                Self::status(created, "market exists"),
            ));
        }
    }

    fn submit(&mut self, req: SubmitReq) {
        self.journal.push(format!("S {}", req.order_id));
        let known = self.markets.contains(req.market_id.as_str());
        if known {
            self.open.insert(
                order_key(req.market_id.as_str(), req.order_id.as_str()),
                (req.price, req.quantity),
            );
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish(&SubmitResp::for_request(
                &req,
                Self::status(known, "unknown market"),
            ));
        }
    }

    fn cancel(&mut self, req: CancelReq) {
        self.journal.push(format!("C {}", req.order_id));
        let removed = self
            .open
            .remove(&order_key(req.market_id.as_str(), req.order_id.as_str()))
            .is_some();
        if let Some(publisher) = &self.publisher {
            publisher.publish(&CancelResp::for_request(
                &req,
                Self::status(removed, "unknown order"),
            ));
        }
    }

    fn replace(&mut self, req: ReplaceReq) {
        self.journal.push(format!("R {}", req.order_id));
        let key = order_key(req.market_id.as_str(), req.order_id.as_str());
        let replaced = match self.open.get_mut(&key) {
            Some(level) => {
                *level = (req.price, req.quantity);
                true
            }
            None => false,
        };
        if let Some(publisher) = &self.publisher {
            publisher.publish(&ReplaceResp::for_request(
                &req,
                Self::status(replaced, "unknown order"),
            ));
        }
    }

    fn market_details(&mut self, req: MarketDetailsReq) {
        self.journal.push(format!("D {}", req.market_id));
    }

    fn log(&mut self, req: LogReq) {
        self.journal.push(format!("L {}", req.market_id));
    }

    fn halt(&mut self) {
        self.journal.push("H".to_string());
        self.halted = true;
    }
}
