/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! The engine-side handler set.

use crate::protocol::{
    CancelReq, Command, CreateMarketReq, LogReq, MarketDetailsReq, ReplaceReq, SubmitReq,
};

/// Callbacks through which decoded commands reach the engine.
///
/// The same handler receives replayed commands at bootstrap and live
/// commands afterwards, so replaying a log and feeding the same commands live
/// must leave the engine in the same state. All business effects (matching,
/// state changes, responses, events, fills) happen here; the relay only
/// decodes and routes.
pub trait RequestHandler {
    /// Opens a market.
    fn create_market(&mut self, req: CreateMarketReq);

    /// Accepts a new order.
    fn submit(&mut self, req: SubmitReq);

    /// Cancels a resting order.
    fn cancel(&mut self, req: CancelReq);

    /// Replaces a resting order.
    fn replace(&mut self, req: ReplaceReq);

    /// Answers a market-details query.
    fn market_details(&mut self, req: MarketDetailsReq);

    /// Logs a market's book.
    fn log(&mut self, req: LogReq);

    /// Halts the engine.
    fn halt(&mut self);
}

impl<H: RequestHandler + ?Sized> RequestHandler for &mut H {
    fn create_market(&mut self, req: CreateMarketReq) {
        (**self).create_market(req);
    }

    fn submit(&mut self, req: SubmitReq) {
        (**self).submit(req);
    }

    fn cancel(&mut self, req: CancelReq) {
        (**self).cancel(req);
    }

    fn replace(&mut self, req: ReplaceReq) {
        (**self).replace(req);
    }

    fn market_details(&mut self, req: MarketDetailsReq) {
        (**self).market_details(req);
    }

    fn log(&mut self, req: LogReq) {
        (**self).log(req);
    }

    fn halt(&mut self) {
        (**self).halt();
    }
}

impl Command {
    /// Invokes exactly the handler callback matching this command.
    pub fn dispatch<H: RequestHandler + ?Sized>(self, handler: &mut H) {
        match self {
            Self::CreateMarket(req) => handler.create_market(req),
            Self::Submit(req) => handler.submit(req),
            Self::Cancel(req) => handler.cancel(req),
            Self::Replace(req) => handler.replace(req),
            Self::MarketDetails(req) => handler.market_details(req),
            Self::Log(req) => handler.log(req),
            Self::Halt => handler.halt(),
        }
    }
}
