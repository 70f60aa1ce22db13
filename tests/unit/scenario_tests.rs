/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

use crate::engine::BookKeeper;
use exch_relay::config::RelayConfig;
use exch_relay::protocol::{CreateMarketResp, MarketCreatedEvt};
use exch_relay::relay::{ListenerError, Relay, RelayError};
use exch_relay::transport::{InMemoryTransport, Publish};
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(transport: &Arc<InMemoryTransport>) -> Relay {
        Relay::new(RelayConfig::default(), transport.clone(), transport.clone()).unwrap()
    }

    #[test]
    fn test_bootstrap_create_submit_cancel() {
        let transport = Arc::new(InMemoryTransport::with_records(
            "CMD",
            [
                "M:mkt1,1,1,BTC/USD,1",
                "S:mkt1,ord1,2,1,B,100,5",
                "C:mkt1,ord1,3,1",
            ],
        ));
        let session = relay(&transport).start(BookKeeper::default()).unwrap();

        let engine = session.handler();
        assert_eq!(engine.journal, vec!["M mkt1", "S ord1", "C ord1"]);
        assert_eq!(engine.open_in("mkt1"), 0);
    }

    #[test]
    fn test_live_submit_is_routed_and_logged() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut session = relay(&transport).start(BookKeeper::default()).unwrap();

        transport
            .publish(
                "EX_REQ:S",
                r#"{"market_id":"mkt1","order_id":"ord1","req_id":2,"user_id":10,"side":"sell","price":100,"quantity":3}"#,
            )
            .unwrap();
        session.try_drain().unwrap();

        assert_eq!(session.handler().journal, vec!["S ord1"]);
        assert_eq!(transport.records("CMD"), vec!["S:mkt1,ord1,2,10,S,100,3"]);
    }

    #[test]
    fn test_responses_and_events_after_going_live() {
        let transport = Arc::new(InMemoryTransport::with_records(
            "CMD",
            ["M:old,1,1,ETH/USD,1"],
        ));
        let relay = relay(&transport);
        let engine = BookKeeper::publishing(relay.publisher());
        let mut session = relay.start(engine).unwrap();
        assert!(transport.published().is_empty());

        transport
            .publish(
                "EX_REQ:M",
                r#"{"market_id":"new","req_id":7,"user_id":3,"symbol":"BTC/USD","tick_size":5}"#,
            )
            .unwrap();
        transport
            .publish(
                "EX_REQ:M",
                r#"{"market_id":"old","req_id":8,"user_id":3,"symbol":"ETH/USD","tick_size":1}"#,
            )
            .unwrap();
        session.try_drain().unwrap();

        let events: Vec<MarketCreatedEvt> = transport
            .published_on("EX_EVT:M")
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].market_id.as_str(), "new");
        assert_eq!(events[0].tick_size, 5);

        let responses: Vec<CreateMarketResp> = transport
            .published_on("EX_RESP:M")
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert!(responses[0].status.is_accepted());
        assert!(!responses[1].status.is_accepted());
        assert_eq!(responses[1].req_id, 8);
    }

    #[test]
    fn test_corrupt_log_keeps_relay_offline() {
        let transport = Arc::new(InMemoryTransport::with_records(
            "CMD",
            ["M:mkt1,1,1,BTC/USD,1", "Z:mkt1"],
        ));
        let err = relay(&transport).start(BookKeeper::default()).unwrap_err();
        assert!(matches!(err, RelayError::Replay(_)));
        assert!(err.to_string().contains("position 1"));
        assert_eq!(transport.subscription_count(), 0);
    }

    #[test]
    fn test_halt_and_queries_reach_engine_without_logging() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut session = relay(&transport).start(BookKeeper::default()).unwrap();

        transport
            .publish("EX_REQ:D", r#"{"market_id":"mkt1","req_id":1,"user_id":1}"#)
            .unwrap();
        transport
            .publish("EX_REQ:L", r#"{"market_id":"mkt1","req_id":2,"user_id":1}"#)
            .unwrap();
        transport.publish("EX_REQ:H", "{}").unwrap();
        session.try_drain().unwrap();

        let engine = session.handler();
        assert_eq!(engine.journal, vec!["D mkt1", "L mkt1", "H"]);
        assert!(engine.halted);
        assert!(transport.records("CMD").is_empty());
    }

    #[tokio::test]
    async fn test_session_runs_until_protocol_violation() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut session = relay(&transport).start(BookKeeper::default()).unwrap();

        let producer = transport.clone();
        tokio::spawn(async move {
            producer
                .publish(
                    "EX_REQ:M",
                    r#"{"market_id":"mkt1","req_id":1,"user_id":1,"symbol":"X","tick_size":1}"#,
                )
                .unwrap();
            producer.publish("EX_REQ:W", "{}").unwrap();
        });

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ListenerError::Dispatch(ref e) if e.is_fatal()));
        assert_eq!(session.handler().journal, vec!["M mkt1"]);
        assert!(!session.is_subscribed());
    }
}
