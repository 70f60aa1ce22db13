/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

use crate::engine::BookKeeper;
use exch_relay::config::RelayConfig;
use exch_relay::relay::Relay;
use exch_relay::transport::{FileLogStore, InMemoryTransport, LogStore, Publish};
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_log_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let pubsub = Arc::new(InMemoryTransport::new());

        {
            let log: Arc<dyn LogStore> = Arc::new(FileLogStore::open(dir.path()).unwrap());
            let relay = Relay::new(RelayConfig::default(), log, pubsub.clone()).unwrap();
            let mut session = relay.start(BookKeeper::default()).unwrap();
            pubsub
                .publish(
                    "EX_REQ:M",
                    r#"{"market_id":"mkt1","req_id":1,"user_id":1,"symbol":"A,B","tick_size":1}"#,
                )
                .unwrap();
            pubsub
                .publish(
                    "EX_REQ:S",
                    r#"{"market_id":"mkt1","order_id":"o1","req_id":2,"user_id":1,"side":"buy","price":10,"quantity":1}"#,
                )
                .unwrap();
            session.try_drain().unwrap();
        }

        let log: Arc<dyn LogStore> = Arc::new(FileLogStore::open(dir.path()).unwrap());
        assert_eq!(log.len("CMD").unwrap(), 2);
        let relay = Relay::new(RelayConfig::default(), log, pubsub).unwrap();
        let session = relay.start(BookKeeper::default()).unwrap();

        assert_eq!(session.replay_report().processed(), 2);
        assert_eq!(session.handler().journal, vec!["M mkt1", "S o1"]);
        assert_eq!(session.handler().open_in("mkt1"), 1);
    }
}
