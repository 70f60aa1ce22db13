/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

use exch_relay::config::{ConfigError, RelayConfig};
use exch_relay::relay::AckMode;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = RelayConfig {
            persistence: AckMode::Retry {
                max_attempts: 5,
                backoff_ms: 20,
            },
            ..RelayConfig::default()
        };
        write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_persistence_modes_parse() {
        for (json, mode) in [
            (r#"{"mode":"fire_and_forget"}"#, AckMode::FireAndForget),
            (r#"{"mode":"confirm"}"#, AckMode::Confirm),
            (
                r#"{"mode":"retry","max_attempts":2,"backoff_ms":0}"#,
                AckMode::Retry {
                    max_attempts: 2,
                    backoff_ms: 0,
                },
            ),
        ] {
            let config = RelayConfig::from_json(&format!(r#"{{"persistence":{json}}}"#)).unwrap();
            assert_eq!(config.persistence, mode);
        }
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let err = RelayConfig::from_json(r#"{"persistence":{"mode":"eventually"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_wildcard_in_key_is_invalid() {
        let err = RelayConfig::from_json(r#"{"storage":{"command_log_key":"CMD*"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_empty_namespace_is_invalid() {
        let err = RelayConfig::from_json(r#"{"channels":{"event_namespace":""}}"#).unwrap_err();
        assert!(err.to_string().contains("event_namespace"));
    }
}
