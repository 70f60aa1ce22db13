/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Relay configuration.
//!
//! Every field has a default matching the conventional key layout
//! (`EX_REQ:*` inbound, `EX_RESP:*`/`EX_EVT:*` outbound, `CMD` and `FILLS`
//! logs), so an empty JSON object is a complete configuration.

use crate::protocol::{DEFAULT_EVENT_NAMESPACE, DEFAULT_RESPONSE_NAMESPACE};
use crate::relay::AckMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default namespace of inbound request channels.
pub const DEFAULT_REQUEST_NAMESPACE: &str = "EX_REQ";

/// Default key of the durable command log.
pub const DEFAULT_COMMAND_LOG_KEY: &str = "CMD";

/// Default key of the durable fill log.
pub const DEFAULT_FILL_LOG_KEY: &str = "FILLS";

/// Errors raised while loading or validating a [`RelayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid JSON for [`RelayConfig`].
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but is inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Channel namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Namespace of inbound request channels.
    pub request_namespace: String,
    /// Namespace of the five response channels.
    pub response_namespace: String,
    /// Namespace of the four event channels.
    pub event_namespace: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_namespace: DEFAULT_REQUEST_NAMESPACE.to_string(),
            response_namespace: DEFAULT_RESPONSE_NAMESPACE.to_string(),
            event_namespace: DEFAULT_EVENT_NAMESPACE.to_string(),
        }
    }
}

/// Durable log keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Key of the command log.
    pub command_log_key: String,
    /// Key of the fill log.
    pub fill_log_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            command_log_key: DEFAULT_COMMAND_LOG_KEY.to_string(),
            fill_log_key: DEFAULT_FILL_LOG_KEY.to_string(),
        }
    }
}

/// Complete relay configuration.
///
/// # Examples
///
/// ```
/// use exch_relay::config::RelayConfig;
/// use exch_relay::relay::AckMode;
///
/// let config = RelayConfig::from_json(
///     r#"{ "channels": { "request_namespace": "REQ" },
///          "persistence": { "mode": "retry", "max_attempts": 3, "backoff_ms": 5 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.channels.request_namespace, "REQ");
/// assert_eq!(config.channels.response_namespace, "EX_RESP");
/// assert_eq!(config.persistence, AckMode::Retry { max_attempts: 3, backoff_ms: 5 });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Channel namespaces.
    pub channels: ChannelConfig,
    /// Durable log keys.
    pub storage: StorageConfig,
    /// Failure policy for log appends.
    pub persistence: AckMode,
}

impl RelayConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`], [`ConfigError::Parse`] or
    /// [`ConfigError::Invalid`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks that names are usable and do not collide.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("channels.request_namespace", &self.channels.request_namespace),
            ("channels.response_namespace", &self.channels.response_namespace),
            ("channels.event_namespace", &self.channels.event_namespace),
            ("storage.command_log_key", &self.storage.command_log_key),
            ("storage.fill_log_key", &self.storage.fill_log_key),
        ];
        for (field, value) in names {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
            if value.contains([':', '*', '?']) {
                return Err(ConfigError::Invalid(format!(
                    "{field} {value:?} must not contain ':', '*' or '?'"
                )));
            }
        }

        let channels = &self.channels;
        if channels.request_namespace == channels.response_namespace
            || channels.request_namespace == channels.event_namespace
        {
            return Err(ConfigError::Invalid(
                "request namespace must differ from outbound namespaces".to_string(),
            ));
        }
        // Both namespaces carry an `M` channel.
        if channels.response_namespace == channels.event_namespace {
            return Err(ConfigError::Invalid(
                "response and event namespaces must differ".to_string(),
            ));
        }
        if self.storage.command_log_key == self.storage.fill_log_key {
            return Err(ConfigError::Invalid(
                "command and fill logs must use different keys".to_string(),
            ));
        }
        if let AckMode::Retry { max_attempts: 0, .. } = self.persistence {
            return Err(ConfigError::Invalid(
                "persistence.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.persistence, AckMode::FireAndForget);
        assert_eq!(config.storage.command_log_key, "CMD");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(matches!(
            RelayConfig::from_json(r#"{"chanels": {}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_namespace_collisions_are_rejected() {
        let mut config = RelayConfig::default();
        config.channels.request_namespace = "EX_RESP".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RelayConfig::default();
        config.channels.event_namespace = "EX_RESP".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RelayConfig::default();
        config.storage.fill_log_key = "CMD".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_separator_in_namespace_is_rejected() {
        let mut config = RelayConfig::default();
        config.channels.request_namespace = "EX:REQ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_attempts_is_rejected() {
        let err = RelayConfig::from_json(
            r#"{"persistence": {"mode": "retry", "max_attempts": 0, "backoff_ms": 1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = RelayConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.json"));
    }
}
