//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures used by the connection
//! lifecycle manager: agent identity, polling, relay reads, deduplication retention
//! and handler channel sizes.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, TopicId};

// ----------------------------------------------------------------------------
// Agent Identity
// ----------------------------------------------------------------------------

/// Who this agent is on the topic substrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Account announced in acknowledgements and application messages
    pub account_id: AccountId,
    /// Well-known topic peers post connection requests to
    pub inbound_topic: TopicId,
    /// Topic this agent publishes `connection_created` acknowledgements on
    pub outbound_topic: TopicId,
}

impl AgentIdentity {
    pub fn new(
        account_id: impl Into<AccountId>,
        inbound_topic: impl Into<TopicId>,
        outbound_topic: impl Into<TopicId>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            inbound_topic: inbound_topic.into(),
            outbound_topic: outbound_topic.into(),
        }
    }
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self::new("0.0.local", "0.0.inbound", "0.0.outbound")
    }
}

// ----------------------------------------------------------------------------
// Polling Configuration
// ----------------------------------------------------------------------------

/// Configuration for the inbound request poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between scheduled polls in milliseconds
    pub interval_ms: u64,
    /// Newest inbound messages examined per poll
    pub batch_size: usize,
    /// Accept every request surfaced by a scheduled poll
    pub auto_accept: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            batch_size: 25,
            auto_accept: true,
        }
    }
}

impl PollingConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            interval_ms: 50,
            batch_size: 25,
            auto_accept: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ----------------------------------------------------------------------------
// Relay Configuration
// ----------------------------------------------------------------------------

/// Configuration for reads on connection topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Default `limit` for `read` when the caller does not pass one
    pub read_batch_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_batch_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Deduplication Configuration
// ----------------------------------------------------------------------------

/// Configuration for the processed-sequence set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Explicit sequence numbers kept per topic before folding into a floor
    pub retention_per_topic: Option<usize>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_per_topic: Some(10_000),
        }
    }
}

impl DedupConfig {
    /// Keep every processed sequence number for the life of the process
    pub fn unbounded() -> Self {
        Self {
            retention_per_topic: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Configuration for handler task channel buffer sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for commands (handle → handler task)
    pub command_buffer_size: usize,
    /// Capacity of the lifecycle event broadcast
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,
            event_buffer_size: 256,
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 16,
            event_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a connection handler
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub identity: AgentIdentity,
    pub polling: PollingConfig,
    pub relay: RelayConfig,
    pub dedup: DedupConfig,
    pub channels: ChannelConfig,
}

impl LinkConfig {
    pub fn new(identity: AgentIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            identity: AgentIdentity::default(),
            polling: PollingConfig::testing(),
            relay: RelayConfig::default(),
            dedup: DedupConfig::unbounded(),
            channels: ChannelConfig::testing(),
        }
    }

    /// Builder method for customizing the agent identity
    pub fn with_identity(mut self, identity: AgentIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Builder method for customizing polling configuration
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Builder method for customizing relay configuration
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Builder method for customizing deduplication configuration
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Builder method for customizing channel configuration
    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Builder method for toggling auto-accept
    pub fn with_auto_accept(mut self, enabled: bool) -> Self {
        self.polling.auto_accept = enabled;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.identity.account_id.as_str().is_empty() {
            return Err("Account id cannot be empty".into());
        }
        if self.identity.inbound_topic.as_str().is_empty() {
            return Err("Inbound topic cannot be empty".into());
        }
        if self.identity.outbound_topic.as_str().is_empty() {
            return Err("Outbound topic cannot be empty".into());
        }

        if self.polling.interval_ms == 0 {
            return Err("Poll interval cannot be zero".into());
        }
        if self.polling.batch_size == 0 {
            return Err("Poll batch size cannot be zero".into());
        }
        if self.relay.read_batch_size == 0 {
            return Err("Relay read batch size cannot be zero".into());
        }
        if self.dedup.retention_per_topic == Some(0) {
            return Err("Dedup retention cannot be zero".into());
        }
        if let Some(retention) = self.dedup.retention_per_topic {
            // A single poll must never prune entries it is about to compare against
            if retention < self.polling.batch_size {
                return Err("Dedup retention must be at least the poll batch size".into());
            }
        }

        if self.channels.command_buffer_size == 0 {
            return Err("Command buffer size cannot be zero".into());
        }
        if self.channels.event_buffer_size == 0 {
            return Err("Event buffer size cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.polling.batch_size, 25);
        assert_eq!(config.polling.interval(), Duration::from_secs(60));
        assert!(config.polling.auto_accept);
        assert!(config.validate().is_ok());
        assert!(LinkConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let mut config = LinkConfig::default();
        config.polling.batch_size = 0;
        assert!(config.validate().is_err());

        let config = LinkConfig::default().with_dedup(DedupConfig {
            retention_per_topic: Some(0),
        });
        assert!(config.validate().is_err());

        let config = LinkConfig::default().with_dedup(DedupConfig {
            retention_per_topic: Some(10),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_identity() {
        let config = LinkConfig::new(AgentIdentity::new("", "0.0.1", "0.0.2"));
        assert_eq!(
            config.validate(),
            Err("Account id cannot be empty".to_string())
        );
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: LinkConfig = serde_json::from_str(
            r#"{"identity":{"account_id":"0.0.9","inbound_topic":"0.0.10","outbound_topic":"0.0.11"},"polling":{"auto_accept":false}}"#,
        )
        .unwrap();

        assert!(!config.polling.auto_accept);
        assert_eq!(config.polling.batch_size, 25);
        assert_eq!(config.relay, RelayConfig::default());
        assert_eq!(config.identity.account_id.as_str(), "0.0.9");
    }
}
