//! AgentLink CLI Configuration Management
//!
//! Configuration comes from, in increasing priority:
//! - Built-in defaults
//! - A TOML file passed with `--config`
//! - Command line flags

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use agentlink_core::{AccountId, LinkConfig, TopicId};

use crate::cli::Cli;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the AgentLink CLI application
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Connection handler configuration
    pub link: LinkConfig,
    /// Simulated peer settings
    pub peers: PeerConfig,
}

/// How simulated peers are named and behave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Peers are named `<account_prefix><n>`
    pub account_prefix: String,
    /// Whether simulated peers answer every message they receive
    pub echo_replies: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            account_prefix: "0.0.peer".to_string(),
            echo_replies: true,
        }
    }
}

impl PeerConfig {
    pub fn peer_account(&self, n: usize) -> AccountId {
        AccountId::new(format!("{}{}", self.account_prefix, n))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of file or default values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        let identity = &mut self.link.identity;
        if let Some(account) = &cli.account {
            identity.account_id = AccountId::new(account.clone());
        }
        if let Some(topic) = &cli.inbound_topic {
            identity.inbound_topic = TopicId::new(topic.clone());
        }
        if let Some(topic) = &cli.outbound_topic {
            identity.outbound_topic = TopicId::new(topic.clone());
        }
        if let Some(interval_ms) = cli.poll_interval_ms {
            self.link.polling.interval_ms = interval_ms;
        }
        if cli.manual_accept {
            self.link.polling.auto_accept = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.link.validate().map_err(CliError::Config)?;
        if self.peers.account_prefix.is_empty() {
            return Err(CliError::Config("Peer account prefix cannot be empty".into()));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = AppConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut path = std::env::temp_dir();
        path.push(format!("agentlink-cli-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[link.identity]\naccount_id = \"0.0.77\"\ninbound_topic = \"0.0.78\"\noutbound_topic = \"0.0.79\"\n\n[link.polling]\ninterval_ms = 1000"
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.link.identity.account_id.as_str(), "0.0.77");
        assert_eq!(config.link.polling.interval_ms, 1000);
        assert_eq!(config.link.polling.batch_size, 25);
        assert_eq!(config.peers, PeerConfig::default());
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let result = AppConfig::load_from_file("/nonexistent/agentlink.toml");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_cli_overrides_win() {
        let cli = Cli::parse_from([
            "agentlink",
            "--account",
            "0.0.5",
            "--manual-accept",
            "config",
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(&cli);

        assert_eq!(config.link.identity.account_id.as_str(), "0.0.5");
        assert!(!config.link.polling.auto_accept);
        assert!(config.validate().is_ok());
    }
}
