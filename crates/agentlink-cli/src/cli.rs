//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Account id of the local agent
    #[arg(long)]
    pub account: Option<String>,

    /// Inbound topic peers post connection requests to
    #[arg(long)]
    pub inbound_topic: Option<String>,

    /// Topic acknowledgements are published on
    #[arg(long)]
    pub outbound_topic: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Leave requests pending instead of accepting them automatically
    #[arg(long)]
    pub manual_accept: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run a scripted poll, accept, exchange and close scenario
    Demo {
        /// Number of simulated peers requesting a connection
        #[arg(short, long, default_value_t = 2)]
        peers: usize,
        /// Messages sent to each peer before closing
        #[arg(short, long, default_value_t = 2)]
        messages: usize,
    },
    /// Start the poll loop and print lifecycle events while peers keep arriving
    Watch {
        /// How long to run before stopping
        #[arg(short, long, default_value_t = 5)]
        duration_secs: u64,
        /// Delay between simulated peer requests in milliseconds
        #[arg(long, default_value_t = 750)]
        peer_interval_ms: u64,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_defaults() {
        let cli = Cli::parse_from(["agentlink", "demo"]);
        assert_eq!(
            cli.command,
            Commands::Demo {
                peers: 2,
                messages: 2
            }
        );
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "agentlink",
            "--account",
            "0.0.42",
            "--manual-accept",
            "--poll-interval-ms",
            "250",
            "watch",
            "--duration-secs",
            "2",
        ]);
        assert_eq!(cli.account.as_deref(), Some("0.0.42"));
        assert!(cli.manual_accept);
        assert_eq!(cli.poll_interval_ms, Some(250));
        assert!(matches!(cli.command, Commands::Watch { duration_secs: 2, .. }));
    }
}
