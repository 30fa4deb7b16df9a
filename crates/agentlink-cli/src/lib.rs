//! AgentLink CLI library
//!
//! This library provides the pieces behind the `agentlink` binary: argument
//! parsing, configuration loading, and the demo and watch commands that drive a
//! connection handler against simulated peers.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::AgentLinkApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
