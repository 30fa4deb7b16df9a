//! Stateful managers for the AgentLink runtime
//!
//! This module contains the owned collections behind the connection handler: the
//! pending-request set and the connection registry.

pub mod connection;
pub mod requests;

pub use connection::{AuditAction, AuditEntry, ConnectionRegistry, RegistryStats, StateDistribution};
pub use requests::PendingRequests;
