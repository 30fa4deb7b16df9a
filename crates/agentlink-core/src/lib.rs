//! AgentLink Core
//!
//! This crate provides the foundational types for AgentLink, the connection protocol
//! that lets autonomous agents open dedicated channels with each other over a shared,
//! append-only topic substrate. It contains:
//! - Identifiers, timestamps and the connection data model
//! - The wire envelope codec for connection-protocol traffic
//! - The [`MessageTopicClient`] abstraction plus an in-memory substrate
//! - The processed-sequence set used for exactly-once request promotion
//! - Configuration and the error taxonomy
//!
//! The stateful machinery (poller, acceptor, relay, closer, scheduler) lives in
//! `agentlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod dedup;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod topic;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    AgentIdentity, ChannelConfig, DedupConfig, LinkConfig, PollingConfig, RelayConfig,
};
pub use connection::{ActiveConnection, ConnectionRequest, ConnectionStatus, Message};
pub use dedup::{DedupStats, ProcessedSequenceSet};
pub use envelope::{ApplicationMessage, Envelope, Operation, CONNECTION_PROTOCOL};
pub use errors::{LinkError, LinkResult, Result, TopicClientError};
pub use events::LinkEvent;
pub use topic::{
    memory::InMemoryTopicClient, MessageTopicClient, SendReceipt, SharedTopicClient, TopicMessage,
};
pub use types::{
    AccountId, ConnectionId, ManualTimeSource, RequestId, SystemTimeSource, TimeSource, Timestamp,
    TopicId,
};
