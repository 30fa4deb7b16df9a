//! AgentLink Runtime
//!
//! This crate contains the stateful side of the AgentLink connection protocol:
//! - `RequestPoller`: promotes inbound connection requests exactly once
//! - `ConnectionHandler`: accept, relay, close and status over a topic client
//! - `HandlerTask` and `PollScheduler`: the actor that serializes operations and
//!   the interval loop that feeds it poll cycles
//! - `HandlerBuilder` / `HandlerHandle`: assembly and the async caller surface
//!
//! `agentlink-core` provides the data model, codec and topic client abstraction.

pub mod builder;
pub mod handler;
pub mod managers;
pub mod poller;
pub mod scheduler;
pub mod status;
pub mod task;

pub use builder::{
    create_test_handler, create_test_handler_with_config, HandlerBuilder, HandlerHandle,
};
pub use handler::{AcceptFailure, ConnectionHandler, PollOutcome};
pub use managers::*;
pub use poller::RequestPoller;
pub use scheduler::PollScheduler;
pub use status::{HandlerState, HandlerStatus};
pub use task::{HandlerCommand, HandlerTask};

// Re-export core types for convenience
pub use agentlink_core::{
    AccountId, ActiveConnection, AgentIdentity, ConnectionId, ConnectionRequest,
    ConnectionStatus, InMemoryTopicClient, LinkConfig, LinkError, LinkEvent, LinkResult, Message,
    MessageTopicClient, RequestId, SharedTopicClient, TopicId,
};
