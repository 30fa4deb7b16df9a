//! Lifecycle notifications published by the connection handler
//!
//! Dashboards and orchestration flows subscribe to these instead of polling the
//! status surface.

use serde::{Deserialize, Serialize};

use crate::connection::{ActiveConnection, ConnectionRequest, Message};
use crate::types::{ConnectionId, TopicId};

/// Events emitted as requests and connections move through their lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A new request entered the pending set
    RequestReceived { request: ConnectionRequest },
    ConnectionEstablished { connection: ActiveConnection },
    MessageSent { message: Message },
    ConnectionClosed { connection_id: ConnectionId },
    /// A scheduled poll could not read the inbound topic
    PollFailed { topic: TopicId, reason: String },
}

impl LinkEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            LinkEvent::RequestReceived { .. } => "request_received",
            LinkEvent::ConnectionEstablished { .. } => "connection_established",
            LinkEvent::MessageSent { .. } => "message_sent",
            LinkEvent::ConnectionClosed { .. } => "connection_closed",
            LinkEvent::PollFailed { .. } => "poll_failed",
        }
    }
}
