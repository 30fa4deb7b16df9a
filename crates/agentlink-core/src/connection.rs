//! Connection data model
//!
//! `ConnectionRequest` is an unaccepted inbound offer, `ActiveConnection` is the
//! record of an established (possibly since closed) channel, and `Message` is the
//! relay-level view of one payload on a connection topic.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, ConnectionId, RequestId, Timestamp, TopicId};

// ----------------------------------------------------------------------------
// Connection Request
// ----------------------------------------------------------------------------

/// An inbound offer to connect that has not been accepted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: RequestId,
    /// Requesting peer, `"unknown"` when the envelope omitted it
    pub from_account: AccountId,
    /// Topic the peer listens on, if it advertised one
    pub remote_inbound_topic: Option<TopicId>,
    pub message: String,
    /// Position of the request on the inbound topic
    pub sequence_number: u64,
    pub received_at: Timestamp,
}

// ----------------------------------------------------------------------------
// Active Connection
// ----------------------------------------------------------------------------

/// Status of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Closed => "closed",
        }
    }
}

/// An established channel between this agent and one peer
///
/// The counter only moves through [`ActiveConnection::record_message`] and the status
/// only through [`ActiveConnection::close`]; neither can run backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConnection {
    id: ConnectionId,
    remote_account: AccountId,
    remote_inbound_topic: Option<TopicId>,
    connection_topic: TopicId,
    status: ConnectionStatus,
    created_at: Timestamp,
    closed_at: Option<Timestamp>,
    messages_exchanged: u64,
    /// Inbound sequence number of the request this connection was accepted from
    origin_sequence_number: u64,
}

impl ActiveConnection {
    /// Open a connection for an accepted request
    pub fn from_request(
        request: &ConnectionRequest,
        connection_topic: TopicId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            remote_account: request.from_account.clone(),
            remote_inbound_topic: request.remote_inbound_topic.clone(),
            connection_topic,
            status: ConnectionStatus::Active,
            created_at,
            closed_at: None,
            messages_exchanged: 0,
            origin_sequence_number: request.sequence_number,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_account(&self) -> &AccountId {
        &self.remote_account
    }

    pub fn remote_inbound_topic(&self) -> Option<&TopicId> {
        self.remote_inbound_topic.as_ref()
    }

    pub fn connection_topic(&self) -> &TopicId {
        &self.connection_topic
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.closed_at
    }

    pub fn messages_exchanged(&self) -> u64 {
        self.messages_exchanged
    }

    pub fn origin_sequence_number(&self) -> u64 {
        self.origin_sequence_number
    }

    /// Count one successfully sent message; ignored once closed
    pub fn record_message(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.messages_exchanged += 1;
        true
    }

    /// Transition to `closed`
    ///
    /// Returns `false` when the connection was already closed, in which case the
    /// original `closed_at` is kept.
    pub fn close(&mut self, at: Timestamp) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = ConnectionStatus::Closed;
        self.closed_at = Some(at);
        true
    }
}

// ----------------------------------------------------------------------------
// Relay Message
// ----------------------------------------------------------------------------

/// One application message on a connection topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub connection_id: ConnectionId,
    pub from: AccountId,
    pub content: String,
    pub sequence_number: u64,
    pub timestamp: Timestamp,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
