//! Topic substrate abstraction
//!
//! The connection lifecycle manager never talks to a ledger or message bus
//! directly. Everything goes through [`MessageTopicClient`], which models an
//! ordered, append-only log per topic with stable sequence numbers. Durability and
//! ordering are the implementation's responsibility.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::TopicClientError;
use crate::types::{Timestamp, TopicId};

// ----------------------------------------------------------------------------
// Topic Records
// ----------------------------------------------------------------------------

/// One message as stored on a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub content: String,
    /// Per-topic position assigned at write time
    pub sequence_number: u64,
    pub timestamp: Timestamp,
}

/// Provenance of a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub sequence_number: u64,
    pub timestamp: Timestamp,
}

// ----------------------------------------------------------------------------
// Client Trait
// ----------------------------------------------------------------------------

/// Client for an append-only, per-topic ordered message store
#[async_trait]
pub trait MessageTopicClient: Send + Sync {
    /// Read up to `limit` of the newest messages on `topic`, in ascending topic order
    async fn read(&self, topic: &TopicId, limit: usize)
        -> Result<Vec<TopicMessage>, TopicClientError>;

    /// Append `payload` to `topic`
    async fn send(&self, topic: &TopicId, payload: &str) -> Result<SendReceipt, TopicClientError>;

    /// Provision a new topic
    async fn create_topic(&self) -> Result<TopicId, TopicClientError>;
}

/// Topic client shared between the handler and its owner
pub type SharedTopicClient = Arc<dyn MessageTopicClient>;
