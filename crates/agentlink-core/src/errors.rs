//! Error types for AgentLink
//!
//! This module contains the failures reported by topic substrate clients and the
//! main `LinkError` type returned by every connection-lifecycle operation.

use crate::types::{ConnectionId, RequestId, TopicId};

// ----------------------------------------------------------------------------
// Topic Client Errors
// ----------------------------------------------------------------------------

/// Failures reported by a [`MessageTopicClient`](crate::topic::MessageTopicClient)
///
/// The lifecycle manager treats all of these as transient: they are propagated to
/// the caller and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicClientError {
    #[error("Topic substrate unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Topic operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: TopicId },
    #[error("Submission rejected: {reason}")]
    Rejected { reason: String },
}

impl TopicClientError {
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        TopicClientError::Unavailable {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Link Errors
// ----------------------------------------------------------------------------

/// Core error type for connection-lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Request is not pending: already accepted, never existed, or discarded
    #[error("Connection request not found: {request_id}")]
    RequestNotFound { request_id: RequestId },

    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: ConnectionId },

    #[error("Connection is closed: {connection_id}")]
    ConnectionClosed { connection_id: ConnectionId },

    #[error("Failed to read topic {topic}: {source}")]
    TopicReadFailure {
        topic: TopicId,
        #[source]
        source: TopicClientError,
    },

    #[error("Failed to create connection topic: {source}")]
    TopicCreateFailure {
        #[source]
        source: TopicClientError,
    },

    #[error("Failed to send to topic {topic}: {source}")]
    TopicSendFailure {
        topic: TopicId,
        #[source]
        source: TopicClientError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The handler task is gone or did not answer
    #[error("Channel error: {message}")]
    Channel { message: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl LinkError {
    pub fn request_not_found(request_id: RequestId) -> Self {
        LinkError::RequestNotFound { request_id }
    }

    pub fn connection_not_found(connection_id: ConnectionId) -> Self {
        LinkError::ConnectionNotFound { connection_id }
    }

    pub fn connection_closed(connection_id: ConnectionId) -> Self {
        LinkError::ConnectionClosed { connection_id }
    }

    pub fn read_failure(topic: &TopicId, source: TopicClientError) -> Self {
        LinkError::TopicReadFailure {
            topic: topic.clone(),
            source,
        }
    }

    pub fn create_failure(source: TopicClientError) -> Self {
        LinkError::TopicCreateFailure { source }
    }

    pub fn send_failure(topic: &TopicId, source: TopicClientError) -> Self {
        LinkError::TopicSendFailure {
            topic: topic.clone(),
            source,
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        LinkError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        LinkError::Channel {
            message: message.into(),
        }
    }

    /// Whether the failure came from the topic substrate and may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::TopicReadFailure { .. }
                | LinkError::TopicCreateFailure { .. }
                | LinkError::TopicSendFailure { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, LinkError>;
pub type LinkResult<T> = Result<T>;
