//! Handler lifecycle state and the status surface

use agentlink_core::TopicId;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

/// Whether the poll loop is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerState {
    #[default]
    Stopped,
    Running,
}

impl HandlerState {
    /// Move to `Running`; returns false if already running
    pub fn start(&mut self) -> bool {
        if *self == HandlerState::Running {
            return false;
        }
        *self = HandlerState::Running;
        true
    }

    /// Move to `Stopped`; returns false if already stopped
    pub fn stop(&mut self) -> bool {
        if *self == HandlerState::Stopped {
            return false;
        }
        *self = HandlerState::Stopped;
        true
    }

    pub fn is_running(&self) -> bool {
        *self == HandlerState::Running
    }
}

// ----------------------------------------------------------------------------
// Status Surface
// ----------------------------------------------------------------------------

/// Aggregate counters consumed by dashboards and orchestration flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerStatus {
    pub running: bool,
    pub inbound_topic: TopicId,
    /// Connections currently `active`
    pub active_connections: usize,
    pub pending_requests: usize,
    /// Sum of `messages_exchanged` over active and closed connections
    pub total_messages: u64,
}

impl HandlerStatus {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
