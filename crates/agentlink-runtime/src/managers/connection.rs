//! Connection registry for the AgentLink runtime
//!
//! This module contains the ConnectionRegistry that owns every connection accepted
//! during the process lifetime, open or closed, and records lifecycle transitions
//! for audit.

use std::collections::VecDeque;

use agentlink_core::{
    AccountId, ActiveConnection, ConnectionId, ConnectionStatus, LinkError, LinkResult, Timestamp,
};
use hashbrown::HashMap;
use serde::Serialize;

/// Audit entries kept before the oldest are dropped
const MAX_AUDIT_ENTRIES: usize = 1000;

// ----------------------------------------------------------------------------
// Connection Registry
// ----------------------------------------------------------------------------

/// Stores connections densely so status aggregation is a plain scan
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Every connection ever accepted, in acceptance order
    connections: Vec<ActiveConnection>,
    /// Connection id → position in `connections`
    index: HashMap<ConnectionId, usize>,
    /// Connection audit trail
    audit_trail: VecDeque<AuditEntry>,
    /// Statistics
    stats: RegistryStats,
}

impl ConnectionRegistry {
    /// Create a new connection registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection
    pub fn insert(&mut self, connection: ActiveConnection) -> &ActiveConnection {
        let position = self.connections.len();
        self.index.insert(connection.id(), position);
        self.record_audit(
            connection.id(),
            connection.remote_account().clone(),
            AuditAction::Established,
            connection.created_at(),
        );
        self.stats.connections_established += 1;
        self.connections.push(connection);
        &self.connections[position]
    }

    /// Get a connection by id
    pub fn get(&self, id: &ConnectionId) -> Option<&ActiveConnection> {
        self.index.get(id).map(|&position| &self.connections[position])
    }

    /// Look up a connection, failing with `ConnectionNotFound`
    pub fn require(&self, id: &ConnectionId) -> LinkResult<&ActiveConnection> {
        self.get(id).ok_or_else(|| LinkError::connection_not_found(*id))
    }

    /// Look up a connection that can still carry messages
    pub fn require_active(&self, id: &ConnectionId) -> LinkResult<&ActiveConnection> {
        let connection = self.require(id)?;
        if !connection.is_active() {
            return Err(LinkError::connection_closed(*id));
        }
        Ok(connection)
    }

    fn get_mut(&mut self, id: &ConnectionId) -> LinkResult<&mut ActiveConnection> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| LinkError::connection_not_found(*id))?;
        Ok(&mut self.connections[position])
    }

    /// Count one sent message, returning the new counter value
    pub fn record_message(&mut self, id: &ConnectionId) -> LinkResult<u64> {
        let connection = self.get_mut(id)?;
        if !connection.record_message() {
            return Err(LinkError::connection_closed(*id));
        }
        let count = connection.messages_exchanged();
        self.stats.messages_recorded += 1;
        Ok(count)
    }

    /// Mark a connection closed
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&mut self, id: &ConnectionId, at: Timestamp) -> LinkResult<bool> {
        let connection = self.get_mut(id)?;
        if !connection.close(at) {
            return Ok(false);
        }
        let remote = connection.remote_account().clone();
        self.record_audit(*id, remote, AuditAction::Closed, at);
        self.stats.connections_closed += 1;
        Ok(true)
    }

    /// All connections in acceptance order
    pub fn iter(&self) -> impl Iterator<Item = &ActiveConnection> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get count of connections in each state
    pub fn get_state_counts(&self) -> StateDistribution {
        let mut distribution = StateDistribution::default();

        for connection in &self.connections {
            match connection.status() {
                ConnectionStatus::Active => distribution.active += 1,
                ConnectionStatus::Closed => distribution.closed += 1,
            }
        }

        distribution
    }

    /// Sum of `messages_exchanged` over open and closed connections
    pub fn total_messages(&self) -> u64 {
        self.connections
            .iter()
            .map(ActiveConnection::messages_exchanged)
            .sum()
    }

    /// Get recent audit entries
    pub fn get_recent_audit_entries(&self, limit: usize) -> Vec<AuditEntry> {
        let start = self.audit_trail.len().saturating_sub(limit);
        self.audit_trail.iter().skip(start).cloned().collect()
    }

    /// Get registry statistics
    pub fn get_statistics(&self) -> &RegistryStats {
        &self.stats
    }

    fn record_audit(
        &mut self,
        connection_id: ConnectionId,
        remote_account: AccountId,
        action: AuditAction,
        at: Timestamp,
    ) {
        self.audit_trail.push_back(AuditEntry {
            connection_id,
            remote_account,
            action,
            at,
        });

        if self.audit_trail.len() > MAX_AUDIT_ENTRIES {
            self.audit_trail.pop_front();
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Lifecycle transition recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Established,
    Closed,
}

/// One audit trail record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub connection_id: ConnectionId,
    pub remote_account: AccountId,
    pub action: AuditAction,
    pub at: Timestamp,
}

/// Statistics for connection management
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    /// Number of connections accepted
    pub connections_established: u64,
    /// Number of connections closed
    pub connections_closed: u64,
    /// Number of messages counted across all connections
    pub messages_recorded: u64,
}

/// Distribution of connections across states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDistribution {
    pub active: usize,
    pub closed: usize,
}

impl StateDistribution {
    /// Get total number of connections
    pub fn total(&self) -> usize {
        self.active + self.closed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
