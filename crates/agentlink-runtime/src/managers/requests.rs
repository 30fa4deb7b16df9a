//! Pending connection requests
//!
//! Requests surfaced by the poller wait here until they are accepted. Iteration
//! follows arrival order, which is inbound topic order.

use agentlink_core::{ConnectionRequest, RequestId};
use hashbrown::HashMap;

/// Requests that have been seen but not accepted
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: HashMap<RequestId, ConnectionRequest>,
    /// Arrival order of the ids in `requests`
    order: Vec<RequestId>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly polled request
    pub fn insert(&mut self, request: ConnectionRequest) {
        if self.requests.insert(request.id, request.clone()).is_none() {
            self.order.push(request.id);
        }
    }

    pub fn get(&self, id: &RequestId) -> Option<&ConnectionRequest> {
        self.requests.get(id)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Remove a request; a given id can be taken at most once
    pub fn take(&mut self, id: &RequestId) -> Option<ConnectionRequest> {
        let request = self.requests.remove(id)?;
        self.order.retain(|pending| pending != id);
        Some(request)
    }

    /// Pending requests in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRequest> {
        self.order.iter().filter_map(|id| self.requests.get(id))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::{AccountId, Timestamp};

    fn request(seq: u64) -> ConnectionRequest {
        ConnectionRequest {
            id: RequestId::generate(),
            from_account: AccountId::from(format!("0.0.{}", seq)),
            remote_inbound_topic: None,
            message: String::new(),
            sequence_number: seq,
            received_at: Timestamp::new(seq),
        }
    }

    #[test]
    fn test_take_is_exactly_once() {
        let mut pending = PendingRequests::new();
        let req = request(1);
        let id = req.id;
        pending.insert(req);

        assert!(pending.contains(&id));
        assert!(pending.take(&id).is_some());
        assert!(pending.take(&id).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_iteration_keeps_arrival_order() {
        let mut pending = PendingRequests::new();
        let requests: Vec<_> = (1..=4).map(request).collect();
        for req in &requests {
            pending.insert(req.clone());
        }
        pending.take(&requests[1].id);

        let seqs: Vec<u64> = pending.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 4]);
        assert_eq!(pending.len(), 3);
    }
}
