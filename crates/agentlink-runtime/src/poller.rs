//! Connection request poller
//!
//! Pulls the newest batch of the inbound topic, keeps only connection-request
//! envelopes, and promotes each `(topic, sequence_number)` at most once.

use agentlink_core::{
    AccountId, ConnectionRequest, DedupStats, Envelope, LinkError, LinkResult, MessageTopicClient,
    Operation, ProcessedSequenceSet, RequestId, TopicId,
};
use tracing::{debug, trace};

/// Turns inbound topic traffic into fresh connection requests
#[derive(Debug)]
pub struct RequestPoller {
    inbound_topic: TopicId,
    batch_size: usize,
    processed: ProcessedSequenceSet,
}

impl RequestPoller {
    pub fn new(inbound_topic: TopicId, batch_size: usize, processed: ProcessedSequenceSet) -> Self {
        Self {
            inbound_topic,
            batch_size,
            processed,
        }
    }

    pub fn inbound_topic(&self) -> &TopicId {
        &self.inbound_topic
    }

    /// Read one batch and return the requests not seen before, in topic order
    ///
    /// A failed read leaves the processed set untouched.
    pub async fn poll(&mut self, client: &dyn MessageTopicClient) -> LinkResult<Vec<ConnectionRequest>> {
        let batch = client
            .read(&self.inbound_topic, self.batch_size)
            .await
            .map_err(|e| LinkError::read_failure(&self.inbound_topic, e))?;

        let mut requests = Vec::new();
        for message in batch {
            let Some(envelope) = Envelope::parse(&message.content) else {
                trace!(sequence_number = message.sequence_number, "Ignoring non-protocol message");
                continue;
            };
            let (account_id, inbound_topic, m) = match envelope.operation {
                Operation::ConnectionRequest {
                    account_id,
                    inbound_topic,
                    m,
                } => (account_id, inbound_topic, m),
                other => {
                    trace!(
                        sequence_number = message.sequence_number,
                        op = other.name(),
                        "Ignoring non-request envelope"
                    );
                    continue;
                }
            };

            if self.processed.check(&self.inbound_topic, message.sequence_number) {
                continue;
            }
            self.processed
                .mark_processed(&self.inbound_topic, message.sequence_number);

            let request = ConnectionRequest {
                id: RequestId::generate(),
                from_account: account_id.unwrap_or_else(AccountId::unknown),
                remote_inbound_topic: inbound_topic,
                message: m.unwrap_or_default(),
                sequence_number: message.sequence_number,
                received_at: message.timestamp,
            };
            debug!(
                request_id = %request.id,
                from = %request.from_account,
                sequence_number = request.sequence_number,
                "New connection request"
            );
            requests.push(request);
        }

        Ok(requests)
    }

    pub fn is_processed(&self, sequence_number: u64) -> bool {
        self.processed.contains(&self.inbound_topic, sequence_number)
    }

    pub fn dedup_stats(&self) -> &DedupStats {
        self.processed.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::InMemoryTopicClient;

    async fn setup() -> (InMemoryTopicClient, RequestPoller) {
        let client = InMemoryTopicClient::new();
        let inbound = TopicId::from("0.0.inbound");
        client.register_topic(&inbound).await;
        let poller = RequestPoller::new(inbound, 25, ProcessedSequenceSet::unbounded());
        (client, poller)
    }

    #[tokio::test]
    async fn test_second_poll_yields_nothing() {
        let (client, mut poller) = setup().await;
        let request = Envelope::connection_request(AccountId::from("0.0.remote"), None, None);
        client
            .send(poller.inbound_topic(), &request.to_json().unwrap())
            .await
            .unwrap();

        let first = poller.poll(&client).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(poller.is_processed(first[0].sequence_number));

        let second = poller.poll(&client).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(poller.dedup_stats().duplicates_detected, 1);
    }

    #[tokio::test]
    async fn test_missing_fields_get_defaults() {
        let (client, mut poller) = setup().await;
        client
            .send(
                poller.inbound_topic(),
                r#"{"protocol":"hcs-10","op":"connection_request"}"#,
            )
            .await
            .unwrap();

        let requests = poller.poll(&client).await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].from_account.is_unknown());
        assert_eq!(requests[0].message, "");
        assert_eq!(requests[0].remote_inbound_topic, None);
    }

    #[tokio::test]
    async fn test_odd_account_values_still_surface() {
        let (client, mut poller) = setup().await;
        for payload in [
            r#"{"protocol":"hcs-10","op":"connection_request","account_id":42}"#,
            r#"{"protocol":"hcs-10","op":"connection_request","account_id":["0.0.1"]}"#,
        ] {
            client.send(poller.inbound_topic(), payload).await.unwrap();
        }

        let requests = poller.poll(&client).await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].from_account.as_str(), "42");
        assert!(requests[1].from_account.is_unknown());
    }

    #[tokio::test]
    async fn test_read_failure_mutates_nothing() {
        let (client, mut poller) = setup().await;
        let request = Envelope::connection_request(AccountId::from("0.0.remote"), None, None);
        client
            .send(poller.inbound_topic(), &request.to_json().unwrap())
            .await
            .unwrap();

        client.fail_next_reads(1);
        let err = poller.poll(&client).await.unwrap_err();
        assert!(matches!(err, LinkError::TopicReadFailure { .. }));
        assert!(!poller.is_processed(1));

        // The next poll still sees the request
        assert_eq!(poller.poll(&client).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_size_limits_the_window() {
        let client = InMemoryTopicClient::new();
        let inbound = TopicId::from("0.0.inbound");
        client.register_topic(&inbound).await;
        let mut poller = RequestPoller::new(inbound.clone(), 2, ProcessedSequenceSet::unbounded());

        for n in 0..3 {
            let envelope =
                Envelope::connection_request(AccountId::from(format!("0.0.{}", n)), None, None);
            client.send(&inbound, &envelope.to_json().unwrap()).await.unwrap();
        }

        let requests = poller.poll(&client).await.unwrap();
        let seqs: Vec<u64> = requests.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
    }
}
