//! In-memory topic substrate
//!
//! Deterministic [`MessageTopicClient`] for tests, demos and single-process setups.
//! Topics are named like ledger topics (`0.0.<n>`), sequence numbers start at 1 on
//! every topic, and failures can be injected per operation to exercise the
//! transient-error paths of the lifecycle manager.

use async_trait::async_trait;
use hashbrown::HashMap;
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{MessageTopicClient, SendReceipt, TopicMessage};
use crate::errors::TopicClientError;
use crate::types::{SystemTimeSource, TimeSource, TopicId};

/// First numeric suffix handed out by `create_topic`
const FIRST_TOPIC_NUMBER: u64 = 1000;

// ----------------------------------------------------------------------------
// Failure Injection
// ----------------------------------------------------------------------------

/// Countdown of upcoming calls that should fail
#[derive(Debug, Default)]
struct FailureBudget {
    reads: AtomicU32,
    sends: AtomicU32,
    creates: AtomicU32,
}

impl FailureBudget {
    /// Consume one failure from `counter` if any are left
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ----------------------------------------------------------------------------
// In-memory Client
// ----------------------------------------------------------------------------

/// Process-local topic store
///
/// Cloning is cheap and every clone sees the same topics, which lets a test play
/// both the local agent and its remote peers against one substrate.
#[derive(Clone)]
pub struct InMemoryTopicClient {
    topics: Arc<RwLock<HashMap<TopicId, Vec<TopicMessage>>>>,
    next_topic: Arc<AtomicU64>,
    failures: Arc<FailureBudget>,
    time_source: Arc<dyn TimeSource>,
}

impl InMemoryTopicClient {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    /// Stamp messages with a custom clock
    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_topic: Arc::new(AtomicU64::new(FIRST_TOPIC_NUMBER)),
            failures: Arc::new(FailureBudget::default()),
            time_source,
        }
    }

    /// Make a topic with a well-known id available (e.g. an agent's inbound topic)
    pub async fn register_topic(&self, topic: &TopicId) {
        self.topics.write().await.entry(topic.clone()).or_default();
    }

    /// All messages on a topic, oldest first
    pub async fn messages(&self, topic: &TopicId) -> Vec<TopicMessage> {
        self.topics
            .read()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// Fail the next `count` reads with `Unavailable`
    pub fn fail_next_reads(&self, count: u32) {
        self.failures.reads.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` sends with `Unavailable`
    pub fn fail_next_sends(&self, count: u32) {
        self.failures.sends.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` topic creations with `Unavailable`
    pub fn fail_next_creates(&self, count: u32) {
        self.failures.creates.store(count, Ordering::SeqCst);
    }
}

impl Default for InMemoryTopicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTopicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTopicClient")
            .field("next_topic", &self.next_topic.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageTopicClient for InMemoryTopicClient {
    async fn read(
        &self,
        topic: &TopicId,
        limit: usize,
    ) -> Result<Vec<TopicMessage>, TopicClientError> {
        if FailureBudget::take(&self.failures.reads) {
            return Err(TopicClientError::unavailable("injected read failure"));
        }

        let topics = self.topics.read().await;
        let messages = topics
            .get(topic)
            .ok_or_else(|| TopicClientError::UnknownTopic {
                topic: topic.clone(),
            })?;

        let start = messages.len().saturating_sub(limit);
        trace!(%topic, limit, returned = messages.len() - start, "Topic read");
        Ok(messages[start..].to_vec())
    }

    async fn send(&self, topic: &TopicId, payload: &str) -> Result<SendReceipt, TopicClientError> {
        if FailureBudget::take(&self.failures.sends) {
            return Err(TopicClientError::unavailable("injected send failure"));
        }

        let mut topics = self.topics.write().await;
        let messages = topics
            .get_mut(topic)
            .ok_or_else(|| TopicClientError::UnknownTopic {
                topic: topic.clone(),
            })?;

        let receipt = SendReceipt {
            sequence_number: messages.len() as u64 + 1,
            timestamp: self.time_source.now(),
        };
        messages.push(TopicMessage {
            content: payload.to_string(),
            sequence_number: receipt.sequence_number,
            timestamp: receipt.timestamp,
        });

        trace!(%topic, sequence_number = receipt.sequence_number, "Topic send");
        Ok(receipt)
    }

    async fn create_topic(&self) -> Result<TopicId, TopicClientError> {
        if FailureBudget::take(&self.failures.creates) {
            return Err(TopicClientError::unavailable("injected create failure"));
        }

        let number = self.next_topic.fetch_add(1, Ordering::SeqCst);
        let topic = TopicId::new(format!("0.0.{}", number));
        self.topics.write().await.insert(topic.clone(), Vec::new());

        debug!(%topic, "Created topic");
        Ok(topic)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ManualTimeSource, Timestamp};

    #[tokio::test]
    async fn test_send_assigns_increasing_sequence_numbers() {
        let client = InMemoryTopicClient::new();
        let topic = client.create_topic().await.unwrap();

        let first = client.send(&topic, "a").await.unwrap();
        let second = client.send(&topic, "b").await.unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_read_returns_newest_in_topic_order() {
        let client = InMemoryTopicClient::new();
        let topic = TopicId::from("0.0.inbound");
        client.register_topic(&topic).await;

        for payload in ["one", "two", "three", "four"] {
            client.send(&topic, payload).await.unwrap();
        }

        let batch = client.read(&topic, 2).await.unwrap();
        let contents: Vec<_> = batch.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "four"]);
        assert_eq!(batch[0].sequence_number, 3);

        assert_eq!(client.read(&topic, 100).await.unwrap().len(), 4);
        assert!(client.read(&topic, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_topics_are_distinct() {
        let client = InMemoryTopicClient::new();
        let a = client.create_topic().await.unwrap();
        let b = client.create_topic().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(client.topic_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let client = InMemoryTopicClient::new();
        let missing = TopicId::from("0.0.404");
        assert_eq!(
            client.read(&missing, 10).await,
            Err(TopicClientError::UnknownTopic {
                topic: missing.clone()
            })
        );
        assert!(client.send(&missing, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let client = InMemoryTopicClient::new();
        let topic = client.create_topic().await.unwrap();

        client.fail_next_reads(1);
        assert!(client.read(&topic, 10).await.is_err());
        assert!(client.read(&topic, 10).await.is_ok());

        client.fail_next_creates(2);
        assert!(client.create_topic().await.is_err());
        assert!(client.create_topic().await.is_err());
        assert!(client.create_topic().await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_state_and_clock() {
        let clock = ManualTimeSource::new(Timestamp::new(5_000));
        let client = InMemoryTopicClient::with_time_source(Arc::new(clock.clone()));
        let peer_view = client.clone();
        let topic = client.create_topic().await.unwrap();

        clock.advance(10);
        let receipt = peer_view.send(&topic, "hi").await.unwrap();
        assert_eq!(receipt.timestamp, Timestamp::new(5_010));
        assert_eq!(client.messages(&topic).await.len(), 1);
    }
}
