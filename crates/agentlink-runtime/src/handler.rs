//! Connection handler
//!
//! Owns the pending request set and the connection registry and implements the
//! lifecycle operations against a [`MessageTopicClient`]:
//!
//! - poll: surface new connection requests from the inbound topic
//! - accept: create a connection topic, acknowledge, and register the connection
//! - send / read: relay application messages over a connection topic
//! - close: notify the peer and retire the connection
//!
//! Every mutation happens only after the topic call it depends on has succeeded,
//! so a failed call leaves the handler exactly as it was.

use std::sync::Arc;

use agentlink_core::envelope::TopicPayload;
use agentlink_core::{
    AccountId, ActiveConnection, AgentIdentity, ApplicationMessage, ConnectionId,
    ConnectionRequest, DedupStats, Envelope, LinkConfig, LinkError, LinkEvent, LinkResult,
    Message, ProcessedSequenceSet, RequestId, SharedTopicClient, SystemTimeSource, TimeSource,
    TopicId,
};
use hashbrown::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::managers::{AuditEntry, ConnectionRegistry, PendingRequests};
use crate::poller::RequestPoller;
use crate::status::{HandlerState, HandlerStatus};

// ----------------------------------------------------------------------------
// Poll Outcome
// ----------------------------------------------------------------------------

/// An auto-accept attempt that failed; the request stays pending
#[derive(Debug)]
pub struct AcceptFailure {
    pub request_id: RequestId,
    pub error: LinkError,
}

/// Result of one scheduled poll cycle
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Requests surfaced by this poll
    pub requests: Vec<ConnectionRequest>,
    /// Connections opened by auto-accept
    pub accepted: Vec<ActiveConnection>,
    pub failures: Vec<AcceptFailure>,
}

// ----------------------------------------------------------------------------
// Connection Handler
// ----------------------------------------------------------------------------

/// Connection lifecycle manager for one agent identity
pub struct ConnectionHandler {
    config: LinkConfig,
    client: SharedTopicClient,
    time_source: Arc<dyn TimeSource>,
    poller: RequestPoller,
    pending: PendingRequests,
    registry: ConnectionRegistry,
    /// Topics created for requests whose acknowledgement has not gone out yet
    provisioned: HashMap<RequestId, TopicId>,
    state: HandlerState,
    events: broadcast::Sender<LinkEvent>,
}

impl ConnectionHandler {
    /// Create a handler; fails if the configuration does not validate
    pub fn new(config: LinkConfig, client: SharedTopicClient) -> LinkResult<Self> {
        config.validate().map_err(LinkError::config_error)?;

        let processed = ProcessedSequenceSet::new(config.dedup.retention_per_topic);
        let poller = RequestPoller::new(
            config.identity.inbound_topic.clone(),
            config.polling.batch_size,
            processed,
        );
        let (events, _) = broadcast::channel(config.channels.event_buffer_size);

        Ok(Self {
            config,
            client,
            time_source: Arc::new(SystemTimeSource::new()),
            poller,
            pending: PendingRequests::new(),
            registry: ConnectionRegistry::new(),
            provisioned: HashMap::new(),
            state: HandlerState::Stopped,
            events,
        })
    }

    /// Replace the clock used for connection timestamps
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.config.identity
    }

    // ------------------------------------------------------------------------
    // Poller
    // ------------------------------------------------------------------------

    /// Read the inbound topic once and add every new request to the pending set
    pub async fn poll(&mut self) -> LinkResult<Vec<ConnectionRequest>> {
        let requests = self.poller.poll(self.client.as_ref()).await?;
        for request in &requests {
            self.pending.insert(request.clone());
            self.emit(LinkEvent::RequestReceived {
                request: request.clone(),
            });
        }
        if !requests.is_empty() {
            info!(
                count = requests.len(),
                pending = self.pending.len(),
                "Received connection requests"
            );
        }
        Ok(requests)
    }

    /// One scheduled cycle: poll, then accept what was found if auto-accept is on
    ///
    /// A failed read is logged and reported as an event before being returned.
    /// Accept failures do not abort the cycle.
    pub async fn run_poll_cycle(&mut self) -> LinkResult<PollOutcome> {
        let requests = match self.poll().await {
            Ok(requests) => requests,
            Err(e) => {
                warn!(error = %e, "Inbound poll failed");
                self.emit(LinkEvent::PollFailed {
                    topic: self.config.identity.inbound_topic.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut outcome = PollOutcome {
            requests,
            ..PollOutcome::default()
        };
        if !self.config.polling.auto_accept {
            return Ok(outcome);
        }

        let ids: Vec<RequestId> = outcome.requests.iter().map(|r| r.id).collect();
        for request_id in ids {
            match self.accept(request_id).await {
                Ok(connection) => outcome.accepted.push(connection),
                Err(error) => {
                    warn!(%request_id, error = %error, "Auto-accept failed; request stays pending");
                    outcome.failures.push(AcceptFailure { request_id, error });
                }
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Acceptor
    // ------------------------------------------------------------------------

    /// Accept a pending request
    ///
    /// The request leaves the pending set only once the connection topic exists
    /// and the acknowledgement is published. A topic created for a request whose
    /// acknowledgement failed is reused when the accept is retried.
    pub async fn accept(&mut self, request_id: RequestId) -> LinkResult<ActiveConnection> {
        let request = self
            .pending
            .get(&request_id)
            .cloned()
            .ok_or_else(|| LinkError::request_not_found(request_id))?;

        let connection_topic = match self.provisioned.get(&request_id) {
            Some(topic) => topic.clone(),
            None => {
                let topic = self
                    .client
                    .create_topic()
                    .await
                    .map_err(LinkError::create_failure)?;
                self.provisioned.insert(request_id, topic.clone());
                topic
            }
        };

        let identity = &self.config.identity;
        let ack = Envelope::connection_created(
            identity.account_id.clone(),
            request.from_account.clone(),
            connection_topic.clone(),
        );
        if let Err(e) = self
            .client
            .send(&identity.outbound_topic, &ack.to_json()?)
            .await
        {
            warn!(
                %request_id,
                topic = %connection_topic,
                "Acknowledgement failed; keeping topic for retry"
            );
            return Err(LinkError::send_failure(&identity.outbound_topic, e));
        }
        self.provisioned.remove(&request_id);

        let request = self
            .pending
            .take(&request_id)
            .ok_or_else(|| LinkError::request_not_found(request_id))?;
        let connection = ActiveConnection::from_request(
            &request,
            connection_topic,
            self.time_source.now(),
        );
        let connection = self.registry.insert(connection).clone();

        info!(
            connection_id = %connection.id(),
            remote = %connection.remote_account(),
            topic = %connection.connection_topic(),
            "Connection established"
        );
        self.emit(LinkEvent::ConnectionEstablished {
            connection: connection.clone(),
        });
        Ok(connection)
    }

    /// Drop a pending request without accepting it
    pub fn discard(&mut self, request_id: RequestId) -> LinkResult<ConnectionRequest> {
        let request = self
            .pending
            .take(&request_id)
            .ok_or_else(|| LinkError::request_not_found(request_id))?;
        if let Some(topic) = self.provisioned.remove(&request_id) {
            warn!(%request_id, %topic, "Discarded request leaves its connection topic unused");
        }
        debug!(%request_id, from = %request.from_account, "Discarded connection request");
        Ok(request)
    }

    // ------------------------------------------------------------------------
    // Relay
    // ------------------------------------------------------------------------

    /// Publish an application message on an active connection
    pub async fn send(
        &mut self,
        connection_id: ConnectionId,
        content: impl Into<String>,
    ) -> LinkResult<Message> {
        let topic = self
            .registry
            .require_active(&connection_id)?
            .connection_topic()
            .clone();

        let payload = ApplicationMessage::new(self.config.identity.account_id.clone(), content);
        let receipt = self
            .client
            .send(&topic, &payload.to_json()?)
            .await
            .map_err(|e| LinkError::send_failure(&topic, e))?;
        let exchanged = self.registry.record_message(&connection_id)?;

        let message = Message {
            connection_id,
            from: payload.from,
            content: payload.content,
            sequence_number: receipt.sequence_number,
            timestamp: receipt.timestamp,
        };
        debug!(
            %connection_id,
            sequence_number = message.sequence_number,
            exchanged,
            "Message sent"
        );
        self.emit(LinkEvent::MessageSent {
            message: message.clone(),
        });
        Ok(message)
    }

    /// Read the newest messages on a connection topic, oldest first
    ///
    /// Works on closed connections too. Protocol envelopes are skipped and
    /// payloads without an application shape are returned verbatim from an
    /// unknown sender.
    pub async fn read(
        &self,
        connection_id: ConnectionId,
        limit: Option<usize>,
    ) -> LinkResult<Vec<Message>> {
        let topic = self
            .registry
            .require(&connection_id)?
            .connection_topic()
            .clone();
        let limit = limit.unwrap_or(self.config.relay.read_batch_size);

        let batch = self
            .client
            .read(&topic, limit)
            .await
            .map_err(|e| LinkError::read_failure(&topic, e))?;

        let messages = batch
            .into_iter()
            .filter_map(|raw| {
                let (from, content) = match TopicPayload::classify(&raw.content) {
                    TopicPayload::Protocol(_) => return None,
                    TopicPayload::Application(app) => (app.from, app.content),
                    TopicPayload::Opaque(content) => (AccountId::unknown(), content),
                };
                Some(Message {
                    connection_id,
                    from,
                    content,
                    sequence_number: raw.sequence_number,
                    timestamp: raw.timestamp,
                })
            })
            .collect();
        Ok(messages)
    }

    // ------------------------------------------------------------------------
    // Closer
    // ------------------------------------------------------------------------

    /// Notify the peer and mark the connection closed
    ///
    /// Closing a closed connection succeeds without sending anything.
    pub async fn close(
        &mut self,
        connection_id: ConnectionId,
        reason: Option<String>,
    ) -> LinkResult<()> {
        let connection = self.registry.require(&connection_id)?;
        if !connection.is_active() {
            debug!(%connection_id, "Connection already closed");
            return Ok(());
        }
        let topic = connection.connection_topic().clone();

        let notice = Envelope::connection_close(reason);
        self.client
            .send(&topic, &notice.to_json()?)
            .await
            .map_err(|e| LinkError::send_failure(&topic, e))?;
        self.registry.close(&connection_id, self.time_source.now())?;

        info!(%connection_id, "Connection closed");
        self.emit(LinkEvent::ConnectionClosed { connection_id });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle and Status
    // ------------------------------------------------------------------------

    /// Mark the handler running; returns false if it already was
    ///
    /// Only the handler task calls this, alongside spawning its poll schedule. A
    /// handler used directly stays `running = false` and is polled by its owner.
    pub(crate) fn start(&mut self) -> bool {
        let changed = self.state.start();
        if changed {
            info!(inbound = %self.config.identity.inbound_topic, "Connection handler started");
        }
        changed
    }

    /// Mark the handler stopped; returns false if it already was
    pub(crate) fn stop(&mut self) -> bool {
        let changed = self.state.stop();
        if changed {
            info!("Connection handler stopped");
        }
        changed
    }

    /// Whether a poll schedule is driving this handler
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn status(&self) -> HandlerStatus {
        HandlerStatus {
            running: self.state.is_running(),
            inbound_topic: self.config.identity.inbound_topic.clone(),
            active_connections: self.registry.get_state_counts().active,
            pending_requests: self.pending.len(),
            total_messages: self.registry.total_messages(),
        }
    }

    /// Pending requests in arrival order
    pub fn pending_requests(&self) -> impl Iterator<Item = &ConnectionRequest> {
        self.pending.iter()
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Option<&ActiveConnection> {
        self.registry.get(connection_id)
    }

    /// Every connection accepted so far, open or closed
    pub fn connections(&self) -> impl Iterator<Item = &ActiveConnection> {
        self.registry.iter()
    }

    pub fn recent_audit_entries(&self, limit: usize) -> Vec<AuditEntry> {
        self.registry.get_recent_audit_entries(limit)
    }

    pub fn dedup_stats(&self) -> &DedupStats {
        self.poller.dedup_stats()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<LinkEvent> {
        self.events.clone()
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("identity", &self.config.identity)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("connections", &self.registry.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::{
        InMemoryTopicClient, ManualTimeSource, MessageTopicClient, Operation, Timestamp,
    };

    async fn setup(auto_accept: bool) -> (InMemoryTopicClient, ConnectionHandler) {
        let client = InMemoryTopicClient::new();
        let config = LinkConfig::testing().with_auto_accept(auto_accept);
        client.register_topic(&config.identity.inbound_topic).await;
        client.register_topic(&config.identity.outbound_topic).await;
        let handler = ConnectionHandler::new(config, Arc::new(client.clone())).unwrap();
        (client, handler)
    }

    async fn post_request(client: &InMemoryTopicClient, handler: &ConnectionHandler, from: &str) {
        let envelope = Envelope::connection_request(AccountId::from(from), None, None);
        client
            .send(&handler.identity().inbound_topic, &envelope.to_json().unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = LinkConfig::testing();
        config.polling.batch_size = 0;
        let result = ConnectionHandler::new(config, Arc::new(InMemoryTopicClient::new()));
        assert!(matches!(result, Err(LinkError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_accept_publishes_ack_and_registers() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;

        let requests = handler.poll().await.unwrap();
        let connection = handler.accept(requests[0].id).await.unwrap();

        assert_eq!(connection.remote_account().as_str(), "0.0.remote");
        assert_eq!(connection.origin_sequence_number(), 1);
        assert_eq!(handler.pending_requests().count(), 0);

        let acks = client.messages(&handler.identity().outbound_topic).await;
        assert_eq!(acks.len(), 1);
        let ack = Envelope::parse(&acks[0].content).unwrap();
        match ack.operation {
            Operation::ConnectionCreated {
                connected_account_id,
                connection_topic,
                ..
            } => {
                assert_eq!(connected_account_id.as_str(), "0.0.remote");
                assert_eq!(&connection_topic, connection.connection_topic());
            }
            other => panic!("unexpected ack {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept_twice_fails() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;

        handler.accept(id).await.unwrap();
        assert!(matches!(
            handler.accept(id).await,
            Err(LinkError::RequestNotFound { .. })
        ));
        assert_eq!(handler.connections().count(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_request_pending() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;

        client.fail_next_creates(1);
        assert!(matches!(
            handler.accept(id).await,
            Err(LinkError::TopicCreateFailure { .. })
        ));
        assert_eq!(handler.status().pending_requests, 1);

        client.fail_next_sends(1);
        assert!(matches!(
            handler.accept(id).await,
            Err(LinkError::TopicSendFailure { .. })
        ));
        assert_eq!(handler.status().pending_requests, 1);

        assert!(handler.accept(id).await.is_ok());
        assert_eq!(handler.status().active_connections, 1);
    }

    #[tokio::test]
    async fn test_ack_retry_reuses_connection_topic() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;
        let topics_before = client.topic_count().await;

        for _ in 0..2 {
            client.fail_next_sends(1);
            assert!(matches!(
                handler.accept(id).await,
                Err(LinkError::TopicSendFailure { .. })
            ));
        }
        assert_eq!(client.topic_count().await, topics_before + 1);

        let connection = handler.accept(id).await.unwrap();
        assert_eq!(client.topic_count().await, topics_before + 1);
        assert!(client.messages(connection.connection_topic()).await.is_empty());
    }

    #[tokio::test]
    async fn test_direct_handler_is_polled_by_its_owner() {
        let (client, mut handler) = setup(true).await;
        post_request(&client, &handler, "0.0.remote").await;
        assert!(!handler.status().running);

        // Flipping the flag schedules nothing; only the task drives polls
        assert!(handler.start());
        assert!(!handler.start());
        let status = handler.status();
        assert!(status.running);
        assert_eq!(status.pending_requests, 0);
        assert_eq!(status.active_connections, 0);

        handler.run_poll_cycle().await.unwrap();
        assert_eq!(handler.status().active_connections, 1);
        assert!(handler.stop());
        assert!(!handler.is_running());
    }

    #[tokio::test]
    async fn test_send_counts_and_read_classifies() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;
        let connection = handler.accept(id).await.unwrap();
        let conn_id = connection.id();
        let topic = connection.connection_topic().clone();

        let sent = handler.send(conn_id, "hello").await.unwrap();
        assert_eq!(sent.from, handler.identity().account_id);

        let reply = ApplicationMessage::new(AccountId::from("0.0.remote"), "hi back");
        client.send(&topic, &reply.to_json().unwrap()).await.unwrap();
        client.send(&topic, "plain text").await.unwrap();

        let messages = handler.read(conn_id, None).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hi back", "plain text"]);
        assert!(messages[2].from.is_unknown());

        // Reads do not count toward messages exchanged
        assert_eq!(handler.connection(&conn_id).unwrap().messages_exchanged(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_counter() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;
        let conn_id = handler.accept(id).await.unwrap().id();

        client.fail_next_sends(1);
        assert!(handler.send(conn_id, "lost").await.is_err());
        assert_eq!(handler.connection(&conn_id).unwrap().messages_exchanged(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (client, mut handler) = setup(false).await;
        let clock = Arc::new(ManualTimeSource::new(Timestamp::new(1_000)));
        handler = handler.with_time_source(clock.clone());
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;
        let connection = handler.accept(id).await.unwrap();
        let conn_id = connection.id();

        clock.advance(500);
        handler.close(conn_id, Some("done".into())).await.unwrap();
        handler.close(conn_id, None).await.unwrap();

        let closed = handler.connection(&conn_id).unwrap();
        assert!(!closed.is_active());
        assert_eq!(closed.closed_at(), Some(Timestamp::new(1_500)));

        // Only one close notice went out
        let notices = client.messages(connection.connection_topic()).await;
        assert_eq!(notices.len(), 1);

        assert!(matches!(
            handler.send(conn_id, "late").await,
            Err(LinkError::ConnectionClosed { .. })
        ));
        // Reading a closed connection is still allowed
        assert!(handler.read(conn_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_send_failure_keeps_connection_active() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;
        let conn_id = handler.accept(id).await.unwrap().id();

        client.fail_next_sends(1);
        assert!(handler.close(conn_id, None).await.is_err());
        assert!(handler.connection(&conn_id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let (_client, mut handler) = setup(false).await;
        let missing = ConnectionId::generate();
        assert!(matches!(
            handler.send(missing, "x").await,
            Err(LinkError::ConnectionNotFound { .. })
        ));
        assert!(matches!(
            handler.read(missing, None).await,
            Err(LinkError::ConnectionNotFound { .. })
        ));
        assert!(matches!(
            handler.close(missing, None).await,
            Err(LinkError::ConnectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_poll_cycle_auto_accepts() {
        let (client, mut handler) = setup(true).await;
        post_request(&client, &handler, "0.0.a").await;
        post_request(&client, &handler, "0.0.b").await;

        let outcome = handler.run_poll_cycle().await.unwrap();
        assert_eq!(outcome.requests.len(), 2);
        assert_eq!(outcome.accepted.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(handler.status().pending_requests, 0);
        assert_eq!(handler.status().active_connections, 2);
    }

    #[tokio::test]
    async fn test_poll_cycle_read_failure_emits_event() {
        let (client, mut handler) = setup(true).await;
        let mut events = handler.subscribe();

        client.fail_next_reads(1);
        assert!(handler.run_poll_cycle().await.is_err());
        match events.recv().await.unwrap() {
            LinkEvent::PollFailed { topic, .. } => {
                assert_eq!(topic, handler.identity().inbound_topic)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discard_removes_pending_request() {
        let (client, mut handler) = setup(false).await;
        post_request(&client, &handler, "0.0.remote").await;
        let id = handler.poll().await.unwrap()[0].id;

        assert_eq!(handler.discard(id).unwrap().id, id);
        assert!(matches!(
            handler.accept(id).await,
            Err(LinkError::RequestNotFound { .. })
        ));
        // A discarded request is not resurfaced
        assert!(handler.poll().await.unwrap().is_empty());
    }
}
