//! Handler builder and handle
//!
//! [`HandlerBuilder`] assembles a [`ConnectionHandler`] and either returns it for
//! direct use or spawns it as a [`HandlerTask`] behind a cloneable
//! [`HandlerHandle`].

use std::sync::Arc;
use std::time::Duration;

use agentlink_core::{
    ActiveConnection, AgentIdentity, ConnectionId, ConnectionRequest, InMemoryTopicClient,
    LinkConfig, LinkError, LinkEvent, LinkResult, Message, RequestId, SharedTopicClient,
    TimeSource,
};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handler::{ConnectionHandler, PollOutcome};
use crate::managers::AuditEntry;
use crate::status::HandlerStatus;
use crate::task::{HandlerCommand, HandlerTask};

/// How long `shutdown` waits for the task to drain
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Handler Builder
// ----------------------------------------------------------------------------

/// Builder for connection handlers
pub struct HandlerBuilder {
    config: LinkConfig,
    client: Option<SharedTopicClient>,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl HandlerBuilder {
    /// Create a new builder for an agent identity
    pub fn new(identity: AgentIdentity) -> Self {
        Self {
            config: LinkConfig::new(identity),
            client: None,
            time_source: None,
        }
    }

    /// Set the full configuration, including identity
    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the topic client the handler talks to
    pub fn with_client(mut self, client: SharedTopicClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the clock for connection timestamps
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Build the handler for direct, single-owner use
    ///
    /// No poll schedule runs for a handler built this way; the owner calls
    /// `poll` or `run_poll_cycle` itself. Use [`spawn`](Self::spawn) for the
    /// interval-driven loop.
    pub fn build(self) -> LinkResult<ConnectionHandler> {
        let client = self
            .client
            .ok_or_else(|| LinkError::config_error("No topic client configured"))?;
        let handler = ConnectionHandler::new(self.config, client)?;
        Ok(match self.time_source {
            Some(time_source) => handler.with_time_source(time_source),
            None => handler,
        })
    }

    /// Spawn the handler task without starting the poll loop
    pub fn spawn(self) -> LinkResult<HandlerHandle> {
        let command_buffer_size = self.config.channels.command_buffer_size;
        let handler = self.build()?;

        let (commands, receiver) = mpsc::channel(command_buffer_size);
        let events = handler.event_sender();
        let inbound = handler.identity().inbound_topic.clone();
        let shutdown_token = CancellationToken::new();

        let task = HandlerTask::new(
            handler,
            receiver,
            commands.downgrade(),
            shutdown_token.clone(),
        );
        let join = tokio::spawn(task.run());

        info!(%inbound, "Connection handler spawned");

        Ok(HandlerHandle {
            commands,
            events,
            shutdown_token,
            task: Arc::new(Mutex::new(Some(join))),
        })
    }

    /// Spawn the handler task and start the poll loop
    pub async fn build_and_start(self) -> LinkResult<HandlerHandle> {
        let handle = self.spawn()?;
        handle.start().await?;
        Ok(handle)
    }
}

// ----------------------------------------------------------------------------
// Handler Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a running handler task
#[derive(Clone)]
pub struct HandlerHandle {
    commands: mpsc::Sender<HandlerCommand>,
    events: broadcast::Sender<LinkEvent>,
    shutdown_token: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HandlerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HandlerCommand,
    ) -> LinkResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| LinkError::channel_error("Handler task is not running"))?;
        response
            .await
            .map_err(|_| LinkError::channel_error("Handler task dropped the reply"))
    }

    /// Poll the inbound topic once
    pub async fn poll(&self) -> LinkResult<Vec<ConnectionRequest>> {
        self.request(|reply| HandlerCommand::Poll { reply }).await?
    }

    /// Run one poll cycle, auto-accepting if configured
    pub async fn poll_cycle(&self) -> LinkResult<PollOutcome> {
        self.request(|reply| HandlerCommand::PollCycle { reply })
            .await?
    }

    pub async fn accept(&self, request_id: RequestId) -> LinkResult<ActiveConnection> {
        self.request(|reply| HandlerCommand::Accept { request_id, reply })
            .await?
    }

    pub async fn discard(&self, request_id: RequestId) -> LinkResult<ConnectionRequest> {
        self.request(|reply| HandlerCommand::Discard { request_id, reply })
            .await?
    }

    pub async fn send(
        &self,
        connection_id: ConnectionId,
        content: impl Into<String>,
    ) -> LinkResult<Message> {
        let content = content.into();
        self.request(|reply| HandlerCommand::Send {
            connection_id,
            content,
            reply,
        })
        .await?
    }

    pub async fn read(
        &self,
        connection_id: ConnectionId,
        limit: Option<usize>,
    ) -> LinkResult<Vec<Message>> {
        self.request(|reply| HandlerCommand::Read {
            connection_id,
            limit,
            reply,
        })
        .await?
    }

    pub async fn close(&self, connection_id: ConnectionId, reason: Option<String>) -> LinkResult<()> {
        self.request(|reply| HandlerCommand::Close {
            connection_id,
            reason,
            reply,
        })
        .await?
    }

    /// Start the poll loop; `false` if it was already running
    pub async fn start(&self) -> LinkResult<bool> {
        self.request(|reply| HandlerCommand::Start { reply }).await
    }

    /// Stop the poll loop; `false` if it was not running
    pub async fn stop(&self) -> LinkResult<bool> {
        self.request(|reply| HandlerCommand::Stop { reply }).await
    }

    pub async fn status(&self) -> LinkResult<HandlerStatus> {
        self.request(|reply| HandlerCommand::Status { reply }).await
    }

    pub async fn pending_requests(&self) -> LinkResult<Vec<ConnectionRequest>> {
        self.request(|reply| HandlerCommand::PendingRequests { reply })
            .await
    }

    pub async fn connection(&self, connection_id: ConnectionId) -> LinkResult<Option<ActiveConnection>> {
        self.request(|reply| HandlerCommand::Connection {
            connection_id,
            reply,
        })
        .await
    }

    pub async fn connections(&self) -> LinkResult<Vec<ActiveConnection>> {
        self.request(|reply| HandlerCommand::Connections { reply })
            .await
    }

    pub async fn recent_audit_entries(&self, limit: usize) -> LinkResult<Vec<AuditEntry>> {
        self.request(|reply| HandlerCommand::AuditEntries { limit, reply })
            .await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Whether the handler task is still accepting commands
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Stop the poll loop and the task, waiting for it to finish
    pub async fn shutdown(&self) -> LinkResult<()> {
        info!("Shutting down connection handler");

        if self.commands.send(HandlerCommand::Shutdown).await.is_err() {
            // Task already gone; make sure a stuck loop notices too
            self.shutdown_token.cancel();
        }

        let join = self.task.lock().await.take();
        if let Some(join) = join {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(LinkError::channel_error(format!(
                        "Handler task panicked: {}",
                        e
                    )))
                }
                Err(_) => {
                    warn!("Handler task did not stop in time; cancelling");
                    self.shutdown_token.cancel();
                    return Err(LinkError::channel_error(format!(
                        "Handler task did not stop within {:?}",
                        SHUTDOWN_TIMEOUT
                    )));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerHandle")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Spawn a handler with test configuration against an in-memory substrate
///
/// The identity's inbound and outbound topics are registered on `client`. The
/// poll loop is not started.
pub async fn create_test_handler(client: &InMemoryTopicClient) -> LinkResult<HandlerHandle> {
    create_test_handler_with_config(client, LinkConfig::testing()).await
}

/// Like [`create_test_handler`] with a custom configuration
pub async fn create_test_handler_with_config(
    client: &InMemoryTopicClient,
    config: LinkConfig,
) -> LinkResult<HandlerHandle> {
    client.register_topic(&config.identity.inbound_topic).await;
    client.register_topic(&config.identity.outbound_topic).await;
    HandlerBuilder::new(config.identity.clone())
        .with_config(config)
        .with_client(Arc::new(client.clone()))
        .spawn()
}
