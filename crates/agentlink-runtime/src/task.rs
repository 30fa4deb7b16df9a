//! Handler task
//!
//! Serializes every operation on a [`ConnectionHandler`] through one command
//! channel. Handles send a command with a oneshot reply and await the answer;
//! the scheduler's polls arrive on the same channel, so a poll and an accept
//! can never interleave.

use agentlink_core::{
    ActiveConnection, ConnectionId, ConnectionRequest, LinkResult, Message, RequestId,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler::{ConnectionHandler, PollOutcome};
use crate::managers::AuditEntry;
use crate::scheduler::PollScheduler;
use crate::status::HandlerStatus;

type Reply<T> = oneshot::Sender<T>;

/// Commands accepted by the handler task
#[derive(Debug)]
pub enum HandlerCommand {
    Poll {
        reply: Reply<LinkResult<Vec<ConnectionRequest>>>,
    },
    /// Poll and, if enabled, auto-accept; sent by the scheduler
    PollCycle {
        reply: Reply<LinkResult<PollOutcome>>,
    },
    Accept {
        request_id: RequestId,
        reply: Reply<LinkResult<ActiveConnection>>,
    },
    Discard {
        request_id: RequestId,
        reply: Reply<LinkResult<ConnectionRequest>>,
    },
    Send {
        connection_id: ConnectionId,
        content: String,
        reply: Reply<LinkResult<Message>>,
    },
    Read {
        connection_id: ConnectionId,
        limit: Option<usize>,
        reply: Reply<LinkResult<Vec<Message>>>,
    },
    Close {
        connection_id: ConnectionId,
        reason: Option<String>,
        reply: Reply<LinkResult<()>>,
    },
    Start {
        reply: Reply<bool>,
    },
    Stop {
        reply: Reply<bool>,
    },
    Status {
        reply: Reply<HandlerStatus>,
    },
    PendingRequests {
        reply: Reply<Vec<ConnectionRequest>>,
    },
    Connection {
        connection_id: ConnectionId,
        reply: Reply<Option<ActiveConnection>>,
    },
    Connections {
        reply: Reply<Vec<ActiveConnection>>,
    },
    AuditEntries {
        limit: usize,
        reply: Reply<Vec<AuditEntry>>,
    },
    Shutdown,
}

/// Owns the handler and processes commands one at a time
pub struct HandlerTask {
    handler: ConnectionHandler,
    receiver: mpsc::Receiver<HandlerCommand>,
    /// Given to the scheduler so a running poll loop does not keep the channel open
    commands: mpsc::WeakSender<HandlerCommand>,
    shutdown_token: CancellationToken,
    scheduler: Option<PollScheduler>,
}

impl HandlerTask {
    pub fn new(
        handler: ConnectionHandler,
        receiver: mpsc::Receiver<HandlerCommand>,
        commands: mpsc::WeakSender<HandlerCommand>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            handler,
            receiver,
            commands,
            shutdown_token,
            scheduler: None,
        }
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(
            inbound = %self.handler.identity().inbound_topic,
            "Handler task starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    debug!("Shutdown token cancelled");
                    break;
                }
                command = self.receiver.recv() => match command {
                    Some(HandlerCommand::Shutdown) | None => break,
                    Some(command) => self.dispatch(command).await,
                },
            }
        }

        self.stop_schedule();
        info!("Handler task stopped");
    }

    async fn dispatch(&mut self, command: HandlerCommand) {
        // A dropped reply receiver means the caller gave up; nothing to do
        match command {
            HandlerCommand::Poll { reply } => {
                let _ = reply.send(self.handler.poll().await);
            }
            HandlerCommand::PollCycle { reply } => {
                let _ = reply.send(self.handler.run_poll_cycle().await);
            }
            HandlerCommand::Accept { request_id, reply } => {
                let _ = reply.send(self.handler.accept(request_id).await);
            }
            HandlerCommand::Discard { request_id, reply } => {
                let _ = reply.send(self.handler.discard(request_id));
            }
            HandlerCommand::Send {
                connection_id,
                content,
                reply,
            } => {
                let _ = reply.send(self.handler.send(connection_id, content).await);
            }
            HandlerCommand::Read {
                connection_id,
                limit,
                reply,
            } => {
                let _ = reply.send(self.handler.read(connection_id, limit).await);
            }
            HandlerCommand::Close {
                connection_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handler.close(connection_id, reason).await);
            }
            HandlerCommand::Start { reply } => {
                let _ = reply.send(self.start_schedule());
            }
            HandlerCommand::Stop { reply } => {
                let _ = reply.send(self.stop_schedule());
            }
            HandlerCommand::Status { reply } => {
                let _ = reply.send(self.handler.status());
            }
            HandlerCommand::PendingRequests { reply } => {
                let _ = reply.send(self.handler.pending_requests().cloned().collect());
            }
            HandlerCommand::Connection {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.handler.connection(&connection_id).cloned());
            }
            HandlerCommand::Connections { reply } => {
                let _ = reply.send(self.handler.connections().cloned().collect());
            }
            HandlerCommand::AuditEntries { limit, reply } => {
                let _ = reply.send(self.handler.recent_audit_entries(limit));
            }
            HandlerCommand::Shutdown => {}
        }
    }

    fn start_schedule(&mut self) -> bool {
        if !self.handler.start() {
            return false;
        }
        let interval = self.handler.config().polling.interval();
        self.scheduler = Some(PollScheduler::spawn(
            interval,
            self.commands.clone(),
            &self.shutdown_token,
        ));
        true
    }

    fn stop_schedule(&mut self) -> bool {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }
        self.handler.stop()
    }
}
