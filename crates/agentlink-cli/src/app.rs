//! Core application logic for the AgentLink CLI
//!
//! Wires a connection handler to an in-memory topic substrate and plays the
//! remote peers on the same substrate.

use std::sync::Arc;

use agentlink_core::{
    AccountId, ApplicationMessage, Envelope, InMemoryTopicClient, MessageTopicClient, Operation,
    TopicId,
};
use agentlink_runtime::{HandlerBuilder, HandlerHandle};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::Result;

/// Main application state
pub struct AgentLinkApp {
    config: AppConfig,
    client: InMemoryTopicClient,
    handle: HandlerHandle,
}

impl AgentLinkApp {
    /// Create the substrate and spawn the handler task
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let client = InMemoryTopicClient::new();
        let identity = &config.link.identity;
        client.register_topic(&identity.inbound_topic).await;
        client.register_topic(&identity.outbound_topic).await;

        let handle = HandlerBuilder::new(identity.clone())
            .with_config(config.link.clone())
            .with_client(Arc::new(client.clone()))
            .spawn()?;

        info!(account = %identity.account_id, inbound = %identity.inbound_topic, "AgentLink application ready");
        Ok(Self {
            config,
            client,
            handle,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn handle(&self) -> &HandlerHandle {
        &self.handle
    }

    pub fn client(&self) -> &InMemoryTopicClient {
        &self.client
    }

    /// Post a connection request as simulated peer `n`
    pub async fn simulate_request(&self, n: usize, note: &str) -> Result<AccountId> {
        let account = self.config.peers.peer_account(n);
        let peer_inbox = TopicId::new(format!("{}.inbox", account));
        let envelope = Envelope::connection_request(
            account.clone(),
            Some(peer_inbox),
            Some(note.to_string()),
        );
        let receipt = self
            .client
            .send(&self.config.link.identity.inbound_topic, &envelope.to_json()?)
            .await?;
        debug!(peer = %account, sequence_number = receipt.sequence_number, "Simulated peer posted request");
        Ok(account)
    }

    /// Find the connection topic announced to `peer` on the outbound topic
    pub async fn announced_topic(&self, peer: &AccountId) -> Option<TopicId> {
        let acks = self
            .client
            .messages(&self.config.link.identity.outbound_topic)
            .await;
        acks.iter()
            .rev()
            .filter_map(|ack| Envelope::parse(&ack.content))
            .find_map(|envelope| match envelope.operation {
                Operation::ConnectionCreated {
                    connected_account_id,
                    connection_topic,
                    ..
                } if &connected_account_id == peer => Some(connection_topic),
                _ => None,
            })
    }

    /// Publish an application message as `peer` on a connection topic
    pub async fn peer_reply(&self, peer: &AccountId, topic: &TopicId, content: &str) -> Result<()> {
        if !self.config.peers.echo_replies {
            return Ok(());
        }
        let message = ApplicationMessage::new(peer.clone(), content);
        self.client.send(topic, &message.to_json()?).await?;
        Ok(())
    }

    /// Stop the handler task
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await?;
        Ok(())
    }
}
