//! Command handlers for the AgentLink CLI

use std::time::Duration;

use agentlink_core::LinkEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::AgentLinkApp;
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Demo { peers, messages } => {
                let app = AgentLinkApp::new(config).await?;
                let result = Self::handle_demo_command(&app, peers, messages).await;
                app.shutdown().await?;
                result
            }
            Commands::Watch {
                duration_secs,
                peer_interval_ms,
            } => {
                let app = AgentLinkApp::new(config).await?;
                let result = Self::handle_watch_command(
                    &app,
                    Duration::from_secs(duration_secs),
                    Duration::from_millis(peer_interval_ms),
                )
                .await;
                app.shutdown().await?;
                result
            }
            Commands::Config => Self::handle_config_command(&config),
        }
    }

    /// Poll, accept, exchange messages with and close every simulated peer
    pub async fn handle_demo_command(
        app: &AgentLinkApp,
        peers: usize,
        messages: usize,
    ) -> Result<()> {
        let handle = app.handle();

        for n in 1..=peers {
            app.simulate_request(n, "requesting a connection").await?;
        }

        let requests = handle.poll().await?;
        println!("Polled {} connection request(s)", requests.len());

        let mut connections = Vec::with_capacity(requests.len());
        for request in &requests {
            let connection = handle.accept(request.id).await?;
            println!(
                "Accepted {} on topic {}",
                connection.remote_account(),
                connection.connection_topic()
            );
            connections.push(connection);
        }

        for connection in &connections {
            let peer = connection.remote_account();
            let topic = connection.connection_topic();
            for i in 1..=messages {
                handle
                    .send(connection.id(), format!("message {} for {}", i, peer))
                    .await?;
                app.peer_reply(peer, topic, &format!("ack {}", i)).await?;
            }

            for message in handle.read(connection.id(), None).await? {
                println!(
                    "  [{}] #{} {}: {}",
                    topic, message.sequence_number, message.from, message.content
                );
            }
            handle
                .close(connection.id(), Some("demo finished".to_string()))
                .await?;
            println!("Closed connection with {}", peer);
        }

        let status = handle.status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok(())
    }

    /// Run the scheduled poll loop while peers keep arriving, printing events
    pub async fn handle_watch_command(
        app: &AgentLinkApp,
        duration: Duration,
        peer_interval: Duration,
    ) -> Result<()> {
        let handle = app.handle();
        let mut events = handle.subscribe();
        handle.start().await?;
        info!(?duration, "Watching for connection requests");

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut arrivals = tokio::time::interval(peer_interval);
        let mut next_peer = 1;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = arrivals.tick() => {
                    app.simulate_request(next_peer, "watch mode").await?;
                    next_peer += 1;
                }
                event = events.recv() => match event {
                    Ok(event) => Self::print_event(&event),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        handle.stop().await?;
        let status = handle.status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok(())
    }

    /// Print the effective configuration
    pub fn handle_config_command(config: &AppConfig) -> Result<()> {
        config.validate()?;
        print!("{}", config.to_toml_string()?);
        Ok(())
    }

    fn print_event(event: &LinkEvent) {
        match event {
            LinkEvent::RequestReceived { request } => {
                println!("request   {} (seq {})", request.from_account, request.sequence_number)
            }
            LinkEvent::ConnectionEstablished { connection } => println!(
                "connected {} on {}",
                connection.remote_account(),
                connection.connection_topic()
            ),
            LinkEvent::MessageSent { message } => {
                println!("sent      {} on {}", message.content, message.connection_id)
            }
            LinkEvent::ConnectionClosed { connection_id } => {
                println!("closed    {}", connection_id)
            }
            LinkEvent::PollFailed { topic, reason } => {
                println!("poll of {} failed: {}", topic, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_leaves_everything_closed() {
        let app = AgentLinkApp::new(AppConfig::default()).await.unwrap();
        CommandDispatcher::handle_demo_command(&app, 3, 2)
            .await
            .unwrap();

        let status = app.handle().status().await.unwrap();
        assert_eq!(status.active_connections, 0);
        assert_eq!(status.pending_requests, 0);
        assert_eq!(status.total_messages, 6);
        assert_eq!(app.handle().connections().await.unwrap().len(), 3);

        app.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_accepts_arriving_peers() {
        let mut config = AppConfig::default();
        config.link.polling.interval_ms = 100;
        let app = AgentLinkApp::new(config).await.unwrap();

        CommandDispatcher::handle_watch_command(
            &app,
            Duration::from_millis(1_000),
            Duration::from_millis(300),
        )
        .await
        .unwrap();

        let status = app.handle().status().await.unwrap();
        assert!(!status.running);
        assert!(status.active_connections >= 3);

        app.shutdown().await.unwrap();
    }
}
