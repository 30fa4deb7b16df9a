//! Poll scheduler
//!
//! Ticks at the configured interval and asks the handler task for one poll cycle
//! per tick. The next tick is not awaited until the previous cycle has replied,
//! so polls never overlap; ticks missed during a slow poll are delayed rather
//! than bunched up.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::task::HandlerCommand;

/// A running poll loop
#[derive(Debug)]
pub struct PollScheduler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollScheduler {
    /// Spawn the loop; it also ends when `parent` is cancelled
    pub fn spawn(
        interval: Duration,
        commands: mpsc::WeakSender<HandlerCommand>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let handle = tokio::spawn(run_schedule(interval, commands, token.clone()));
        Self { token, handle }
    }

    /// Stop scheduling new polls; a cycle already in flight still completes
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_schedule(
    interval: Duration,
    commands: mpsc::WeakSender<HandlerCommand>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(sender) = commands.upgrade() else {
            break;
        };
        let (reply, outcome) = oneshot::channel();
        if sender.send(HandlerCommand::PollCycle { reply }).await.is_err() {
            break;
        }
        drop(sender);

        match outcome.await {
            Ok(Ok(outcome)) => debug!(
                found = outcome.requests.len(),
                accepted = outcome.accepted.len(),
                failed = outcome.failures.len(),
                "Poll cycle complete"
            ),
            // Already logged by the handler; the next tick retries
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Handler task dropped poll cycle reply");
                break;
            }
        }
    }

    debug!("Poll scheduler exited");
}
