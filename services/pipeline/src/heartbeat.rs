//! Liveness beats emitted while a long task runs.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running heartbeat task.
pub struct Heartbeat {
    token: CancellationToken,
    handle: JoinHandle<u64>,
}

impl Heartbeat {
    /// Spawn a task that beats every `period` until stopped.
    pub fn spawn(task: &str, period: Duration) -> Self {
        let token = CancellationToken::new();
        let child = token.child_token();
        let task = task.to_string();

        let handle = tokio::spawn(async move {
            info!(task = %task, interval_secs = period.as_secs_f64(), "Heartbeat started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            let mut beats = 0u64;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        beats += 1;
                        debug!(task = %task, beats, "Heartbeat");
                    }
                }
            }
            info!(task = %task, beats, "Heartbeat stopped");
            beats
        });

        Self { token, handle }
    }

    /// Cancel the task and wait for it. Returns the number of beats sent.
    pub async fn stop(self) -> u64 {
        self.token.cancel();
        match self.handle.await {
            Ok(beats) => beats,
            Err(e) => {
                warn!(error = %e, "Heartbeat task ended abnormally");
                0
            }
        }
    }
}
