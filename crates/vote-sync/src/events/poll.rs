//! Polling change feed
//!
//! Stores reached over plain HTTP have no push channel. A `PollingFeed`
//! stands in for one by publishing a [`ChangeNotice::Poll`] every interval,
//! which makes subscribed controllers re-fetch.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bus::ChangeBus;
use super::types::ChangeNotice;

/// Background task emitting periodic poll notices
pub struct PollingFeed {
    bus: ChangeBus,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl PollingFeed {
    /// Start polling. The first notice fires one `interval` after start.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(interval: Duration) -> Self {
        let bus = ChangeBus::new();
        let token = CancellationToken::new();

        let task_bus = bus.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; the startup fetch covers that
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        task_bus.publish(ChangeNotice::poll());
                    }
                }
            }
            debug!("Polling feed stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "Polling feed started");
        Self {
            bus,
            token,
            handle: Some(handle),
            interval,
        }
    }

    /// Subscribe to poll notices
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.bus.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop emitting notices. Safe to call more than once.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop and wait for the background task to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollingFeed {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
