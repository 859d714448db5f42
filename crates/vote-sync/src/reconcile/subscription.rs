//! Handle for a live change-feed listener

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Keeps a controller's change listener alive.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop listening. Calling this again has no effect.
    pub fn unsubscribe(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            debug!("Subscription cancelled");
        }
    }

    /// False once unsubscribed, replaced, or the feed closed
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Unsubscribe and wait for the listener task to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
