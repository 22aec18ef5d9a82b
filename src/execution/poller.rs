use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

use super::clock::{Clock, Shutdown, TokioClock};
use crate::error::{SwingError, SwingResult};

/// Fixed-interval polling that can be interrupted by a shutdown.
///
/// No backoff, no jitter and no attempt limit: callers poll until their
/// check says done, an error escapes, or shutdown fires.
#[derive(Clone)]
pub struct Poller {
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
}

impl Poller {
    pub fn new(clock: Arc<dyn Clock>, shutdown: Shutdown) -> Self {
        Self { clock, shutdown }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Sleep for `interval` unless shutdown fires first
    pub async fn wait(&self, interval: Duration) -> SwingResult<()> {
        if self.shutdown.is_triggered() {
            return Err(SwingError::Cancelled);
        }

        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown.triggered() => Err(SwingError::Cancelled),
            _ = self.clock.sleep(interval) => Ok(()),
        }
    }

    /// Run `check` until it yields a value, waiting `interval` between attempts
    pub async fn poll_until<T, F, Fut>(&self, interval: Duration, mut check: F) -> SwingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SwingResult<Option<T>>>,
    {
        loop {
            if self.shutdown.is_triggered() {
                return Err(SwingError::Cancelled);
            }
            if let Some(value) = check().await? {
                return Ok(value);
            }
            self.wait(interval).await?;
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock), Shutdown::never())
    }
}
