//! Waiting for the provider to converge
//!
//! Every adapter that has to wait on an asynchronous provider operation goes
//! through [`poll_until`]: the probe is called immediately and then once per
//! interval until it reports a value, the deadline passes, or the token fires.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::provider::ProviderResult;

/// Default pause between two probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// No deadline means wait as long as the provider keeps answering
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Fires a [`CancelToken`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by pollers to stop waiting early
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token nobody can fire
    pub fn never() -> Self {
        let (_, token) = Self::pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token fires; pending forever if the handle is gone
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Call `probe` until it yields a value.
///
/// Probe errors are returned as they are; the loop never retries a failed probe.
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    cancel: &CancelToken,
    what: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<Option<T>>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                what: what.to_string(),
            });
        }

        attempts += 1;
        if let Some(value) = probe().await? {
            log::debug!("{} reached after {} probe(s)", what, attempts);
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if let Some(deadline) = config.deadline
            && elapsed + config.interval > deadline
        {
            return Err(Error::Timeout {
                what: what.to_string(),
                elapsed,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { what: what.to_string() });
            }
        }
    }
}
