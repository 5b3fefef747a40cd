//! Poll-until-status.
//!
//! [`poll_until_status`] re-fetches a resource on a fixed interval until its
//! status string equals a target. Every fetch is preceded by one interval of
//! waiting, the first included. During a wait, cancellation wins over the
//! deadline, and both win over issuing another fetch.
//!
//! There is no attempt limit, backoff or jitter. A fetch error ends the loop
//! immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace};

use crate::error::ProviderError;

/// An observation that may carry a status string.
pub trait Observed {
    /// The reported status, if the remote side set one.
    fn status(&self) -> Option<&str>;
}

/// Timing for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Wait before each fetch.
    pub interval: Duration,
    /// Instant after which the loop gives up.
    pub deadline: Option<Instant>,
}

impl PollOptions {
    /// Poll every `interval`, with no deadline.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Give up once `timeout` has passed from now. A timeout too far out
    /// to be represented as an instant means no deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }
}

/// Fetch repeatedly until the observed status equals `target`.
///
/// Returns the first matching observation. Fails with
/// [`ProviderError::Cancelled`] when `cancel` resolves, with
/// [`ProviderError::DeadlineExceeded`] when the deadline passes, and with the
/// fetch error itself when a fetch fails.
pub async fn poll_until_status<T, F, Fut, C>(
    mut fetch: F,
    target: &str,
    options: &PollOptions,
    cancel: C,
) -> Result<T, ProviderError>
where
    T: Observed,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let deadline = async {
        match options.deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut attempt: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                debug!(target_status = target, attempt, "poll cancelled");
                return Err(ProviderError::Cancelled(format!(
                    "stopped waiting for status {:?}",
                    target
                )));
            }
            _ = &mut deadline => {
                debug!(target_status = target, attempt, "poll deadline reached");
                return Err(ProviderError::DeadlineExceeded(format!(
                    "status {:?} not reached in time",
                    target
                )));
            }
            _ = sleep(options.interval) => {}
        }

        attempt += 1;
        let observed = fetch().await?;

        let reached = match observed.status() {
            None => {
                trace!(target_status = target, attempt, "status not yet reported");
                false
            },
            Some(current) if current != target => {
                debug!(
                    want_status = target,
                    current_status = current,
                    attempt,
                    "waiting for status"
                );
                false
            },
            Some(_) => true,
        };

        if reached {
            debug!(target_status = target, attempt, "status reached");
            return Ok(observed);
        }
    }
}
