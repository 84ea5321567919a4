//! The speculative request policy and its self-rescheduling chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use quill_sched::Lane;
use tracing::{trace, warn};

/// Error constructing a [`SpeculativePolicy`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// `max_timeout_ms × backoff_multiplier` would overflow, so the grown
    /// delay could wrap instead of saturating at the cap.
    #[error("max timeout {max_timeout_ms}ms with multiplier {multiplier} would overflow")]
    TimeoutOverflow {
        /// The rejected maximum timeout.
        max_timeout_ms: u32,
        /// The rejected multiplier.
        multiplier: u32,
    },

    /// The multiplier must be at least 1.
    #[error("backoff multiplier must be at least 1")]
    ZeroMultiplier,
}

/// Error surfaced by a failed speculative request.
#[derive(Debug, thiserror::Error)]
#[error("speculative request failed: {0}")]
pub struct RequestError(pub String);

/// Issues the actual hedge requests for one pending operation.
#[async_trait::async_trait]
pub trait SpeculativeRequestExecutor: Send + Sync + 'static {
    /// Issue one hedge request. Resolves `true` to keep hedging, `false`
    /// once a response has satisfied the caller.
    async fn issue_speculative_request(&self) -> Result<bool, RequestError>;
}

/// Retry/hedging policy with exponentially growing, capped delays.
///
/// Construction validates that the cap times the multiplier fits the
/// timeout width, so delay growth can never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeculativePolicy {
    first_timeout_ms: u32,
    max_timeout_ms: u32,
    backoff_multiplier: u32,
}

impl SpeculativePolicy {
    /// Create a policy. Fails when `backoff_multiplier` is zero or when
    /// `max_timeout_ms × backoff_multiplier` overflows.
    pub fn new(
        first_timeout_ms: u32,
        max_timeout_ms: u32,
        backoff_multiplier: u32,
    ) -> Result<Self, PolicyError> {
        if backoff_multiplier == 0 {
            return Err(PolicyError::ZeroMultiplier);
        }
        if max_timeout_ms > u32::MAX / backoff_multiplier {
            return Err(PolicyError::TimeoutOverflow {
                max_timeout_ms,
                multiplier: backoff_multiplier,
            });
        }
        Ok(Self {
            first_timeout_ms,
            max_timeout_ms,
            backoff_multiplier,
        })
    }

    /// Delay before the first hedge request.
    pub fn first_timeout_ms(&self) -> u32 {
        self.first_timeout_ms
    }

    /// Hard ceiling on any hedge delay.
    pub fn max_timeout_ms(&self) -> u32 {
        self.max_timeout_ms
    }

    /// Per-round delay growth factor.
    pub fn backoff_multiplier(&self) -> u32 {
        self.backoff_multiplier
    }

    /// The delay following `current_ms`: grown by the multiplier, capped
    /// at the maximum.
    pub(crate) fn next_timeout_ms(&self, current_ms: u32) -> u32 {
        self.max_timeout_ms
            .min(current_ms.saturating_mul(self.backoff_multiplier))
    }

    /// Start a hedge chain: the first request fires `first_timeout_ms`
    /// from now on `scheduler`, and each satisfied (`true`) completion
    /// reschedules with the grown delay. A `false`, a request failure, or
    /// a scheduler rejection terminates the chain; nothing holds on to the
    /// executor afterwards.
    pub fn initiate(&self, scheduler: &Arc<Lane>, executor: Arc<dyn SpeculativeRequestExecutor>) {
        schedule_speculative_request(scheduler.clone(), executor, *self, self.first_timeout_ms);
    }
}

fn schedule_speculative_request(
    scheduler: Arc<Lane>,
    executor: Arc<dyn SpeculativeRequestExecutor>,
    policy: SpeculativePolicy,
    timeout_ms: u32,
) {
    // Boxed so the chain's future type does not contain itself.
    let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin({
        let scheduler = scheduler.clone();
        async move {
            match executor.issue_speculative_request().await {
                Ok(true) => {
                    let next = policy.next_timeout_ms(timeout_ms);
                    schedule_speculative_request(scheduler, executor, policy, next);
                }
                Ok(false) => {
                    trace!(timeout_ms, "stopped issuing speculative requests");
                }
                Err(e) => {
                    warn!(%e, timeout_ms, "failed to issue speculative request");
                }
            }
        }
    });

    if let Err(e) = scheduler.schedule(Duration::from_millis(u64::from(timeout_ms)), task) {
        warn!(%e, timeout_ms, "failed to schedule speculative request");
    }
}
