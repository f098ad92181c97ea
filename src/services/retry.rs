//! Rate-limit aware retry controller.
//!
//! Each target moves `Pending -> InFlight -> {Succeeded, RateLimitedWait(n), Abandoned}`.
//! The decision for every outcome is made by [`RetryPolicy::decide`], a pure
//! function of the outcome and the attempt counters.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::{FailureReason, RetryConfig};
use crate::services::transport::{FetchOutcome, Transport};

/// Retry bounds and delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub backoff_base: Duration,
    pub max_transient_retries: u32,
    pub transient_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_rate_limit_retries: config.max_rate_limit_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_transient_retries: config.max_transient_retries,
            transient_delay: Duration::from_millis(config.transient_delay_ms),
        }
    }

    /// Delay before rate-limit retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Decide what to do with `outcome`, given how many rate-limit and
    /// transient retries were already spent on this target.
    pub fn decide(
        &self,
        outcome: FetchOutcome,
        rate_limited: u32,
        transient: u32,
    ) -> RetryDecision {
        let attempts = rate_limited + transient + 1;
        match outcome {
            FetchOutcome::Success(body) => RetryDecision::Accept(Fetched::Body(body)),
            FetchOutcome::Empty => RetryDecision::Accept(Fetched::Empty),
            FetchOutcome::RateLimited if rate_limited < self.max_rate_limit_retries => {
                RetryDecision::Retry {
                    delay: self.backoff(rate_limited),
                    rate_limited: true,
                }
            }
            FetchOutcome::RateLimited => {
                RetryDecision::Abandon(FailureReason::RateLimited { attempts })
            }
            FetchOutcome::Unauthorized => RetryDecision::Abandon(FailureReason::Unauthorized),
            FetchOutcome::TransientError(_) if transient < self.max_transient_retries => {
                RetryDecision::Retry {
                    delay: self.transient_delay,
                    rate_limited: false,
                }
            }
            FetchOutcome::TransientError(cause) => {
                RetryDecision::Abandon(FailureReason::Transient { attempts, cause })
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Body handed upstream on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Body(Vec<u8>),
    /// Terminal for this target
    Empty,
}

/// What the policy wants done next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Accept(Fetched),
    Retry { delay: Duration, rate_limited: bool },
    Abandon(FailureReason),
}

/// Lifecycle of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    InFlight,
    RateLimitedWait(u32),
    Succeeded,
    Abandoned,
    /// Run cancelled while waiting to retry; not a failure
    Cancelled,
}

/// Terminal result of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResult {
    Done(Fetched),
    Abandoned(FailureReason),
    Cancelled,
}

/// Result plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub result: TargetResult,
    pub attempts: u32,
    /// Delays slept before each retry, in order
    pub delays: Vec<Duration>,
    pub state: FetchState,
}

/// Wraps a transport with the retry policy.
pub struct RetryController {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryController {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            transport,
            policy,
            cancel,
        }
    }

    /// Fetch `url`, retrying the identical request as the policy allows.
    pub async fn fetch(&self, target: &str, url: &str) -> FetchReport {
        let mut state = FetchState::Pending;
        let mut rate_limited = 0u32;
        let mut transient = 0u32;
        let mut delays = Vec::new();

        loop {
            debug_assert!(matches!(
                state,
                FetchState::Pending | FetchState::RateLimitedWait(_) | FetchState::InFlight
            ));
            state = FetchState::InFlight;
            let outcome = self.transport.fetch(url).await;
            if let FetchOutcome::TransientError(cause) = &outcome {
                log::debug!("Transient error for {}: {}", target, cause);
            }

            match self.policy.decide(outcome, rate_limited, transient) {
                RetryDecision::Accept(fetched) => {
                    return FetchReport {
                        result: TargetResult::Done(fetched),
                        attempts: rate_limited + transient + 1,
                        delays,
                        state: FetchState::Succeeded,
                    };
                }
                RetryDecision::Abandon(reason) => {
                    log::warn!("Abandoning {}: {}", target, reason);
                    return FetchReport {
                        result: TargetResult::Abandoned(reason),
                        attempts: rate_limited + transient + 1,
                        delays,
                        state: FetchState::Abandoned,
                    };
                }
                RetryDecision::Retry {
                    delay,
                    rate_limited: was_rate_limited,
                } => {
                    if was_rate_limited {
                        rate_limited += 1;
                        state = FetchState::RateLimitedWait(rate_limited);
                        log::info!(
                            "Rate limited on {} (retry {}/{}), waiting {:?}",
                            target,
                            rate_limited,
                            self.policy.max_rate_limit_retries,
                            delay
                        );
                    } else {
                        transient += 1;
                    }
                    delays.push(delay);

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            log::debug!("Cancelled while waiting to retry {}", target);
                            return FetchReport {
                                result: TargetResult::Cancelled,
                                attempts: rate_limited + transient,
                                delays,
                                state: FetchState::Cancelled,
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if let FetchState::RateLimitedWait(_) = state {
                        log::debug!("Retrying {} after backoff", target);
                    }
                }
            }
        }
    }
}
