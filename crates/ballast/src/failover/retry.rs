//! At-most-one retry with structured escalation on exhaustion.
//!
//! The policy is deliberately blunt: transient failures (rate limit, timeout,
//! 5xx, network) get exactly one retry; permanent failures none; anything
//! unclassifiable is treated as non-retriable so a misbehaving provider can
//! never put the loop into a retry storm. When retries are exhausted, the
//! caller's escalation hook fires once and the original failure is surfaced
//! unchanged.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use crate::failover::escalation::{EscalationContext, EscalationInfo, escalate};
use crate::failover::taxonomy::{CallFailure, ErrorCategory, categorize};

/// Maximum retries after the initial attempt.
pub const MAX_RETRIES: u32 = 1;

/// Outcome of a retry decision.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub category: ErrorCategory,
    pub reason: String,
}

/// Decide whether a failed attempt should be retried.
pub fn decide(failure: &CallFailure, retry_count: u32) -> RetryDecision {
    let category = categorize(failure);
    if retry_count >= MAX_RETRIES {
        return RetryDecision {
            should_retry: false,
            category,
            reason: "Max retries exhausted".into(),
        };
    }
    if category.is_transient() {
        return RetryDecision {
            should_retry: true,
            category,
            reason: format!("{category} is transient"),
        };
    }
    RetryDecision {
        should_retry: false,
        category,
        reason: format!("{category} is not retriable"),
    }
}

/// Future type returned by retry hooks.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Observer hooks fired around retry and escalation. All methods default to
/// no-ops; implement only what you need.
pub trait RetryHooks: Send + Sync {
    /// Fired (and awaited) before the retry attempt begins.
    fn on_retry(&self, _decision: &RetryDecision, _attempt: u32) -> HookFuture<'_> {
        Box::pin(async {})
    }

    /// Fired (and awaited) once when retries are exhausted or the failure is
    /// not retriable, before the original failure is returned.
    fn on_escalation(&self, _info: &EscalationInfo) -> HookFuture<'_> {
        Box::pin(async {})
    }
}

/// Hooks that do nothing. Useful for tests and fire-and-forget callers.
pub struct NoopHooks;

impl RetryHooks for NoopHooks {}

/// Backoff schedule applied before a retry attempt.
///
/// Off by default: the single retry usually wants to go out immediately and
/// let the provider's own pacing apply. Enable for providers that punish
/// instant re-sends.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Deterministic jitter keyed on the attempt number, so tests stay
    /// reproducible without pulling randomness into the schedule.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Options for [`execute_with_retry`].
#[derive(Clone, Debug)]
pub struct RetryOptions {
    pub provider: String,
    pub model: String,
    /// Optional delay schedule applied before the retry attempt.
    pub backoff: Option<BackoffConfig>,
}

impl RetryOptions {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            backoff: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// Run a provider call with the at-most-one-retry policy.
///
/// `run` is invoked with the current attempt number (0, then 1). On success
/// the result is returned immediately and no hook fires. On failure the
/// decision is computed; a retriable failure fires `on_retry` (awaited) and
/// loops, anything else builds an [`EscalationInfo`], fires `on_escalation`
/// (awaited), and returns the original failure.
pub async fn execute_with_retry<T, F, Fut>(
    mut run: F,
    options: &RetryOptions,
    hooks: &dyn RetryHooks,
) -> Result<T, CallFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallFailure>>,
{
    let mut ctx = EscalationContext::new(options.provider.clone(), options.model.clone());
    let mut attempt = 0u32;

    loop {
        match run(attempt).await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                let decision = decide(&failure, attempt);
                if decision.should_retry {
                    debug!(
                        provider = options.provider,
                        model = options.model,
                        category = decision.category.as_str(),
                        attempt,
                        "retrying provider call"
                    );
                    hooks.on_retry(&decision, attempt).await;
                    if let Some(backoff) = &options.backoff {
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    }
                    attempt += 1;
                    ctx.retry_count = attempt;
                    continue;
                }

                let info = escalate(&failure, &ctx);
                warn!(
                    provider = options.provider,
                    model = options.model,
                    category = decision.category.as_str(),
                    reason = decision.reason,
                    "provider call escalated"
                );
                hooks.on_escalation(&info).await;
                return Err(failure);
            }
        }
    }
}
