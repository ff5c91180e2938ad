// Convergence Poller
// Single retry-until-condition primitive shared by descriptor retries,
// Kubernetes readiness/endpoint checks, hypervisor task polling and
// child task aggregation.

use crate::application::cancel::CancelToken;
use crate::config::PollSettings;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Condition reached; stop polling
    Converged(T),
    /// Not yet; poll again after the interval
    Pending(T),
    /// Unrecoverable; stop polling without converging
    Abort(T),
}

/// Final result of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T> {
    Converged { value: T, attempts: u32 },
    Aborted { value: T, attempts: u32 },
    TimedOut { last: Option<T>, attempts: u32 },
    Cancelled { last: Option<T>, attempts: u32 },
}

impl<T> PollResult<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollResult::Converged { attempts, .. }
            | PollResult::Aborted { attempts, .. }
            | PollResult::TimedOut { attempts, .. }
            | PollResult::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, PollResult::Converged { .. })
    }
}

/// Fixed-interval polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn from_secs(max_attempts: u32, interval_secs: u64) -> Self {
        Self::new(max_attempts, Duration::from_secs(interval_secs))
    }
}

impl From<PollSettings> for PollPolicy {
    fn from(settings: PollSettings) -> Self {
        Self::from_secs(settings.max_attempts, settings.interval_secs)
    }
}

/// Sleep for `interval`, returning false if cancellation arrived first
pub async fn sleep_or_cancel(interval: Duration, cancel: &CancelToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    let mut cancel = cancel.clone();
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Run `check` until it converges, aborts, exhausts `policy.max_attempts`, or is cancelled
///
/// `check` receives the 1-based attempt number. Cancellation is checked before
/// every attempt and during every sleep; an in-flight check is never interrupted.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, cancel: &CancelToken, mut check: F) -> PollResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return PollResult::Cancelled {
                last,
                attempts: attempt - 1,
            };
        }

        match check(attempt).await {
            PollStep::Converged(value) => {
                return PollResult::Converged {
                    value,
                    attempts: attempt,
                }
            }
            PollStep::Abort(value) => {
                return PollResult::Aborted {
                    value,
                    attempts: attempt,
                }
            }
            PollStep::Pending(value) => last = Some(value),
        }

        if attempt < max_attempts {
            debug!(
                attempt,
                max_attempts,
                interval_ms = policy.interval.as_millis() as u64,
                "Condition not reached, polling again"
            );
            if !sleep_or_cancel(policy.interval, cancel).await {
                return PollResult::Cancelled {
                    last,
                    attempts: attempt,
                };
            }
        }
    }

    PollResult::TimedOut {
        last,
        attempts: max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_third_poll() {
        let outputs = ["<no value>", "<no value>", "addresses", "addresses"];
        let calls = AtomicU32::new(0);

        let result = poll_until(PollPolicy::from_secs(30, 10), &CancelToken::never(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let out = outputs[n].to_string();
            async move {
                if out.contains("addresses") {
                    PollStep::Converged(out)
                } else {
                    PollStep::Pending(out)
                }
            }
        })
        .await;

        assert_eq!(
            result,
            PollResult::Converged {
                value: "addresses".to_string(),
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = poll_until(PollPolicy::from_secs(4, 10), &CancelToken::never(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { PollStep::Pending(attempt) }
        })
        .await;

        assert_eq!(
            result,
            PollResult::TimedOut {
                last: Some(4),
                attempts: 4
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // three sleeps between four attempts
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_immediately() {
        let result = poll_until(PollPolicy::from_secs(10, 1), &CancelToken::never(), |attempt| async move {
            if attempt == 2 {
                PollStep::Abort("unreachable")
            } else {
                PollStep::Pending("retry")
            }
        })
        .await;

        assert_eq!(
            result,
            PollResult::Aborted {
                value: "unreachable",
                attempts: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_between_attempts() {
        let (handle, token) = cancel_channel();
        let handle = Arc::new(handle);
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = handle.clone();
        let counter = calls.clone();
        let result = poll_until(PollPolicy::from_secs(100, 10), &token, move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                trigger.cancel();
            }
            async move { PollStep::<u32>::Pending(n) }
        })
        .await;

        assert_eq!(
            result,
            PollResult::Cancelled {
                last: Some(1),
                attempts: 2
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_checks_once() {
        let result = poll_until(PollPolicy::from_secs(0, 0), &CancelToken::never(), |_| async {
            PollStep::Converged(())
        })
        .await;
        assert!(result.is_converged());
        assert_eq!(result.attempts(), 1);
    }
}
