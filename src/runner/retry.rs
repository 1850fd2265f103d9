//! @ai:module:intent Retry transient attempt failures with bounded, budget-capped backoff
//! @ai:module:layer application
//! @ai:module:public_api RetryScheduler, RetryPolicy, BackoffSchedule, TestState, RetryResult
//! @ai:module:stateless false

use crate::error::InvalidTransition;
use crate::metrics::TestStatus;
use crate::resolver::ExecutionPolicy;
use crate::sandbox::AttemptOutcome;
use std::future::Future;
use std::time::Duration;

/// @ai:intent Limits for one test's retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Total backoff may never exceed this
    pub budget: Duration,
}

impl From<&ExecutionPolicy> for RetryPolicy {
    fn from(policy: &ExecutionPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            backoff_base: policy.backoff_base,
            backoff_max: policy.backoff_max,
            budget: policy.timeout,
        }
    }
}

/// @ai:intent Exponential delays: base * 2^(n-1), capped, monotonic, within budget
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: RetryPolicy,
    issued: u32,
    spent: Duration,
    last: Duration,
}

impl BackoffSchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            issued: 0,
            spent: Duration::ZERO,
            last: Duration::ZERO,
        }
    }

    /// @ai:intent Total delay handed out so far
    /// @ai:effects pure
    pub fn spent(&self) -> Duration {
        self.spent
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.issued >= self.policy.max_retries {
            return None;
        }

        let factor = 2u32.checked_pow(self.issued).unwrap_or(u32::MAX);
        let delay = self
            .policy
            .backoff_base
            .checked_mul(factor)
            .unwrap_or(self.policy.backoff_max)
            .min(self.policy.backoff_max)
            .max(self.last);

        if self.spent + delay > self.policy.budget {
            return None;
        }

        self.issued += 1;
        self.spent += delay;
        self.last = delay;
        Some(delay)
    }
}

/// @ai:intent Lifecycle of one test: pending -> running -> finished, re-entering pending only by retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Pending { attempt: u32 },
    Running { attempt: u32 },
    Finished { status: TestStatus, attempts: u32 },
}

impl TestState {
    pub fn new() -> Self {
        TestState::Pending { attempt: 1 }
    }

    fn label(&self) -> &'static str {
        match self {
            TestState::Pending { .. } => "pending",
            TestState::Running { .. } => "running",
            TestState::Finished { .. } => "finished",
        }
    }

    /// @ai:intent pending -> running
    /// @ai:effects pure
    pub fn start(self) -> Result<Self, InvalidTransition> {
        match self {
            TestState::Pending { attempt } => Ok(TestState::Running { attempt }),
            other => Err(InvalidTransition {
                from: other.label(),
                action: "start",
            }),
        }
    }

    /// @ai:intent running -> finished
    /// @ai:effects pure
    pub fn finish(self, status: TestStatus) -> Result<Self, InvalidTransition> {
        match self {
            TestState::Running { attempt } => Ok(TestState::Finished {
                status,
                attempts: attempt,
            }),
            other => Err(InvalidTransition {
                from: other.label(),
                action: "finish",
            }),
        }
    }

    /// @ai:intent finished with error -> pending, for the next attempt
    /// @ai:effects pure
    pub fn retry(self) -> Result<Self, InvalidTransition> {
        match self {
            TestState::Finished {
                status: TestStatus::Error,
                attempts,
            } => Ok(TestState::Pending {
                attempt: attempts + 1,
            }),
            other => Err(InvalidTransition {
                from: other.label(),
                action: "retry",
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Finished { .. })
    }
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

/// @ai:intent The recorded outcome of a test after its retry cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RetryResult {
    /// Last observed outcome
    pub outcome: AttemptOutcome,
    pub attempts: u32,
    pub state: TestState,
}

/// @ai:intent Drives attempts until a non-retryable outcome or the retry budget runs out
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// @ai:intent Run `attempt` (called with the 1-based attempt number) under the retry policy
    /// @ai:effects time
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<RetryResult, InvalidTransition>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome>,
    {
        let mut schedule = BackoffSchedule::new(self.policy);
        let mut state = TestState::new();

        loop {
            let number = match state {
                TestState::Pending { attempt } => attempt,
                _ => 1,
            };

            state = state.start()?;
            let outcome = attempt(number).await;
            state = state.finish(outcome.status())?;

            if !outcome.kind.is_retryable() {
                return Ok(RetryResult {
                    outcome,
                    attempts: number,
                    state,
                });
            }

            match schedule.next() {
                Some(delay) => {
                    tracing::debug!(
                        "Attempt {} hit a transient error, retrying in {:?}: {}",
                        number,
                        delay,
                        outcome.message
                    );
                    tokio::time::sleep(delay).await;
                    state = state.retry()?;
                }
                None => {
                    return Ok(RetryResult {
                        outcome,
                        attempts: number,
                        state,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::OutcomeKind;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32, base_ms: u64, max_ms: u64, budget_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(base_ms),
            backoff_max: Duration::from_millis(max_ms),
            budget: Duration::from_millis(budget_ms),
        }
    }

    fn outcome(kind: OutcomeKind) -> AttemptOutcome {
        AttemptOutcome::new(kind, format!("{kind:?}"), Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let delays: Vec<u64> = BackoffSchedule::new(policy(5, 100, 300, 10_000))
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 300, 300]);
    }

    #[test]
    fn test_backoff_respects_budget() {
        let mut schedule = BackoffSchedule::new(policy(10, 100, 1_000, 350));
        let delays: Vec<Duration> = schedule.by_ref().collect();
        assert_eq!(delays.len(), 2);
        assert!(schedule.spent() <= Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let delays: Vec<Duration> = BackoffSchedule::new(policy(8, 7, 100, 60_000)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_state_machine_transitions() {
        let state = TestState::new().start().unwrap();
        assert_eq!(state, TestState::Running { attempt: 1 });

        let failed = state.finish(TestStatus::Fail).unwrap();
        assert!(failed.is_terminal());
        assert!(failed.retry().is_err());

        let errored = TestState::new()
            .start()
            .unwrap()
            .finish(TestStatus::Error)
            .unwrap();
        assert_eq!(errored.retry().unwrap(), TestState::Pending { attempt: 2 });
        assert!(TestState::new().finish(TestStatus::Pass).is_err());
    }

    #[tokio::test]
    async fn test_transient_then_pass_records_attempt_count() {
        let scheduler = RetryScheduler::new(policy(3, 1, 5, 1_000));
        let calls = AtomicU32::new(0);

        let result = scheduler
            .run(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        outcome(OutcomeKind::Transient)
                    } else {
                        outcome(OutcomeKind::Pass)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.outcome.kind, OutcomeKind::Pass);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.state,
            TestState::Finished {
                status: TestStatus::Pass,
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn test_fail_and_timeout_are_not_retried() {
        let scheduler = RetryScheduler::new(policy(3, 1, 5, 1_000));

        for kind in [OutcomeKind::Assertion, OutcomeKind::Timeout, OutcomeKind::Infrastructure] {
            let result = scheduler.run(|_| async move { outcome(kind) }).await.unwrap();
            assert_eq!(result.attempts, 1);
            assert_eq!(result.outcome.kind, kind);
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_last_outcome() {
        let scheduler = RetryScheduler::new(policy(2, 1, 5, 1_000));

        let result = scheduler
            .run(|n| async move {
                AttemptOutcome::new(
                    OutcomeKind::Transient,
                    format!("attempt {n}"),
                    Duration::ZERO,
                )
            })
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.outcome.message, "attempt 3");
        assert_eq!(result.outcome.status(), TestStatus::Error);
    }
}
