//! Broadcast retry state machine.
//!
//! ```text
//! Attempting ──accepted──────────────▶ Terminal(Delivered)
//!     │  └──────permanent────────────▶ Terminal(Rejected)
//!     │ transient
//!     ├──budget spent────────────────▶ Terminal(Exhausted)
//!     ▼
//!  Backoff ──elapsed──▶ Retrying ──(same edges as Attempting)
//! ```

use std::fmt;
use std::time::Duration;

use crate::ledger::Disposition;

/// Bounds on how hard a single transfer is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delivered,
    Rejected,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// First attempt in flight.
    Attempting { attempt: u32 },
    /// Waiting before the next attempt.
    Backoff { attempt: u32, delay: Duration },
    /// A later attempt in flight.
    Retrying { attempt: u32 },
    Terminal(Verdict),
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Attempt number in flight or just failed; zero once terminal.
    pub fn attempt(&self) -> u32 {
        match *self {
            RetryState::Attempting { attempt }
            | RetryState::Backoff { attempt, .. }
            | RetryState::Retrying { attempt } => attempt,
            RetryState::Terminal(_) => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Terminal(_))
    }

    /// Transition after the in-flight attempt finished.
    ///
    /// Only `Attempting` and `Retrying` react; other states are returned as is.
    pub fn on_attempt(self, result: Disposition, policy: &RetryPolicy) -> Self {
        let attempt = match self {
            RetryState::Attempting { attempt } | RetryState::Retrying { attempt } => attempt,
            other => return other,
        };

        match result {
            Disposition::Accepted => RetryState::Terminal(Verdict::Delivered),
            Disposition::Permanent => RetryState::Terminal(Verdict::Rejected),
            Disposition::Transient if attempt >= policy.max_attempts => {
                RetryState::Terminal(Verdict::Exhausted)
            }
            Disposition::Transient => RetryState::Backoff {
                attempt,
                delay: policy.backoff(attempt),
            },
        }
    }

    /// Transition once the backoff delay has passed.
    pub fn on_backoff_elapsed(self) -> Self {
        match self {
            RetryState::Backoff { attempt, .. } => RetryState::Retrying {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryState::Attempting { attempt } => write!(f, "ATTEMPTING({attempt})"),
            RetryState::Backoff { attempt, delay } => {
                write!(f, "BACKOFF({attempt}, {}ms)", delay.as_millis())
            }
            RetryState::Retrying { attempt } => write!(f, "RETRYING({attempt})"),
            RetryState::Terminal(verdict) => write!(f, "TERMINAL({verdict:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = policy(10);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(64), Duration::from_millis(1_000));
    }

    #[test]
    fn accepted_first_try_is_delivered() {
        let state = RetryState::start().on_attempt(Disposition::Accepted, &policy(3));
        assert_eq!(state, RetryState::Terminal(Verdict::Delivered));
    }

    #[test]
    fn permanent_is_never_retried() {
        let state = RetryState::start().on_attempt(Disposition::Permanent, &policy(3));
        assert_eq!(state, RetryState::Terminal(Verdict::Rejected));
    }

    #[test]
    fn transient_backs_off_then_retries() {
        let policy = policy(3);
        let state = RetryState::start().on_attempt(Disposition::Transient, &policy);
        assert_eq!(
            state,
            RetryState::Backoff {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );

        let state = state.on_backoff_elapsed();
        assert_eq!(state, RetryState::Retrying { attempt: 2 });

        let state = state.on_attempt(Disposition::Accepted, &policy);
        assert_eq!(state, RetryState::Terminal(Verdict::Delivered));
    }

    #[test]
    fn transient_results_exhaust_after_max_attempts() {
        let policy = policy(3);
        let mut state = RetryState::start();
        let mut attempts = 0;

        while !state.is_terminal() {
            attempts += 1;
            state = state
                .on_attempt(Disposition::Transient, &policy)
                .on_backoff_elapsed();
        }

        assert_eq!(attempts, 3);
        assert_eq!(state, RetryState::Terminal(Verdict::Exhausted));
    }

    #[test]
    fn single_attempt_policy_never_backs_off() {
        let state = RetryState::start().on_attempt(Disposition::Transient, &policy(1));
        assert_eq!(state, RetryState::Terminal(Verdict::Exhausted));
    }

    #[test]
    fn terminal_ignores_further_events() {
        let state = RetryState::Terminal(Verdict::Rejected);
        assert_eq!(state.on_attempt(Disposition::Accepted, &policy(3)), state);
        assert_eq!(state.on_backoff_elapsed(), state);
    }

    #[test]
    fn display() {
        assert_eq!(RetryState::start().to_string(), "ATTEMPTING(1)");
        assert_eq!(
            RetryState::Terminal(Verdict::Exhausted).to_string(),
            "TERMINAL(Exhausted)"
        );
    }
}
