//! Bounded polling of a health probe.
//!
//! Replaces the fixed-interval "sleep, probe, give up after N" loops with
//! one policy: attempts and wall-clock time are both bounded, whichever
//! runs out first ends the wait.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::Cancellation;
use crate::probe::{check_with_timeout, HealthProbe, ProbeOutcome};

/// How long to keep probing a service before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on probe invocations. Always at least 1.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub interval: Duration,
    /// Optional wall-clock ceiling for the whole wait.
    pub total_budget: Option<Duration>,
}

/// Which bound ended a timed-out poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// `max_attempts` probes were made without a healthy answer.
    Attempts,
    /// `total_budget` elapsed, possibly in the middle of an attempt.
    Budget,
}

/// Result of polling a probe under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The last attempt reported healthy.
    Healthy { attempts: u32 },
    /// A bound ran out first; `exhausted` says which one.
    TimedOut { attempts: u32, exhausted: Exhausted },
    /// The probe returned `Error`; no further attempts were made.
    Failed { attempts: u32, detail: String },
    /// Cancellation was raised before or during an attempt or wait.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    /// Probe invocations started, including one cut short.
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Healthy { attempts }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(15),
            total_budget: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy with no time budget. `max_attempts` of zero
    /// is raised to one.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            total_budget: None,
        }
    }

    /// Cap the whole wait, in-flight attempts included.
    pub fn with_total_budget(mut self, budget: Duration) -> Self {
        self.total_budget = Some(budget);
        self
    }

    /// Probe until healthy, out of attempts, out of time, failed, or cancelled.
    pub async fn poll(&self, probe: &dyn HealthProbe, cancel: &mut Cancellation) -> PollOutcome {
        let started = Instant::now();
        let deadline = self.total_budget.map(|budget| started + budget);
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled { attempts };
            }

            attempts += 1;
            let outcome = tokio::select! {
                outcome = check_with_timeout(probe) => outcome,
                _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
                _ = wait_until(deadline) => {
                    warn!(
                        probe = %probe.describe(),
                        attempts,
                        budget = ?self.total_budget,
                        "gave up: time budget exhausted mid-attempt"
                    );
                    return PollOutcome::TimedOut {
                        attempts,
                        exhausted: Exhausted::Budget,
                    };
                }
            };

            match outcome {
                ProbeOutcome::Healthy => {
                    debug!(probe = %probe.describe(), attempts, "probe healthy");
                    return PollOutcome::Healthy { attempts };
                }
                ProbeOutcome::Error(detail) => {
                    warn!(probe = %probe.describe(), %detail, "probe misconfigured, not retrying");
                    return PollOutcome::Failed { attempts, detail };
                }
                ProbeOutcome::Unhealthy => {
                    debug!(probe = %probe.describe(), attempt = attempts, max_attempts, "probe unhealthy");
                }
            }

            if attempts >= max_attempts {
                warn!(probe = %probe.describe(), attempts, "gave up: attempts exhausted");
                return PollOutcome::TimedOut {
                    attempts,
                    exhausted: Exhausted::Attempts,
                };
            }

            if let Some(budget) = self.total_budget {
                if started.elapsed() + self.interval > budget {
                    warn!(
                        probe = %probe.describe(),
                        attempts,
                        budget = ?budget,
                        "gave up: time budget exhausted"
                    );
                    return PollOutcome::TimedOut {
                        attempts,
                        exhausted: Exhausted::Budget,
                    };
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
            }
        }
    }
}

/// Resolve at `deadline`, or never when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
