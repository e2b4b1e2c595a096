//! Reconnection backoff schedule.
//!
//! A [`ReconnectPlan`] is the pure schedule (base delay, growth factor,
//! cap); a [`ReconnectSupervisor`] layers the attempt counter on top
//! and decides whether to retry or give up. The session layer owns a
//! supervisor per binding and resets it whenever a channel opens.

use std::time::Duration;

/// Default delay before the first reconnect attempt.
const DEFAULT_BASE: Duration = Duration::from_secs(1);

/// Default growth factor applied per attempt.
const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default ceiling on the reconnect delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default number of attempts before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff schedule for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPlan {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per completed attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Attempts allowed before the supervisor gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectPlan {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPlan {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `delay = min(base * multiplier^attempt, max_delay)`. The product
    /// is capped in float space, so a steep schedule that overshoots
    /// `Duration` range collapses to `max_delay` instead of panicking.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(64)).unwrap_or(64);
        let factor = self.multiplier.powi(exponent);
        let delay = self.base.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Outcome of asking the supervisor for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then try again. `attempt` is one-based for display.
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is exhausted; stop reconnecting.
    GiveUp,
}

/// Tracks consecutive failed attempts against a [`ReconnectPlan`].
#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    plan: ReconnectPlan,
    attempt: u32,
}

impl ReconnectSupervisor {
    /// Create a supervisor with a fresh attempt counter.
    #[must_use]
    pub const fn new(plan: ReconnectPlan) -> Self {
        Self { plan, attempt: 0 }
    }

    /// Decide the next step after a failed or dropped connection.
    ///
    /// Consumes one attempt from the budget on every `Retry` returned.
    pub fn next(&mut self) -> ReconnectDecision {
        if self.attempt >= self.plan.max_attempts {
            return ReconnectDecision::GiveUp;
        }
        let decision = ReconnectDecision::Retry {
            attempt: self.attempt + 1,
            delay: self.plan.delay_for(self.attempt),
        };
        self.attempt += 1;
        decision
    }

    /// Reset the attempt counter after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts consumed since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The schedule this supervisor runs on.
    #[must_use]
    pub const fn plan(&self) -> &ReconnectPlan {
        &self.plan
    }
}
