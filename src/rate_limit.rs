use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

/// All three bounds are required; there is no `Default`. Invalid bounds
/// are rejected at construction rather than silently misbehaving.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
    pub cooldown: Duration,
}

impl RateLimitConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("rate limit max_attempts must be positive");
        }
        if self.window.is_zero() {
            anyhow::bail!("rate limit window must be positive");
        }
        if self.cooldown.is_zero() {
            anyhow::bail!("rate limit cooldown must be positive");
        }
        Ok(())
    }
}

/// Sliding-window attempt counter with an escalating cooldown.
///
/// Two states: open (attempts inside the trailing window are counted)
/// and limited (a cooldown end instant is set and still in the future,
/// every attempt is rejected). The countdown is pull-based: remaining
/// time is computed from `cooldown_end` and the injected clock on
/// demand, so there is no timer to cancel on teardown. Advisory only;
/// one instance per gated surface, single-threaded callers assumed.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    attempts: VecDeque<DateTime<Utc>>,
    cooldown_end: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            clock,
            attempts: VecDeque::with_capacity(config.max_attempts as usize + 1),
            cooldown_end: None,
            config,
        })
    }

    /// Gate an action. Returns `true` and records the attempt when the
    /// action may proceed. The attempt that overflows the window is the
    /// one that starts the cooldown; it is rejected and does not count
    /// toward a future window.
    pub fn record_attempt(&mut self) -> bool {
        let now = self.clock.now();
        if self.cooldown_blocks(now) {
            return false;
        }
        self.purge(now);
        if self.attempts.len() as u32 >= self.config.max_attempts {
            self.cooldown_end = Some(now + self.config.cooldown);
            return false;
        }
        self.attempts.push_back(now);
        true
    }

    /// Advisory probe with the same purge-and-compare logic but no
    /// recorded attempt; safe to call any number of times.
    pub fn check_limit(&mut self) -> bool {
        let now = self.clock.now();
        if self.cooldown_blocks(now) {
            return false;
        }
        self.purge(now);
        (self.attempts.len() as u32) < self.config.max_attempts
    }

    /// Unconditionally back to the open state with nothing recorded.
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.cooldown_end = None;
    }

    pub fn is_limited(&self) -> bool {
        let now = self.clock.now();
        self.cooldown_end.is_some_and(|end| now < end)
    }

    pub fn remaining_attempts(&self) -> u32 {
        let now = self.clock.now();
        match self.cooldown_end {
            Some(end) if now < end => 0,
            // Elapsed cooldown means a pending full reset; any recorded
            // attempts are already forfeit.
            Some(_) => self.config.max_attempts,
            None => {
                let cutoff = now - self.config.window;
                let live = self.attempts.iter().filter(|at| **at > cutoff).count() as u32;
                self.config.max_attempts.saturating_sub(live)
            }
        }
    }

    /// Time left on an active cooldown, `None` when open.
    pub fn time_until_reset(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.cooldown_end
            .filter(|end| now < *end)
            .and_then(|end| (end - now).to_std().ok())
    }

    // Returns true while a cooldown is active. An elapsed cooldown is a
    // full reset, observed by whichever call gets here first.
    fn cooldown_blocks(&mut self, now: DateTime<Utc>) -> bool {
        match self.cooldown_end {
            Some(end) if now < end => true,
            Some(_) => {
                self.attempts.clear();
                self.cooldown_end = None;
                false
            }
            None => false,
        }
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.config.window;
        while self.attempts.front().is_some_and(|at| *at <= cutoff) {
            self.attempts.pop_front();
        }
    }
}

/// Render a countdown for display: `"Xm Ys"` from one minute up,
/// otherwise `"Ys"`, floored to whole seconds.
pub fn format_time_remaining(ms: u64) -> String {
    let total_seconds = ms / 1000;
    if ms >= 60_000 {
        format!("{}m {}s", total_seconds / 60, total_seconds % 60)
    } else {
        format!("{total_seconds}s")
    }
}
