//! Rate-limit token budget shared by every fetch in a sweep

use crate::io::status_api::RateLimitInfo;
use std::time::Duration;
use tokio::time::Instant;

/// Token budget settings
#[derive(Debug, Clone, Copy)]
pub struct BudgetSettings {
    /// Tokens available after a reset
    pub capacity: u32,
    /// Tokens consumed per zone query
    pub cost_per_call: u32,
    /// Upper bound on concurrent fetches per batch
    pub max_batch: usize,
    /// Reset window assumed when the API does not say
    pub default_reset: Duration,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            cost_per_call: 16,
            max_batch: 20,
            default_reset: Duration::from_secs(60),
        }
    }
}

/// Tokens available and when the budget replenishes
#[derive(Debug, Clone)]
pub struct RateBudget {
    settings: BudgetSettings,
    available: u32,
    reset_at: Instant,
}

impl RateBudget {
    /// A full budget
    pub fn new(settings: BudgetSettings) -> Self {
        Self { available: settings.capacity, reset_at: Instant::now(), settings }
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    pub fn settings(&self) -> &BudgetSettings {
        &self.settings
    }

    /// `clamp(available / cost, 1, max_batch)`
    pub fn batch_size(&self) -> usize {
        let cost = self.settings.cost_per_call.max(1);
        let affordable = (self.available / cost) as usize;
        affordable.clamp(1, self.settings.max_batch.max(1))
    }

    /// Not even one call can be afforded
    pub fn is_exhausted(&self) -> bool {
        self.available < self.settings.cost_per_call
    }

    /// How long dispatch must wait before the next batch, if at all.
    ///
    /// Once the reset time has passed the budget is replenished in place,
    /// whatever count was left over from the previous window.
    pub fn wait_needed(&mut self, now: Instant) -> Option<Duration> {
        if self.reset_at <= now {
            self.replenish();
            return None;
        }
        if !self.is_exhausted() {
            return None;
        }
        Some(self.reset_at - now)
    }

    /// Restore the full budget after the reset time elapsed
    pub fn replenish(&mut self) {
        self.available = self.settings.capacity;
    }

    /// Record a successful response
    pub fn record_response(&mut self, info: Option<RateLimitInfo>, now: Instant) {
        match info {
            Some(info) => {
                self.available = info.remaining;
                self.reset_at = now + info.reset_after;
            }
            None => {
                // First call of a new window
                if self.reset_at <= now {
                    self.replenish();
                    self.reset_at = now + self.settings.default_reset;
                }
                self.available = self.available.saturating_sub(self.settings.cost_per_call);
            }
        }
    }

    /// Record an explicit rate-limit rejection
    pub fn record_rate_limited(&mut self, available: u32, reset_after: Duration, now: Instant) {
        self.available = available;
        self.reset_at = now + reset_after;
    }
}
