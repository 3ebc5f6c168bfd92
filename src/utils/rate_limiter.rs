//! Rate Limiter
//!
//! Per-actor sliding-window rate limiting for sensitive operations.
//! Each actor keeps the timestamps of its recent calls; entries older than
//! the window are pruned on every check.

use crate::utils::clock::{elapsed_between, Clock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Calls in the window after this one was recorded
    pub count: usize,
    pub limit: usize,
}

/// Sliding-window limiter keyed by actor id
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// `limit` calls are allowed per `window`
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            limit: limit as usize,
            window,
            clock,
        }
    }

    /// Record a call for `actor` and report whether it stays within the limit.
    ///
    /// The call is recorded even when it is rejected, so hammering a limited
    /// actor keeps the window full.
    pub fn check(&self, actor: &str) -> RateDecision {
        let now = self.clock.now();
        let mut entry = self.windows.entry(actor.to_string()).or_default();
        let timestamps = entry.value_mut();

        timestamps.push_back(now);
        prune(timestamps, now, self.window);

        let count = timestamps.len();
        RateDecision {
            allowed: count <= self.limit,
            count,
            limit: self.limit,
        }
    }

    /// Number of calls currently inside the window for `actor`
    pub fn current_count(&self, actor: &str) -> usize {
        let now = self.clock.now();
        match self.windows.get_mut(actor) {
            Some(mut entry) => {
                prune(entry.value_mut(), now, self.window);
                entry.len()
            }
            None => 0,
        }
    }

    /// Time until the oldest entry leaves the window, if the actor is at the limit
    pub fn time_until_allowed(&self, actor: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.windows.get(actor)?;
        if entry.len() < self.limit {
            return None;
        }
        let oldest = *entry.front()?;
        self.window.checked_sub(elapsed_between(oldest, now))
    }

    /// Clear the window for `actor`
    pub fn reset(&self, actor: &str) {
        self.windows.remove(actor);
    }

    /// Drop windows whose newest entry is older than `idle`
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| match timestamps.back() {
            Some(newest) => elapsed_between(*newest, now) <= idle,
            None => false,
        });
        before - self.windows.len()
    }

    pub fn tracked_actors(&self) -> usize {
        self.windows.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

fn prune(timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if elapsed_between(*oldest, now) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
