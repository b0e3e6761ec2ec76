//! Throttle guard: per-(subscriber, command) minimum interval.
//!
//! A request is admitted when at least `window` has elapsed since the last
//! admitted request for the same key; admission records the new timestamp in
//! the same critical section, so concurrent requests for one key cannot both
//! pass.
//!
//! State is held in-memory and lost on restart. Entries idle for longer than
//! `EVICTION_FACTOR` windows are swept out, at most once per window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use courier_common::types::{Command, SubscriberId};

/// Default minimum interval between two admitted requests.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Entries older than this many windows are evicted.
const EVICTION_FACTOR: u32 = 6;

#[derive(Debug, Default)]
struct ThrottleState {
    last_accepted: HashMap<(SubscriberId, Command), Instant>,
    last_sweep: Option<Instant>,
}

/// In-memory throttle guard.
#[derive(Debug)]
pub struct ThrottleGuard {
    window: Duration,
    state: Mutex<ThrottleState>,
}

impl ThrottleGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Check-and-update for `(subscriber, command)` at `now`.
    ///
    /// Returns `false` if the previous admission was less than `window` ago.
    /// Exactly `window` ago admits.
    pub fn admit(&self, subscriber: SubscriberId, command: Command, now: Instant) -> bool {
        let mut state = self.lock();

        if state
            .last_sweep
            .is_none_or(|t| now.saturating_duration_since(t) >= self.window)
        {
            Self::sweep(&mut state, self.stale_after(), now);
        }

        let key = (subscriber, command);
        if let Some(&last) = state.last_accepted.get(&key)
            && now.saturating_duration_since(last) < self.window
        {
            tracing::debug!(
                subscriber = %subscriber,
                command = %command,
                window_secs = self.window.as_secs(),
                "Request throttled"
            );
            return false;
        }

        let entry = state.last_accepted.entry(key).or_insert(now);
        *entry = (*entry).max(now);
        true
    }

    /// Drop entries idle for longer than the eviction horizon.
    /// Returns the number of entries removed.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let mut state = self.lock();
        Self::sweep(&mut state, self.stale_after(), now)
    }

    /// Number of tracked keys (for monitoring).
    pub fn tracked_count(&self) -> usize {
        self.lock().last_accepted.len()
    }

    fn stale_after(&self) -> Duration {
        self.window * EVICTION_FACTOR
    }

    fn sweep(state: &mut ThrottleState, stale_after: Duration, now: Instant) -> usize {
        let before = state.last_accepted.len();
        state
            .last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) < stale_after);
        state.last_sweep = Some(now);

        let removed = before - state.last_accepted.len();
        if removed > 0 {
            tracing::debug!(removed, "Evicted stale throttle entries");
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        // The state is a plain map; a panic elsewhere cannot leave it inconsistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ThrottleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
