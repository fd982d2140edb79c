//! Temporary lockout after repeated failed logins.
//!
//! - Consecutive failures are counted per username
//! - At `max_attempts` failures the username is locked for `lockout_secs`
//! - While locked, attempts are refused before any password is checked
//! - A successful login or an admin reset clears the counter
//! - Failures older than `lockout_secs` are forgotten, and idle entries are
//!   pruned whenever a new failure is recorded
//!
//! State is in memory only; restarting the application clears every lock.

use std::collections::HashMap;

/// Default: 3 attempts before lockout.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default lockout: 30 minutes.
pub const DEFAULT_LOCKOUT_SECS: u64 = 30 * 60;

/// Current epoch seconds.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Result of checking a username before an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    /// Attempt may proceed.
    Open,
    /// Locked; retry after this many seconds.
    Locked { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Default)]
struct AttemptState {
    failures: u32,
    /// When the current lock expires (0 if none).
    locked_until: u64,
    /// Last failure timestamp (for expiry and stale cleanup).
    last_failure: u64,
}

/// Failed-attempt tracker.
pub struct LoginGuard {
    max_attempts: u32,
    lockout_secs: u64,
    states: HashMap<String, AttemptState>,
}

impl Default for LoginGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_LOCKOUT_SECS)
    }
}

impl LoginGuard {
    /// A `max_attempts` of zero disables locking.
    pub fn new(max_attempts: u32, lockout_secs: u64) -> Self {
        Self {
            max_attempts,
            lockout_secs,
            states: HashMap::new(),
        }
    }

    pub fn check(&mut self, username: &str) -> GuardStatus {
        self.check_at(username, now_secs())
    }

    pub fn check_at(&mut self, username: &str, now: u64) -> GuardStatus {
        let Some(state) = self.states.get_mut(username) else {
            return GuardStatus::Open;
        };
        if state.locked_until == 0 {
            return GuardStatus::Open;
        }
        if now < state.locked_until {
            return GuardStatus::Locked {
                retry_after_secs: state.locked_until - now,
            };
        }

        // Lock expired: start counting from scratch
        self.states.remove(username);
        GuardStatus::Open
    }

    /// Count a failure. Returns the status after counting it.
    pub fn record_failure(&mut self, username: &str) -> GuardStatus {
        self.record_failure_at(username, now_secs())
    }

    pub fn record_failure_at(&mut self, username: &str, now: u64) -> GuardStatus {
        if self.max_attempts == 0 {
            return GuardStatus::Open;
        }

        self.cleanup_stale_at(now);

        let window = self.lockout_secs;
        let state = self.states.entry(username.to_string()).or_default();
        if state.failures > 0 && now.saturating_sub(state.last_failure) > window {
            state.failures = 0;
        }
        state.failures += 1;
        state.last_failure = now;

        if state.failures >= self.max_attempts {
            state.locked_until = now.saturating_add(self.lockout_secs);
            tracing::warn!(
                username,
                failures = state.failures,
                lockout_secs = self.lockout_secs,
                "Too many failed logins; account temporarily locked"
            );
            return GuardStatus::Locked {
                retry_after_secs: self.lockout_secs,
            };
        }
        GuardStatus::Open
    }

    pub fn record_success(&mut self, username: &str) {
        self.states.remove(username);
    }

    /// Admin unlock. Returns `true` if there was anything to clear.
    pub fn reset(&mut self, username: &str) -> bool {
        self.states.remove(username).is_some()
    }

    /// Drop entries that are neither locked nor failed recently.
    pub fn cleanup_stale(&mut self) {
        self.cleanup_stale_at(now_secs());
    }

    pub fn cleanup_stale_at(&mut self, now: u64) {
        let window = self.lockout_secs;
        self.states.retain(|_, state| {
            now < state.locked_until || now.saturating_sub(state.last_failure) <= window
        });
    }

    /// Number of usernames with tracked state.
    pub fn tracked_users(&self) -> usize {
        self.states.len()
    }

    /// Consecutive failures currently counted for `username`.
    pub fn failures(&self, username: &str) -> u32 {
        self.states.get(username).map_or(0, |s| s.failures)
    }
}
