use chrono::{DateTime, Utc};
use std::time::Duration;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Age-based freshness rule. An artifact whose age has reached the
/// retention window is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    window: Duration,
}

impl FreshnessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_stale(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        is_stale(last_modified, now, self.window)
    }

    pub fn is_fresh(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        !self.is_stale(last_modified, now)
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

/// Artifacts stamped in the future (clock skew between store and host) are
/// treated as fresh.
pub fn is_stale(last_modified: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - last_modified).to_std() {
        Ok(age) => age >= window,
        Err(_) => false,
    }
}
