use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_REASON_LEN: usize = 100;

/// Software policy lock preventing pump activation, optionally time-bounded.
///
/// Invariant: `reason` and `expires_at` are `None` whenever `active` is
/// false. The transitions below are the only way to mutate this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatchState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl LatchState {
    pub fn engage(&mut self, reason: Option<String>, expires_at: Option<DateTime<Utc>>) {
        self.active = true;
        self.reason = reason;
        self.expires_at = expires_at;
    }

    pub fn release(&mut self) {
        self.active = false;
        self.reason = None;
        self.expires_at = None;
    }

    /// True when a timed latch has outlived its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at.map(|at| (at - now).num_seconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn release_clears_reason_and_expiry() {
        let mut latch = LatchState::default();
        latch.engage(Some("timeout".into()), Some(Utc::now()));
        latch.release();
        assert!(!latch.active);
        assert!(latch.reason.is_none());
        assert!(latch.expires_at.is_none());
    }

    #[test]
    fn indefinite_latch_never_expires() {
        let mut latch = LatchState::default();
        latch.engage(None, None);
        assert!(!latch.is_expired(Utc::now() + ChronoDuration::days(365)));
    }

    #[test]
    fn timed_latch_expires_at_the_deadline() {
        let now = Utc::now();
        let mut latch = LatchState::default();
        latch.engage(None, Some(now + ChronoDuration::seconds(60)));
        assert!(!latch.is_expired(now));
        assert!(latch.is_expired(now + ChronoDuration::seconds(60)));
        assert_eq!(latch.remaining_secs(now), Some(60));
    }

    #[test]
    fn inactive_latch_is_never_expired() {
        let latch = LatchState::default();
        assert!(!latch.is_expired(Utc::now()));
    }
}
