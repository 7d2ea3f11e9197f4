use crate::config::Config;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_NOTE_LEN: usize = 50;

/// The durable session ledger: every numeric balance, the ownership claim,
/// and the cosmetic status note. One instance per deployment.
///
/// Mutations here do not persist by themselves; the caller commits through
/// the persistence gateway after every state-changing operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLedger {
    /// Seconds of pump runtime left in the current session.
    #[serde(default)]
    pub session_remaining_secs: u64,

    /// Value an explicit reset restores.
    #[serde(default)]
    pub default_session_secs: u64,

    /// Unused run time reclaimed from interrupted runs, capped.
    #[serde(default)]
    pub banked_secs: u64,

    /// Wall-clock start of a manual (open-ended) run, consumed lazily.
    #[serde(default)]
    pub pump_run_start: Option<DateTime<Utc>>,

    /// The registered wearer, if anyone has claimed the device.
    #[serde(default)]
    pub owner: Option<u64>,

    /// Cosmetic status note, no behavioral effect.
    #[serde(default)]
    pub note: Option<String>,
}

impl SessionLedger {
    /// A fresh ledger starts with a full session balance.
    pub fn fresh(config: &Config) -> Self {
        Self {
            session_remaining_secs: config.max_session_secs,
            default_session_secs: config.max_session_secs,
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Balance mutations
    // -----------------------------------------------------------------------

    /// Subtract run time from the session balance, clamped at zero.
    /// Returns the amount actually consumed.
    pub fn consume(&mut self, secs: u64) -> u64 {
        let taken = secs.min(self.session_remaining_secs);
        self.session_remaining_secs -= taken;
        taken
    }

    pub fn add_time(&mut self, minutes: u64, config: &Config) -> Result<()> {
        if minutes == 0 {
            return Err(CoreError::NonPositiveMinutes);
        }
        let secs = minutes.saturating_mul(60);
        if secs > config.max_extension_secs {
            return Err(CoreError::ExtensionTooLarge(config.max_extension_secs / 60));
        }
        self.session_remaining_secs =
            (self.session_remaining_secs + secs).min(config.max_session_secs);
        Ok(())
    }

    /// Set the balance outright. Zero is legal: a deliberate empty-out.
    /// Also updates the default that `reset_time` restores.
    pub fn set_time(&mut self, minutes: u64, config: &Config) -> Result<()> {
        let secs = minutes.saturating_mul(60);
        if secs > config.max_session_secs {
            return Err(CoreError::SessionTooLarge(config.max_session_secs / 60));
        }
        self.session_remaining_secs = secs;
        self.default_session_secs = secs;
        self.pump_run_start = None;
        Ok(())
    }

    pub fn reset_time(&mut self) {
        self.session_remaining_secs = self.default_session_secs;
        self.pump_run_start = None;
    }

    /// Bank reclaimed time, clamped at the cap. Returns the amount actually
    /// banked so callers can tell the user what was dropped.
    pub fn bank(&mut self, secs: u64, config: &Config) -> u64 {
        let room = config.max_banked_secs.saturating_sub(self.banked_secs);
        let banked = secs.min(room);
        self.banked_secs += banked;
        banked
    }

    /// Spend banked time, clamped at zero. Returns the amount withdrawn.
    pub fn redeem_bank(&mut self, secs: u64) -> u64 {
        let taken = secs.min(self.banked_secs);
        self.banked_secs -= taken;
        taken
    }

    // -----------------------------------------------------------------------
    // Ownership and note
    // -----------------------------------------------------------------------

    pub fn claim_owner(&mut self, candidate: u64, secret: &str, config: &Config) -> Result<()> {
        if secret != config.wearer_secret {
            return Err(CoreError::WrongSecret);
        }
        self.owner = Some(candidate);
        Ok(())
    }

    pub fn is_wearer(&self, actor: u64) -> bool {
        self.owner == Some(actor)
    }

    pub fn set_note(&mut self, note: Option<String>) -> Result<()> {
        if let Some(text) = &note {
            if text.chars().count() > MAX_NOTE_LEN {
                return Err(CoreError::NoteTooLong(MAX_NOTE_LEN));
            }
        }
        self.note = note.filter(|n| !n.trim().is_empty());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Manual run tracking
    // -----------------------------------------------------------------------

    pub fn start_manual_run(&mut self, now: DateTime<Utc>) {
        self.pump_run_start = Some(now);
    }

    /// Commit lazy manual-run consumption up to `now` and stop tracking.
    /// Returns the seconds consumed.
    pub fn settle_manual_run(&mut self, now: DateTime<Utc>) -> u64 {
        let Some(start) = self.pump_run_start.take() else {
            return 0;
        };
        let elapsed = (now - start).num_seconds().max(0) as u64;
        self.consume(elapsed)
    }

    /// Commit whole elapsed seconds while the manual run continues. The
    /// tracker advances by the committed amount, so sub-second remainders
    /// carry over instead of being truncated away on every call.
    pub fn commit_manual_run(&mut self, now: DateTime<Utc>) -> u64 {
        let Some(start) = self.pump_run_start else {
            return 0;
        };
        let elapsed = (now - start).num_seconds().max(0) as u64;
        if elapsed == 0 {
            return 0;
        }
        let consumed = self.consume(elapsed);
        self.pump_run_start = Some(start + chrono::Duration::seconds(elapsed as i64));
        consumed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn config() -> Config {
        Config {
            wearer_secret: "hunter2".into(),
            max_session_secs: 1800,
            max_extension_secs: 3600,
            max_banked_secs: 600,
            ..Config::default()
        }
    }

    #[test]
    fn fresh_ledger_starts_full() {
        let ledger = SessionLedger::fresh(&config());
        assert_eq!(ledger.session_remaining_secs, 1800);
        assert_eq!(ledger.default_session_secs, 1800);
        assert_eq!(ledger.banked_secs, 0);
        assert!(ledger.owner.is_none());
    }

    #[test]
    fn consume_clamps_at_zero() {
        let mut ledger = SessionLedger::fresh(&config());
        ledger.session_remaining_secs = 10;
        assert_eq!(ledger.consume(25), 10);
        assert_eq!(ledger.session_remaining_secs, 0);
    }

    #[test]
    fn add_time_rejects_zero_minutes() {
        let mut ledger = SessionLedger::fresh(&config());
        assert!(matches!(
            ledger.add_time(0, &config()),
            Err(CoreError::NonPositiveMinutes)
        ));
    }

    #[test]
    fn add_time_rejects_oversized_extension() {
        let mut ledger = SessionLedger::fresh(&config());
        assert!(matches!(
            ledger.add_time(61, &config()),
            Err(CoreError::ExtensionTooLarge(60))
        ));
    }

    #[test]
    fn add_time_never_exceeds_session_cap() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.session_remaining_secs = 1700;
        ledger.add_time(10, &cfg).unwrap();
        assert_eq!(ledger.session_remaining_secs, 1800);
        ledger.add_time(5, &cfg).unwrap();
        assert_eq!(ledger.session_remaining_secs, 1800);
    }

    #[test]
    fn set_time_zero_is_a_deliberate_empty_out() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.set_time(0, &cfg).unwrap();
        assert_eq!(ledger.session_remaining_secs, 0);
        assert_eq!(ledger.default_session_secs, 0);
    }

    #[test]
    fn set_time_rejects_above_max() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        assert!(matches!(
            ledger.set_time(31, &cfg),
            Err(CoreError::SessionTooLarge(30))
        ));
    }

    #[test]
    fn set_time_updates_default_and_reset_restores_it() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.set_time(10, &cfg).unwrap();
        ledger.consume(300);
        assert_eq!(ledger.session_remaining_secs, 300);
        ledger.reset_time();
        assert_eq!(ledger.session_remaining_secs, 600);
    }

    #[test]
    fn bank_reports_the_clamped_amount() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        assert_eq!(ledger.bank(500, &cfg), 500);
        assert_eq!(ledger.bank(500, &cfg), 100);
        assert_eq!(ledger.banked_secs, 600);
    }

    #[test]
    fn redeem_bank_clamps_at_zero() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.bank(100, &cfg);
        assert_eq!(ledger.redeem_bank(250), 100);
        assert_eq!(ledger.banked_secs, 0);
    }

    #[test]
    fn claim_owner_rejects_wrong_secret() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        let result = ledger.claim_owner(42, "wrong", &cfg);
        assert!(matches!(result, Err(CoreError::WrongSecret)));
        assert!(ledger.owner.is_none());
    }

    #[test]
    fn claim_owner_sets_identity_with_correct_secret() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.claim_owner(42, "hunter2", &cfg).unwrap();
        assert_eq!(ledger.owner, Some(42));
        assert!(ledger.is_wearer(42));
        assert!(!ledger.is_wearer(7));
    }

    #[test]
    fn note_is_bounded_and_clearable() {
        let mut ledger = SessionLedger::fresh(&config());
        ledger.set_note(Some("be gentle".into())).unwrap();
        assert_eq!(ledger.note.as_deref(), Some("be gentle"));

        let too_long = "x".repeat(MAX_NOTE_LEN + 1);
        assert!(matches!(
            ledger.set_note(Some(too_long)),
            Err(CoreError::NoteTooLong(_))
        ));

        ledger.set_note(None).unwrap();
        assert!(ledger.note.is_none());
    }

    #[test]
    fn settle_manual_run_consumes_elapsed_and_stops_tracking() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        let start = Utc::now();
        ledger.start_manual_run(start);
        let consumed = ledger.settle_manual_run(start + ChronoDuration::seconds(90));
        assert_eq!(consumed, 90);
        assert_eq!(ledger.session_remaining_secs, 1710);
        assert!(ledger.pump_run_start.is_none());
    }

    #[test]
    fn settle_without_tracker_is_a_no_op() {
        let mut ledger = SessionLedger::fresh(&config());
        assert_eq!(ledger.settle_manual_run(Utc::now()), 0);
        assert_eq!(ledger.session_remaining_secs, 1800);
    }

    #[test]
    fn commit_keeps_tracking_and_carries_fractions() {
        let cfg = config();
        let mut ledger = SessionLedger::fresh(&cfg);
        let start = Utc::now();
        ledger.start_manual_run(start);

        // 1.9 elapsed seconds: one whole second commits, 0.9s carries.
        let consumed = ledger.commit_manual_run(start + ChronoDuration::milliseconds(1900));
        assert_eq!(consumed, 1);
        assert!(ledger.pump_run_start.is_some());

        // Another 1.2s later (3.1s total): two more whole seconds commit.
        let consumed = ledger.commit_manual_run(start + ChronoDuration::milliseconds(3100));
        assert_eq!(consumed, 2);
        assert_eq!(ledger.session_remaining_secs, 1797);
    }
}
