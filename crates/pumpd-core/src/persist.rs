use crate::config::Config;
use crate::error::Result;
use crate::io;
use crate::latch::LatchState;
use crate::ledger::SessionLedger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Durable snapshot of the session ledger and latch.
///
/// Field-level defaults keep older or hand-edited state files loading across
/// upgrades: unknown fields are ignored, missing fields default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub ledger: SessionLedger,
    #[serde(default)]
    pub latch: LatchState,
}

/// Write the snapshot atomically, overwriting any previous one.
pub fn save(path: &Path, ledger: &SessionLedger, latch: &LatchState) -> Result<()> {
    let state = PersistedState {
        ledger: ledger.clone(),
        latch: latch.clone(),
    };
    let data = serde_json::to_vec_pretty(&state)?;
    io::atomic_write(path, &data)
}

/// Load the snapshot, falling back to fresh defaults (full session balance,
/// unlatched, no owner) when the file is missing or unreadable. The system
/// must never fail to start over a bad state file.
///
/// A latch persisted as active with a now-past expiry is resolved to
/// unlatched here, before any other operation can observe it.
pub fn load_or_init(path: &Path, config: &Config) -> Result<(SessionLedger, LatchState)> {
    let state = match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<PersistedState>(&data) {
            Ok(mut state) => {
                if state.latch.is_expired(Utc::now()) {
                    info!("persisted latch expired while offline, unlatching");
                    state.latch.release();
                    save(path, &state.ledger, &state.latch)?;
                }
                return Ok((state.ledger, state.latch));
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "state file is corrupt, starting fresh");
                PersistedState {
                    ledger: SessionLedger::fresh(config),
                    latch: LatchState::default(),
                }
            }
        },
        Err(_) => PersistedState {
            ledger: SessionLedger::fresh(config),
            latch: LatchState::default(),
        },
    };

    save(path, &state.ledger, &state.latch)?;
    Ok((state.ledger, state.latch))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            wearer_secret: "hunter2".into(),
            ..Config::default()
        }
    }

    #[test]
    fn missing_file_initializes_defaults_and_writes_them_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (ledger, latch) = load_or_init(&path, &config()).unwrap();
        assert_eq!(ledger.session_remaining_secs, config().max_session_secs);
        assert!(!latch.active);
        assert!(ledger.owner.is_none());
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_initializes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let (ledger, _) = load_or_init(&path, &config()).unwrap();
        assert_eq!(ledger.session_remaining_secs, config().max_session_secs);
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let cfg = config();

        let mut ledger = SessionLedger::fresh(&cfg);
        ledger.session_remaining_secs = 123;
        ledger.banked_secs = 45;
        ledger.owner = Some(42);
        ledger.note = Some("back soon".into());
        let mut latch = LatchState::default();
        latch.engage(
            Some("bedtime".into()),
            Some(Utc::now() + ChronoDuration::hours(1)),
        );

        save(&path, &ledger, &latch).unwrap();
        let (loaded_ledger, loaded_latch) = load_or_init(&path, &cfg).unwrap();

        assert_eq!(loaded_ledger.session_remaining_secs, 123);
        assert_eq!(loaded_ledger.banked_secs, 45);
        assert_eq!(loaded_ledger.owner, Some(42));
        assert_eq!(loaded_ledger.note.as_deref(), Some("back soon"));
        assert!(loaded_latch.active);
        assert_eq!(loaded_latch.reason.as_deref(), Some("bedtime"));
        assert_eq!(latch.expires_at, loaded_latch.expires_at);
    }

    #[test]
    fn expired_latch_resolves_to_unlatched_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let cfg = config();

        let ledger = SessionLedger::fresh(&cfg);
        let mut latch = LatchState::default();
        latch.engage(
            Some("overnight".into()),
            Some(Utc::now() - ChronoDuration::minutes(5)),
        );
        save(&path, &ledger, &latch).unwrap();

        let (_, loaded_latch) = load_or_init(&path, &cfg).unwrap();
        assert!(!loaded_latch.active);
        assert!(loaded_latch.reason.is_none());

        // The resolution is persisted, not just in-memory.
        let data = std::fs::read_to_string(&path).unwrap();
        let reloaded: PersistedState = serde_json::from_str(&data).unwrap();
        assert!(!reloaded.latch.active);
    }

    #[test]
    fn unknown_and_missing_fields_default_instead_of_failing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"ledger": {"session_remaining_secs": 60, "some_future_field": true}}"#,
        )
        .unwrap();
        let (ledger, latch) = load_or_init(&path, &config()).unwrap();
        assert_eq!(ledger.session_remaining_secs, 60);
        assert_eq!(ledger.banked_secs, 0);
        assert!(!latch.active);
    }
}
