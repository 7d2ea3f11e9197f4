use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of run is (or was) driving the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Fixed-deadline run drawing on the session balance.
    Timed,
    /// Fixed-deadline run drawing banked time and session balance together.
    Banked,
    /// Open-ended wearer-initiated run, consumed lazily.
    Manual,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Timed => "timed",
            RunKind::Banked => "banked",
            RunKind::Manual => "manual",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of everything a front end needs to render the device state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service_up: bool,
    /// Last observed pump duty cycle; `None` when the device was unreachable.
    pub pump_level: Option<f64>,
    pub run_active: Option<RunKind>,
    pub run_remaining_secs: Option<u64>,
    pub session_remaining_secs: u64,
    pub banked_secs: u64,
    pub latched: bool,
    pub latch_reason: Option<String>,
    pub latch_remaining_secs: Option<u64>,
    pub owner_set: bool,
    pub note: Option<String>,
}

/// Result of starting or extending a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunGrant {
    pub kind: RunKind,
    /// Seconds this request actually added to the run.
    pub granted_secs: u64,
    /// Total seconds remaining on the live run after this request.
    pub run_remaining_secs: u64,
    /// Requested seconds that did not fit and were banked instead.
    pub banked_overflow_secs: u64,
    pub session_remaining_secs: u64,
    pub banked_secs: u64,
}

/// Result of a session balance adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceChange {
    pub session_remaining_secs: u64,
    pub banked_secs: u64,
}

/// Result of a latch transition.
#[derive(Debug, Clone, Serialize)]
pub struct LatchChange {
    pub latched: bool,
    pub reason: Option<String>,
    pub expires_in_secs: Option<u64>,
    /// Set when the best-effort pump-off call failed while latching; the
    /// latch itself still took effect.
    pub hardware_warning: Option<String>,
}
