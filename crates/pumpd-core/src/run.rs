use crate::core::Core;
use crate::types::RunKind;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The single live run. At most one exists at any time; it is owned by the
/// core state and read and updated under the core lock on every tick.
#[derive(Debug)]
pub struct ActiveRun {
    pub kind: RunKind,
    pub started: Instant,
    pub target_end: Instant,
    /// Whole seconds already charged against the ledger.
    pub consumed_secs: u64,
    pub cancel: CancellationToken,
    pub task: Option<JoinHandle<()>>,
}

impl ActiveRun {
    pub fn new(kind: RunKind, duration_secs: u64, cancel: CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            kind,
            started,
            target_end: started + Duration::from_secs(duration_secs),
            consumed_secs: 0,
            cancel,
            task: None,
        }
    }

    /// Total seconds this run intends to consume, extensions included.
    pub fn intended_secs(&self) -> u64 {
        self.target_end.duration_since(self.started).as_secs()
    }

    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.target_end.saturating_duration_since(now).as_secs()
    }

    /// Seconds left rounded to the nearest whole second, for banking.
    pub fn remaining_secs_rounded(&self, now: Instant) -> u64 {
        let ms = self.target_end.saturating_duration_since(now).as_millis() as u64;
        (ms + 500) / 1000
    }

    pub fn extend(&mut self, secs: u64) {
        self.target_end += Duration::from_secs(secs);
    }
}

/// Why a tick loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The deadline arrived.
    Completed,
    /// Explicit cancellation: manual override or process shutdown.
    Cancelled,
    LatchEngaged,
    ServiceLost,
    BudgetExhausted,
}

impl StopCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCause::Completed => "completed",
            StopCause::Cancelled => "cancelled",
            StopCause::LatchEngaged => "latch_engaged",
            StopCause::ServiceLost => "service_lost",
            StopCause::BudgetExhausted => "budget_exhausted",
        }
    }
}

/// Drive the live run: tick until a stop cause emerges, then run the full
/// cleanup sequence. Cleanup is not skippable, cancellation included.
pub(crate) async fn drive(core: Core, cancel: CancellationToken, tick: Duration) {
    let cause = loop {
        tokio::select! {
            _ = cancel.cancelled() => break StopCause::Cancelled,
            _ = tokio::time::sleep(tick) => {}
        }
        match core.tick_run().await {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(cause) => break cause,
        }
    };
    core.finish_run(cause).await;
}
