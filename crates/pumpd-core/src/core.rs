use crate::actuator::ActuatorClient;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::events::{CoreEvent, EventBus};
use crate::health::HealthMonitor;
use crate::io;
use crate::latch::{LatchState, MAX_REASON_LEN};
use crate::ledger::SessionLedger;
use crate::persist;
use crate::run::{self, ActiveRun, StopCause};
use crate::types::{BalanceChange, LatchChange, RunGrant, RunKind, StatusReport};
use chrono::Utc;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// The mutable trio guarded by one lock: every mutating operation runs to
/// completion under it, so concurrent requests serialize instead of
/// interleaving on the same fields.
struct CoreState {
    ledger: SessionLedger,
    latch: LatchState,
    run: Option<ActiveRun>,
    latch_timer: Option<CancellationToken>,
}

struct CoreInner {
    config: Config,
    actuator: ActuatorClient,
    events: EventBus,
    health: HealthMonitor,
    state_path: PathBuf,
    state: Mutex<CoreState>,
    ticker_cancel: CancellationToken,
}

/// The control core: one explicitly constructed object owning the session
/// ledger, the latch, and the live run. Clones share the same state.
///
/// Must be constructed inside a tokio runtime; it spawns the health monitor
/// and the once-a-second session ticker.
#[derive(Clone)]
pub struct Core {
    inner: Arc<CoreInner>,
}

impl Core {
    pub async fn new(config: Config) -> Result<Core> {
        let state_path = config.state_file.clone();
        if let Some(parent) = state_path.parent() {
            if !parent.as_os_str().is_empty() {
                // An unusable state directory is the one fatal startup error:
                // running without durability would lose the safety balances.
                io::ensure_dir(parent)?;
            }
        }
        let (mut ledger, latch) = persist::load_or_init(&state_path, &config)?;

        // Fold in consumption from a manual run that straddled the restart.
        if ledger.pump_run_start.is_some() {
            let consumed = ledger.settle_manual_run(Utc::now());
            if consumed > 0 {
                info!(consumed, "committed manual run time from before restart");
            }
            persist::save(&state_path, &ledger, &latch)?;
        }

        let actuator = ActuatorClient::new(&config)?;
        let events = EventBus::new(64);
        let health = HealthMonitor::spawn(
            actuator.clone(),
            events.clone(),
            Duration::from_secs(config.health_poll_secs),
        );

        let core = Core {
            inner: Arc::new(CoreInner {
                actuator,
                events,
                health,
                state_path,
                state: Mutex::new(CoreState {
                    ledger,
                    latch,
                    run: None,
                    latch_timer: None,
                }),
                ticker_cancel: CancellationToken::new(),
                config,
            }),
        };

        // Resume a timed latch that survived the restart.
        {
            let mut guard = core.inner.state.lock().await;
            if guard.latch.active {
                if let Some(remaining) = guard.latch.remaining_secs(Utc::now()) {
                    let token = core.schedule_unlatch(Duration::from_secs(remaining.max(1)));
                    guard.latch_timer = Some(token);
                }
            }
        }

        tokio::spawn(session_ticker(
            core.clone(),
            core.inner.ticker_cancel.clone(),
        ));
        Ok(core)
    }

    /// Subscribe to outward notifications (status changes, latch expiry,
    /// service transitions).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    /// Direct liveness probe of the actuator service.
    pub async fn ping_device(&self) -> Result<()> {
        self.inner.actuator.ping().await
    }

    // -----------------------------------------------------------------------
    // Ownership, balances, note
    // -----------------------------------------------------------------------

    pub async fn claim_owner(&self, candidate: u64, secret: &str) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        guard
            .ledger
            .claim_owner(candidate, secret, &self.inner.config)?;
        // Ownership must survive restart, so this commit is not deferred.
        self.commit(&guard.ledger, &guard.latch);
        info!(wearer = candidate, "wearer registered");
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(())
    }

    pub async fn add_time(&self, actor: u64, minutes: u64) -> Result<BalanceChange> {
        let mut guard = self.inner.state.lock().await;
        ensure_wearer(&guard.ledger, actor)?;
        commit_lazy_consumption(&mut guard);
        guard.ledger.add_time(minutes, &self.inner.config)?;
        self.commit(&guard.ledger, &guard.latch);
        let change = balance_of(&guard.ledger);
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    pub async fn set_time(&self, actor: u64, minutes: u64) -> Result<BalanceChange> {
        let mut guard = self.inner.state.lock().await;
        ensure_wearer(&guard.ledger, actor)?;
        guard.ledger.set_time(minutes, &self.inner.config)?;
        self.commit(&guard.ledger, &guard.latch);
        let change = balance_of(&guard.ledger);
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    pub async fn reset_time(&self, actor: u64) -> Result<BalanceChange> {
        let mut guard = self.inner.state.lock().await;
        ensure_wearer(&guard.ledger, actor)?;
        guard.ledger.reset_time();
        self.commit(&guard.ledger, &guard.latch);
        let change = balance_of(&guard.ledger);
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    pub async fn set_note(&self, actor: u64, note: Option<String>) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        ensure_wearer(&guard.ledger, actor)?;
        guard.ledger.set_note(note)?;
        self.commit(&guard.ledger, &guard.latch);
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Latch
    // -----------------------------------------------------------------------

    /// Toggle, set, or time-limit the latch. `state = None` toggles.
    pub async fn latch(
        &self,
        actor: u64,
        state: Option<bool>,
        minutes: Option<u64>,
        reason: Option<String>,
    ) -> Result<LatchChange> {
        let duration = match minutes {
            Some(0) => return Err(CoreError::NonPositiveMinutes),
            Some(m) => Some(Duration::from_secs(m.saturating_mul(60))),
            None => None,
        };
        self.latch_with_duration(actor, state, duration, reason)
            .await
    }

    pub(crate) async fn latch_with_duration(
        &self,
        actor: u64,
        state: Option<bool>,
        duration: Option<Duration>,
        reason: Option<String>,
    ) -> Result<LatchChange> {
        if let Some(text) = &reason {
            if text.chars().count() > MAX_REASON_LEN {
                return Err(CoreError::ReasonTooLong(MAX_REASON_LEN));
            }
        }

        let mut guard = self.inner.state.lock().await;
        ensure_wearer(&guard.ledger, actor)?;

        let engaging = state.unwrap_or(!guard.latch.active);

        // At most one pending expiry timer per activation: any transition
        // cancels the old one.
        if let Some(token) = guard.latch_timer.take() {
            token.cancel();
        }

        let mut hardware_warning = None;
        if engaging {
            // Commit in-progress lazy consumption first so latch time is
            // never charged against the session.
            let now = Utc::now();
            guard.ledger.settle_manual_run(now);
            let expires_at = duration
                .map(|d| now + chrono::Duration::milliseconds(d.as_millis() as i64));
            guard.latch.engage(reason, expires_at);
            self.commit(&guard.ledger, &guard.latch);

            // Latching is software policy: it succeeds even when the device
            // is unreachable. The failed off-call is only a warning.
            if let Err(err) = self.inner.actuator.set_level(0.0).await {
                warn!(error = %err, "failed to turn pump off while latching");
                hardware_warning = Some(err.to_string());
            }

            if let Some(d) = duration {
                let token = self.schedule_unlatch(d);
                guard.latch_timer = Some(token);
            }
            info!(timed = duration.is_some(), "pump latched");
        } else {
            guard.latch.release();
            self.commit(&guard.ledger, &guard.latch);
            info!("pump unlatched");
        }

        let change = LatchChange {
            latched: engaging,
            reason: guard.latch.reason.clone(),
            expires_in_secs: guard.latch.remaining_secs(Utc::now()),
            hardware_warning,
        };
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    fn schedule_unlatch(&self, delay: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let core = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            core.expire_latch().await;
        });
        token
    }

    async fn expire_latch(&self) {
        let mut guard = self.inner.state.lock().await;
        if !guard.latch.active {
            return;
        }
        // A replacement latch may have won the race to the lock; only expire
        // the activation this timer belongs to.
        let now = Utc::now();
        match guard.latch.expires_at {
            Some(at) if at <= now + chrono::Duration::seconds(1) => {}
            _ => return,
        }
        guard.latch.release();
        guard.latch_timer = None;
        self.commit(&guard.ledger, &guard.latch);
        info!("timed latch expired, pump unlatched");
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.inner.events.publish(CoreEvent::LatchExpired);
        self.publish_status(status);
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Start (or extend) a timed run drawing on the session balance.
    pub async fn start_timed(&self, seconds: u64) -> Result<RunGrant> {
        self.start_run(RunKind::Timed, seconds).await
    }

    /// Start (or extend) a run drawing banked time; banked usage still burns
    /// the session balance at the same rate.
    pub async fn start_banked(&self, seconds: u64) -> Result<RunGrant> {
        self.start_run(RunKind::Banked, seconds).await
    }

    async fn start_run(&self, kind: RunKind, seconds: u64) -> Result<RunGrant> {
        if seconds == 0 {
            return Err(CoreError::NonPositiveDuration);
        }
        let config = &self.inner.config;
        let mut guard = self.inner.state.lock().await;
        if guard.latch.active {
            return Err(CoreError::Latched {
                reason: guard.latch.reason.clone(),
            });
        }
        if !self.inner.health.is_up() {
            return Err(CoreError::ServiceDown);
        }

        // A stray manual tracker would double-charge the managed run.
        let settled = guard.ledger.settle_manual_run(Utc::now());
        if settled > 0 {
            self.commit(&guard.ledger, &guard.latch);
        }

        let state = &mut *guard;
        if let Some(active) = state.run.as_mut() {
            if active.kind != kind {
                return Err(CoreError::RunActive(active.kind.to_string()));
            }
            // The actuator is a single global resource: merge into the live
            // run instead of racing it. Rounded remainder, so a run that
            // started milliseconds ago still counts at full length.
            let now = Instant::now();
            let current_remaining = active.remaining_secs_rounded(now);
            let mut ceiling = config.max_pump_secs.min(state.ledger.session_remaining_secs);
            if kind == RunKind::Banked {
                ceiling = ceiling.min(state.ledger.banked_secs);
            }
            let granted = seconds.min(ceiling.saturating_sub(current_remaining));
            let overflow = seconds - granted;
            let banked_overflow = if kind == RunKind::Timed && overflow > 0 {
                state.ledger.bank(overflow, config)
            } else {
                0
            };
            active.extend(granted);
            let run_remaining = current_remaining + granted;
            if banked_overflow > 0 {
                self.commit(&state.ledger, &state.latch);
            }
            debug!(granted, banked_overflow, "extended live run");
            let grant = RunGrant {
                kind,
                granted_secs: granted,
                run_remaining_secs: run_remaining,
                banked_overflow_secs: banked_overflow,
                session_remaining_secs: state.ledger.session_remaining_secs,
                banked_secs: state.ledger.banked_secs,
            };
            let status = self.snapshot(&guard, None);
            drop(guard);
            self.publish_status(status);
            return Ok(grant);
        }

        let mut run_secs = seconds
            .min(state.ledger.session_remaining_secs)
            .min(config.max_pump_secs);
        if kind == RunKind::Banked {
            if state.ledger.banked_secs == 0 {
                return Err(CoreError::NoBankedTime);
            }
            run_secs = run_secs.min(state.ledger.banked_secs);
        }
        if run_secs == 0 {
            return Err(CoreError::NoSessionTime);
        }

        // Device first: a failed start leaves no state behind.
        let level = self.inner.actuator.set_level(1.0).await?;

        let cancel = CancellationToken::new();
        let mut active = ActiveRun::new(kind, run_secs, cancel.clone());
        let tick = Duration::from_millis(config.tick_interval_ms.max(1));
        active.task = Some(tokio::spawn(run::drive(self.clone(), cancel, tick)));
        state.run = Some(active);
        info!(kind = %kind, secs = run_secs, "run started");

        let grant = RunGrant {
            kind,
            granted_secs: run_secs,
            run_remaining_secs: run_secs,
            banked_overflow_secs: 0,
            session_remaining_secs: state.ledger.session_remaining_secs,
            banked_secs: state.ledger.banked_secs,
        };
        let status = self.snapshot(&guard, Some(level));
        drop(guard);
        self.publish_status(status);
        Ok(grant)
    }

    /// One pass of the run loop's bookkeeping. Returns the stop cause once
    /// the run should wind down.
    pub(crate) async fn tick_run(&self) -> ControlFlow<StopCause> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(active) = state.run.as_mut() else {
            return ControlFlow::Break(StopCause::Completed);
        };

        let now = Instant::now();
        let target = active.started.elapsed().as_secs().min(active.intended_secs());
        let mut delta = target - active.consumed_secs;
        if delta > 0 {
            if active.kind == RunKind::Banked {
                delta = state.ledger.redeem_bank(delta);
            }
            state.ledger.consume(delta);
            active.consumed_secs += delta;
            self.commit(&state.ledger, &state.latch);
        }

        if now >= active.target_end {
            return ControlFlow::Break(StopCause::Completed);
        }
        if state.latch.active {
            return ControlFlow::Break(StopCause::LatchEngaged);
        }
        if !self.inner.health.is_up() {
            return ControlFlow::Break(StopCause::ServiceLost);
        }
        if state.ledger.session_remaining_secs == 0 {
            return ControlFlow::Break(StopCause::BudgetExhausted);
        }
        if active.kind == RunKind::Banked && state.ledger.banked_secs == 0 {
            return ControlFlow::Break(StopCause::BudgetExhausted);
        }
        ControlFlow::Continue(())
    }

    /// The strictly ordered end of a run: actuator off, commit, persist,
    /// notify. Runs for every stop cause, cancellation included.
    pub(crate) async fn finish_run(&self, cause: StopCause) {
        // Best-effort off first; an unreachable device must never prevent
        // the ledger from being corrected. Power loss defaults the actuator
        // off at the hardware level, which is the deeper safety net.
        if let Err(err) = self.inner.actuator.set_level(0.0).await {
            warn!(error = %err, "failed to turn pump off after run");
        }

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(mut active) = state.run.take() else {
            return;
        };

        let now = Instant::now();
        let target = active.started.elapsed().as_secs().min(active.intended_secs());
        let mut delta = target - active.consumed_secs;
        if delta > 0 {
            if active.kind == RunKind::Banked {
                delta = state.ledger.redeem_bank(delta);
            }
            state.ledger.consume(delta);
            active.consumed_secs += delta;
        }

        // An interrupted timed run banks its unused intent, capped. Banked
        // runs draw per-second, so their remainder never left the bank.
        let mut banked = 0;
        if active.kind == RunKind::Timed && cause != StopCause::Completed {
            let remaining = active.remaining_secs_rounded(now);
            if remaining > 0 {
                banked = state.ledger.bank(remaining, &self.inner.config);
            }
        }

        self.commit(&state.ledger, &state.latch);
        info!(
            kind = %active.kind,
            cause = cause.as_str(),
            consumed = active.consumed_secs,
            banked,
            "run finished"
        );
        let status = self.snapshot(&guard, None);
        drop(guard);
        self.publish_status(status);
    }

    // -----------------------------------------------------------------------
    // Manual override
    // -----------------------------------------------------------------------

    /// Turn the pump on with no deadline. Consumption is tracked lazily and
    /// reconciled by the session ticker.
    pub async fn manual_on(&self, actor: u64) -> Result<BalanceChange> {
        let pending = {
            let mut guard = self.inner.state.lock().await;
            ensure_wearer(&guard.ledger, actor)?;
            if guard.latch.active {
                return Err(CoreError::Latched {
                    reason: guard.latch.reason.clone(),
                });
            }
            guard
                .run
                .as_mut()
                .map(|r| (r.cancel.clone(), r.task.take()))
        };
        // Let the cancelled run finish its cleanup before touching the
        // device, or its off-call would race our on-call.
        if let Some((token, task)) = pending {
            token.cancel();
            if let Some(task) = task {
                let _ = task.await;
            }
        }

        let mut guard = self.inner.state.lock().await;
        if guard.latch.active {
            return Err(CoreError::Latched {
                reason: guard.latch.reason.clone(),
            });
        }
        let settled = guard.ledger.settle_manual_run(Utc::now());
        if settled > 0 {
            self.commit(&guard.ledger, &guard.latch);
        }
        if guard.ledger.session_remaining_secs == 0 {
            return Err(CoreError::NoSessionTime);
        }

        let level = self.inner.actuator.set_level(1.0).await?;
        guard.ledger.start_manual_run(Utc::now());
        self.commit(&guard.ledger, &guard.latch);
        info!("pump turned on manually");
        let change = balance_of(&guard.ledger);
        let status = self.snapshot(&guard, Some(level));
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    /// Turn the pump off, cancelling any live run and committing lazy
    /// consumption.
    pub async fn manual_off(&self, actor: u64) -> Result<BalanceChange> {
        let pending = {
            let mut guard = self.inner.state.lock().await;
            ensure_wearer(&guard.ledger, actor)?;
            guard
                .run
                .as_mut()
                .map(|r| (r.cancel.clone(), r.task.take()))
        };
        if let Some((token, task)) = pending {
            token.cancel();
            if let Some(task) = task {
                let _ = task.await;
            }
        }

        let mut guard = self.inner.state.lock().await;
        let settled = guard.ledger.settle_manual_run(Utc::now());
        if settled > 0 {
            self.commit(&guard.ledger, &guard.latch);
        }

        // The ledger is already corrected; a device failure here is still an
        // error because the pump may physically stay on.
        let level = self.inner.actuator.set_level(0.0).await?;
        info!("pump turned off manually");
        let change = balance_of(&guard.ledger);
        let status = self.snapshot(&guard, Some(level));
        drop(guard);
        self.publish_status(status);
        Ok(change)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Snapshot the current state, folding in lazy manual consumption.
    pub async fn query_status(&self) -> StatusReport {
        let service_up = self.inner.health.is_up();
        let pump_level = if service_up {
            self.inner.actuator.get_level().await.ok()
        } else {
            None
        };

        let mut guard = self.inner.state.lock().await;
        if guard.run.is_none() {
            let consumed = guard.ledger.commit_manual_run(Utc::now());
            if consumed > 0 {
                self.commit(&guard.ledger, &guard.latch);
            }
        }
        self.snapshot(&guard, pump_level)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop background tasks and wind down any live run through its full
    /// cleanup sequence.
    pub async fn shutdown(&self) {
        self.inner.ticker_cancel.cancel();
        self.inner.health.shutdown();
        let pending = {
            let mut guard = self.inner.state.lock().await;
            if let Some(token) = guard.latch_timer.take() {
                token.cancel();
            }
            guard
                .run
                .as_mut()
                .map(|r| (r.cancel.clone(), r.task.take()))
        };
        if let Some((token, task)) = pending {
            token.cancel();
            if let Some(task) = task {
                let _ = task.await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Persist the durable trio. Failure is logged, never fatal: the
    /// in-memory effect stands, durability is degraded until the disk
    /// recovers.
    fn commit(&self, ledger: &SessionLedger, latch: &LatchState) {
        if let Err(err) = persist::save(&self.inner.state_path, ledger, latch) {
            warn!(error = %err, "failed to persist session state");
        }
    }

    fn snapshot(&self, state: &CoreState, pump_level: Option<f64>) -> StatusReport {
        let now = Utc::now();
        let (run_active, run_remaining_secs) = match &state.run {
            Some(active) => (
                Some(active.kind),
                Some(active.remaining_secs(Instant::now())),
            ),
            None if state.ledger.pump_run_start.is_some() => (Some(RunKind::Manual), None),
            None => (None, None),
        };
        StatusReport {
            service_up: self.inner.health.is_up(),
            pump_level,
            run_active,
            run_remaining_secs,
            session_remaining_secs: state.ledger.session_remaining_secs,
            banked_secs: state.ledger.banked_secs,
            latched: state.latch.active,
            latch_reason: state.latch.reason.clone(),
            latch_remaining_secs: state.latch.remaining_secs(now),
            owner_set: state.ledger.owner.is_some(),
            note: state.ledger.note.clone(),
        }
    }

    fn publish_status(&self, status: StatusReport) {
        self.inner.events.publish(CoreEvent::StatusChanged { status });
    }
}

fn ensure_wearer(ledger: &SessionLedger, actor: u64) -> Result<()> {
    if ledger.is_wearer(actor) {
        Ok(())
    } else {
        Err(CoreError::NotWearer)
    }
}

fn balance_of(ledger: &SessionLedger) -> BalanceChange {
    BalanceChange {
        session_remaining_secs: ledger.session_remaining_secs,
        banked_secs: ledger.banked_secs,
    }
}

/// Fold lazy consumption into the balance while the tracker keeps running.
fn commit_lazy_consumption(state: &mut CoreState) {
    if state.run.is_none() {
        state.ledger.commit_manual_run(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Session ticker
// ---------------------------------------------------------------------------

/// Once-a-second reconciliation loop: commits lazy manual consumption,
/// forces the pump off when the budget runs dry, and adopts a pump found
/// running with no tracker so it still burns budget.
async fn session_ticker(core: Core, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        core.reconcile_manual().await;
    }
}

impl Core {
    async fn reconcile_manual(&self) {
        // A managed run does its own accounting.
        {
            let guard = self.inner.state.lock().await;
            if guard.run.is_some() {
                return;
            }
        }

        let level = if self.inner.health.is_up() {
            self.inner.actuator.get_level().await.ok()
        } else {
            None
        };
        let physically_on = level.map(|l| l > 0.0);

        let mut guard = self.inner.state.lock().await;
        if guard.run.is_some() {
            return;
        }

        let mut force_off = false;
        let mut stopped = false;
        let mut adopted = false;
        let mut changed = false;

        if guard.ledger.pump_run_start.is_some() {
            let now = Utc::now();
            let consumed = guard.ledger.commit_manual_run(now);
            changed = consumed > 0;
            if guard.ledger.session_remaining_secs == 0 {
                // Budget ran dry while the pump was left on.
                guard.ledger.settle_manual_run(now);
                force_off = true;
                stopped = true;
            } else if physically_on == Some(false) {
                // Pump went off outside our control; stop tracking.
                guard.ledger.settle_manual_run(now);
                stopped = true;
            }
        } else if physically_on == Some(true) {
            if guard.latch.active || guard.ledger.session_remaining_secs == 0 {
                // Running against policy: push it off.
                force_off = true;
            } else {
                // Found running with no tracker (crash recovery or
                // out-of-band activation): adopt it so the budget burns.
                debug!("adopting untracked pump run");
                guard.ledger.start_manual_run(Utc::now());
                adopted = true;
            }
        }

        if changed || stopped || adopted {
            self.commit(&guard.ledger, &guard.latch);
        }
        let status = (force_off || stopped || adopted).then(|| self.snapshot(&guard, level));
        drop(guard);

        if force_off {
            warn!("forcing pump off");
            if let Err(err) = self.inner.actuator.set_level(0.0).await {
                warn!(error = %err, "failed to force pump off");
            }
        }
        if let Some(status) = status {
            self.publish_status(status);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
