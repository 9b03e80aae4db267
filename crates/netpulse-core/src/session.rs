//! Session controller
//!
//! The controller owns the session state, the measurement log and the error
//! counter, and is the only thing that mutates them. Starting a session spawns
//! a tick loop; each tick runs the [`Scheduler`] decision and launches probe
//! and sample tasks that report back through the controller.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  start   ┌─────────┐  stop / duration elapsed  ┌─────────┐
//! │ Idle │ ───────► │ Running │ ────────────────────────► │ Stopped │
//! └──────┘          └─────────┘                           └─────────┘
//!                        ▲               start                 │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! Records are accepted only while the session that issued them is running.
//! Probes still pending at stop are left to finish and their results are
//! dropped; the in-flight sample, if any, is cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{SessionConfig, TransportConfig};
use crate::error::Result;
use crate::export::ExportRow;
use crate::log::{MeasurementLog, SessionStats};
use crate::probe::LatencyProber;
use crate::record::{HistoryPoint, Measurement, MeasurementStatus};
use crate::sampler::{DownloadProgress, ThroughputSampler};
use crate::scheduler::{SampleSlot, SampleTicket, Scheduler, TickPlan};
use crate::transport::{DownloadSource, HttpTransport, ProbeTransport};

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserRequested,
    DurationElapsed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user_requested"),
            Self::DurationElapsed => write!(f, "duration_elapsed"),
        }
    }
}

/// Lifecycle state of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running {
        session_id: Uuid,
        started_at: Instant,
        ends_at: Instant,
        started_wall: DateTime<Utc>,
    },
    Stopped {
        session_id: Uuid,
        reason: StopReason,
    },
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::Idle => None,
            Self::Running { session_id, .. } | Self::Stopped { session_id, .. } => {
                Some(*session_id)
            }
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::Stopped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    fn is_running_session(&self, id: Uuid) -> bool {
        matches!(self, Self::Running { session_id, .. } if *session_id == id)
    }
}

struct SessionCore {
    state: SessionState,
    log: MeasurementLog,
    probe_errors: u64,
    /// Records accepted since start, including evicted ones
    appended: u64,
    cancel: CancellationToken,
}

struct Shared {
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
    slot: SampleSlot,
}

impl Shared {
    /// Append a record if its session is still running
    fn record(&self, session_id: Uuid, measurement: Measurement) -> bool {
        let mut core = self.core.lock();
        if !core.state.is_running_session(session_id) {
            trace!(%session_id, kind = %measurement.kind(), "Dropping record for inactive session");
            return false;
        }

        if let Measurement::Probe(probe) = &measurement {
            if probe.status == MeasurementStatus::Error {
                core.probe_errors += 1;
            }
        }
        core.log.append(measurement);
        core.appended += 1;
        true
    }

    /// Running -> Stopped; no-op in any other state
    fn stop(&self, reason: StopReason) -> bool {
        let mut core = self.core.lock();
        let session_id = match core.state {
            SessionState::Running { session_id, .. } => session_id,
            _ => return false,
        };

        core.cancel.cancel();
        let sample_cancelled = self.slot.cancel_in_flight();
        core.state = SessionState::Stopped { session_id, reason };
        self.state_tx.send_replace(core.state.clone());

        info!(
            %session_id,
            %reason,
            records = core.log.len(),
            sample_cancelled,
            "Session stopped"
        );
        true
    }
}

/// Top-level controller of monitoring sessions
pub struct SessionController {
    shared: Arc<Shared>,
    prober: LatencyProber,
    sampler: ThroughputSampler,
    clock: Arc<dyn Clock>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        probe_transport: Arc<dyn ProbeTransport>,
        download_source: Arc<dyn DownloadSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let shared = Arc::new(Shared {
            core: Mutex::new(SessionCore {
                state: SessionState::Idle,
                log: MeasurementLog::new(),
                probe_errors: 0,
                appended: 0,
                cancel: CancellationToken::new(),
            }),
            state_tx,
            slot: SampleSlot::new(),
        });

        Self {
            shared,
            prober: LatencyProber::new(probe_transport, Arc::clone(&clock)),
            sampler: ThroughputSampler::new(download_source, Arc::clone(&clock)),
            clock,
            tick_task: Mutex::new(None),
        }
    }

    /// Controller backed by the reqwest transport and the system clock
    pub fn http(config: &TransportConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(
            transport.clone(),
            transport,
            Arc::new(SystemClock),
        ))
    }

    /// Start a fresh session
    ///
    /// Fails with `InvalidConfig` without touching the current state. A
    /// running session is stopped first. The log and error counter are reset
    /// and the first tick fires immediately.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all)]
    pub fn start(&self, config: SessionConfig) -> Result<Uuid> {
        config.validate()?;
        self.shared.stop(StopReason::UserRequested);

        let session_id = Uuid::now_v7();
        let started_at = self.clock.now();
        let scheduler = Scheduler::new(started_at, &config);
        let cancel = CancellationToken::new();

        {
            let mut core = self.shared.core.lock();
            core.log.clear();
            core.probe_errors = 0;
            core.appended = 0;
            core.cancel = cancel.clone();
            core.state = SessionState::Running {
                session_id,
                started_at,
                ends_at: scheduler.ends_at(),
                started_wall: self.clock.wall_time(),
            };
            self.shared.state_tx.send_replace(core.state.clone());
        }

        info!(
            %session_id,
            duration_secs = config.duration.as_secs(),
            ping_interval_secs = config.ping_interval.as_secs(),
            speed_interval_secs = config.speed_interval.as_secs(),
            ping_target = %config.ping_target,
            download_target = %config.download_target,
            "Session started"
        );

        let tick_loop = TickLoop {
            session_id,
            config,
            scheduler,
            cancel,
            shared: Arc::clone(&self.shared),
            prober: self.prober.clone(),
            sampler: self.sampler.clone(),
            clock: Arc::clone(&self.clock),
        };
        let handle = tokio::spawn(tick_loop.run());
        if let Some(previous) = self.tick_task.lock().replace(handle) {
            // Already cancelled by the stop above
            previous.abort();
        }

        Ok(session_id)
    }

    /// Stop the running session; returns whether a transition happened
    pub fn stop(&self, reason: StopReason) -> bool {
        self.shared.stop(reason)
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.core.lock().state.is_running()
    }

    /// Time since the running session started
    pub fn elapsed(&self) -> Option<Duration> {
        match self.shared.core.lock().state {
            SessionState::Running { started_at, .. } => {
                Some(self.clock.now().saturating_duration_since(started_at))
            }
            _ => None,
        }
    }

    pub fn sample_in_flight(&self) -> bool {
        self.shared.slot.is_in_flight()
    }

    /// Failed probes accepted since the session started
    pub fn probe_errors(&self) -> u64 {
        self.shared.core.lock().probe_errors
    }

    /// Read the log without copying it
    pub fn with_log<R>(&self, f: impl FnOnce(&MeasurementLog) -> R) -> R {
        f(&self.shared.core.lock().log)
    }

    pub fn log_snapshot(&self) -> Vec<Measurement> {
        self.with_log(MeasurementLog::to_vec)
    }

    pub fn stats(&self) -> SessionStats {
        self.with_log(MeasurementLog::compute_stats)
    }

    pub fn export_rows(&self) -> Vec<ExportRow> {
        self.with_log(MeasurementLog::export_rows)
    }

    /// Records appended after `cursor`, plus the cursor to pass next time
    ///
    /// Cursors count every accepted record since start, so they stay valid
    /// when old entries are evicted. Evicted records are skipped.
    pub fn records_since(&self, cursor: u64) -> (u64, Vec<Measurement>) {
        let core = self.shared.core.lock();
        let first_retained = core.appended - core.log.len() as u64;
        let skip = cursor.saturating_sub(first_retained) as usize;
        let records = core.log.iter().skip(skip).cloned().collect();
        (core.appended, records)
    }

    /// History of the sample at `index` in the log
    pub fn sample_history(&self, index: usize) -> Option<Vec<HistoryPoint>> {
        self.with_log(|log| log.sample_history(index).map(<[HistoryPoint]>::to_vec))
    }

    /// Live progress of the current download
    pub fn progress(&self) -> watch::Receiver<DownloadProgress> {
        self.sampler.subscribe()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the current session stops; `None` if no session was started
    pub async fn wait_until_stopped(&self) -> Option<StopReason> {
        let mut rx = self.subscribe();
        let state = rx.wait_for(|state| !state.is_running()).await.ok()?;
        state.stop_reason()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shared.stop(StopReason::UserRequested);
        if let Some(handle) = self.tick_task.lock().take() {
            handle.abort();
        }
    }
}

struct TickLoop {
    session_id: Uuid,
    config: SessionConfig,
    scheduler: Scheduler,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    prober: LatencyProber,
    sampler: ThroughputSampler,
    clock: Arc<dyn Clock>,
}

impl TickLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep_until(self.scheduler.ends_at());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = &mut deadline => {
                    self.expire();
                    break;
                }
                _ = ticker.tick() => {}
            }

            if !self.tick() {
                break;
            }
        }

        debug!(session_id = %self.session_id, "Tick loop exited");
    }

    /// Process one tick; returns false once the session has ended
    fn tick(&mut self) -> bool {
        let now = self.clock.now();

        match self.scheduler.plan(now) {
            TickPlan::Expire => {
                self.expire();
                false
            }
            TickPlan::Measure { sample_due } => {
                self.spawn_probe();

                if sample_due {
                    match self.shared.slot.try_begin(&self.cancel) {
                        Some(ticket) => {
                            self.scheduler.mark_sample_launched(now);
                            self.spawn_sample(ticket);
                        }
                        None => {
                            debug!(session_id = %self.session_id, "Sample due but one is in flight, skipping tick")
                        }
                    }
                }
                true
            }
        }
    }

    fn expire(&self) {
        info!(session_id = %self.session_id, "Session duration elapsed");
        self.shared.stop(StopReason::DurationElapsed);
    }

    fn spawn_probe(&self) {
        let prober = self.prober.clone();
        let shared = Arc::clone(&self.shared);
        let target = self.config.ping_target.clone();
        let session_id = self.session_id;

        tokio::spawn(async move {
            let record = prober.probe(&target).await;
            shared.record(session_id, record.into());
        });
    }

    fn spawn_sample(&self, ticket: SampleTicket) {
        let sampler = self.sampler.clone();
        let shared = Arc::clone(&self.shared);
        let target = self.config.download_target.clone();
        let session_id = self.session_id;

        tokio::spawn(async move {
            if let Some(record) = sampler.sample(&target, ticket.token()).await {
                shared.record(session_id, record.into());
            }
            drop(ticket);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::transport::Download;
    use async_trait::async_trait;
    use url::Url;

    struct InstantTransport;

    #[async_trait]
    impl ProbeTransport for InstantTransport {
        async fn round_trip(&self, _url: &Url) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl DownloadSource for InstantTransport {
        async fn open(&self, _url: &Url) -> Result<Download> {
            Err(MonitorError::HttpStatus(404))
        }
    }

    fn controller() -> SessionController {
        let transport = Arc::new(InstantTransport);
        SessionController::new(transport.clone(), transport, Arc::new(SystemClock))
    }

    #[test]
    fn test_initial_state() {
        let controller = controller();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.elapsed().is_none());
        assert!(!controller.stop(StopReason::UserRequested));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_config_creates_no_session() {
        let controller = controller();
        let config = SessionConfig::default().with_ping_interval(Duration::ZERO);

        let err = controller.start(config).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidConfig(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let controller = controller();
        let id = controller.start(SessionConfig::default()).unwrap();
        assert!(controller.is_running());

        assert!(controller.stop(StopReason::UserRequested));
        assert!(!controller.stop(StopReason::DurationElapsed));
        assert_eq!(
            controller.state(),
            SessionState::Stopped {
                session_id: id,
                reason: StopReason::UserRequested
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_after_stop_are_dropped() {
        let controller = controller();
        let id = controller.start(SessionConfig::default()).unwrap();
        controller.stop(StopReason::UserRequested);
        let before = controller.with_log(MeasurementLog::len);

        let probe = crate::record::ProbeRecord::error(Utc::now(), "00:00:00".to_string());
        assert!(!controller.shared.record(id, probe.into()));
        assert_eq!(controller.with_log(MeasurementLog::len), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_log_and_errors() {
        let controller = controller();
        let first = controller.start(SessionConfig::default()).unwrap();
        let probe = crate::record::ProbeRecord::error(Utc::now(), "00:00:00".to_string());
        assert!(controller.shared.record(first, probe.clone().into()));
        assert!(controller.probe_errors() >= 1);

        let second = controller.start(SessionConfig::default()).unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.probe_errors(), 0);
        assert!(!controller.shared.record(first, probe.into()));
        assert_eq!(controller.with_log(MeasurementLog::len), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_since_cursor() {
        let controller = controller();
        let id = controller.start(SessionConfig::default()).unwrap();
        controller.with_log(|log| assert!(log.is_empty()));

        let probe = crate::record::ProbeRecord::ok(Utc::now(), "00:00:00".to_string(), 12);
        controller.shared.record(id, probe.clone().into());
        controller.shared.record(id, probe.clone().into());

        let (cursor, records) = controller.records_since(0);
        assert_eq!(cursor, 2);
        assert_eq!(records.len(), 2);

        controller.shared.record(id, probe.into());
        let (cursor, records) = controller.records_since(cursor);
        assert_eq!(cursor, 3);
        assert_eq!(records.len(), 1);
        assert!(controller.records_since(cursor).1.is_empty());
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::UserRequested.to_string(), "user_requested");
        assert_eq!(StopReason::DurationElapsed.to_string(), "duration_elapsed");
    }
}
