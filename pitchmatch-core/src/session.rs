//! # Session Module
//!
//! Ties capture, estimation and matching together.
//!
//! - [`MatchSession`] is the synchronous pipeline for one session: each
//!   [`MatchSession::tick`] pulls the newest frame, estimates its pitch,
//!   applies the confidence gate and feeds the evaluator.
//! - [`PitchTrainer`] is what the presentation layer talks to. It owns at
//!   most one active session, drives it from a [`PeriodicScheduler`] and
//!   publishes a [`Snapshot`] after every tick. A capture failure ends the
//!   session from inside the tick and is published in the final snapshot.

use crate::audio::{CaptureHandle, SampleSource};
use crate::config::TrainerConfig;
use crate::error::{CaptureError, SessionError};
use crate::matcher::{FeedbackCategory, MatchEvaluator, MatchState};
use crate::notes::{self, NoteTarget};
use crate::pitch::{PitchEstimate, PitchEstimator};
use crate::playback::TonePlayer;
use crate::scheduler::PeriodicScheduler;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

/// Snapshots a subscriber may fall behind by before new ones are dropped.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Read-only view of a session, published after every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub target: Option<NoteTarget>,
    /// Last confident reading; cleared when a match is confirmed or a new
    /// target is selected.
    pub estimate: Option<PitchEstimate>,
    pub match_state: MatchState,
    pub feedback: FeedbackCategory,
    /// `estimate - target`, in Hz.
    pub deviation_hz: Option<f32>,
    /// `estimate` relative to `target`, in cents.
    pub cents: Option<f32>,
    /// Catalog note closest to `estimate`.
    pub nearest_note: Option<String>,
    /// Reference tone playback failed; target selection is blocked.
    pub playback_degraded: bool,
    /// The capture device failed mid-session and the session was ended.
    pub capture_error: Option<CaptureError>,
    /// Ticks processed since the session started.
    pub ticks: u64,
}

/// One capture session: owns the capture handle and all matching state.
pub struct MatchSession {
    capture: CaptureHandle,
    estimator: PitchEstimator,
    evaluator: MatchEvaluator,
    confidence_threshold: f32,
    latest_estimate: Option<PitchEstimate>,
    playback_degraded: bool,
    capture_error: Option<CaptureError>,
    ticks: u64,
}

impl MatchSession {
    /// Opens capture and creates an idle session.
    pub fn open(source: &dyn SampleSource, config: &TrainerConfig) -> Result<Self, CaptureError> {
        let capture = CaptureHandle::open(source, config.window_size)?;
        Ok(Self {
            capture,
            estimator: PitchEstimator::new(config.min_rms),
            evaluator: MatchEvaluator::new(config.tolerance_hz, config.hold_duration()),
            confidence_threshold: config.confidence_threshold,
            latest_estimate: None,
            playback_degraded: false,
            capture_error: None,
            ticks: 0,
        })
    }

    /// Runs one polling step at time `now`.
    ///
    /// Low-confidence frames leave the match state and the stored estimate
    /// untouched. A capture failure closes the session and is recorded in
    /// the snapshot. Does nothing once the session is closed.
    pub fn tick(&mut self, now: Instant) -> Snapshot {
        if !self.capture.is_open() {
            return self.snapshot();
        }
        self.ticks += 1;

        match self.capture.next_frame(now) {
            Ok(Some(frame)) => {
                let estimate = self.estimator.estimate(&frame);
                self.apply_estimate(estimate, now);
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("[SESSION] Capture failed, ending session: {}", err);
                self.capture.close();
                self.capture_error = Some(err);
            }
        }
        self.snapshot()
    }

    /// Confidence gate: only estimates at or above the threshold reach the
    /// evaluator or replace the stored estimate.
    fn apply_estimate(&mut self, estimate: PitchEstimate, now: Instant) {
        if estimate.confidence < self.confidence_threshold {
            return;
        }
        self.latest_estimate = Some(estimate);
        let evaluation = self.evaluator.evaluate(&estimate, now);
        if evaluation.clear_estimate {
            log::info!("[SESSION] Match confirmed");
            self.latest_estimate = None;
        }
    }

    /// Installs `target` and resets matching to `AwaitingMatch`.
    pub fn set_target(&mut self, target: NoteTarget) {
        log::info!("[SESSION] Target {} ({:.2} Hz)", target.name, target.frequency_hz);
        self.evaluator.set_target(target);
        self.latest_estimate = None;
    }

    pub fn latch_playback_degraded(&mut self) {
        self.playback_degraded = true;
    }

    pub fn playback_degraded(&self) -> bool {
        self.playback_degraded
    }

    pub fn is_open(&self) -> bool {
        self.capture.is_open()
    }

    /// Releases capture. Idempotent; later ticks are no-ops.
    pub fn close(&mut self) {
        self.capture.close();
    }

    pub fn snapshot(&self) -> Snapshot {
        let target = self.evaluator.target().cloned();
        let estimate = self.latest_estimate;
        let (deviation_hz, cents) = match (&target, &estimate) {
            (Some(t), Some(e)) => (
                Some(e.frequency_hz - t.frequency_hz),
                Some(notes::cents_deviation(e.frequency_hz, t.frequency_hz)),
            ),
            _ => (None, None),
        };
        Snapshot {
            target,
            estimate,
            match_state: self.evaluator.state(),
            feedback: self.evaluator.feedback(),
            deviation_hz,
            cents,
            nearest_note: estimate.map(|e| notes::nearest_note(e.frequency_hz).name.clone()),
            playback_degraded: self.playback_degraded,
            capture_error: self.capture_error.clone(),
            ticks: self.ticks,
        }
    }
}

/// The running session and the schedule driving it.
struct ActiveSession {
    session: Arc<Mutex<MatchSession>>,
    scheduler: PeriodicScheduler,
}

/// Entry point for the presentation layer.
///
/// Commands may be issued from any thread. Only one session may hold the
/// capture device at a time.
pub struct PitchTrainer {
    source: Arc<dyn SampleSource>,
    player: Arc<dyn TonePlayer>,
    config: TrainerConfig,
    active: Arc<Mutex<Option<ActiveSession>>>,
    subscribers: Arc<Mutex<Vec<Sender<Snapshot>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(subscribers: &Mutex<Vec<Sender<Snapshot>>>, snapshot: &Snapshot) {
    lock(subscribers).retain(|tx| match tx.try_send(snapshot.clone()) {
        Ok(()) | Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Disconnected(_)) => false,
    });
}

/// Clears the trainer's active session if it is still `session`, then stops
/// its schedule. Runs on the tick thread, so the cancel only signals.
fn end_failed_session(
    active: &Weak<Mutex<Option<ActiveSession>>>,
    session: &Arc<Mutex<MatchSession>>,
) {
    let Some(active) = active.upgrade() else {
        return;
    };
    let ended = {
        let mut active = lock(&active);
        let is_current = active
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.session, session));
        if is_current { active.take() } else { None }
    };
    if let Some(mut ended) = ended {
        ended.scheduler.cancel();
        log::warn!("[SESSION] Session ended after capture failure");
    }
}

impl PitchTrainer {
    pub fn new(
        source: Arc<dyn SampleSource>,
        player: Arc<dyn TonePlayer>,
        config: TrainerConfig,
    ) -> Self {
        Self {
            source,
            player,
            config,
            active: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Opens capture and starts the polling tick.
    ///
    /// Fails with [`SessionError::SessionAlreadyActive`] without touching the
    /// running session, or with the capture error if the microphone cannot
    /// be opened. Nothing stays acquired on failure.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            log::warn!("[SESSION] Start rejected: a session is already active");
            return Err(SessionError::SessionAlreadyActive);
        }

        let session = MatchSession::open(self.source.as_ref(), &self.config).map_err(|err| {
            log::error!("[SESSION] Could not start: {}", err);
            SessionError::from(err)
        })?;
        let session = Arc::new(Mutex::new(session));

        if self.config.select_on_start {
            self.install_target(&session, notes::random_target().clone())?;
        }

        let tick_session = Arc::clone(&session);
        let tick_active = Arc::downgrade(&self.active);
        let subscribers = Arc::clone(&self.subscribers);
        let scheduler = PeriodicScheduler::start(
            "pitchmatch-session",
            self.config.tick_period(),
            move || {
                let snapshot = lock(&tick_session).tick(Instant::now());
                if snapshot.capture_error.is_some() {
                    end_failed_session(&tick_active, &tick_session);
                }
                publish(&subscribers, &snapshot);
            },
        );
        let scheduler = match scheduler {
            Ok(scheduler) => scheduler,
            Err(err) => {
                lock(&session).close();
                log::error!("[SESSION] Could not start tick: {}", err);
                return Err(SessionError::Scheduler(err.to_string()));
            }
        };

        log::info!("[SESSION] Session started");
        *active = Some(ActiveSession { session, scheduler });
        Ok(())
    }

    /// Stops the active session, if any. Safe to call at any time and any
    /// number of times.
    pub fn stop(&self) {
        let Some(mut active) = lock(&self.active).take() else {
            return;
        };
        // Closing first turns any tick that still runs into a no-op.
        lock(&active.session).close();
        active.scheduler.cancel();
        log::info!("[SESSION] Session stopped");
    }

    /// Selects a random catalog note as the new target.
    pub fn select_random(&self) -> Result<NoteTarget, SessionError> {
        self.select(notes::random_target().clone())
    }

    /// Selects the catalog note called `name` as the new target.
    pub fn select_note(&self, name: &str) -> Result<NoteTarget, SessionError> {
        let target = notes::target_for_name(name)
            .ok_or_else(|| SessionError::UnknownNote(name.to_string()))?;
        self.select(target.clone())
    }

    /// The current session state, or `None` when no session is active.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let session = self.active_session().ok()?;
        let snapshot = lock(&session).snapshot();
        Some(snapshot)
    }

    /// Returns a channel that receives a snapshot after every tick and every
    /// target change. Slow receivers miss snapshots instead of stalling ticks.
    pub fn subscribe(&self) -> Receiver<Snapshot> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_CAPACITY);
        lock(&self.subscribers).push(tx);
        rx
    }

    fn active_session(&self) -> Result<Arc<Mutex<MatchSession>>, SessionError> {
        lock(&self.active)
            .as_ref()
            .map(|active| Arc::clone(&active.session))
            .ok_or(SessionError::NotActive)
    }

    fn select(&self, target: NoteTarget) -> Result<NoteTarget, SessionError> {
        let session = self.active_session()?;
        {
            let session = lock(&session);
            // A concurrent stop may have closed it after the lookup.
            if !session.is_open() {
                return Err(SessionError::NotActive);
            }
            if session.playback_degraded() {
                return Err(SessionError::PlaybackDegraded);
            }
        }
        self.install_target(&session, target.clone())?;
        Ok(target)
    }

    /// Sets the target, then plays its cue without holding the session lock.
    fn install_target(
        &self,
        session: &Mutex<MatchSession>,
        target: NoteTarget,
    ) -> Result<(), SessionError> {
        {
            let mut session = lock(session);
            if !session.is_open() {
                return Err(SessionError::NotActive);
            }
            session.set_target(target.clone());
        }

        if self.config.play_reference_tone {
            if let Err(err) = self.player.play(&target) {
                log::warn!("[SESSION] {}; target selection disabled until restart", err);
                lock(session).latch_playback_degraded();
            }
        }

        let snapshot = lock(session).snapshot();
        publish(&self.subscribers, &snapshot);
        Ok(())
    }
}

impl Drop for PitchTrainer {
    fn drop(&mut self) {
        self.stop();
    }
}
