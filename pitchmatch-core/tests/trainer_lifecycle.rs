//! Lifecycle tests for `PitchTrainer`, driven by a scripted capture device
//! and a recording tone player. No audio hardware is touched.

use pitchmatch_core::audio::{CaptureDevice, SampleSource};
use pitchmatch_core::config::TrainerConfig;
use pitchmatch_core::error::{CaptureError, PlaybackError, SessionError};
use pitchmatch_core::matcher::{FeedbackCategory, MatchState};
use pitchmatch_core::notes::NoteTarget;
use pitchmatch_core::playback::TonePlayer;
use pitchmatch_core::session::{PitchTrainer, Snapshot};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const RATE: u32 = 48_000;

fn sine_window(freq: f32) -> Vec<f32> {
    (0..2048)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
        .collect()
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    released: AtomicUsize,
    pulls: AtomicUsize,
}

/// Always offers a fresh copy of the current tone until unplugged.
struct ToneDevice {
    tone: Arc<Mutex<Vec<f32>>>,
    unplugged: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl CaptureDevice for ToneDevice {
    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn latest_window(&mut self) -> Result<Option<Vec<f32>>, CaptureError> {
        self.counters.pulls.fetch_add(1, Ordering::SeqCst);
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable("input device disconnected".into()));
        }
        Ok(Some(self.tone.lock().unwrap().clone()))
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct ToneSource {
    tone: Arc<Mutex<Vec<f32>>>,
    unplugged: Arc<AtomicBool>,
    counters: Arc<Counters>,
    refuse: AtomicBool,
}

impl ToneSource {
    fn new(freq: f32) -> Arc<Self> {
        Arc::new(Self {
            tone: Arc::new(Mutex::new(sine_window(freq))),
            unplugged: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            refuse: AtomicBool::new(false),
        })
    }

    fn set_tone(&self, freq: f32) {
        *self.tone.lock().unwrap() = sine_window(freq);
    }

    fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    fn pulls(&self) -> usize {
        self.counters.pulls.load(Ordering::SeqCst)
    }
}

impl SampleSource for ToneSource {
    fn open(&self, _window_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("microphone blocked".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ToneDevice {
            tone: Arc::clone(&self.tone),
            unplugged: Arc::clone(&self.unplugged),
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[derive(Default)]
struct RecordingPlayer {
    played: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl TonePlayer for RecordingPlayer {
    fn play(&self, note: &NoteTarget) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push(note.name.clone());
        if self.fail.load(Ordering::SeqCst) {
            Err(PlaybackError("speaker unplugged".into()))
        } else {
            Ok(())
        }
    }
}

fn test_config() -> TrainerConfig {
    TrainerConfig {
        tick_rate_hz: 200.0,
        hold_duration_ms: 100,
        select_on_start: false,
        ..TrainerConfig::default()
    }
}

fn trainer(source: &Arc<ToneSource>, player: &Arc<RecordingPlayer>, config: TrainerConfig) -> PitchTrainer {
    PitchTrainer::new(source.clone(), player.clone(), config)
}

/// Polls snapshots until `predicate` holds or two seconds pass.
fn wait_for(trainer: &PitchTrainer, predicate: impl Fn(&Snapshot) -> bool) -> Snapshot {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = trainer.snapshot().expect("session not active");
        if predicate(&snapshot) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "timed out; last snapshot {:?}", snapshot);
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn start_ticks_and_stop_releases_once() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());

    trainer.start().unwrap();
    assert!(trainer.is_active());
    let snapshot = wait_for(&trainer, |s| s.ticks >= 3);
    assert_eq!(snapshot.match_state, MatchState::Idle);
    assert_eq!(snapshot.feedback, FeedbackCategory::None);
    assert!(snapshot.target.is_none());
    // The displayed reading still follows the voice without a target.
    assert!(snapshot.estimate.is_some());

    trainer.stop();
    assert!(!trainer.is_active());
    assert!(trainer.snapshot().is_none());
    assert_eq!(source.released(), 1);

    let pulls = source.pulls();
    thread::sleep(Duration::from_millis(40));
    assert_eq!(source.pulls(), pulls, "ticks continued after stop");

    trainer.stop();
    drop(trainer);
    assert_eq!(source.released(), 1);
}

#[test]
fn stop_mid_hold_releases_capture_exactly_once() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(
        &source,
        &player,
        TrainerConfig {
            hold_duration_ms: 60_000,
            ..test_config()
        },
    );

    trainer.start().unwrap();
    trainer.select_note("A4").unwrap();
    wait_for(&trainer, |s| matches!(s.match_state, MatchState::Holding { .. }));

    trainer.stop();
    assert_eq!(source.released(), 1);
    let pulls = source.pulls();
    thread::sleep(Duration::from_millis(40));
    assert_eq!(source.pulls(), pulls);

    drop(trainer);
    assert_eq!(source.released(), 1);
}

#[test]
fn dropping_an_active_trainer_releases_capture() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());
    trainer.start().unwrap();
    drop(trainer);
    assert_eq!(source.released(), 1);
}

#[test]
fn sustained_tone_is_confirmed_through_the_scheduler() {
    let source = ToneSource::new(392.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());
    let updates = trainer.subscribe();

    trainer.start().unwrap();
    let target = trainer.select_note("G4").unwrap();
    assert_eq!(target.frequency_hz, 392.0);
    assert_eq!(*player.played.lock().unwrap(), vec!["G4".to_string()]);

    // Drain updates as they arrive so the bounded channel never fills.
    let confirmed = loop {
        let snapshot = updates
            .recv_timeout(Duration::from_secs(2))
            .expect("no snapshot within two seconds");
        if snapshot.match_state == MatchState::Confirmed {
            break snapshot;
        }
    };
    assert_eq!(confirmed.feedback, FeedbackCategory::MatchConfirmed);
    assert!(confirmed.estimate.is_none());
    assert_eq!(confirmed.target.unwrap().name, "G4");
    trainer.stop();
}

#[test]
fn off_key_singing_reports_direction() {
    let source = ToneSource::new(480.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());

    trainer.start().unwrap();
    trainer.select_note("A4").unwrap();
    let snapshot = wait_for(&trainer, |s| s.feedback == FeedbackCategory::TooHigh);
    assert_eq!(snapshot.match_state, MatchState::AwaitingMatch);

    source.set_tone(400.0);
    wait_for(&trainer, |s| s.feedback == FeedbackCategory::TooLow);
    trainer.stop();
}

#[test]
fn second_start_is_rejected_and_first_session_keeps_running() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());

    trainer.start().unwrap();
    trainer.select_note("B3").unwrap();
    let before = trainer.snapshot().unwrap();

    assert_eq!(trainer.start(), Err(SessionError::SessionAlreadyActive));
    assert_eq!(source.counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(source.released(), 0);

    let after = wait_for(&trainer, |s| s.ticks > before.ticks);
    assert_eq!(after.target, before.target);
    trainer.stop();
}

#[test]
fn capture_failure_is_reported_and_leaves_no_session() {
    let source = ToneSource::new(440.0);
    source.refuse.store(true, Ordering::SeqCst);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());

    assert_eq!(
        trainer.start(),
        Err(SessionError::Capture(CaptureError::PermissionDenied(
            "microphone blocked".into()
        )))
    );
    assert!(!trainer.is_active());
    assert_eq!(trainer.select_random(), Err(SessionError::NotActive));

    // The user grants access and starts again.
    source.refuse.store(false, Ordering::SeqCst);
    trainer.start().unwrap();
    trainer.stop();
    assert_eq!(source.released(), 1);
}

#[test]
fn device_lost_mid_session_ends_the_session() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());
    let updates = trainer.subscribe();

    trainer.start().unwrap();
    trainer.select_note("A4").unwrap();
    wait_for(&trainer, |s| matches!(s.match_state, MatchState::Holding { .. }));

    source.unplugged.store(true, Ordering::SeqCst);
    let failed = loop {
        let snapshot = updates
            .recv_timeout(Duration::from_secs(2))
            .expect("no snapshot within two seconds");
        if snapshot.capture_error.is_some() {
            break snapshot;
        }
    };
    assert_eq!(
        failed.capture_error,
        Some(CaptureError::Unavailable("input device disconnected".into()))
    );
    assert!(!trainer.is_active());
    assert!(trainer.snapshot().is_none());
    assert_eq!(source.released(), 1);
    assert_eq!(trainer.select_random(), Err(SessionError::NotActive));

    let pulls = source.pulls();
    thread::sleep(Duration::from_millis(40));
    assert_eq!(source.pulls(), pulls, "ticks continued after the failure");

    // Plugging the device back in allows a fresh session.
    source.unplugged.store(false, Ordering::SeqCst);
    trainer.start().unwrap();
    assert!(trainer.snapshot().unwrap().capture_error.is_none());
    trainer.stop();
    assert_eq!(source.released(), 2);
}

#[test]
fn playback_failure_latches_until_restart() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    player.fail.store(true, Ordering::SeqCst);
    let trainer = trainer(&source, &player, test_config());

    trainer.start().unwrap();
    // The selection itself goes through; evaluation keeps running.
    trainer.select_note("A4").unwrap();
    let snapshot = wait_for(&trainer, |s| matches!(s.match_state, MatchState::Holding { .. }));
    assert!(snapshot.playback_degraded);

    assert_eq!(trainer.select_random(), Err(SessionError::PlaybackDegraded));
    assert_eq!(trainer.select_note("C3"), Err(SessionError::PlaybackDegraded));
    assert_eq!(trainer.snapshot().unwrap().target.unwrap().name, "A4");

    player.fail.store(false, Ordering::SeqCst);
    trainer.stop();
    trainer.start().unwrap();
    assert!(!trainer.snapshot().unwrap().playback_degraded);
    assert!(trainer.select_note("C3").is_ok());
    trainer.stop();
}

#[test]
fn unknown_note_is_rejected_without_changing_target() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(&source, &player, test_config());

    assert_eq!(trainer.select_note("A4"), Err(SessionError::NotActive));
    trainer.start().unwrap();
    trainer.select_note("A4").unwrap();
    assert_eq!(
        trainer.select_note("A#4"),
        Err(SessionError::UnknownNote("A#4".into()))
    );
    assert_eq!(trainer.snapshot().unwrap().target.unwrap().name, "A4");
    trainer.stop();
}

#[test]
fn start_can_pick_a_target_and_cue_it() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    let trainer = trainer(
        &source,
        &player,
        TrainerConfig {
            select_on_start: true,
            ..test_config()
        },
    );

    trainer.start().unwrap();
    let snapshot = trainer.snapshot().unwrap();
    let target = snapshot.target.expect("no target selected on start");
    assert_eq!(*player.played.lock().unwrap(), vec![target.name.clone()]);
    assert_eq!(snapshot.feedback, FeedbackCategory::SingTarget);
    trainer.stop();
}

#[test]
fn reference_tone_can_be_disabled() {
    let source = ToneSource::new(440.0);
    let player = Arc::new(RecordingPlayer::default());
    player.fail.store(true, Ordering::SeqCst);
    let trainer = trainer(
        &source,
        &player,
        TrainerConfig {
            play_reference_tone: false,
            ..test_config()
        },
    );

    trainer.start().unwrap();
    trainer.select_random().unwrap();
    trainer.select_random().unwrap();
    assert!(player.played.lock().unwrap().is_empty());
    trainer.stop();
}
