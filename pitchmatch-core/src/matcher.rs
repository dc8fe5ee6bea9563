//! # Match Evaluation Module
//!
//! Decides whether the singer is on the target note. A reading inside the
//! tolerance band starts a hold timer; the match is confirmed only once the
//! reading has stayed inside the band for the full hold duration. Any reading
//! outside the band clears the timer, so short spikes and octave jumps never
//! confirm a match.

use crate::notes::NoteTarget;
use crate::pitch::PitchEstimate;
use std::time::{Duration, Instant};

/// Matching progress for the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// No target selected.
    Idle,
    /// Target selected; no reading yet, or the last one was out of tolerance.
    AwaitingMatch,
    /// Readings have been in tolerance continuously since `start`.
    Holding { start: Instant },
    /// Held long enough. Terminal until a new target is selected.
    Confirmed,
}

/// Feedback shown to the singer after each evaluated reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCategory {
    /// Nothing to report (no target yet).
    None,
    /// A target was just selected; sing it.
    SingTarget,
    TooHigh,
    TooLow,
    MatchStarted,
    MatchInProgress,
    MatchConfirmed,
}

/// Outcome of feeding one estimate to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: MatchState,
    pub feedback: FeedbackCategory,
    /// The reading completed a hold; the caller drops its stored estimate so
    /// the next transition needs a fresh one.
    pub clear_estimate: bool,
}

/// Tolerance and hold-duration state machine for a single target.
#[derive(Debug, Clone)]
pub struct MatchEvaluator {
    tolerance_hz: f32,
    hold_duration: Duration,
    target: Option<NoteTarget>,
    state: MatchState,
    feedback: FeedbackCategory,
}

impl MatchEvaluator {
    pub fn new(tolerance_hz: f32, hold_duration: Duration) -> Self {
        Self {
            tolerance_hz,
            hold_duration,
            target: None,
            state: MatchState::Idle,
            feedback: FeedbackCategory::None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn feedback(&self) -> FeedbackCategory {
        self.feedback
    }

    pub fn target(&self) -> Option<&NoteTarget> {
        self.target.as_ref()
    }

    /// Installs a new target and restarts matching from any state.
    pub fn set_target(&mut self, target: NoteTarget) {
        log::debug!("[MATCH] New target {} ({:.2} Hz)", target.name, target.frequency_hz);
        self.target = Some(target);
        self.state = MatchState::AwaitingMatch;
        self.feedback = FeedbackCategory::SingTarget;
    }

    /// Feeds one confident estimate taken at `now`.
    ///
    /// Callers gate on confidence first; every estimate passed here counts as
    /// a measurement.
    pub fn evaluate(&mut self, estimate: &PitchEstimate, now: Instant) -> Evaluation {
        let (state, feedback, clear_estimate) = match (&self.target, self.state) {
            (None, _) | (_, MatchState::Idle) | (_, MatchState::Confirmed) => {
                (self.state, self.feedback, false)
            }
            (Some(target), current) => {
                let diff = estimate.frequency_hz - target.frequency_hz;
                self.transition(current, diff, now)
            }
        };

        if state != self.state {
            log::debug!("[MATCH] {:?} -> {:?} ({:?})", self.state, state, feedback);
        }
        self.state = state;
        self.feedback = feedback;
        Evaluation {
            state,
            feedback,
            clear_estimate,
        }
    }

    /// The transition function for an active target.
    fn transition(
        &self,
        current: MatchState,
        diff: f32,
        now: Instant,
    ) -> (MatchState, FeedbackCategory, bool) {
        if diff > self.tolerance_hz {
            return (MatchState::AwaitingMatch, FeedbackCategory::TooHigh, false);
        }
        if diff < -self.tolerance_hz {
            return (MatchState::AwaitingMatch, FeedbackCategory::TooLow, false);
        }
        match current {
            MatchState::Holding { start } => {
                if now.saturating_duration_since(start) >= self.hold_duration {
                    (MatchState::Confirmed, FeedbackCategory::MatchConfirmed, true)
                } else {
                    (current, FeedbackCategory::MatchInProgress, false)
                }
            }
            _ => (
                MatchState::Holding { start: now },
                FeedbackCategory::MatchStarted,
                false,
            ),
        }
    }
}
