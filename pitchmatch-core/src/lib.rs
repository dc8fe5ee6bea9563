// pitchmatch-core/src/lib.rs

//! The core logic for the pitch-matching trainer.
//! This crate captures microphone audio, estimates the pitch of the
//! singer's voice and decides when a target note has been held long enough.
//! It is completely headless and contains no presentation code.

pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod matcher;
pub mod notes;
pub mod pitch;
pub mod playback;
pub mod scheduler;
pub mod session;

pub use config::TrainerConfig;
pub use error::{CaptureError, PlaybackError, SessionError};
pub use matcher::{FeedbackCategory, MatchState};
pub use notes::NoteTarget;
pub use pitch::PitchEstimate;
pub use session::{PitchTrainer, Snapshot};
