//! # Error Types
//!
//! Typed failures surfaced by the capture device, the tone player and the
//! trainer. Low-confidence frames are not errors and never appear here.

use thiserror::Error;

/// Failure to open the microphone capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The platform has no usable audio input.
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),
    /// The user or the OS refused microphone access.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
}

/// Failure reported by the reference tone collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reference tone playback failed: {0}")]
pub struct PlaybackError(pub String);

/// Errors returned by [`crate::session::PitchTrainer`] commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Capture could not be opened; the attempted session was torn down.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// A session already holds the capture device.
    #[error("a session is already active; stop it before starting another")]
    SessionAlreadyActive,
    /// Reference tone playback failed earlier in this session; target
    /// selection stays blocked until the session is restarted.
    #[error("reference tone playback degraded; restart the session to select targets")]
    PlaybackDegraded,
    /// The command needs a running session.
    #[error("no active session")]
    NotActive,
    /// `select_note` was given a name outside the catalog.
    #[error("unknown note: {0}")]
    UnknownNote(String),
    /// The tick thread could not be spawned; capture was released.
    #[error("failed to start session tick: {0}")]
    Scheduler(String),
}
