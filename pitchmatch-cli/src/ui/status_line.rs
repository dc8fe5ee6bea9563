//! # Status Line
//!
//! Formats a session snapshot as one line of text for the terminal.

use pitchmatch_core::{FeedbackCategory, MatchState, Snapshot};

use super::deviation_meter::DeviationMeter;

/// Text shown for each feedback category.
pub fn feedback_text(feedback: FeedbackCategory, target: Option<&str>) -> String {
    match feedback {
        FeedbackCategory::None => "Pick a note to start".to_string(),
        FeedbackCategory::SingTarget => match target {
            Some(name) => format!("Sing {}", name),
            None => "Sing the note".to_string(),
        },
        FeedbackCategory::TooHigh => "Too high".to_string(),
        FeedbackCategory::TooLow => "Too low".to_string(),
        FeedbackCategory::MatchStarted => "On pitch, hold it...".to_string(),
        FeedbackCategory::MatchInProgress => "Holding...".to_string(),
        FeedbackCategory::MatchConfirmed => "Correct!".to_string(),
    }
}

fn state_label(state: &MatchState) -> &'static str {
    match state {
        MatchState::Idle => "idle",
        MatchState::AwaitingMatch => "waiting",
        MatchState::Holding { .. } => "holding",
        MatchState::Confirmed => "matched",
    }
}

/// Renders `snapshot` as a single status line.
pub fn render(snapshot: &Snapshot, tolerance_hz: f32) -> String {
    let target = snapshot
        .target
        .as_ref()
        .map(|t| format!("{} ({:.2} Hz)", t.name, t.frequency_hz))
        .unwrap_or_else(|| "N/A".to_string());
    let reading = match snapshot.estimate {
        Some(e) => format!("{:>7.2} Hz{}", e.frequency_hz, deviation_text(snapshot)),
        None => "  sing...".to_string(),
    };
    let meter = DeviationMeter::new(snapshot.deviation_hz, tolerance_hz).render();
    let feedback = feedback_text(
        snapshot.feedback,
        snapshot.target.as_ref().map(|t| t.name.as_str()),
    );

    let mut line = format!(
        "target {} | you {} {} | {:<7} | {}",
        target,
        reading,
        meter,
        state_label(&snapshot.match_state),
        feedback
    );
    if snapshot.playback_degraded {
        line.push_str(" | tone playback failed: restart to pick notes");
    }
    if let Some(err) = &snapshot.capture_error {
        line.push_str(&format!(" | session ended: {}", err));
    }
    line
}

/// Cents from the target and the nearest catalog note, e.g. ` (+38.9c, A4)`.
fn deviation_text(snapshot: &Snapshot) -> String {
    match (snapshot.cents, &snapshot.nearest_note) {
        (Some(cents), Some(note)) => format!(" ({:+.1}c, {})", cents, note),
        (Some(cents), None) => format!(" ({:+.1}c)", cents),
        (None, Some(note)) => format!(" ({})", note),
        (None, None) => String::new(),
    }
}
