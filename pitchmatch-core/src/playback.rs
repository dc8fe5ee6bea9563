//! # Reference Tone Playback
//!
//! Plays the selected target so the singer can hear it. The trainer only
//! cares whether playback could be started; it never waits for the tone to
//! finish.

use crate::error::PlaybackError;
use crate::notes::NoteTarget;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::thread;
use std::time::Duration;

/// Peak amplitude of the generated tone.
const TONE_AMPLITUDE: f32 = 0.2;
/// Fade-in/fade-out length to avoid clicks.
const FADE_SECONDS: f32 = 0.02;

/// Plays a cue for a target note.
pub trait TonePlayer: Send + Sync {
    /// Starts playing `note` and returns once playback has begun.
    fn play(&self, note: &NoteTarget) -> Result<(), PlaybackError>;
}

/// A player that plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl TonePlayer for SilentPlayer {
    fn play(&self, _note: &NoteTarget) -> Result<(), PlaybackError> {
        Ok(())
    }
}

/// Plays a sine at the target frequency on the default output device.
#[derive(Debug, Clone, Copy)]
pub struct SinePlayer {
    pub duration: Duration,
}

impl Default for SinePlayer {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1000),
        }
    }
}

impl TonePlayer for SinePlayer {
    /// The stream is owned by a short-lived thread that keeps it alive for
    /// the tone's duration. Only the setup result is waited on.
    fn play(&self, note: &NoteTarget) -> Result<(), PlaybackError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), PlaybackError>>(1);
        let frequency = note.frequency_hz;
        let duration = self.duration;
        let name = note.name.clone();

        thread::Builder::new()
            .name("pitchmatch-tone".into())
            .spawn(move || match build_tone_stream(frequency, duration) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    thread::sleep(duration);
                    drop(stream);
                    log::debug!("[TONE] Finished {}", name);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| PlaybackError(format!("spawning tone thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(PlaybackError("tone thread exited before playback started".into())),
        }
    }
}

fn build_tone_stream(frequency: f32, duration: Duration) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError("no output device available".into()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError(format!("no default output config: {}", e)))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(PlaybackError(format!(
            "unsupported output sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0 as f32;
    let channels = config.channels.max(1) as usize;
    let total_samples = (duration.as_secs_f32() * sample_rate) as u64;
    let mut position: u64 = 0;

    let err_fn = |err| log::error!("[TONE] An error occurred on the output stream: {}", err);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = tone_sample(frequency, sample_rate, position, total_samples);
                    frame.fill(value);
                    position = position.saturating_add(1);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaybackError(e.to_string()))?;

    stream.play().map_err(|e| PlaybackError(e.to_string()))?;
    Ok(stream)
}

/// Sample `position` of a faded sine lasting `total_samples`; silent after.
fn tone_sample(frequency: f32, sample_rate: f32, position: u64, total_samples: u64) -> f32 {
    if position >= total_samples {
        return 0.0;
    }
    let t = position as f32 / sample_rate;
    let remaining = (total_samples - position) as f32 / sample_rate;
    let envelope = (t / FADE_SECONDS).min(remaining / FADE_SECONDS).min(1.0);
    TONE_AMPLITUDE * envelope * (2.0 * std::f32::consts::PI * frequency * t).sin()
}
