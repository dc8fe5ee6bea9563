//! # Audio Capture Module
//!
//! This module owns the microphone side of the pipeline. A [`SampleSource`]
//! opens a [`CaptureDevice`]; the session wraps it in a [`CaptureHandle`],
//! which hands out the most recent analysis window on each tick and releases
//! the device exactly once, however the session ends.
//!
//! ## Features
//! - Device-agnostic traits, so sessions run against fakes in tests
//! - CPAL backend running the input stream on its own thread
//! - Latest-window delivery: unread older windows are discarded, never queued
//! - Bounded staleness: a window is repeated for at most two window lengths
//! - Stream failures after open are reported on the next pull
//! - Idempotent close, also performed on drop

use crate::error::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default analysis window size in samples.
///
/// At 44.1 kHz a window of 2048 samples spans ~46 ms, which resolves
/// periods down to ~43 Hz with the half-window lag search.
pub const BUFFER_SIZE: usize = 2048;

/// Number of finished windows the capture callback may hold before it starts
/// evicting the oldest.
const FRAME_SLOTS: usize = 2;

/// How many window lengths a window may be repeated for while the device
/// delivers nothing new.
const MAX_FRAME_AGE_WINDOWS: f64 = 2.0;

/// One analysis window of mono samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    pub samples: Vec<f32>,
    /// Sample rate the window was captured at, in Hz.
    pub sample_rate: u32,
}

/// An open capture device, as seen by the session.
pub trait CaptureDevice: Send {
    /// Native sample rate chosen when the device was opened.
    fn sample_rate(&self) -> u32;

    /// Returns the newest complete window produced since the previous call,
    /// or `None` if nothing new has arrived. Must never block.
    ///
    /// An error means the device failed after it was opened; no further
    /// windows will arrive.
    fn latest_window(&mut self) -> Result<Option<Vec<f32>>, CaptureError>;

    /// Stops the device. Called exactly once by [`CaptureHandle`].
    fn release(&mut self);
}

/// Something that can open the microphone.
pub trait SampleSource: Send + Sync {
    /// Requests microphone access and starts capturing `window_size`-sample
    /// windows at the platform's native rate.
    fn open(&self, window_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// Owned capture resource for one session.
///
/// `next_frame` is non-blocking: it returns the newest window, or repeats the
/// previous one when the device has produced nothing new since the last tick.
/// A window older than two window lengths is dropped instead of repeated.
pub struct CaptureHandle {
    device: Option<Box<dyn CaptureDevice>>,
    window_size: usize,
    sample_rate: u32,
    max_age: Duration,
    latest: Option<(Vec<f32>, Instant)>,
}

impl CaptureHandle {
    /// Opens `source` and binds the resulting device to a handle.
    pub fn open(source: &dyn SampleSource, window_size: usize) -> Result<Self, CaptureError> {
        let device = source.open(window_size)?;
        let sample_rate = device.sample_rate();
        log::info!(
            "[CAPTURE] Opened capture: {} Hz, window {} samples",
            sample_rate,
            window_size
        );
        Ok(Self {
            device: Some(device),
            window_size,
            sample_rate,
            max_age: max_frame_age(window_size, sample_rate),
            latest: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// How long a window may be handed out again before it counts as stale.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns the most recent window as of `now`, or `None` if the handle is
    /// closed, the device has not yet filled a window, or the last window is
    /// stale.
    ///
    /// A device failure closes the handle and is returned once.
    pub fn next_frame(&mut self, now: Instant) -> Result<Option<SampleFrame>, CaptureError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(None);
        };
        let window = match device.latest_window() {
            Ok(window) => window,
            Err(err) => {
                log::error!("[CAPTURE] Capture device failed: {}", err);
                self.close();
                return Err(err);
            }
        };

        if let Some(window) = window {
            if window.len() == self.window_size {
                self.latest = Some((window, now));
            } else {
                log::warn!(
                    "[CAPTURE] Dropping window of {} samples (expected {})",
                    window.len(),
                    self.window_size
                );
            }
        }

        let stale = self
            .latest
            .as_ref()
            .is_some_and(|(_, captured_at)| now.saturating_duration_since(*captured_at) > self.max_age);
        if stale {
            log::debug!("[CAPTURE] No new audio for {:?}; dropping stale window", self.max_age);
            self.latest = None;
        }

        Ok(self.latest.as_ref().map(|(samples, _)| SampleFrame {
            samples: samples.clone(),
            sample_rate: self.sample_rate,
        }))
    }

    /// Releases the device. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            self.latest = None;
            log::info!("[CAPTURE] Capture released");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn max_frame_age(window_size: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(MAX_FRAME_AGE_WINDOWS * window_size as f64 / sample_rate.max(1) as f64)
}

/// Captures from the host's default input device through CPAL.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl SampleSource for CpalInput {
    /// Spawns the capture thread and waits for it to report whether the
    /// stream started.
    ///
    /// The stream lives entirely on that thread; the returned device only
    /// holds channel ends and the thread handle.
    fn open(&self, window_size: usize) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_SLOTS);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, CaptureError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (error_tx, error_rx) = crossbeam_channel::bounded::<CaptureError>(1);

        let evict_rx = frame_rx.clone();
        let thread_handle = thread::Builder::new()
            .name("pitchmatch-capture".into())
            .spawn(move || {
                let channels = StreamChannels {
                    frame_tx,
                    evict_rx,
                    error_tx,
                };
                run_capture_thread(window_size, channels, ready_tx, shutdown_rx)
            })
            .map_err(|e| CaptureError::Unavailable(format!("spawning capture thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Box::new(CpalCapture {
                frames: frame_rx,
                errors: error_rx,
                sample_rate,
                shutdown_tx,
                thread_handle: Some(thread_handle),
            })),
            Ok(Err(err)) => {
                let _ = thread_handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(CaptureError::Unavailable(
                    "capture thread exited before the stream started".into(),
                ))
            }
        }
    }
}

/// Channel ends moved into the stream callbacks.
struct StreamChannels {
    frame_tx: Sender<Vec<f32>>,
    evict_rx: Receiver<Vec<f32>>,
    error_tx: Sender<CaptureError>,
}

/// Body of the capture thread: build the stream, report, then park until
/// told to shut down.
fn run_capture_thread(
    window_size: usize,
    channels: StreamChannels,
    ready_tx: Sender<Result<u32, CaptureError>>,
    shutdown_rx: Receiver<()>,
) {
    let (stream, sample_rate) = match build_input_stream(window_size, channels) {
        Ok(started) => started,
        Err(err) => {
            log::error!("[CAPTURE] Failed to start audio capture: {}", err);
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    let _ = ready_tx.send(Ok(sample_rate));

    // Either an explicit shutdown or the device being dropped ends capture.
    let _ = shutdown_rx.recv();

    if let Err(e) = stream.pause() {
        log::warn!("[CAPTURE] Error pausing stream: {}", e);
    }
    drop(stream);
    log::debug!("[CAPTURE] Capture thread finished");
}

fn build_input_stream(
    window_size: usize,
    channels: StreamChannels,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let StreamChannels {
        frame_tx,
        evict_rx,
        error_tx,
    } = channels;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::Unavailable("no input device available".into()))?;

    if let Ok(name) = device.name() {
        log::info!("[CAPTURE] Using audio input device: {}", name);
    }

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Unavailable(format!("no default input config: {}", e)))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(CaptureError::Unavailable(format!(
            "unsupported input sample format {:?}",
            supported.sample_format()
        )));
    }

    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels.max(1) as usize;

    // Only the first failure matters; the session ends on it.
    let err_fn = move |err: cpal::StreamError| {
        log::error!("[CAPTURE] An error occurred on the audio stream: {}", err);
        let _ = error_tx.try_send(map_stream_error(err));
    };

    // This buffer accumulates mono audio from the callback until a full
    // window is available.
    let mut audio_buffer: Vec<f32> = Vec::with_capacity(window_size * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Keep the first channel of each interleaved frame.
                audio_buffer.extend(data.iter().step_by(channels));

                while audio_buffer.len() >= window_size {
                    let window = audio_buffer[..window_size].to_vec();
                    audio_buffer.drain(..window_size);
                    publish_latest(&frame_tx, &evict_rx, window);
                }
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)?;

    stream.play().map_err(map_play_error)?;

    Ok((stream, sample_rate))
}

/// Sends `window`, evicting the oldest unread window if every slot is full.
fn publish_latest(tx: &Sender<Vec<f32>>, evict_rx: &Receiver<Vec<f32>>, window: Vec<f32>) {
    let mut window = window;
    loop {
        match tx.try_send(window) {
            Ok(()) => return,
            Err(crossbeam_channel::TrySendError::Full(rejected)) => {
                let _ = evict_rx.try_recv();
                window = rejected;
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
        }
    }
}

/// CPAL has no dedicated permission variant; backends report refusals as
/// backend-specific errors, so those are classified by their description.
fn classify_backend_error(description: &str) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(description.to_string())
    } else {
        CaptureError::Unavailable(description.to_string())
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        other => CaptureError::Unavailable(other.to_string()),
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        other => CaptureError::Unavailable(other.to_string()),
    }
}

fn map_stream_error(err: cpal::StreamError) -> CaptureError {
    match err {
        cpal::StreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        other => CaptureError::Unavailable(other.to_string()),
    }
}

/// Capture device backed by the CPAL capture thread.
struct CpalCapture {
    frames: Receiver<Vec<f32>>,
    errors: Receiver<CaptureError>,
    sample_rate: u32,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureDevice for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn latest_window(&mut self) -> Result<Option<Vec<f32>>, CaptureError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }
        let mut newest = None;
        loop {
            match self.frames.try_recv() {
                Ok(window) => newest = Some(window),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(CaptureError::Unavailable("audio input stream ended".into()));
                }
            }
        }
        Ok(newest)
    }

    fn release(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[CAPTURE] Capture thread panicked");
            }
        }
    }
}
