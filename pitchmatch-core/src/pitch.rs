//! # Pitch Estimation Module
//!
//! Estimates the fundamental frequency of a single voice with the McLeod
//! Pitch Method. The normalized square difference function (NSDF) is built
//! from the window's autocorrelation; its first strong maximum gives the
//! period and its height gives the confidence.
//!
//! ## Features
//! - Stateless: each estimate depends on its frame alone
//! - Amplitude gate that reports silence as zero confidence
//! - Key-maximum peak picking to avoid octave errors
//! - Parabolic interpolation for sub-sample period accuracy

use crate::audio::SampleFrame;
use crate::fft;

/// Fraction of the highest NSDF key maximum that the chosen peak must reach.
const KEY_MAXIMUM_RATIO: f32 = 0.9;

/// Frequency and confidence for one analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// Normalized periodicity strength: 1.0 for a perfectly periodic window,
    /// near 0 for noise or silence.
    pub confidence: f32,
}

impl PitchEstimate {
    /// The estimate reported for silent or aperiodic windows.
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        frequency_hz: 0.0,
        confidence: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimator {
    /// Windows with an RMS below this are reported as unvoiced.
    pub min_rms: f32,
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self { min_rms: 0.01 }
    }
}

impl PitchEstimator {
    pub fn new(min_rms: f32) -> Self {
        Self { min_rms }
    }

    /// Estimates the pitch of one frame, using the frame's own sample rate.
    pub fn estimate(&self, frame: &SampleFrame) -> PitchEstimate {
        detect_pitch_mpm(&frame.samples, frame.sample_rate, self.min_rms)
    }
}

/// McLeod Pitch Method over one window.
///
/// # Arguments
/// * `signal` - Input audio window
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude_threshold` - Minimum RMS for pitch detection
///
/// # Returns
/// * A [`PitchEstimate`]; [`PitchEstimate::UNVOICED`] for silence, noise
///   without a clear period, or degenerate input
pub fn detect_pitch_mpm(signal: &[f32], sample_rate: u32, amplitude_threshold: f32) -> PitchEstimate {
    let frame_size = signal.len();
    if frame_size < 4 || sample_rate == 0 {
        return PitchEstimate::UNVOICED;
    }

    // --- Noise Gate: Calculate RMS to filter out silence ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if !rms.is_finite() || rms < amplitude_threshold {
        return PitchEstimate::UNVOICED;
    }

    let mut centered = signal.to_vec();
    fft::remove_dc_offset(&mut centered);

    let nsdf = normalized_square_difference(&centered);
    let key_maxima = find_key_maxima(&nsdf);

    let highest = key_maxima
        .iter()
        .map(|&tau| nsdf[tau])
        .fold(f32::NEG_INFINITY, f32::max);
    if !(highest > 0.0) {
        return PitchEstimate::UNVOICED;
    }

    // The first maximum close to the highest one is the fundamental period;
    // later ones are its multiples.
    let threshold = KEY_MAXIMUM_RATIO * highest;
    let Some(&tau) = key_maxima.iter().find(|&&tau| nsdf[tau] >= threshold) else {
        return PitchEstimate::UNVOICED;
    };

    let (period, peak) = parabolic_peak(&nsdf, tau);
    let frequency = sample_rate as f32 / period;

    if frequency.is_finite() && frequency > 20.0 {
        PitchEstimate {
            frequency_hz: frequency,
            confidence: peak.clamp(0.0, 1.0),
        }
    } else {
        PitchEstimate::UNVOICED
    }
}

/// NSDF for lags `0..signal.len() / 2`.
///
/// n'(tau) = 2 r(tau) / m(tau), where r is the autocorrelation and m the
/// sum of squares of both overlapping parts, updated incrementally.
fn normalized_square_difference(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    let max_lag = n / 2;
    let acf = fft::autocorrelation(signal);

    let mut nsdf = vec![0.0; max_lag];
    let mut m = 2.0 * acf[0];
    for tau in 0..max_lag {
        if tau > 0 {
            let head = signal[tau - 1];
            let tail = signal[n - tau];
            m -= head * head + tail * tail;
        }
        nsdf[tau] = if m > f32::EPSILON { 2.0 * acf[tau] / m } else { 0.0 };
    }
    nsdf
}

/// Lags of the highest NSDF value inside each positive lobe, skipping the
/// lobe around lag zero.
fn find_key_maxima(nsdf: &[f32]) -> Vec<usize> {
    let len = nsdf.len();
    let mut maxima = Vec::new();
    if len < 3 {
        return maxima;
    }

    // Leave the lobe around lag zero, then the first negative region.
    let mut pos = 0;
    while pos < (len - 1) / 3 && nsdf[pos] > 0.0 {
        pos += 1;
    }
    while pos < len - 1 && nsdf[pos] <= 0.0 {
        pos += 1;
    }
    pos = pos.max(1);

    let mut current: Option<usize> = None;
    while pos < len - 1 {
        if nsdf[pos] > nsdf[pos - 1] && nsdf[pos] >= nsdf[pos + 1] {
            match current {
                Some(best) if nsdf[best] >= nsdf[pos] => {}
                _ => current = Some(pos),
            }
        }
        pos += 1;
        if pos < len - 1 && nsdf[pos] <= 0.0 {
            if let Some(best) = current.take() {
                maxima.push(best);
            }
            while pos < len - 1 && nsdf[pos] <= 0.0 {
                pos += 1;
            }
        }
    }
    if let Some(best) = current {
        maxima.push(best);
    }
    maxima
}

/// Fits a parabola through `tau - 1..=tau + 1` and returns the vertex
/// position and height.
fn parabolic_peak(values: &[f32], tau: usize) -> (f32, f32) {
    if tau == 0 || tau + 1 >= values.len() {
        return (tau as f32, values[tau]);
    }
    let y1 = values[tau - 1];
    let y2 = values[tau];
    let y3 = values[tau + 1];
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-12 {
        return (tau as f32, y2);
    }
    let shift = (y1 - y3) / (2.0 * denominator);
    let height = y2 - 0.25 * (y1 - y3) * shift;
    (tau as f32 + shift, height)
}
