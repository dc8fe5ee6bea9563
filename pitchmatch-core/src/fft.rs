//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-based helpers for the pitch estimator. The autocorrelation of a
//! window is computed in O(n log n) through the power spectrum instead of the
//! direct O(n²) lag sum.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - DC offset removal so the 0 Hz component does not dominate the correlation
//! - Zero padding to avoid circular wrap-around

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Audio signal to process (modified in-place)
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Computes the linear (non-circular) autocorrelation of a signal.
///
/// The signal is zero-padded to twice its length, transformed, reduced to
/// its power spectrum and transformed back, so that entry `tau` equals
/// `sum(x[i] * x[i + tau])` over the overlapping samples.
///
/// # Arguments
/// * `signal` - Input audio signal of any length
///
/// # Returns
/// * `Vec<f32>` - Autocorrelation for lags `0..signal.len()`
pub fn autocorrelation(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let fft_len = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&sample| Complex { re: sample, im: 0.0 })
        .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }))
        .take(fft_len)
        .collect();

    forward.process(&mut buffer);
    for bin in buffer.iter_mut() {
        *bin = Complex {
            re: bin.norm_sqr(),
            im: 0.0,
        };
    }
    inverse.process(&mut buffer);

    // RustFFT does not normalize, so the round trip scales by fft_len.
    let scale = 1.0 / fft_len as f32;
    buffer.iter().take(n).map(|c| c.re * scale).collect()
}
