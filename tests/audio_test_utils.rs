//! Shared helpers for audio assertions in integration tests
//!
//! Include with `mod audio_test_utils;`.
#![allow(dead_code)]

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Root mean square of a mono buffer
pub fn calculate_rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|x| x * x).sum::<f32>() / buffer.len() as f32).sqrt()
}

/// Peak absolute value
pub fn calculate_peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |m, x| m.max(x.abs()))
}

/// Left channel of interleaved stereo frames
pub fn left(frames: &[[f32; 2]]) -> Vec<f32> {
    frames.iter().map(|f| f[0]).collect()
}

/// Power spectrum averaged over consecutive Hann-windowed blocks
///
/// Returns `(frequencies, power)` for bins `0..fft_size / 2`.
pub fn average_spectrum(buffer: &[f32], sample_rate: f32, fft_size: usize) -> (Vec<f32>, Vec<f32>) {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    let window: Vec<f32> = (0..fft_size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
        .collect();

    let mut power = vec![0.0f32; fft_size / 2];
    let mut blocks = 0;
    for chunk in buffer.chunks_exact(fft_size) {
        let mut input: Vec<Complex<f32>> = chunk
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut input);
        for (p, c) in power.iter_mut().zip(input.iter()) {
            *p += c.norm_sqr();
        }
        blocks += 1;
    }
    if blocks > 0 {
        for p in power.iter_mut() {
            *p /= blocks as f32;
        }
    }

    let frequencies = (0..fft_size / 2)
        .map(|i| i as f32 * sample_rate / fft_size as f32)
        .collect();
    (frequencies, power)
}

/// Total power between `low_hz` and `high_hz`
pub fn band_energy(frequencies: &[f32], power: &[f32], low_hz: f32, high_hz: f32) -> f32 {
    frequencies
        .iter()
        .zip(power.iter())
        .filter(|(f, _)| **f >= low_hz && **f < high_hz)
        .map(|(_, p)| *p)
        .sum()
}

/// Frequency of the strongest bin
pub fn dominant_frequency(frequencies: &[f32], power: &[f32]) -> f32 {
    frequencies
        .iter()
        .zip(power.iter())
        .skip(1)
        .fold((0.0f32, 0.0f32), |best, (&f, &p)| if p > best.1 { (f, p) } else { best })
        .0
}
