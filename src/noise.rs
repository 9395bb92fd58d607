//! Noise synthesizer: buffered white, pink and brown noise
//!
//! Buffers are the raw material for every ambient layer. They are generated
//! once per layer (or once per transient for thunder and page turns) and
//! played back by [`crate::nodes::buffer_source::BufferSource`].
//!
//! Both channels are generated independently from the same generator, so the
//! left and right signals are uncorrelated.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

/// Overall attenuation applied to white and brown noise
const NOISE_ATTENUATION: f32 = 0.3;

/// Leak coefficient of the brown noise integrator
const BROWN_LEAK: f32 = 0.02;

/// Make-up gain for the (quiet) brown integrator output
const BROWN_MAKEUP: f32 = 3.5;

/// Output scale of the pink filter bank
const PINK_SCALE: f32 = 0.06;

/// Spectral colour of a noise buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseColor {
    /// Flat spectrum
    White,
    /// 1/f spectrum (-3 dB/octave)
    Pink,
    /// 1/f^2 spectrum (-6 dB/octave)
    Brown,
}

impl NoiseColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseColor::White => "white",
            NoiseColor::Pink => "pink",
            NoiseColor::Brown => "brown",
        }
    }
}

impl FromStr for NoiseColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(NoiseColor::White),
            "pink" => Ok(NoiseColor::Pink),
            "brown" => Ok(NoiseColor::Brown),
            other => Err(format!("unknown noise colour: {other}")),
        }
    }
}

/// A stereo sample buffer
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseBuffer {
    sample_rate: u32,
    channels: [Vec<f32>; 2],
}

impl NoiseBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Frame at `index`, both channels
    #[inline]
    pub fn frame(&self, index: usize) -> [f32; 2] {
        [self.channels[0][index], self.channels[1][index]]
    }
}

/// Paul Kellet's refined pink noise filter bank
///
/// Six one-pole lowpass sections at staggered corner frequencies plus a
/// one-sample delayed term. The weighted sum approximates a 1/f falloff to
/// within ±0.05 dB above 9.2 Hz at 44.1 kHz.
#[derive(Debug, Default, Clone)]
struct PinkFilter {
    b: [f32; 7],
}

impl PinkFilter {
    #[inline]
    fn next(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.969 * b[2] + white * 0.153852;
        b[3] = 0.8665 * b[3] + white * 0.3104856;
        b[4] = 0.55 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.016898;
        let out = (b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362) * PINK_SCALE;
        b[6] = white * 0.115926;
        out
    }
}

/// Leaky integrator turning white noise into brown noise
#[derive(Debug, Default, Clone)]
struct BrownFilter {
    last: f32,
}

impl BrownFilter {
    #[inline]
    fn next(&mut self, white: f32) -> f32 {
        self.last = (self.last + BROWN_LEAK * white) / (1.0 + BROWN_LEAK);
        self.last * BROWN_MAKEUP * NOISE_ATTENUATION
    }
}

/// Generates noise buffers at a fixed sample rate
pub struct NoiseSynthesizer {
    sample_rate: u32,
    rng: StdRng,
}

impl NoiseSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a synthesizer with a specific seed (for testing)
    pub fn with_seed(sample_rate: u32, seed: u64) -> Self {
        Self {
            sample_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Generate `duration_seconds` of stereo noise of the given colour
    pub fn generate(&mut self, color: NoiseColor, duration_seconds: f32) -> NoiseBuffer {
        let length = (self.sample_rate as f32 * duration_seconds.max(0.0)).round() as usize;
        let left = self.generate_channel(color, length);
        let right = self.generate_channel(color, length);
        NoiseBuffer {
            sample_rate: self.sample_rate,
            channels: [left, right],
        }
    }

    fn generate_channel(&mut self, color: NoiseColor, length: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(length);
        match color {
            NoiseColor::White => {
                for _ in 0..length {
                    data.push(self.white() * NOISE_ATTENUATION);
                }
            }
            NoiseColor::Pink => {
                let mut filter = PinkFilter::default();
                for _ in 0..length {
                    let white = self.white();
                    data.push(filter.next(white));
                }
            }
            NoiseColor::Brown => {
                let mut filter = BrownFilter::default();
                for _ in 0..length {
                    let white = self.white();
                    data.push(filter.next(white));
                }
            }
        }
        data
    }

    #[inline]
    fn white(&mut self) -> f32 {
        self.rng.gen::<f32>() * 2.0 - 1.0
    }
}

/// Convenience wrapper: one-off buffer from a fresh entropy-seeded synthesizer
pub fn generate(color: NoiseColor, duration_seconds: f32, sample_rate: u32) -> NoiseBuffer {
    NoiseSynthesizer::new(sample_rate).generate(color, duration_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(data: &[f32]) -> f32 {
        (data.iter().map(|x| x * x).sum::<f32>() / data.len() as f32).sqrt()
    }

    /// Mean absolute difference between consecutive samples
    fn roughness(data: &[f32]) -> f32 {
        data.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>() / (data.len() - 1) as f32
    }

    #[test]
    fn test_buffer_length_matches_duration() {
        let mut synth = NoiseSynthesizer::with_seed(8000, 1);
        let buffer = synth.generate(NoiseColor::Pink, 2.0);
        assert_eq!(buffer.len(), 16000);
        assert_eq!(buffer.channel(1).len(), 16000);
        assert!((buffer.duration() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_white_noise_is_attenuated() {
        let mut synth = NoiseSynthesizer::with_seed(44100, 7);
        let buffer = synth.generate(NoiseColor::White, 1.0);
        let peak = buffer.channel(0).iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!(peak <= NOISE_ATTENUATION + f32::EPSILON, "peak {peak}");
        // Uniform in [-0.3, 0.3] has RMS 0.3 / sqrt(3) ~= 0.173
        let r = rms(buffer.channel(0));
        assert!((r - 0.173).abs() < 0.01, "white RMS {r}");
    }

    #[test]
    fn test_channels_are_independent() {
        let mut synth = NoiseSynthesizer::with_seed(44100, 3);
        let buffer = synth.generate(NoiseColor::White, 0.5);
        assert_ne!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_brown_and_pink_are_smoother_than_white() {
        let mut synth = NoiseSynthesizer::with_seed(44100, 11);
        let white = synth.generate(NoiseColor::White, 1.0);
        let pink = synth.generate(NoiseColor::Pink, 1.0);
        let brown = synth.generate(NoiseColor::Brown, 1.0);

        let white_r = roughness(white.channel(0)) / rms(white.channel(0));
        let pink_r = roughness(pink.channel(0)) / rms(pink.channel(0));
        let brown_r = roughness(brown.channel(0)) / rms(brown.channel(0));

        assert!(pink_r < white_r, "pink {pink_r} vs white {white_r}");
        assert!(brown_r < pink_r, "brown {brown_r} vs pink {pink_r}");
    }

    #[test]
    fn test_zero_duration_is_empty() {
        let buffer = generate(NoiseColor::Brown, 0.0, 44100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("pink".parse::<NoiseColor>(), Ok(NoiseColor::Pink));
        assert!("violet".parse::<NoiseColor>().is_err());
    }
}
