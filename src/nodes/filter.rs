/// Stereo biquad filter used by ambient beds and transients
///
/// Wraps `biquad::DirectForm2Transposed` (one instance per channel) with the
/// three response types the layer recipes use. Lowpass and highpass use a
/// Butterworth Q; bandpass takes an explicit Q.
///
/// Coefficients are only recomputed when the cutoff moves by more than
/// 0.1 Hz, which keeps per-block LFO sweeps cheap.

use crate::audio_node::Frame;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass { q: f32 },
}

impl FilterKind {
    fn biquad_type(&self) -> biquad::Type<f32> {
        match self {
            FilterKind::LowPass => biquad::Type::LowPass,
            FilterKind::HighPass => biquad::Type::HighPass,
            FilterKind::BandPass { .. } => biquad::Type::BandPass,
        }
    }

    fn q(&self) -> f32 {
        match *self {
            FilterKind::LowPass | FilterKind::HighPass => Q_BUTTERWORTH_F32,
            FilterKind::BandPass { q } => q.clamp(0.01, 20.0),
        }
    }
}

/// Two-channel biquad with a movable cutoff
pub struct Filter {
    kind: FilterKind,
    sample_rate: f32,
    cutoff: f32,
    channels: [DirectForm2Transposed<f32>; 2],
}

impl Filter {
    pub fn new(kind: FilterKind, cutoff: f32, sample_rate: f32) -> Self {
        let cutoff = clamp_cutoff(cutoff, sample_rate);
        let coeffs = coefficients(kind, cutoff, sample_rate);
        Self {
            kind,
            sample_rate,
            cutoff,
            channels: [
                DirectForm2Transposed::<f32>::new(coeffs),
                DirectForm2Transposed::<f32>::new(coeffs),
            ],
        }
    }

    pub fn lowpass(cutoff: f32, sample_rate: f32) -> Self {
        Self::new(FilterKind::LowPass, cutoff, sample_rate)
    }

    pub fn highpass(cutoff: f32, sample_rate: f32) -> Self {
        Self::new(FilterKind::HighPass, cutoff, sample_rate)
    }

    pub fn bandpass(cutoff: f32, q: f32, sample_rate: f32) -> Self {
        Self::new(FilterKind::BandPass { q }, cutoff, sample_rate)
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Move the cutoff, keeping filter memory
    pub fn set_cutoff(&mut self, cutoff: f32) {
        let cutoff = clamp_cutoff(cutoff, self.sample_rate);
        if (cutoff - self.cutoff).abs() <= 0.1 {
            return;
        }
        self.cutoff = cutoff;
        let coeffs = coefficients(self.kind, cutoff, self.sample_rate);
        for channel in &mut self.channels {
            channel.update_coefficients(coeffs);
        }
    }

    #[inline]
    pub fn process(&mut self, frame: Frame) -> Frame {
        [
            self.channels[0].run(frame[0]),
            self.channels[1].run(frame[1]),
        ]
    }
}

fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    cutoff.max(10.0).min(sample_rate * 0.49)
}

/// Biquad coefficients, falling back to a pass-through when the design fails
fn coefficients(kind: FilterKind, cutoff: f32, sample_rate: f32) -> Coefficients<f32> {
    Coefficients::<f32>::from_params(kind.biquad_type(), sample_rate.hz(), cutoff.hz(), kind.q())
        .unwrap_or(Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_rms_through(filter: &mut Filter, freq: f32, sample_rate: f32) -> f32 {
        let n = sample_rate as usize;
        let mut sum = 0.0;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f32 / sample_rate).sin();
            let y = filter.process([x, x])[0];
            // Skip the settling transient
            if i > n / 4 {
                sum += y * y;
            }
        }
        (sum / (n - n / 4 - 1) as f32).sqrt()
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let sr = 44100.0;
        let low = sine_rms_through(&mut Filter::lowpass(1000.0, sr), 200.0, sr);
        let high = sine_rms_through(&mut Filter::lowpass(1000.0, sr), 8000.0, sr);
        assert!(low > 0.6, "200 Hz should pass, rms {low}");
        assert!(high < 0.05, "8 kHz should be cut, rms {high}");
    }

    #[test]
    fn test_highpass_attenuates_lows() {
        let sr = 44100.0;
        let low = sine_rms_through(&mut Filter::highpass(3000.0, sr), 100.0, sr);
        let high = sine_rms_through(&mut Filter::highpass(3000.0, sr), 10000.0, sr);
        assert!(low < 0.01, "100 Hz should be cut, rms {low}");
        assert!(high > 0.6, "10 kHz should pass, rms {high}");
    }

    #[test]
    fn test_bandpass_peaks_at_center() {
        let sr = 44100.0;
        let center = sine_rms_through(&mut Filter::bandpass(600.0, 1.0, sr), 600.0, sr);
        let far = sine_rms_through(&mut Filter::bandpass(600.0, 1.0, sr), 8000.0, sr);
        assert!(center > far * 5.0, "center {center} far {far}");
    }

    #[test]
    fn test_cutoff_is_clamped_below_nyquist() {
        let mut f = Filter::lowpass(30000.0, 8000.0);
        assert!(f.cutoff() < 4000.0);
        f.set_cutoff(5.0);
        assert_eq!(f.cutoff(), 10.0);
    }
}
