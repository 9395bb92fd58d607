/// Oscillator with an automatable frequency
///
/// Only the two waveforms the transient recipes need: sine for drips, chirps,
/// clinks, crickets and the chime; naive sawtooth for fire crackles (the
/// aliasing reads as extra crackle, which is fine here).

use super::automation::Param;
use std::f32::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: Param,
    /// Phase in cycles, [0, 1)
    phase: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32) -> Self {
        Self {
            waveform,
            frequency: Param::new(frequency),
            phase: 0.0,
        }
    }

    pub fn sine(frequency: f32) -> Self {
        Self::new(Waveform::Sine, frequency)
    }

    pub fn sawtooth(frequency: f32) -> Self {
        Self::new(Waveform::Sawtooth, frequency)
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Frequency automation (Hz)
    pub fn frequency(&mut self) -> &mut Param {
        &mut self.frequency
    }

    #[inline]
    pub fn next(&mut self, sample_rate: f32) -> f32 {
        let out = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
        };
        let freq = self.frequency.next(sample_rate);
        self.phase = (self.phase + freq / sample_rate).rem_euclid(1.0);
        out
    }
}
