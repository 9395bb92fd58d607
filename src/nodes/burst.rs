/// Transient bursts - short enveloped one-shots mixed into a layer's bus
///
/// Two shapes cover every transient the layer recipes schedule:
///
/// - [`ToneBurst`]: oscillator with optional pitch automation (drips, chirps,
///   crackles, clinks, crickets, chime tones)
/// - [`NoiseBurst`]: one-shot noise through a filter (thunder claps, page turns)
///
/// Both carry a gain envelope and a hard stop time, after which they report
/// `Finished` and the graph drops them.

use super::automation::Param;
use super::buffer_source::BufferSource;
use super::filter::Filter;
use super::oscillator::Oscillator;
use crate::audio_node::{AudioNode, Frame, NodeStatus, ProcessContext};

/// Frames of silence before the burst starts, then the burst length
#[derive(Debug, Clone, Copy)]
struct Timing {
    delay: f64,
    duration: f64,
    elapsed: f64,
}

impl Timing {
    fn new(duration: f64) -> Self {
        Self {
            delay: 0.0,
            duration,
            elapsed: 0.0,
        }
    }
}

pub struct ToneBurst {
    oscillator: Oscillator,
    gain: Param,
    timing: Timing,
}

impl ToneBurst {
    pub fn new(oscillator: Oscillator, gain: Param, duration: f64) -> Self {
        Self {
            oscillator,
            gain,
            timing: Timing::new(duration),
        }
    }

    /// Start `delay` seconds after the node is first processed
    pub fn delayed(mut self, delay: f64) -> Self {
        self.timing.delay = delay.max(0.0);
        self
    }

    pub fn duration(&self) -> f64 {
        self.timing.duration
    }
}

impl AudioNode for ToneBurst {
    fn process_block(&mut self, output: &mut [Frame], context: &ProcessContext) -> NodeStatus {
        let dt = 1.0 / context.sample_rate as f64;
        for out in output.iter_mut() {
            let t = self.timing.elapsed;
            self.timing.elapsed += dt;
            if t < self.timing.delay {
                continue;
            }
            if t - self.timing.delay >= self.timing.duration {
                return NodeStatus::Finished;
            }
            let s = self.oscillator.next(context.sample_rate) * self.gain.next(context.sample_rate);
            out[0] += s;
            out[1] += s;
        }
        NodeStatus::Playing
    }

    fn name(&self) -> &str {
        "ToneBurst"
    }
}

pub struct NoiseBurst {
    source: BufferSource,
    filter: Filter,
    gain: Param,
    timing: Timing,
}

impl NoiseBurst {
    pub fn new(source: BufferSource, filter: Filter, gain: Param, duration: f64) -> Self {
        Self {
            source,
            filter,
            gain,
            timing: Timing::new(duration),
        }
    }
}

impl AudioNode for NoiseBurst {
    fn process_block(&mut self, output: &mut [Frame], context: &ProcessContext) -> NodeStatus {
        let dt = 1.0 / context.sample_rate as f64;
        for out in output.iter_mut() {
            if self.timing.elapsed >= self.timing.duration {
                return NodeStatus::Finished;
            }
            self.timing.elapsed += dt;
            let Some(frame) = self.source.next() else {
                return NodeStatus::Finished;
            };
            let frame = self.filter.process(frame);
            let g = self.gain.next(context.sample_rate);
            out[0] += frame[0] * g;
            out[1] += frame[1] * g;
        }
        NodeStatus::Playing
    }

    fn name(&self) -> &str {
        "NoiseBurst"
    }
}
