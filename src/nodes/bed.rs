/// Ambient bed - the continuous, looped half of a sound layer
///
/// Signal flow:
///
/// ```text
/// looped noise buffer -> filter chain -> level (optionally LFO-modulated) -> bus
/// ```
///
/// A bed runs until its [`StopHandle`] is triggered; the layer disposer
/// triggers it so the node leaves the graph on the next block even if the
/// bus itself is still being torn down.

use super::buffer_source::BufferSource;
use super::filter::Filter;
use super::oscillator::Oscillator;
use crate::audio_node::{AudioNode, Frame, NodeStatus, ProcessContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag between a playing node and its owner
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a low-frequency oscillator modulates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LfoTarget {
    /// `level + lfo * depth`
    Level,
    /// Cutoff of the filter at `index`: `base + lfo * depth` Hz
    Cutoff { index: usize, base: f32 },
}

#[derive(Debug, Clone)]
pub struct Lfo {
    pub oscillator: Oscillator,
    pub depth: f32,
    pub target: LfoTarget,
}

impl Lfo {
    pub fn new(rate_hz: f32, depth: f32, target: LfoTarget) -> Self {
        Self {
            oscillator: Oscillator::sine(rate_hz),
            depth,
            target,
        }
    }
}

pub struct AmbientBed {
    source: BufferSource,
    filters: Vec<Filter>,
    level: f32,
    lfo: Option<Lfo>,
    stop: StopHandle,
}

impl AmbientBed {
    pub fn new(source: BufferSource, level: f32) -> Self {
        Self {
            source,
            filters: Vec::new(),
            level,
            lfo: None,
            stop: StopHandle::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_lfo(mut self, lfo: Lfo) -> Self {
        self.lfo = Some(lfo);
        self
    }

    /// Handle that silences and removes this bed
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl AudioNode for AmbientBed {
    fn process_block(&mut self, output: &mut [Frame], context: &ProcessContext) -> NodeStatus {
        if self.stop.is_stopped() {
            return NodeStatus::Finished;
        }

        for out in output.iter_mut() {
            let mut level = self.level;
            if let Some(lfo) = self.lfo.as_mut() {
                let m = lfo.oscillator.next(context.sample_rate) * lfo.depth;
                match lfo.target {
                    LfoTarget::Level => level += m,
                    LfoTarget::Cutoff { index, base } => {
                        if let Some(filter) = self.filters.get_mut(index) {
                            filter.set_cutoff(base + m);
                        }
                    }
                }
            }

            let Some(mut frame) = self.source.next() else {
                return NodeStatus::Finished;
            };
            for filter in &mut self.filters {
                frame = filter.process(frame);
            }
            out[0] += frame[0] * level;
            out[1] += frame[1] * level;
        }

        NodeStatus::Playing
    }

    fn name(&self) -> &str {
        "AmbientBed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{NoiseColor, NoiseSynthesizer};

    fn bed(level: f32) -> AmbientBed {
        let buffer = Arc::new(NoiseSynthesizer::with_seed(8000, 5).generate(NoiseColor::Pink, 1.0));
        AmbientBed::new(BufferSource::looped(buffer), level)
    }

    fn energy(frames: &[Frame]) -> f32 {
        frames.iter().map(|f| f[0] * f[0] + f[1] * f[1]).sum()
    }

    #[test]
    fn test_bed_mixes_into_output() {
        let mut node = bed(1.0);
        let ctx = ProcessContext::new(8000.0, 0, 256);
        let mut out = vec![[0.0; 2]; 256];
        assert_eq!(node.process_block(&mut out, &ctx), NodeStatus::Playing);
        assert!(energy(&out) > 0.0);
    }

    #[test]
    fn test_level_scales_output() {
        let ctx = ProcessContext::new(8000.0, 0, 256);
        let mut loud = vec![[0.0; 2]; 256];
        let mut quiet = vec![[0.0; 2]; 256];
        bed(1.0).process_block(&mut loud, &ctx);
        bed(0.1).process_block(&mut quiet, &ctx);
        let ratio = energy(&quiet) / energy(&loud);
        assert!((ratio - 0.01).abs() < 1e-3, "ratio {ratio}");
    }

    #[test]
    fn test_stop_handle_finishes_node() {
        let mut node = bed(1.0);
        let handle = node.stop_handle();
        handle.stop();
        let ctx = ProcessContext::new(8000.0, 0, 64);
        let mut out = vec![[0.0; 2]; 64];
        assert_eq!(node.process_block(&mut out, &ctx), NodeStatus::Finished);
        assert_eq!(energy(&out), 0.0);
    }

    #[test]
    fn test_lfo_sweeps_cutoff() {
        let mut node = bed(1.0)
            .with_filter(Filter::bandpass(400.0, 0.5, 8000.0))
            .with_lfo(Lfo::new(2.0, 200.0, LfoTarget::Cutoff { index: 0, base: 400.0 }));
        let ctx = ProcessContext::new(8000.0, 0, 1000);
        let mut out = vec![[0.0; 2]; 1000];
        node.process_block(&mut out, &ctx);
        // Quarter period of a 2 Hz LFO at 8 kHz: cutoff near base + depth
        assert!(node.filters[0].cutoff() > 550.0, "cutoff {}", node.filters[0].cutoff());
    }
}
