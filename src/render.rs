//! Offline rendering of a mix to memory or a WAV file
//!
//! Uses the same recipes as the live engine. Transient generators are
//! scheduled by frame count instead of tokio timers, so a render is fully
//! determined by its seed.

use crate::audio_node::Frame;
use crate::config::AudioConfig;
use crate::error::RenderError;
use crate::graph::{BusId, MixGraph};
use crate::layers::{SoundId, TransientKind};
use crate::mixer::Mix;
use crate::noise::NoiseSynthesizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration for rendering audio
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Block size for processing
    pub block_size: usize,
    /// Duration in seconds
    pub duration: f32,
    /// Master gain (0.0 to 1.0)
    pub master_gain: f32,
    /// Fade in time in seconds
    pub fade_in: f32,
    /// Fade out time in seconds
    pub fade_out: f32,
    /// Length of each looped noise buffer
    pub noise_seconds: f32,
    /// Seed for noise and transient timing
    pub seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            duration: 10.0,
            master_gain: 0.5,
            fade_in: 0.5,
            fade_out: 0.5,
            noise_seconds: 4.0,
            seed: 0,
        }
    }
}

impl RenderConfig {
    pub fn from_audio(audio: &AudioConfig, duration: f32) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            block_size: audio.block_size.max(1),
            duration,
            master_gain: audio.master_volume,
            noise_seconds: audio.noise_seconds,
            ..Self::default()
        }
    }
}

/// A transient generator on the frame clock
struct Scheduled {
    bus: BusId,
    kind: TransientKind,
    period: u64,
    next_frame: u64,
}

pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render a mix to a WAV file
    pub fn render_to_file(&self, mix: &Mix, output_path: &Path) -> Result<RenderStats, RenderError> {
        let frames = self.render_to_buffer(mix)?;
        let stats = RenderStats::from_frames(&frames, self.config.sample_rate);
        write_wav(output_path, &frames, self.config.sample_rate)?;
        info!(
            "Rendered {:.1} s to {}",
            stats.duration,
            output_path.display()
        );
        Ok(stats)
    }

    /// Render a mix to memory
    pub fn render_to_buffer(&self, mix: &Mix) -> Result<Vec<Frame>, RenderError> {
        let sample_rate = self.config.sample_rate;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut synth = NoiseSynthesizer::with_seed(sample_rate, rng.gen());
        let mut graph = MixGraph::new(sample_rate as f32);
        graph.set_master(self.config.master_gain);

        let mut scheduled = Vec::new();
        for (id, volume) in mix.active() {
            let sound: SoundId = match id.parse() {
                Ok(sound) => sound,
                Err(e) => {
                    warn!("Skipping {}", e);
                    continue;
                }
            };
            let recipe = sound.recipe();
            let bus = graph.add_bus(volume);
            graph.push_node(bus, Box::new(recipe.bed.build(&mut synth, self.config.noise_seconds)));

            for generator in recipe.generators {
                let period = generator.draw_period(&mut rng).as_secs_f64() * sample_rate as f64;
                let period = (period as u64).max(1);
                scheduled.push(Scheduled {
                    bus,
                    kind: generator.kind,
                    period,
                    next_frame: period,
                });
            }
            debug!("Render layer {} at {:.2}", sound, volume);
        }

        if graph.bus_count() == 0 {
            return Err(RenderError::EmptyMix);
        }

        let total = (self.config.duration.max(0.0) * sample_rate as f32) as usize;
        let block_size = self.config.block_size.max(1);
        let mut frames = vec![[0.0, 0.0]; total];

        let mut start = 0;
        for block in frames.chunks_mut(block_size) {
            let end = (start + block.len()) as u64;
            // Firings land on the block containing their frame
            for generator in scheduled.iter_mut() {
                while generator.next_frame < end {
                    graph.push_node(generator.bus, generator.kind.build(&mut rng, sample_rate));
                    generator.next_frame += generator.period;
                }
            }
            graph.render(block);
            start += block.len();
        }

        self.apply_fades(&mut frames);
        Ok(frames)
    }

    /// Apply fade in and fade out to frames
    fn apply_fades(&self, frames: &mut [Frame]) {
        let sample_rate = self.config.sample_rate as f32;

        if self.config.fade_in > 0.0 {
            let fade_in_frames = (self.config.fade_in * sample_rate) as usize;
            for (i, frame) in frames.iter_mut().take(fade_in_frames).enumerate() {
                let gain = i as f32 / fade_in_frames as f32;
                frame[0] *= gain;
                frame[1] *= gain;
            }
        }

        if self.config.fade_out > 0.0 {
            let fade_out_frames = (self.config.fade_out * sample_rate) as usize;
            let start = frames.len().saturating_sub(fade_out_frames);
            for (i, frame) in frames[start..].iter_mut().enumerate() {
                let gain = 1.0 - ((i + 1) as f32 / fade_out_frames as f32);
                frame[0] *= gain;
                frame[1] *= gain;
            }
        }
    }
}

/// Write stereo frames as a 16-bit WAV
pub fn write_wav(path: &Path, frames: &[Frame], sample_rate: u32) -> Result<(), RenderError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in frames {
        for &sample in frame {
            let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(scaled)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Statistics about rendered audio
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub duration: f32,
    pub frame_count: usize,
    pub rms: f32,
    pub peak: f32,
    pub dc_offset: f32,
}

impl RenderStats {
    pub fn from_frames(frames: &[Frame], sample_rate: u32) -> Self {
        let frame_count = frames.len();
        let samples = frames.iter().flat_map(|f| f.iter().copied());
        let count = (frame_count * 2).max(1) as f32;

        let (sum, sum_squares, peak) = samples.fold((0.0f32, 0.0f32, 0.0f32), |(s, sq, p), x| {
            (s + x, sq + x * x, p.max(x.abs()))
        });

        Self {
            duration: frame_count as f32 / sample_rate.max(1) as f32,
            frame_count,
            rms: (sum_squares / count).sqrt(),
            peak,
            dc_offset: sum / count,
        }
    }

    pub fn print_summary(&self) {
        println!("Render Statistics:");
        println!("  Duration:   {:.3} seconds", self.duration);
        println!("  Frames:     {}", self.frame_count);
        println!("  RMS:        {:.3}", self.rms);
        println!("  Peak:       {:.3}", self.peak);
        println!("  DC Offset:  {:.6}", self.dc_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(duration: f32) -> RenderConfig {
        RenderConfig {
            duration,
            fade_in: 0.0,
            fade_out: 0.0,
            noise_seconds: 1.0,
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_brown_noise() {
        let renderer = Renderer::new(short(0.5));
        let frames = renderer
            .render_to_buffer(&Mix::new().with("brown", 0.8))
            .expect("render");

        assert_eq!(frames.len(), 22050);
        let stats = RenderStats::from_frames(&frames, 44100);
        assert!(stats.rms > 0.01, "brown noise should be audible, rms {}", stats.rms);
        assert!(stats.peak <= 1.0);
        assert!(stats.dc_offset.abs() < 0.1, "dc offset {}", stats.dc_offset);
    }

    #[test]
    fn test_empty_and_unknown_mixes_fail() {
        let renderer = Renderer::new(short(0.1));
        assert!(matches!(
            renderer.render_to_buffer(&Mix::new()),
            Err(RenderError::EmptyMix)
        ));
        assert!(matches!(
            renderer.render_to_buffer(&Mix::new().with("kazoo", 0.5)),
            Err(RenderError::EmptyMix)
        ));
    }

    #[test]
    fn test_same_seed_same_output() {
        let mix = Mix::new().with("fire", 0.6).with("rain", 0.4);
        let a = Renderer::new(short(0.3)).render_to_buffer(&mix).expect("render");
        let b = Renderer::new(short(0.3)).render_to_buffer(&mix).expect("render");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fades() {
        let config = RenderConfig {
            fade_in: 0.05,
            fade_out: 0.05,
            ..short(0.5)
        };
        let frames = Renderer::new(config)
            .render_to_buffer(&Mix::new().with("white", 1.0))
            .expect("render");

        assert_eq!(frames[0], [0.0, 0.0], "first frame should be silent");
        let last = frames[frames.len() - 1];
        assert!(last[0].abs() < 1e-6 && last[1].abs() < 1e-6, "last frame should be silent");

        let mid = frames.len() / 2;
        let mid_peak = frames[mid - 500..mid + 500]
            .iter()
            .map(|f| f[0].abs())
            .fold(0.0f32, f32::max);
        assert!(mid_peak > 0.1, "middle should be loud, peak {mid_peak}");
    }

    #[test]
    fn test_render_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mix.wav");

        let stats = Renderer::new(short(0.25))
            .render_to_file(&Mix::new().with("pink", 0.7), &path)
            .expect("render to file");
        assert_eq!(stats.frame_count, 11025);

        let reader = hound::WavReader::open(&path).expect("open wav");
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 11025 * 2);
    }
}
