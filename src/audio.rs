//! Audio output backends
//!
//! An [`AudioOutput`] pulls blocks from a [`SharedGraph`]. Two backends:
//!
//! - [`CpalOutput`]: real-time output through cpal (JACK, ALSA, CoreAudio,
//!   WASAPI, OpenSL ES)
//! - [`OfflineOutput`]: no device; the owner pulls audio explicitly. Used by
//!   tests and WAV rendering.

use crate::audio_node::Frame;
use crate::error::{AudioError, AudioResult};
use crate::graph::{self, SharedGraph};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

/// A sink the audio context drives
///
/// `start` may be called again after `suspend`; implementations resume the
/// same stream when they can.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Begin (or resume) pulling audio from `graph`
    fn start(&mut self, graph: SharedGraph) -> AudioResult<()>;

    /// Stop pulling audio; the graph is left untouched
    fn suspend(&mut self) -> AudioResult<()>;
}

/// Real-time output on the default host's default device
pub struct CpalOutput {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    /// Open the default output device; no stream is built until `start`
    pub fn open_default() -> AudioResult<Self> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let name = device
            .name()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        info!("Audio device: {}", name);

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        info!("Audio config: {:?}", config);

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        graph: SharedGraph,
    ) -> AudioResult<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut block: Vec<Frame> = Vec::new();

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                block.resize(frames, [0.0, 0.0]);
                graph::lock(&graph).render(&mut block);
                write_interleaved(data, &block, channels);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;

        Ok(stream)
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn start(&mut self, graph: SharedGraph) -> AudioResult<()> {
        if self.stream.is_none() {
            let config: cpal::StreamConfig = self.config.clone().into();
            let stream = match self.config.sample_format() {
                cpal::SampleFormat::F32 => Self::build_stream::<f32>(&self.device, &config, graph)?,
                cpal::SampleFormat::I16 => Self::build_stream::<i16>(&self.device, &config, graph)?,
                cpal::SampleFormat::U16 => Self::build_stream::<u16>(&self.device, &config, graph)?,
                other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
            };
            self.stream = Some(stream);
        }

        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| AudioError::PlaybackBlocked(e.to_string()))?;
        }
        info!("Audio stream started at {} Hz", self.sample_rate());
        Ok(())
    }

    fn suspend(&mut self) -> AudioResult<()> {
        if let Some(stream) = &self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Device(e.to_string()))?;
            debug!("Audio stream paused");
        }
        Ok(())
    }
}

/// Spread stereo frames over an interleaved device buffer
///
/// Mono devices get the average of both channels; extra channels beyond two
/// are silent.
fn write_interleaved<T>(data: &mut [T], block: &[Frame], channels: usize)
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    for (out, frame) in data.chunks_mut(channels.max(1)).zip(block.iter()) {
        if channels == 1 {
            out[0] = T::from_sample((frame[0] + frame[1]) * 0.5);
            continue;
        }
        for (ch, sample) in out.iter_mut().enumerate() {
            let value = match ch {
                0 => frame[0],
                1 => frame[1],
                _ => 0.0,
            };
            *sample = T::from_sample(value);
        }
    }
}

/// Device-less output: audio is only produced when the owner renders
///
/// Clones share the attached graph, so a test can keep one clone and hand
/// the other to an audio context.
#[derive(Clone)]
pub struct OfflineOutput {
    sample_rate: u32,
    graph: Option<SharedGraph>,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            graph: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.graph.is_some()
    }

    /// Render `frames` frames from the attached graph (silence before `start`)
    pub fn render(&self, frames: usize) -> Vec<Frame> {
        match &self.graph {
            Some(graph) => graph::lock(graph).render_frames(frames),
            None => vec![[0.0, 0.0]; frames],
        }
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, graph: SharedGraph) -> AudioResult<()> {
        self.graph = Some(graph);
        Ok(())
    }

    fn suspend(&mut self) -> AudioResult<()> {
        self.graph = None;
        Ok(())
    }
}
