/// Audio node implementations used by the sound layers
///
/// # Node Categories
///
/// ## Control
/// - [`automation::Param`] - Scheduled set/linear/exponential/target automation
///
/// ## Sources
/// - [`buffer_source::BufferSource`] - Looped or one-shot noise buffer playback
/// - [`oscillator::Oscillator`] - Sine and sawtooth with frequency automation
///
/// ## Processing
/// - [`filter::Filter`] - Stereo biquad (lowpass, highpass, bandpass)
///
/// ## Graph nodes (implement [`crate::audio_node::AudioNode`])
/// - [`bed::AmbientBed`] - Continuous filtered noise loop with optional LFO
/// - [`burst::ToneBurst`] - Enveloped oscillator one-shot
/// - [`burst::NoiseBurst`] - Enveloped, filtered noise one-shot
pub mod automation;
pub mod bed;
pub mod buffer_source;
pub mod burst;
pub mod filter;
pub mod oscillator;

pub use automation::Param;
pub use bed::{AmbientBed, Lfo, LfoTarget, StopHandle};
pub use buffer_source::BufferSource;
pub use burst::{NoiseBurst, ToneBurst};
pub use filter::{Filter, FilterKind};
pub use oscillator::{Oscillator, Waveform};
