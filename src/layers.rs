//! Sound layer factory: procedural recipes for every ambient sound
//!
//! A layer is two things feeding the same bus:
//!
//! 1. an **ambient bed**: a looped noise buffer shaped by filters (and, for
//!    ocean and wind, a slow LFO)
//! 2. zero or more **transient generators**: tasks that periodically push a
//!    short enveloped burst (drip, chirp, crackle, ...) onto the bus
//!
//! Recipes are plain data ([`LayerRecipe`]) so the live factory and the
//! offline renderer schedule exactly the same sounds.
//!
//! # Example
//! ```ignore
//! let mut factory = SoundLayerFactory::new(4.0, tokio::runtime::Handle::current());
//! let bus = graph::lock(ctx.graph()).add_bus(0.5);
//! let layer = factory.build("rain", bus, &ctx).expect("known sound");
//! // ... later
//! layer.dispose();
//! ```

use crate::audio_node::AudioNode;
use crate::context::ContextHandle;
use crate::graph::{self, BusId};
use crate::nodes::{
    AmbientBed, BufferSource, Filter, FilterKind, Lfo, LfoTarget, NoiseBurst, Oscillator, Param,
    StopHandle, ToneBurst,
};
use crate::noise::{NoiseColor, NoiseSynthesizer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Every sound the mixer knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundId {
    Rain,
    Thunder,
    Ocean,
    Wind,
    Birds,
    Fire,
    White,
    Brown,
    Pink,
    Cafe,
    Library,
    Night,
}

impl SoundId {
    pub const ALL: [SoundId; 12] = [
        SoundId::Rain,
        SoundId::Thunder,
        SoundId::Ocean,
        SoundId::Wind,
        SoundId::Birds,
        SoundId::Fire,
        SoundId::White,
        SoundId::Brown,
        SoundId::Pink,
        SoundId::Cafe,
        SoundId::Library,
        SoundId::Night,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundId::Rain => "rain",
            SoundId::Thunder => "thunder",
            SoundId::Ocean => "ocean",
            SoundId::Wind => "wind",
            SoundId::Birds => "birds",
            SoundId::Fire => "fire",
            SoundId::White => "white",
            SoundId::Brown => "brown",
            SoundId::Pink => "pink",
            SoundId::Cafe => "cafe",
            SoundId::Library => "library",
            SoundId::Night => "night",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoundId::Rain => "Rain",
            SoundId::Thunder => "Thunder",
            SoundId::Ocean => "Ocean waves",
            SoundId::Wind => "Wind",
            SoundId::Birds => "Birdsong",
            SoundId::Fire => "Fireplace",
            SoundId::White => "White noise",
            SoundId::Brown => "Brown noise",
            SoundId::Pink => "Pink noise",
            SoundId::Cafe => "Cafe",
            SoundId::Library => "Library",
            SoundId::Night => "Summer night",
        }
    }

    pub fn recipe(&self) -> LayerRecipe {
        match self {
            SoundId::Rain => RAIN,
            SoundId::Thunder => THUNDER,
            SoundId::Ocean => OCEAN,
            SoundId::Wind => WIND,
            SoundId::Birds => BIRDS,
            SoundId::Fire => FIRE,
            SoundId::White => plain(NoiseColor::White),
            SoundId::Brown => plain(NoiseColor::Brown),
            SoundId::Pink => plain(NoiseColor::Pink),
            SoundId::Cafe => CAFE,
            SoundId::Library => LIBRARY,
            SoundId::Night => NIGHT,
        }
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown sound: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoSpec {
    pub rate: f32,
    pub depth: f32,
    pub target: LfoTarget,
}

/// The looped half of a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedSpec {
    pub color: NoiseColor,
    pub filters: &'static [FilterSpec],
    pub level: f32,
    pub lfo: Option<LfoSpec>,
}

/// A transient generator firing every `min_ms..max_ms` milliseconds
///
/// The period is drawn once when the generator starts and then stays fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSpec {
    pub min_ms: u64,
    pub max_ms: u64,
    pub kind: TransientKind,
}

impl GeneratorSpec {
    pub fn draw_period<R: Rng>(&self, rng: &mut R) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rng.gen_range(self.min_ms..self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerRecipe {
    pub bed: BedSpec,
    pub generators: &'static [GeneratorSpec],
}

const fn plain(color: NoiseColor) -> LayerRecipe {
    LayerRecipe {
        bed: BedSpec {
            color,
            filters: &[],
            level: 1.0,
            lfo: None,
        },
        generators: &[],
    }
}

const RAIN: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Brown,
        filters: &[
            FilterSpec { kind: FilterKind::HighPass, cutoff: 800.0 },
            FilterSpec { kind: FilterKind::LowPass, cutoff: 8000.0 },
        ],
        level: 1.0,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 200, max_ms: 500, kind: TransientKind::Drip }],
};

const THUNDER: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Brown,
        filters: &[FilterSpec { kind: FilterKind::HighPass, cutoff: 600.0 }],
        level: 1.0,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 8000, max_ms: 23000, kind: TransientKind::ThunderClap }],
};

const OCEAN: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Pink,
        filters: &[FilterSpec { kind: FilterKind::LowPass, cutoff: 1200.0 }],
        level: 0.5,
        lfo: Some(LfoSpec { rate: 0.1, depth: 0.3, target: LfoTarget::Level }),
    },
    generators: &[],
};

const WIND: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Pink,
        filters: &[FilterSpec { kind: FilterKind::BandPass { q: 0.5 }, cutoff: 400.0 }],
        level: 1.0,
        lfo: Some(LfoSpec {
            rate: 0.05,
            depth: 200.0,
            target: LfoTarget::Cutoff { index: 0, base: 400.0 },
        }),
    },
    generators: &[],
};

const BIRDS: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Pink,
        filters: &[],
        level: 0.1,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 500, max_ms: 2500, kind: TransientKind::Chirp }],
};

const FIRE: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Brown,
        filters: &[FilterSpec { kind: FilterKind::BandPass { q: 1.0 }, cutoff: 600.0 }],
        level: 1.0,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 100, max_ms: 300, kind: TransientKind::Crackle }],
};

const CAFE: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Pink,
        filters: &[FilterSpec { kind: FilterKind::LowPass, cutoff: 2000.0 }],
        level: 0.4,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 2000, max_ms: 7000, kind: TransientKind::Clink }],
};

const LIBRARY: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::White,
        filters: &[],
        level: 0.08,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 5000, max_ms: 15000, kind: TransientKind::PageTurn }],
};

const NIGHT: LayerRecipe = LayerRecipe {
    bed: BedSpec {
        color: NoiseColor::Brown,
        filters: &[],
        level: 0.05,
        lfo: None,
    },
    generators: &[GeneratorSpec { min_ms: 300, max_ms: 1800, kind: TransientKind::Crickets }],
};

impl BedSpec {
    /// Build the looped bed with a fresh noise buffer
    pub fn build(&self, synth: &mut NoiseSynthesizer, noise_seconds: f32) -> AmbientBed {
        let sample_rate = synth.sample_rate() as f32;
        let buffer = Arc::new(synth.generate(self.color, noise_seconds));
        let mut bed = AmbientBed::new(BufferSource::looped(buffer), self.level);
        for spec in self.filters {
            bed = bed.with_filter(Filter::new(spec.kind, spec.cutoff, sample_rate));
        }
        if let Some(lfo) = self.lfo {
            bed = bed.with_lfo(Lfo::new(lfo.rate, lfo.depth, lfo.target));
        }
        bed
    }
}

/// Short one-shot sounds scheduled by generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Sine 2-5 kHz, 0.02 decaying over 100 ms
    Drip,
    /// 2 s of lowpassed brown noise swelling to 0.5 over 300 ms
    ThunderClap,
    /// Sine 2-5 kHz sweeping up 500 Hz then down, 150 ms
    Chirp,
    /// Sawtooth 1-5 kHz, 50 ms
    Crackle,
    /// Sine 3-5 kHz, 80 ms
    Clink,
    /// Highpassed white noise swell, 400 ms
    PageTurn,
    /// 3-7 pulses of a 4-5 kHz sine, 80 ms apart
    Crickets,
}

/// Spacing between cricket pulses
const CRICKET_PULSE_SPACING: f64 = 0.08;

fn decay(peak: f32, seconds: f64) -> Param {
    let mut gain = Param::new(peak);
    gain.set_value_at(0.0, peak).exponential_ramp_to(seconds, 0.001);
    gain
}

impl TransientKind {
    /// Build one instance, drawing its random pitch (and noise) from `rng`
    pub fn build<R: Rng>(&self, rng: &mut R, sample_rate: u32) -> Box<dyn AudioNode> {
        let sr = sample_rate as f32;
        match self {
            TransientKind::Drip => {
                let osc = Oscillator::sine(2000.0 + rng.gen::<f32>() * 3000.0);
                Box::new(ToneBurst::new(osc, decay(0.02, 0.1), 0.1))
            }
            TransientKind::Chirp => {
                let base = 2000.0 + rng.gen::<f32>() * 3000.0;
                let mut osc = Oscillator::sine(base);
                osc.frequency()
                    .set_value_at(0.0, base)
                    .linear_ramp_to(0.05, base + 500.0)
                    .linear_ramp_to(0.1, base - 200.0);
                Box::new(ToneBurst::new(osc, decay(0.05, 0.15), 0.15))
            }
            TransientKind::Crackle => {
                let osc = Oscillator::sawtooth(1000.0 + rng.gen::<f32>() * 4000.0);
                Box::new(ToneBurst::new(osc, decay(0.03, 0.05), 0.05))
            }
            TransientKind::Clink => {
                let osc = Oscillator::sine(3000.0 + rng.gen::<f32>() * 2000.0);
                Box::new(ToneBurst::new(osc, decay(0.04, 0.08), 0.08))
            }
            TransientKind::Crickets => {
                let osc = Oscillator::sine(4000.0 + rng.gen::<f32>() * 1000.0);
                let repeats = rng.gen_range(3..=7);
                let mut gain = Param::new(1.0);
                for j in 0..repeats {
                    let t = j as f64 * CRICKET_PULSE_SPACING;
                    gain.set_value_at(t, 0.03).exponential_ramp_to(t + 0.05, 0.001);
                }
                let duration = repeats as f64 * CRICKET_PULSE_SPACING + 0.1;
                Box::new(ToneBurst::new(osc, gain, duration))
            }
            TransientKind::ThunderClap => {
                let mut synth = NoiseSynthesizer::with_seed(sample_rate, rng.gen());
                let buffer = Arc::new(synth.generate(NoiseColor::Brown, 2.0));
                let mut gain = Param::new(0.0);
                gain.set_value_at(0.0, 0.0)
                    .linear_ramp_to(0.3, 0.5)
                    .exponential_ramp_to(2.0, 0.001);
                Box::new(NoiseBurst::new(
                    BufferSource::one_shot(buffer),
                    Filter::lowpass(200.0, sr),
                    gain,
                    2.0,
                ))
            }
            TransientKind::PageTurn => {
                let mut synth = NoiseSynthesizer::with_seed(sample_rate, rng.gen());
                let buffer = Arc::new(synth.generate(NoiseColor::White, 1.0));
                let mut gain = Param::new(0.0);
                gain.set_value_at(0.0, 0.0)
                    .linear_ramp_to(0.1, 0.06)
                    .exponential_ramp_to(0.4, 0.001);
                Box::new(NoiseBurst::new(
                    BufferSource::one_shot(buffer),
                    Filter::highpass(3000.0, sr),
                    gain,
                    0.4,
                ))
            }
        }
    }
}

/// The two-tone completion chime: 800 Hz, then 1200 Hz 200 ms later
pub fn chime() -> Vec<Box<dyn AudioNode>> {
    [(800.0, 0.0), (1200.0, 0.2)]
        .into_iter()
        .map(|(freq, delay)| {
            let node: Box<dyn AudioNode> =
                Box::new(ToneBurst::new(Oscillator::sine(freq), decay(0.3, 1.0), 1.0).delayed(delay));
            node
        })
        .collect()
}

/// Everything a live layer started, stopped together
///
/// Dropping the disposer has the same effect as calling [`dispose`](Self::dispose).
pub struct LayerDisposer {
    sound: SoundId,
    tasks: JoinSet<()>,
    stops: Vec<StopHandle>,
}

impl LayerDisposer {
    pub fn sound(&self) -> SoundId {
        self.sound
    }

    /// Number of transient generator tasks still owned by this layer
    pub fn generator_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every generator task and silence every looped source
    pub fn dispose(mut self) {
        self.stop_all();
    }

    fn stop_all(&mut self) {
        self.tasks.abort_all();
        for stop in self.stops.drain(..) {
            stop.stop();
        }
    }
}

impl Drop for LayerDisposer {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Builds live layers on a context
pub struct SoundLayerFactory {
    noise_seconds: f32,
    runtime: Handle,
    rng: StdRng,
}

impl SoundLayerFactory {
    pub fn new(noise_seconds: f32, runtime: Handle) -> Self {
        Self {
            noise_seconds,
            runtime,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a factory with a specific seed (for testing)
    pub fn with_seed(noise_seconds: f32, runtime: Handle, seed: u64) -> Self {
        Self {
            noise_seconds,
            runtime,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Start `sound_id` on `bus`
    ///
    /// Returns `None` for an unknown id or when the bus no longer exists; in
    /// both cases nothing was started.
    pub fn build(&mut self, sound_id: &str, bus: BusId, ctx: &ContextHandle) -> Option<LayerDisposer> {
        let sound = match sound_id.parse::<SoundId>() {
            Ok(sound) => sound,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        let recipe = sound.recipe();

        let mut synth = NoiseSynthesizer::with_seed(ctx.sample_rate(), self.rng.gen());
        let bed = recipe.bed.build(&mut synth, self.noise_seconds);
        let stop = bed.stop_handle();
        if !graph::lock(ctx.graph()).push_node(bus, Box::new(bed)) {
            warn!("Bus {} vanished before {} could start", bus, sound);
            return None;
        }

        let mut tasks = JoinSet::new();
        for spec in recipe.generators {
            let period = spec.draw_period(&mut self.rng);
            let seed = self.rng.gen();
            tasks.spawn_on(run_generator(*spec, period, bus, ctx.clone(), seed), &self.runtime);
            debug!("{} generator {:?} every {:?}", sound, spec.kind, period);
        }

        info!("Layer {} started on bus {}", sound, bus);
        Some(LayerDisposer {
            sound,
            tasks,
            stops: vec![stop],
        })
    }
}

/// Fire `spec.kind` every `period` until aborted or the bus disappears
///
/// Firings are skipped while the context is not running.
async fn run_generator(spec: GeneratorSpec, period: Duration, bus: BusId, ctx: ContextHandle, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !ctx.is_running() {
            continue;
        }

        let node = spec.kind.build(&mut rng, ctx.sample_rate());
        ctx.note_transient();
        if !graph::lock(ctx.graph()).push_node(bus, node) {
            debug!("Bus {} gone, {:?} generator exiting", bus, spec.kind);
            break;
        }
    }
}
