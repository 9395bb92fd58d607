//! Audio mix engine: reconciles a desired mix against live layers
//!
//! ```text
//!              set_mix({rain: 0.5, cafe: 0.4})
//!                           |
//!        +------------------+-------------------+
//!        | absent / zero    | new, positive     | live, positive
//!        v                  v                   v
//!   dispose layer      factory.build()     retarget bus gain
//!   remove bus         bus gain = volume   (tau = 0.1 s)
//! ```
//!
//! The audio context is created lazily on the first non-empty mix and
//! resumed whenever a mix with active sounds is applied. Failures never reach
//! the caller: a blocked output leaves new layers absent until the next
//! `set_mix`.

use crate::audio::AudioOutput;
use crate::config::AudioConfig;
use crate::context::{AudioContext, ContextHandle, ContextState};
use crate::error::AudioResult;
use crate::graph::{self, BusId};
use crate::layers::{self, LayerDisposer, SoundLayerFactory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Volumes at or below this are removed by [`Mix::set_volume`]
pub const REMOVE_THRESHOLD: f32 = 0.01;

/// Volume a sound gets when toggled on
pub const TOGGLE_VOLUME: f32 = 0.5;

/// Desired mix: sound id -> volume
///
/// Only entries with a positive volume are active; zero or negative entries
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mix(BTreeMap<String, f32>);

impl Mix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a volume as given (zero keeps the entry but makes it inactive)
    pub fn set(&mut self, id: impl Into<String>, volume: f32) {
        self.0.insert(id.into(), volume);
    }

    pub fn with(mut self, id: impl Into<String>, volume: f32) -> Self {
        self.set(id, volume);
        self
    }

    pub fn remove(&mut self, id: &str) {
        self.0.remove(id);
    }

    /// Volume of `id`, 0 when absent
    pub fn volume(&self, id: &str) -> f32 {
        self.0.get(id).copied().unwrap_or(0.0)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.volume(id) > 0.0
    }

    /// Active entries in id order
    pub fn active(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.0
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(id, v)| (id.as_str(), *v))
    }

    pub fn is_silent(&self) -> bool {
        self.active().next().is_none()
    }

    /// Mixer slider: set a volume, dropping the sound at or below 0.01
    pub fn set_volume(&mut self, id: &str, volume: f32) {
        if volume <= REMOVE_THRESHOLD {
            self.0.remove(id);
        } else {
            self.0.insert(id.to_string(), volume.min(1.0));
        }
    }

    /// Mixer button: absent sounds come in at 0.5, present ones are removed
    pub fn toggle(&mut self, id: &str) {
        if self.0.remove(id).is_none() {
            self.0.insert(id.to_string(), TOGGLE_VOLUME);
        }
    }

    /// Parse `rain=0.5,cafe=0.4`
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut mix = Mix::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, volume) = part
                .split_once('=')
                .ok_or_else(|| format!("expected id=volume, got '{part}'"))?;
            let volume: f32 = volume
                .trim()
                .parse()
                .map_err(|_| format!("invalid volume for {}: '{}'", id.trim(), volume.trim()))?;
            mix.set(id.trim(), volume.clamp(0.0, 1.0));
        }
        Ok(mix)
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for Mix {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Mix(iter.into_iter().map(|(id, v)| (id.into(), v)).collect())
    }
}

/// Opens the output device when the context is first needed
pub type OutputOpener = Box<dyn Fn() -> AudioResult<Box<dyn AudioOutput>> + Send>;

struct LiveLayer {
    bus: BusId,
    disposer: LayerDisposer,
}

pub struct AudioMixEngine {
    context: Option<AudioContext>,
    layers: BTreeMap<String, LiveLayer>,
    chime_bus: Option<BusId>,
    factory: SoundLayerFactory,
    open_output: OutputOpener,
    master_volume: f32,
    smoothing: f32,
}

impl AudioMixEngine {
    pub fn new(config: &AudioConfig, runtime: Handle, open_output: OutputOpener) -> Self {
        Self::with_factory(
            config,
            SoundLayerFactory::new(config.noise_seconds, runtime),
            open_output,
        )
    }

    pub fn with_factory(config: &AudioConfig, factory: SoundLayerFactory, open_output: OutputOpener) -> Self {
        Self {
            context: None,
            layers: BTreeMap::new(),
            chime_bus: None,
            factory,
            open_output,
            master_volume: config.master_volume.clamp(0.0, 1.0),
            smoothing: config.smoothing_seconds,
        }
    }

    /// Apply a desired mix
    pub fn set_mix(&mut self, mix: &Mix) {
        if mix.is_silent() {
            self.stop_all();
            return;
        }

        let Some(ctx) = self.ensure_context() else {
            return;
        };

        let stale: Vec<String> = self
            .layers
            .keys()
            .filter(|id| !mix.is_active(id))
            .cloned()
            .collect();
        for id in stale {
            self.stop_layer(&id);
        }

        for (id, volume) in mix.active() {
            if let Some(layer) = self.layers.get(id) {
                graph::lock(ctx.graph()).set_bus_target(layer.bus, volume, self.smoothing);
                debug!("Layer {} -> {:.2}", id, volume);
                continue;
            }

            if !ctx.is_running() {
                debug!("Context not running, {} deferred", id);
                continue;
            }

            let bus = graph::lock(ctx.graph()).add_bus(volume);
            match self.factory.build(id, bus, &ctx) {
                Some(disposer) => {
                    self.layers.insert(id.to_string(), LiveLayer { bus, disposer });
                }
                None => {
                    graph::lock(ctx.graph()).remove_bus(bus);
                }
            }
        }
    }

    /// Set the master volume, ramping it when the context is running
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        if let Some(ctx) = &self.context {
            if ctx.state() == ContextState::Running {
                graph::lock(ctx.graph()).set_master_target(self.master_volume, self.smoothing);
            }
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Play the two-tone completion chime on the shared context
    pub fn play_chime(&mut self) {
        let Some(ctx) = self.ensure_context() else {
            return;
        };
        if !ctx.is_running() {
            return;
        }

        let mut mix_graph = graph::lock(ctx.graph());
        let bus = match self.chime_bus.filter(|bus| mix_graph.has_bus(*bus)) {
            Some(bus) => bus,
            None => mix_graph.add_bus(1.0),
        };
        self.chime_bus = Some(bus);
        for tone in layers::chime() {
            mix_graph.push_node(bus, tone);
        }
        debug!("Chime queued on bus {}", bus);
    }

    /// Stop every layer and release the audio context
    pub fn dispose(&mut self) {
        self.stop_all();
        if let Some(mut ctx) = self.context.take() {
            ctx.close();
        }
        self.chime_bus = None;
    }

    /// Ids of live layers, sorted
    pub fn active_sounds(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    /// Identity of the live layer for `id` (its bus)
    pub fn layer_id(&self, id: &str) -> Option<BusId> {
        self.layers.get(id).map(|l| l.bus)
    }

    /// Where the live layer's gain is heading
    pub fn layer_gain_target(&self, id: &str) -> Option<f32> {
        let layer = self.layers.get(id)?;
        let ctx = self.context.as_ref()?;
        let target = graph::lock(ctx.graph()).bus_gain_target(layer.bus);
        target
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.context.as_ref().map(AudioContext::state)
    }

    /// Transients scheduled on the current context
    pub fn transients_fired(&self) -> u64 {
        self.context
            .as_ref()
            .map_or(0, |ctx| ctx.handle().transients_fired())
    }

    /// Create the context if needed and try to resume it
    fn ensure_context(&mut self) -> Option<ContextHandle> {
        let closed = self
            .context
            .as_ref()
            .map_or(true, |ctx| ctx.state() == ContextState::Closed);
        if closed {
            let output = match (self.open_output)() {
                Ok(output) => output,
                Err(e) => {
                    warn!("Audio output unavailable: {}", e);
                    return None;
                }
            };
            let ctx = AudioContext::new(output);
            graph::lock(ctx.graph()).set_master(self.master_volume);
            self.context = Some(ctx);
            self.chime_bus = None;
        }

        let ctx = self.context.as_mut()?;
        if ctx.state() == ContextState::Suspended {
            match ctx.resume() {
                Ok(()) => {
                    graph::lock(ctx.graph()).set_master_target(self.master_volume, self.smoothing);
                    info!("Audio context resumed");
                }
                Err(e) => warn!("Playback blocked, retrying on next mix change: {}", e),
            }
        }
        Some(ctx.handle())
    }

    fn stop_layer(&mut self, id: &str) {
        if let Some(layer) = self.layers.remove(id) {
            layer.disposer.dispose();
            if let Some(ctx) = &self.context {
                graph::lock(ctx.graph()).remove_bus(layer.bus);
            }
            info!("Layer {} stopped", id);
        }
    }

    fn stop_all(&mut self) {
        let ids: Vec<String> = self.layers.keys().cloned().collect();
        for id in ids {
            self.stop_layer(&id);
        }
    }
}

impl Drop for AudioMixEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
