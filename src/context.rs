//! Audio context: the graph, its output and a lifecycle state
//!
//! ```text
//!   Suspended --resume()--> Running --suspend()--> Suspended
//!       \                      |
//!        `------close()--------+-----> Closed
//! ```
//!
//! A context starts suspended; nothing reaches the output until `resume`
//! succeeds. A blocked resume leaves it suspended so the caller can retry.
//! Layers and transient generators only see a cheap [`ContextHandle`].

use crate::audio_node::Frame;
use crate::audio::AudioOutput;
use crate::error::{AudioError, AudioResult};
use crate::graph::{self, MixGraph, SharedGraph};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    Suspended = 0,
    Running = 1,
    Closed = 2,
}

impl ContextState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ContextState::Running,
            2 => ContextState::Closed,
            _ => ContextState::Suspended,
        }
    }
}

/// Shared view of a context for layers and generator tasks
#[derive(Clone)]
pub struct ContextHandle {
    graph: SharedGraph,
    state: Arc<AtomicU8>,
    sample_rate: u32,
    transients: Arc<AtomicU64>,
}

impl ContextHandle {
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Count one transient scheduled on this context
    pub fn note_transient(&self) {
        self.transients.fetch_add(1, Ordering::Relaxed);
    }

    /// Transients scheduled since the context was created
    pub fn transients_fired(&self) -> u64 {
        self.transients.load(Ordering::Relaxed)
    }
}

pub struct AudioContext {
    output: Box<dyn AudioOutput>,
    handle: ContextHandle,
}

impl AudioContext {
    /// Create a suspended context rendering at the output's sample rate
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let sample_rate = output.sample_rate();
        info!("Audio context created at {} Hz", sample_rate);
        Self {
            output,
            handle: ContextHandle {
                graph: MixGraph::shared(sample_rate as f32),
                state: Arc::new(AtomicU8::new(ContextState::Suspended as u8)),
                sample_rate,
                transients: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.handle.graph
    }

    pub fn state(&self) -> ContextState {
        self.handle.state()
    }

    pub fn sample_rate(&self) -> u32 {
        self.handle.sample_rate
    }

    fn set_state(&self, state: ContextState) {
        self.handle.state.store(state as u8, Ordering::Release);
    }

    /// Start output; a no-op when already running
    pub fn resume(&mut self) -> AudioResult<()> {
        match self.state() {
            ContextState::Closed => Err(AudioError::Closed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.output.start(self.handle.graph.clone())?;
                self.set_state(ContextState::Running);
                debug!("Audio context running");
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) -> AudioResult<()> {
        if self.state() == ContextState::Running {
            self.output.suspend()?;
            self.set_state(ContextState::Suspended);
            debug!("Audio context suspended");
        }
        Ok(())
    }

    /// Stop output and drop every bus; the context cannot be resumed
    pub fn close(&mut self) {
        if self.state() == ContextState::Closed {
            return;
        }
        // A failing device pause does not keep the context alive
        let _ = self.output.suspend();
        graph::lock(&self.handle.graph).clear();
        self.set_state(ContextState::Closed);
        info!("Audio context closed");
    }

    /// Pull `frames` frames straight from the graph, bypassing the output
    pub fn render_offline(&self, frames: usize) -> Vec<Frame> {
        graph::lock(&self.handle.graph).render_frames(frames)
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}
