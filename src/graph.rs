//! Mix graph: per-layer buses summed into a master gain
//!
//! ```text
//! [nodes] -> bus gain ─┐
//! [nodes] -> bus gain ─┼─> master gain -> output
//! [nodes] -> bus gain ─┘
//! ```
//!
//! A bus is the Rust counterpart of a layer's gain node: every node a layer
//! creates (its ambient bed and each transient) is pushed onto the layer's
//! bus. Removing the bus disconnects the layer in one step.
//!
//! The graph lives behind a mutex shared by the output callback, the mix
//! engine and the transient generator tasks ([`SharedGraph`]).

use crate::audio_node::{AudioNode, Frame, NodeStatus, ProcessContext};
use crate::nodes::Param;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type BusId = u64;

pub type SharedGraph = Arc<Mutex<MixGraph>>;

/// Lock a shared graph, recovering from a poisoned mutex
///
/// A panic inside a node leaves the graph in a consistent state (nodes are
/// only ever appended or dropped), so playback continues.
pub fn lock(graph: &SharedGraph) -> MutexGuard<'_, MixGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Bus {
    gain: Param,
    nodes: Vec<Box<dyn AudioNode>>,
}

pub struct MixGraph {
    sample_rate: f32,
    master: Param,
    buses: BTreeMap<BusId, Bus>,
    next_bus: BusId,
    frames_rendered: u64,
    scratch: Vec<Frame>,
}

impl MixGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            master: Param::new(1.0),
            buses: BTreeMap::new(),
            next_bus: 1,
            frames_rendered: 0,
            scratch: Vec::new(),
        }
    }

    pub fn shared(sample_rate: f32) -> SharedGraph {
        Arc::new(Mutex::new(Self::new(sample_rate)))
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Connect a new bus with an initial gain
    pub fn add_bus(&mut self, gain: f32) -> BusId {
        let id = self.next_bus;
        self.next_bus += 1;
        self.buses.insert(
            id,
            Bus {
                gain: Param::new(gain),
                nodes: Vec::new(),
            },
        );
        id
    }

    /// Disconnect a bus and drop every node on it
    pub fn remove_bus(&mut self, id: BusId) -> bool {
        self.buses.remove(&id).is_some()
    }

    pub fn has_bus(&self, id: BusId) -> bool {
        self.buses.contains_key(&id)
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// Nodes currently playing on a bus
    pub fn node_count(&self, id: BusId) -> usize {
        self.buses.get(&id).map_or(0, |b| b.nodes.len())
    }

    /// Attach a node to a bus; returns false (dropping the node) if the bus
    /// has been removed
    pub fn push_node(&mut self, id: BusId, node: Box<dyn AudioNode>) -> bool {
        match self.buses.get_mut(&id) {
            Some(bus) => {
                bus.nodes.push(node);
                true
            }
            None => false,
        }
    }

    /// Smoothly move a bus gain toward `value`
    pub fn set_bus_target(&mut self, id: BusId, value: f32, time_constant: f32) -> bool {
        match self.buses.get_mut(&id) {
            Some(bus) => {
                bus.gain.set_target(value, time_constant);
                true
            }
            None => false,
        }
    }

    /// Where a bus gain is heading
    pub fn bus_gain_target(&self, id: BusId) -> Option<f32> {
        self.buses.get(&id).map(|b| b.gain.target())
    }

    pub fn set_master(&mut self, value: f32) {
        self.master.set_value(value);
    }

    pub fn set_master_target(&mut self, value: f32, time_constant: f32) {
        self.master.set_target(value, time_constant);
    }

    pub fn master_target(&self) -> f32 {
        self.master.target()
    }

    /// Drop every bus
    pub fn clear(&mut self) {
        self.buses.clear();
    }

    /// Render one block, overwriting `output`
    pub fn render(&mut self, output: &mut [Frame]) {
        for frame in output.iter_mut() {
            *frame = [0.0, 0.0];
        }

        let context = ProcessContext::new(self.sample_rate, self.frames_rendered, output.len());
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(output.len(), [0.0, 0.0]);

        for bus in self.buses.values_mut() {
            for frame in scratch.iter_mut() {
                *frame = [0.0, 0.0];
            }
            bus.nodes
                .retain_mut(|node| node.process_block(&mut scratch, &context) == NodeStatus::Playing);

            for (out, s) in output.iter_mut().zip(scratch.iter()) {
                let g = bus.gain.next(self.sample_rate);
                out[0] += s[0] * g;
                out[1] += s[1] * g;
            }
        }

        for out in output.iter_mut() {
            let g = self.master.next(self.sample_rate);
            out[0] = (out[0] * g).clamp(-1.0, 1.0);
            out[1] = (out[1] * g).clamp(-1.0, 1.0);
        }

        self.scratch = scratch;
        self.frames_rendered += output.len() as u64;
    }

    /// Render `frames` frames into a new buffer
    pub fn render_frames(&mut self, frames: usize) -> Vec<Frame> {
        let mut out = vec![[0.0, 0.0]; frames];
        self.render(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constant DC source for gain checks
    struct Dc(f32);

    impl AudioNode for Dc {
        fn process_block(&mut self, output: &mut [Frame], _context: &ProcessContext) -> NodeStatus {
            for f in output.iter_mut() {
                f[0] += self.0;
                f[1] += self.0;
            }
            NodeStatus::Playing
        }
    }

    /// Plays for one block only
    struct Blip;

    impl AudioNode for Blip {
        fn process_block(&mut self, _output: &mut [Frame], _context: &ProcessContext) -> NodeStatus {
            NodeStatus::Finished
        }
    }

    #[test]
    fn test_bus_and_master_gains_multiply() {
        let mut graph = MixGraph::new(1000.0);
        let bus = graph.add_bus(0.5);
        graph.push_node(bus, Box::new(Dc(0.8)));
        graph.set_master(0.5);
        let out = graph.render_frames(16);
        assert!((out[15][0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_buses_sum() {
        let mut graph = MixGraph::new(1000.0);
        let a = graph.add_bus(1.0);
        let b = graph.add_bus(1.0);
        graph.push_node(a, Box::new(Dc(0.1)));
        graph.push_node(b, Box::new(Dc(0.2)));
        let out = graph.render_frames(4);
        assert!((out[3][1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_removed_bus_is_silent_and_rejects_nodes() {
        let mut graph = MixGraph::new(1000.0);
        let bus = graph.add_bus(1.0);
        graph.push_node(bus, Box::new(Dc(0.5)));
        assert!(graph.remove_bus(bus));
        assert!(!graph.push_node(bus, Box::new(Dc(0.5))));
        let out = graph.render_frames(8);
        assert!(out.iter().all(|f| f[0] == 0.0));
    }

    #[test]
    fn test_finished_nodes_are_dropped() {
        let mut graph = MixGraph::new(1000.0);
        let bus = graph.add_bus(1.0);
        graph.push_node(bus, Box::new(Blip));
        graph.push_node(bus, Box::new(Dc(0.1)));
        graph.render_frames(8);
        assert_eq!(graph.node_count(bus), 1);
    }

    #[test]
    fn test_bus_retarget_is_smooth() {
        let mut graph = MixGraph::new(1000.0);
        let bus = graph.add_bus(0.5);
        graph.push_node(bus, Box::new(Dc(1.0)));
        graph.render_frames(10);
        graph.set_bus_target(bus, 0.8, 0.1);
        assert_eq!(graph.bus_gain_target(bus), Some(0.8));
        let out = graph.render_frames(1000);
        assert!(out[0][0] < 0.51, "no step at retarget: {}", out[0][0]);
        assert!((out[999][0] - 0.8).abs() < 1e-3);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut graph = MixGraph::new(1000.0);
        let bus = graph.add_bus(1.0);
        graph.push_node(bus, Box::new(Dc(3.0)));
        let out = graph.render_frames(4);
        assert_eq!(out[0][0], 1.0);
        assert!((graph.current_time() - 0.004).abs() < 1e-9);
    }
}
