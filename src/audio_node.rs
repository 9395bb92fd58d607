/// Block-based audio processing - core abstraction for the mix graph
///
/// Every sound-producing entity in a layer (looped ambient beds, one-shot
/// transients, the completion chime) implements [`AudioNode`]. The graph asks
/// each node for one block of stereo frames at a time and drops nodes that
/// report [`NodeStatus::Finished`].

/// One interleaved stereo frame: `[left, right]`
pub type Frame = [f32; 2];

/// Context passed to all nodes during block processing
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    /// Sample rate (usually 44100.0 Hz)
    pub sample_rate: f32,

    /// Absolute frame index of the first frame in this block
    pub frame: u64,

    /// Number of frames to process in this block (usually 512)
    pub block_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, frame: u64, block_size: usize) -> Self {
        Self {
            sample_rate,
            frame,
            block_size,
        }
    }

    /// Graph time in seconds at the start of the block
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }
}

/// Whether a node wants to keep receiving blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Playing,
    Finished,
}

/// Core trait for block-based audio processing
///
/// Nodes ADD their signal into `output` (the graph zeroes the bus buffer
/// before the first node runs), so several nodes can share one bus without an
/// extra mixing step.
///
/// # Performance Notes
/// - Avoid allocations inside process_block (use preallocated state)
/// - Nodes run inside the output callback while the graph lock is held
pub trait AudioNode: Send {
    /// Mix one block of audio into `output`
    fn process_block(&mut self, output: &mut [Frame], context: &ProcessContext) -> NodeStatus;

    /// Get a human-readable name for this node (for debugging)
    fn name(&self) -> &str {
        "AudioNode"
    }
}
