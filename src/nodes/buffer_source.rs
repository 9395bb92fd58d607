/// Buffer playback - looped ambient beds and one-shot noise bursts
///
/// The buffer is shared (`Arc`) so a layer can hand the same noise to several
/// sources without copying seconds of audio.

use crate::audio_node::Frame;
use crate::noise::NoiseBuffer;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Arc<NoiseBuffer>,
    position: usize,
    looping: bool,
}

impl BufferSource {
    pub fn looped(buffer: Arc<NoiseBuffer>) -> Self {
        Self {
            buffer,
            position: 0,
            looping: true,
        }
    }

    pub fn one_shot(buffer: Arc<NoiseBuffer>) -> Self {
        Self {
            buffer,
            position: 0,
            looping: false,
        }
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Next frame, or `None` once a one-shot buffer is exhausted
    #[inline]
    pub fn next(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.position >= self.buffer.len() {
            if !self.looping {
                return None;
            }
            self.position = 0;
        }
        let frame = self.buffer.frame(self.position);
        self.position += 1;
        Some(frame)
    }
}
