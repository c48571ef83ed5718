//! In-memory `AudioInput`/`AudioOutput` pair for exercising C1's logic and
//! the S1-S6 scenario tests without real hardware (spec §4.1, ambient).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::chunk::AudioChunk;
use crate::traits::{AudioInput, AudioOutput};

/// Feeds pre-loaded frames to a consumer, then reports end-of-stream.
pub struct InMemoryAudioInput {
    sample_rate: u32,
    frames: VecDeque<AudioChunk>,
    stopped: bool,
}

impl InMemoryAudioInput {
    pub fn new(sample_rate: u32, frames: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            frames: frames
                .into_iter()
                .map(|samples| AudioChunk::new(samples, sample_rate))
                .collect(),
            stopped: false,
        }
    }

    pub fn push_frame(&mut self, samples: Vec<f32>) {
        self.frames.push_back(AudioChunk::new(samples, self.sample_rate));
    }
}

impl AudioInput for InMemoryAudioInput {
    fn next_frame(&mut self) -> Option<AudioChunk> {
        if self.stopped {
            return None;
        }
        self.frames.pop_front()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Records every byte slice written to it for assertion in tests.
#[derive(Clone)]
pub struct InMemoryAudioOutput {
    sample_rate: u32,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemoryAudioOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

impl AudioOutput for InMemoryAudioOutput {
    fn write(&mut self, bytes: &[u8]) -> crate::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_input_yields_frames_then_none() {
        let mut input = InMemoryAudioInput::new(16_000, vec![vec![0.0; 4], vec![1.0; 4]]);
        assert!(input.next_frame().is_some());
        assert!(input.next_frame().is_some());
        assert!(input.next_frame().is_none());
    }

    #[test]
    fn in_memory_output_records_writes() {
        let mut output = InMemoryAudioOutput::new(16_000);
        output.write(&[1, 2, 3]).unwrap();
        output.write(&[4, 5]).unwrap();
        assert_eq!(output.written_bytes(), vec![1, 2, 3, 4, 5]);
    }
}
