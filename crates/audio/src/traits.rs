use crate::chunk::AudioChunk;

/// Collaborator trait for the microphone side of C1 (spec §6).
///
/// Implementations yield fixed-size PCM frames at `sample_rate()`. The real
/// implementation (`CpalAudioInput`) bridges a realtime cpal callback onto
/// this blocking-iterator shape via a `crossbeam-channel`; the in-memory
/// test implementation just drains a pre-loaded queue.
pub trait AudioInput: Send {
    /// Blocks until a frame is available or the input has stopped.
    fn next_frame(&mut self) -> Option<AudioChunk>;

    fn sample_rate(&self) -> u32;

    fn stop(&mut self);
}

/// Collaborator trait for the speaker side of C1 (spec §6).
pub trait AudioOutput: Send {
    /// Writes PCM and returns the number of bytes actually consumed.
    fn write(&mut self, bytes: &[u8]) -> crate::Result<usize>;

    fn sample_rate(&self) -> u32;

    fn close(&mut self);
}

/// Result of C2's per-frame decision (spec §4.2), named here rather than
/// imported from the echo crate so C1 stays generic over any echo canceller
/// implementation instead of depending on a specific one.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoDecision {
    pub is_echo: bool,
    pub correlation: f32,
    pub confidence: f32,
}

impl EchoDecision {
    pub fn not_echo() -> Self {
        Self::default()
    }
}

/// Collaborator trait for C2, referenced by C1 to gate mic input and fed by
/// C1 with reference audio (spec §3: "C2 is referenced by C1 ... C2 never
/// owns audio devices").
pub trait EchoGate: Send {
    fn feed_reference(&mut self, chunk: &AudioChunk);

    /// `strict` selects the stricter barge-in threshold from spec §4.2.
    fn process(&mut self, mic: &AudioChunk, strict: bool) -> EchoDecision;

    fn end_playback(&mut self);

    fn clear_reference(&mut self);
}
