//! Narrow view of C1 that C4 depends on, so this crate never needs the
//! audio crate's generic `AudioGateway<O, E>` type. `voicecore-session`
//! provides the concrete adapter over it.

/// The six C1 operations the orchestrator drives (spec §4.1/§4.4c).
pub trait PlaybackSink: Send + Sync {
    fn push_stream_chunk(&self, pcm: Vec<u8>);
    fn end_stream(&self);
    fn play_oneshot(&self, pcm: Vec<u8>);
    fn stop_playback(&self);
    fn is_playing(&self) -> bool;
    fn reset_interrupt_state(&self);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::PlaybackSink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records every call for assertion in orchestrator tests; never
    /// touches real audio hardware.
    #[derive(Default)]
    pub struct RecordingPlaybackSink {
        chunks: Mutex<Vec<Vec<u8>>>,
        oneshots: Mutex<Vec<Vec<u8>>>,
        ended: AtomicBool,
        stopped: AtomicBool,
        playing: AtomicBool,
    }

    impl RecordingPlaybackSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn pushed_chunks(&self) -> Vec<Vec<u8>> {
            self.chunks.lock().unwrap().clone()
        }

        pub fn oneshots(&self) -> Vec<Vec<u8>> {
            self.oneshots.lock().unwrap().clone()
        }

        pub fn was_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }

        pub fn was_ended(&self) -> bool {
            self.ended.load(Ordering::SeqCst)
        }
    }

    impl PlaybackSink for RecordingPlaybackSink {
        fn push_stream_chunk(&self, pcm: Vec<u8>) {
            self.playing.store(true, Ordering::SeqCst);
            self.chunks.lock().unwrap().push(pcm);
        }

        fn end_stream(&self) {
            self.ended.store(true, Ordering::SeqCst);
            self.playing.store(false, Ordering::SeqCst);
        }

        fn play_oneshot(&self, pcm: Vec<u8>) {
            self.oneshots.lock().unwrap().push(pcm);
        }

        fn stop_playback(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.playing.store(false, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }

        fn reset_interrupt_state(&self) {
            self.stopped.store(false, Ordering::SeqCst);
        }
    }
}
