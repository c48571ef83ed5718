//! Narrow view of C3 that C4 depends on (spec §4.4c), mirroring how
//! `playback_sink` keeps this crate from depending on the concrete gateway
//! type. `voicecore-session` owns the real `SttClient` and provides the
//! adapter over it.

pub trait SttTimingReset: Send + Sync {
    /// Clears C3's start-of-speech reference on barge-in, so the audio sent
    /// during the agent's interrupted reply isn't counted as user latency.
    fn reset_timing_on_bargein(&self);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::SttTimingReset;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls for assertion in orchestrator tests; drives no real STT
    /// transport.
    #[derive(Default)]
    pub struct NullSttTimingReset {
        resets: AtomicUsize,
    }

    impl NullSttTimingReset {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reset_count(&self) -> usize {
            self.resets.load(Ordering::SeqCst)
        }
    }

    impl SttTimingReset for NullSttTimingReset {
        fn reset_timing_on_bargein(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }
}
