//! Adapts the concrete `AudioGateway<O, E>` to the narrow `PlaybackSink`
//! view that C4 depends on (dependency-inversion mirror of how
//! `voicecore-echo` implements `EchoGate` without `voicecore-audio`
//! depending on it).

use std::sync::{Arc, Mutex};

use voicecore_audio::{AudioGateway, AudioOutput};
use voicecore_echo::EchoCanceller;
use voicecore_stt::SttClient;
use voicecore_turn::{PlaybackSink, SttTimingReset};

pub struct GatewayPlaybackSink<O: AudioOutput> {
    gateway: Arc<AudioGateway<O, EchoCanceller>>,
}

impl<O: AudioOutput> GatewayPlaybackSink<O> {
    pub fn new(gateway: Arc<AudioGateway<O, EchoCanceller>>) -> Self {
        Self { gateway }
    }
}

impl<O: AudioOutput + 'static> PlaybackSink for GatewayPlaybackSink<O> {
    fn push_stream_chunk(&self, pcm: Vec<u8>) {
        self.gateway.push_stream_chunk(pcm);
    }

    fn end_stream(&self) {
        self.gateway.end_stream();
    }

    fn play_oneshot(&self, pcm: Vec<u8>) {
        if let Err(err) = self.gateway.play_oneshot(pcm) {
            tracing::warn!(error = %err, "one-shot playback failed");
        }
    }

    fn stop_playback(&self) {
        self.gateway.stop_playback();
    }

    fn is_playing(&self) -> bool {
        self.gateway.is_playing()
    }

    fn reset_interrupt_state(&self) {
        self.gateway.reset_interrupt_state();
    }
}

/// Adapts the shared `Arc<Mutex<Box<dyn SttClient>>>` to the narrow
/// `SttTimingReset` view C4 depends on, so the orchestrator never needs to
/// know C3's full contract or lock it itself.
pub struct SttResetHandle {
    stt: Arc<Mutex<Box<dyn SttClient>>>,
}

impl SttResetHandle {
    pub fn new(stt: Arc<Mutex<Box<dyn SttClient>>>) -> Self {
        Self { stt }
    }
}

impl SttTimingReset for SttResetHandle {
    fn reset_timing_on_bargein(&self) {
        self.stt.lock().unwrap().reset_timing_on_bargein();
    }
}
