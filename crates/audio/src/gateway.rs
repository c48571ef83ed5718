//! C1, the Audio I/O Gateway (spec §4.1): full-duplex audio with explicit
//! barge-in semantics. Capture runs on its own thread (mirroring the
//! teacher's pattern of never blocking a realtime callback), playback runs
//! on a drain-timer thread that pre-buffers before opening the device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use voicecore_bus::{PipelineStatus, SessionFlags};

use crate::chunk::AudioChunk;
use crate::traits::{AudioInput, AudioOutput, EchoDecision, EchoGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadMode {
    /// Every non-echo frame is forwarded as-is to the streaming-STT consumer.
    External,
    /// An internal energy detector accumulates frames into utterances.
    Internal,
}

#[derive(Debug, Clone)]
pub struct AudioGatewayConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_ms: u32,
    pub vad_mode: VadMode,
    pub energy_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub silence_duration_ms: u32,
    pub barge_in_multiplier: f32,
    pub barge_in_bypass_multiplier: f32,
    pub barge_in_confirm_frames: u32,
    pub playback_ring_ms: u32,
    pub pre_buffer_ms: u32,
    pub drain_interval_ms: u32,
    pub playback_cooldown_ms: u32,
}

impl Default for AudioGatewayConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 16_000,
            frame_ms: 20,
            vad_mode: VadMode::External,
            energy_threshold: 0.02,
            min_speech_duration_ms: 200,
            silence_duration_ms: 500,
            barge_in_multiplier: 1.5,
            barge_in_bypass_multiplier: 4.0,
            barge_in_confirm_frames: 4,
            playback_ring_ms: 500,
            pre_buffer_ms: 400,
            drain_interval_ms: 20,
            playback_cooldown_ms: 300,
        }
    }
}

type FrameCallback = Box<dyn Fn(AudioChunk) + Send + 'static>;
type UtteranceCallback = Box<dyn Fn(AudioChunk) + Send + 'static>;

/// Accumulates frames into one "utterance" for [`VadMode::Internal`].
struct InternalVad {
    buffer: Vec<f32>,
    speaking: bool,
    above_since: Option<Instant>,
    below_since: Option<Instant>,
}

impl InternalVad {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            speaking: false,
            above_since: None,
            below_since: None,
        }
    }

    /// Returns `Some(utterance)` when silence closes out an in-progress one.
    fn push(&mut self, frame: &AudioChunk, config: &AudioGatewayConfig) -> Option<AudioChunk> {
        let energy = frame.rms_energy();
        let now = Instant::now();

        if energy >= config.energy_threshold {
            self.below_since = None;
            if self.above_since.is_none() {
                self.above_since = Some(now);
            }
            if !self.speaking {
                let elapsed = now.duration_since(self.above_since.unwrap()).as_millis() as u32;
                if elapsed >= config.min_speech_duration_ms {
                    self.speaking = true;
                }
            }
            if self.speaking {
                self.buffer.extend_from_slice(&frame.samples);
            }
            None
        } else {
            self.above_since = None;
            if self.speaking {
                self.buffer.extend_from_slice(&frame.samples);
                if self.below_since.is_none() {
                    self.below_since = Some(now);
                }
                let elapsed = now.duration_since(self.below_since.unwrap()).as_millis() as u32;
                if elapsed >= config.silence_duration_ms {
                    self.speaking = false;
                    self.below_since = None;
                    let samples = std::mem::take(&mut self.buffer);
                    return Some(AudioChunk::new(samples, frame.sample_rate));
                }
            }
            None
        }
    }
}

/// A bounded ring of recent mic samples flushed to the STT consumer the
/// instant barge-in is confirmed, so the start of the interjection isn't lost.
struct PlaybackRing {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
}

impl PlaybackRing {
    fn new(capacity_ms: u32, sample_rate: u32) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: (sample_rate as u64 * capacity_ms as u64 / 1000) as usize,
            sample_rate,
        }
    }

    fn push(&mut self, frame: &AudioChunk) {
        for &s in &frame.samples {
            if self.samples.len() >= self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
    }

    fn drain(&mut self) -> AudioChunk {
        let samples: Vec<f32> = self.samples.drain(..).collect();
        AudioChunk::new(samples, self.sample_rate)
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

struct StreamState {
    queue: VecDeque<u8>,
    ended: bool,
    pre_buffered: bool,
}

/// C1 itself. Generic over the real or in-memory `AudioInput`/`AudioOutput`
/// and over whatever `EchoGate` (real or scripted) the session wires in.
pub struct AudioGateway<O: AudioOutput, E: EchoGate> {
    config: AudioGatewayConfig,
    flags: Arc<SessionFlags>,
    status: Arc<PipelineStatus>,
    frame_subscriber: Arc<Mutex<Option<FrameCallback>>>,
    utterance_subscriber: Arc<Mutex<Option<UtteranceCallback>>>,
    output: Arc<Mutex<O>>,
    echo: Arc<Mutex<E>>,
    stream: Arc<Mutex<StreamState>>,
    last_playback_end: Arc<AtomicU64>,
    playback_epoch_start: Instant,
    barge_in_counter: Arc<AtomicU32>,
    capture_stop: Arc<std::sync::atomic::AtomicBool>,
    capture_handle: Option<std::thread::JoinHandle<()>>,
    playback_handle: Option<std::thread::JoinHandle<()>>,
}

impl<O: AudioOutput + 'static, E: EchoGate + 'static> AudioGateway<O, E> {
    /// Spawns the capture and playback threads. `input` is consumed by the
    /// capture thread for the lifetime of the gateway.
    pub fn start(
        mut input: impl AudioInput + 'static,
        output: O,
        echo: E,
        config: AudioGatewayConfig,
    ) -> Self {
        let flags = Arc::new(SessionFlags::new());
        let status = Arc::new(PipelineStatus::new());
        let frame_subscriber: Arc<Mutex<Option<FrameCallback>>> = Arc::new(Mutex::new(None));
        let utterance_subscriber: Arc<Mutex<Option<UtteranceCallback>>> = Arc::new(Mutex::new(None));
        let output = Arc::new(Mutex::new(output));
        let echo = Arc::new(Mutex::new(echo));
        let stream = Arc::new(Mutex::new(StreamState {
            queue: VecDeque::new(),
            ended: false,
            pre_buffered: false,
        }));
        let last_playback_end = Arc::new(AtomicU64::new(0));
        let barge_in_counter = Arc::new(AtomicU32::new(0));
        let capture_stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let playback_epoch_start = Instant::now();

        let capture_handle = {
            let config = config.clone();
            let flags = flags.clone();
            let status = status.clone();
            let frame_subscriber = frame_subscriber.clone();
            let utterance_subscriber = utterance_subscriber.clone();
            let echo = echo.clone();
            let last_playback_end = last_playback_end.clone();
            let barge_in_counter = barge_in_counter.clone();
            let capture_stop = capture_stop.clone();
            let mut ring = PlaybackRing::new(config.playback_ring_ms, config.input_sample_rate);
            let mut vad = InternalVad::new();

            std::thread::spawn(move || {
                while !capture_stop.load(Ordering::Relaxed) {
                    let frame = match input.next_frame() {
                        Some(f) => f,
                        None => break,
                    };
                    status.increment_chunks_processed();

                    if flags.is_playing() {
                        ring.push(&frame);
                        let decision = echo.lock().unwrap().process(&frame, true);
                        let confirmed = flags.barge_in_enabled()
                            && evaluate_barge_in(&frame, &decision, &config, &barge_in_counter);
                        if confirmed {
                            flags.set_is_playing(false);
                            flags.set_interrupted(true);
                            echo.lock().unwrap().end_playback();
                            barge_in_counter.store(0, Ordering::Relaxed);
                            let flushed = ring.drain();
                            if let Some(cb) = frame_subscriber.lock().unwrap().as_ref() {
                                cb(flushed);
                            }
                        }
                        continue;
                    }

                    let since_end_ms = elapsed_ms(&last_playback_end, &playback_epoch_start);
                    let in_cooldown = since_end_ms < config.playback_cooldown_ms as u64;
                    if in_cooldown {
                        let decision = echo.lock().unwrap().process(&frame, false);
                        if decision.is_echo {
                            continue;
                        }
                    }

                    match config.vad_mode {
                        VadMode::External => {
                            if let Some(cb) = frame_subscriber.lock().unwrap().as_ref() {
                                cb(frame);
                            }
                        }
                        VadMode::Internal => {
                            if let Some(utterance) = vad.push(&frame, &config) {
                                if let Some(cb) = utterance_subscriber.lock().unwrap().as_ref() {
                                    cb(utterance);
                                }
                            }
                        }
                    }
                }
            })
        };

        let playback_handle = {
            let config = config.clone();
            let flags = flags.clone();
            let output = output.clone();
            let echo = echo.clone();
            let stream = stream.clone();
            let last_playback_end = last_playback_end.clone();
            let capture_stop = capture_stop.clone();
            let epoch_start = playback_epoch_start;

            std::thread::spawn(move || {
                let bytes_per_sample = 2usize;
                let chunk_bytes = (config.output_sample_rate as u64 * config.drain_interval_ms as u64
                    / 1000) as usize
                    * bytes_per_sample;
                let pre_buffer_bytes = (config.output_sample_rate as u64 * config.pre_buffer_ms as u64
                    / 1000) as usize
                    * bytes_per_sample;

                loop {
                    if capture_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(config.drain_interval_ms as u64));

                    let mut state = stream.lock().unwrap();
                    if !state.pre_buffered {
                        if state.queue.len() >= pre_buffer_bytes || (state.ended && !state.queue.is_empty()) {
                            state.pre_buffered = true;
                            flags.set_is_playing(true);
                            flags.set_has_started_playback(true);
                        } else {
                            continue;
                        }
                    }

                    let take = chunk_bytes.min(state.queue.len());
                    let chunk: Vec<u8> = state.queue.drain(..take).collect();
                    let drained_all = state.queue.is_empty();
                    let ended = state.ended;
                    drop(state);

                    let to_write = if chunk.len() < chunk_bytes {
                        let mut padded = chunk.clone();
                        padded.resize(chunk_bytes, 0);
                        padded
                    } else {
                        chunk.clone()
                    };

                    if flags.interrupted() {
                        continue;
                    }

                    let _ = output.lock().unwrap().write(&to_write);
                    if !chunk.is_empty() {
                        let reference = AudioChunk::from_pcm16(&chunk, config.output_sample_rate);
                        echo.lock().unwrap().feed_reference(&reference);
                    }

                    if ended && drained_all {
                        let mut state = stream.lock().unwrap();
                        state.pre_buffered = false;
                        drop(state);
                        flags.set_is_playing(false);
                        flags.set_has_started_playback(false);
                        echo.lock().unwrap().end_playback();
                        last_playback_end.store(epoch_start.elapsed().as_millis() as u64, Ordering::Relaxed);
                    }
                }
            })
        };

        Self {
            config,
            flags,
            status,
            frame_subscriber,
            utterance_subscriber,
            output,
            echo,
            stream,
            last_playback_end,
            playback_epoch_start,
            barge_in_counter,
            capture_stop,
            capture_handle: Some(capture_handle),
            playback_handle: Some(playback_handle),
        }
    }

    /// Shared with the session's orchestrator so barge-in/cancel flags set
    /// here are visible without routing every read through the gateway.
    pub fn flags(&self) -> Arc<SessionFlags> {
        self.flags.clone()
    }

    pub fn subscribe_frames(&self, callback: impl Fn(AudioChunk) + Send + 'static) {
        *self.frame_subscriber.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn subscribe_utterance(&self, callback: impl Fn(AudioChunk) + Send + 'static) {
        *self.utterance_subscriber.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn push_stream_chunk(&self, bytes: Vec<u8>) {
        let mut state = self.stream.lock().unwrap();
        state.queue.extend(bytes);
        state.ended = false;
    }

    pub fn end_stream(&self) {
        self.stream.lock().unwrap().ended = true;
    }

    /// Bypasses pre-buffering: writes the whole clip through in one go,
    /// for short acknowledgments (spec §4.1).
    pub fn play_oneshot(&self, bytes: Vec<u8>) -> crate::Result<()> {
        self.flags.set_is_playing(true);
        self.flags.set_has_started_playback(true);
        let result = self.output.lock().unwrap().write(&bytes);
        let reference = AudioChunk::from_pcm16(&bytes, self.config.output_sample_rate);
        self.echo.lock().unwrap().feed_reference(&reference);
        self.flags.set_is_playing(false);
        self.echo.lock().unwrap().end_playback();
        self.mark_playback_ended();
        result.map(|_| ())
    }

    /// Idempotent: clears the drain queue and stops playback without
    /// flushing remaining bytes (spec §4.1).
    pub fn stop_playback(&self) {
        let mut state = self.stream.lock().unwrap();
        state.queue.clear();
        state.ended = false;
        state.pre_buffered = false;
        drop(state);
        self.flags.set_is_playing(false);
        self.flags.set_has_started_playback(false);
        self.echo.lock().unwrap().end_playback();
        self.mark_playback_ended();
    }

    pub fn is_playing(&self) -> bool {
        self.flags.is_playing()
    }

    pub fn reset_interrupt_state(&self) {
        self.flags.set_interrupted(false);
        self.barge_in_counter.store(0, Ordering::Relaxed);
    }

    pub fn status(&self) -> voicecore_bus::PipelineStatusSnapshot {
        self.status.snapshot()
    }

    fn mark_playback_ended(&self) {
        self.last_playback_end.store(
            self.playback_epoch_start.elapsed().as_millis() as u64,
            Ordering::Relaxed,
        );
    }
}

impl<O: AudioOutput, E: EchoGate> Drop for AudioGateway<O, E> {
    fn drop(&mut self) {
        self.capture_stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.capture_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.playback_handle.take() {
            let _ = h.join();
        }
    }
}

fn evaluate_barge_in(
    frame: &AudioChunk,
    decision: &EchoDecision,
    config: &AudioGatewayConfig,
    counter: &AtomicU32,
) -> bool {
    let energy = frame.rms_energy();
    if decision.is_echo {
        counter.store(0, Ordering::Relaxed);
        return false;
    }
    if energy >= config.energy_threshold * config.barge_in_bypass_multiplier {
        return true;
    }
    if energy >= config.energy_threshold * config.barge_in_multiplier {
        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
        count >= config.barge_in_confirm_frames
    } else {
        counter.store(0, Ordering::Relaxed);
        false
    }
}

fn elapsed_ms(last_playback_end: &AtomicU64, epoch_start: &Instant) -> u64 {
    let now = epoch_start.elapsed().as_millis() as u64;
    now.saturating_sub(last_playback_end.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{InMemoryAudioInput, InMemoryAudioOutput};

    struct AlwaysClearEcho;
    impl EchoGate for AlwaysClearEcho {
        fn feed_reference(&mut self, _chunk: &AudioChunk) {}
        fn process(&mut self, _mic: &AudioChunk, _strict: bool) -> EchoDecision {
            EchoDecision::not_echo()
        }
        fn end_playback(&mut self) {}
        fn clear_reference(&mut self) {}
    }

    #[test]
    fn push_stream_chunk_eventually_starts_playback() {
        let input = InMemoryAudioInput::new(16_000, vec![]);
        let output = InMemoryAudioOutput::new(16_000);
        let gateway = AudioGateway::start(input, output, AlwaysClearEcho, AudioGatewayConfig::default());
        let silence_chunk = vec![0u8; 32_000];
        gateway.push_stream_chunk(silence_chunk);
        gateway.end_stream();
        std::thread::sleep(Duration::from_millis(200));
        // One second of audio at the default 20ms/640-byte drain rate takes
        // roughly 1s to fully drain, so 200ms in, playback must still be
        // under way.
        assert!(gateway.is_playing(), "pre-buffer threshold reached, playback should have started");
    }

    #[test]
    fn barge_in_disabled_suppresses_interruption_during_greeting() {
        let input = InMemoryAudioInput::new(16_000, vec![vec![1.0f32; 320]; 20]);
        let output = InMemoryAudioOutput::new(16_000);
        let gateway = AudioGateway::start(input, output, AlwaysClearEcho, AudioGatewayConfig::default());
        gateway.flags().set_barge_in_enabled(false);
        gateway.flags().set_is_playing(true);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!gateway.flags().interrupted(), "barge-in must not fire while disabled");
    }

    #[test]
    fn reset_interrupt_state_clears_interrupted_flag() {
        let input = InMemoryAudioInput::new(16_000, vec![]);
        let output = InMemoryAudioOutput::new(16_000);
        let gateway = AudioGateway::start(input, output, AlwaysClearEcho, AudioGatewayConfig::default());
        gateway.flags.set_interrupted(true);
        gateway.reset_interrupt_state();
        assert!(!gateway.flags.interrupted());
    }
}
