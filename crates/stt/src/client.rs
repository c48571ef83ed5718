use std::time::{Duration, Instant};

use uuid::Uuid;

/// Timing metrics carried on a final transcript (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct TimingMetrics {
    pub real_latency_ms: u64,
    pub speech_duration_ms: u64,
    pub vad_wait_time_ms: u64,
    pub start_time: Instant,
    pub first_partial_time: Option<Instant>,
    pub commit_time: Instant,
}

#[derive(Debug, Clone)]
pub enum SttEvent {
    Partial { text: String },
    Final { text: String, timing: TimingMetrics },
}

/// Contract for C3 (spec §4.3).
pub trait SttClient: Send {
    /// Establishes the long-lived transport; `on_event` fires for every
    /// partial and final transcript until `close`.
    fn open(&mut self, session_id: Uuid, on_event: Box<dyn FnMut(SttEvent) + Send>) -> crate::Result<()>;

    /// Sends one frame; must not block.
    fn feed_audio(&mut self, bytes: &[u8]);

    /// Clears the start-of-speech time so audio sent during agent playback
    /// is not counted as user latency.
    fn reset_timing_on_bargein(&mut self);

    /// Hint used only for internal filtering if the implementation supports it.
    fn set_agent_speaking(&mut self, speaking: bool);

    /// Lets C1 short-circuit sends during reconnect.
    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

/// Reconnect/backoff/keepalive bookkeeping as one small state struct,
/// mirroring `voicecore_turn`'s `VadState`: pending flags are consumed with
/// `take_*` rather than read-and-cleared in two steps, to avoid
/// double-triggering a reconnect or a keepalive send.
#[derive(Debug)]
pub struct ConnectionState {
    connected: bool,
    reconnecting: bool,
    keepalive_due: bool,
    attempts: u32,
    max_attempts: u32,
    last_activity: Instant,
    keepalive_interval: Duration,
}

impl ConnectionState {
    pub fn new(max_attempts: u32, keepalive_interval: Duration) -> Self {
        Self {
            connected: false,
            reconnecting: false,
            keepalive_due: false,
            attempts: 0,
            max_attempts,
            last_activity: Instant::now(),
            keepalive_interval,
        }
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.attempts = 0;
        self.reconnecting = false;
        self.last_activity = Instant::now();
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        if self.attempts < self.max_attempts {
            self.reconnecting = true;
            self.attempts += 1;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Exponential backoff for the current attempt count, capped at 30s.
    pub fn backoff_delay(&self) -> Duration {
        let millis = 250u64.saturating_mul(1u64 << self.attempts.min(10));
        Duration::from_millis(millis.min(30_000))
    }

    /// Consumes the reconnect flag; returns `true` exactly once per
    /// disconnect, even if polled from multiple places.
    pub fn take_reconnecting(&mut self) -> bool {
        std::mem::take(&mut self.reconnecting)
    }

    pub fn note_audio_sent(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Periodic silent keepalive when no audio has been sent for more than
    /// half the keepalive interval (spec §4.3).
    pub fn poll_keepalive(&mut self) {
        if self.connected && self.last_activity.elapsed() >= self.keepalive_interval / 2 {
            self.keepalive_due = true;
        }
    }

    pub fn take_keepalive_due(&mut self) -> bool {
        std::mem::take(&mut self.keepalive_due)
    }
}

/// Test-only collaborator driving the C3 contract deterministically from a
/// scripted sequence of partials/finals, for the S1-S6 scenario tests.
pub struct MockSttClient {
    script: Vec<SttEvent>,
    connected: bool,
    on_event: Option<Box<dyn FnMut(SttEvent) + Send>>,
    fed_bytes: usize,
}

impl MockSttClient {
    pub fn new(script: Vec<SttEvent>) -> Self {
        Self { script, connected: false, on_event: None, fed_bytes: 0 }
    }

    /// Plays the scripted events through the registered callback, as if
    /// they had arrived from the transport.
    pub fn drive(&mut self) {
        if let Some(cb) = self.on_event.as_mut() {
            for event in self.script.drain(..) {
                cb(event);
            }
        }
    }

    pub fn fed_bytes(&self) -> usize {
        self.fed_bytes
    }
}

impl SttClient for MockSttClient {
    fn open(&mut self, _session_id: Uuid, on_event: Box<dyn FnMut(SttEvent) + Send>) -> crate::Result<()> {
        self.on_event = Some(on_event);
        self.connected = true;
        Ok(())
    }

    fn feed_audio(&mut self, bytes: &[u8]) {
        self.fed_bytes += bytes.len();
    }

    fn reset_timing_on_bargein(&mut self) {}

    fn set_agent_speaking(&mut self, _speaking: bool) {}

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
        self.on_event = None;
    }
}
