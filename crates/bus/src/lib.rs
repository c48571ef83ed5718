//! Bounded, sequence-tracked channels for the voice orchestration core.
//!
//! The capture-to-STT queue, the TTS-to-playback queue, and the SPSC event
//! channel from C3 to C4 (spec §5) all share the same shape: one writer,
//! one reader, bounded capacity, and a need to detect when the reader fell
//! behind. `Bus<T>` provides that shape once instead of per call site.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An item carried on a [`Bus`], tagged with a monotonic sequence number.
#[derive(Debug, Clone)]
pub struct Item<T> {
    /// Monotonic sequence number for ordering and gap detection.
    pub seq: u64,
    pub value: T,
}

/// Sender half of a [`Bus`].
pub struct BusSender<T> {
    tx: mpsc::Sender<Item<T>>,
    seq_counter: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    label: &'static str,
}

impl<T> Clone for BusSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            seq_counter: self.seq_counter.clone(),
            dropped: self.dropped.clone(),
            label: self.label,
        }
    }
}

impl<T> BusSender<T> {
    /// Send without blocking; drops the item (incrementing the drop counter)
    /// if the channel is full. Used on realtime paths that must never wait.
    pub fn send(&self, value: T) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(Item { seq, value }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 10 == 1 {
                    tracing::warn!(bus = self.label, dropped, seq, "bus full, dropping item");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(bus = self.label, "bus closed");
                false
            }
        }
    }

    /// Send, waiting for space. Used by non-realtime producers (e.g. the
    /// TTS-to-playback queue, where backpressure is the correct behavior).
    pub async fn send_async(&self, value: T) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        self.tx.send(Item { seq, value }).await.is_ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::Relaxed)
    }
}

/// Receiver half of a [`Bus`].
pub struct BusReceiver<T> {
    rx: mpsc::Receiver<Item<T>>,
    last_seq: Option<u64>,
    gaps_detected: u64,
    label: &'static str,
}

impl<T> BusReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        self.note_seq(item.seq);
        Some(item.value)
    }

    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        self.note_seq(item.seq);
        Some(item.value)
    }

    fn note_seq(&mut self, seq: u64) {
        if let Some(last) = self.last_seq {
            if seq > last + 1 {
                let gap = seq - last - 1;
                self.gaps_detected += gap;
                tracing::debug!(bus = self.label, gap, "sequence gap detected");
            }
        }
        self.last_seq = Some(seq);
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }

    /// Drain everything currently queued, keeping only the most recent item.
    /// Used by a consumer that wants to catch up after falling behind rather
    /// than process a backlog.
    pub fn drain_to_latest(&mut self) -> Option<T> {
        let mut latest = None;
        let mut drained = 0;
        while let Some(value) = self.try_recv() {
            drained += 1;
            latest = Some(value);
        }
        if drained > 1 {
            tracing::debug!(bus = self.label, drained = drained - 1, "drained stale items");
        }
        latest
    }
}

/// A bounded single-producer single-consumer channel with sequence tracking.
pub struct Bus<T> {
    sender: BusSender<T>,
    receiver: Option<BusReceiver<T>>,
}

impl<T> Bus<T> {
    /// `label` is attached to log lines so a process hosting several buses
    /// (capture→STT, TTS→playback, STT→orchestrator) can tell them apart.
    pub fn bounded(capacity: usize, label: &'static str) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: BusSender {
                tx,
                seq_counter: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
                label,
            },
            receiver: Some(BusReceiver {
                rx,
                last_seq: None,
                gaps_detected: 0,
                label,
            }),
        }
    }

    pub fn sender(&self) -> BusSender<T> {
        self.sender.clone()
    }

    /// Takes the receiver; can only succeed once, mirroring single-consumer
    /// ownership (spec §5: "Playback ring and reference ring are
    /// single-writer by design").
    pub fn take_receiver(&mut self) -> Option<BusReceiver<T>> {
        self.receiver.take()
    }
}

/// Lock-free cross-task session flags named directly in spec §5:
/// `is_playing`, `interrupted`, `cancel_requested`, `has_started_playback`,
/// `agent_speaking`, plus `barge_in_enabled` (spec §4.4, the `Greeting`
/// state: barge-in is disabled while the initial agent utterance plays).
/// These are read from background I/O tasks (cpal callback thread, STT
/// reader task) and written from C4's single logical thread; no other
/// shared mutable session state should need a lock.
#[derive(Debug)]
pub struct SessionFlags {
    is_playing: AtomicBool,
    interrupted: AtomicBool,
    cancel_requested: AtomicBool,
    has_started_playback: AtomicBool,
    agent_speaking: AtomicBool,
    barge_in_enabled: AtomicBool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            is_playing: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            has_started_playback: AtomicBool::new(false),
            agent_speaking: AtomicBool::new(false),
            barge_in_enabled: AtomicBool::new(true),
        }
    }
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Acquire)
    }
    pub fn set_is_playing(&self, value: bool) {
        self.is_playing.store(value, Ordering::Release);
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
    pub fn set_interrupted(&self, value: bool) {
        self.interrupted.store(value, Ordering::Release);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }
    pub fn set_cancel_requested(&self, value: bool) {
        self.cancel_requested.store(value, Ordering::Release);
    }

    pub fn has_started_playback(&self) -> bool {
        self.has_started_playback.load(Ordering::Acquire)
    }
    pub fn set_has_started_playback(&self, value: bool) {
        self.has_started_playback.store(value, Ordering::Release);
    }

    pub fn agent_speaking(&self) -> bool {
        self.agent_speaking.load(Ordering::Acquire)
    }
    pub fn set_agent_speaking(&self, value: bool) {
        self.agent_speaking.store(value, Ordering::Release);
    }

    pub fn barge_in_enabled(&self) -> bool {
        self.barge_in_enabled.load(Ordering::Acquire)
    }
    pub fn set_barge_in_enabled(&self, value: bool) {
        self.barge_in_enabled.store(value, Ordering::Release);
    }

    pub fn snapshot(&self) -> SessionFlagsSnapshot {
        SessionFlagsSnapshot {
            is_playing: self.is_playing(),
            interrupted: self.interrupted(),
            cancel_requested: self.cancel_requested(),
            has_started_playback: self.has_started_playback(),
            agent_speaking: self.agent_speaking(),
            barge_in_enabled: self.barge_in_enabled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SessionFlagsSnapshot {
    pub is_playing: bool,
    pub interrupted: bool,
    pub cancel_requested: bool,
    pub has_started_playback: bool,
    pub agent_speaking: bool,
    pub barge_in_enabled: bool,
}

/// Lock-free per-session pipeline metrics, mirrored from the same atomics
/// pattern (bit-cast f32 for lock-free float storage).
#[derive(Debug, Default)]
pub struct PipelineStatus {
    chunks_processed: AtomicU64,
    dropped_chunks: AtomicU64,
    gaps_detected: AtomicU64,
    last_turn_total_ms_bits: AtomicU32,
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_chunks_processed(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, n: u64) {
        self.dropped_chunks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_gaps(&self, n: u64) {
        self.gaps_detected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_last_turn_total_ms(&self, value: f32) {
        self.last_turn_total_ms_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatusSnapshot {
        PipelineStatusSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            dropped_chunks: self.dropped_chunks.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            last_turn_total_ms: f32::from_bits(self.last_turn_total_ms_bits.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PipelineStatusSnapshot {
    pub chunks_processed: u64,
    pub dropped_chunks: u64,
    pub gaps_detected: u64,
    pub last_turn_total_ms: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_round_trips() {
        let mut bus: Bus<i32> = Bus::bounded(4, "test");
        let sender = bus.sender();
        let mut receiver = bus.take_receiver().unwrap();

        sender.send(42);
        assert_eq!(receiver.recv().await, Some(42));
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let bus: Bus<i32> = Bus::bounded(2, "test");
        let sender = bus.sender();
        for i in 0..10 {
            sender.send(i);
        }
        assert!(sender.dropped() > 0);
    }

    #[tokio::test]
    async fn gap_detection_counts_missing_sequence_numbers() {
        let mut bus: Bus<i32> = Bus::bounded(16, "test");
        let sender = bus.sender();
        let mut receiver = bus.take_receiver().unwrap();

        sender.send(0);
        sender.send(1);
        sender.send(2);
        receiver.recv().await;
        receiver.recv().await;
        receiver.recv().await;
        assert_eq!(receiver.gaps_detected(), 0);
    }

    #[test]
    fn drain_to_latest_returns_only_the_newest_item() {
        let mut bus: Bus<i32> = Bus::bounded(16, "test");
        let sender = bus.sender();
        let mut receiver = bus.take_receiver().unwrap();
        for i in 0..5 {
            sender.send(i);
        }
        assert_eq!(receiver.drain_to_latest(), Some(4));
    }

    #[test]
    fn take_receiver_only_succeeds_once() {
        let mut bus: Bus<i32> = Bus::bounded(4, "test");
        assert!(bus.take_receiver().is_some());
        assert!(bus.take_receiver().is_none());
    }

    #[test]
    fn session_flags_default_to_false_except_barge_in_enabled() {
        let flags = SessionFlags::new();
        let snap = flags.snapshot();
        assert!(!snap.is_playing);
        assert!(!snap.interrupted);
        assert!(!snap.cancel_requested);
        assert!(!snap.has_started_playback);
        assert!(!snap.agent_speaking);
        assert!(snap.barge_in_enabled, "barge-in must be active by default, outside a greeting");
    }

    #[test]
    fn session_flags_set_and_snapshot() {
        let flags = SessionFlags::new();
        flags.set_is_playing(true);
        flags.set_agent_speaking(true);
        flags.set_barge_in_enabled(false);
        let snap = flags.snapshot();
        assert!(snap.is_playing);
        assert!(snap.agent_speaking);
        assert!(!snap.interrupted);
        assert!(!snap.barge_in_enabled);
    }
}
