//! `SessionState` as a single reduction (spec §4.4, ambient per §9): the
//! scattered booleans named in the original design (`isProcessing`,
//! `wasInterrupted`, `hasStartedPlayback`, `shouldCancelProcessing`,
//! `isGreetingInProgress`, `agent_speaking`) are collapsed into one struct
//! owned solely by C4, mirroring how `voicecore_turn`'s predecessor
//! `StreamingTranscriber` composed its substates into one coordinator with
//! delegating methods instead of exposing raw fields. Pending one-shot
//! values are consumed with `Option::take`, matching that type's
//! `take_silence_injection_pending` idiom, never read-then-cleared.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_TRACKED_AGENT_REPLIES: usize = 3;
const BARGE_IN_GRACE_MS: u64 = 800;
const ACK_COOLDOWN_MS: u64 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Greeting,
    Processing,
    Speaking,
    Ended,
}

/// C4's private state. Every other component observes it only through
/// [`TurnPhase`] and the accessor methods below, never through direct field
/// writes.
#[derive(Debug)]
pub struct SessionState {
    phase: TurnPhase,
    processing: bool,
    agent_speaking: bool,
    has_started_playback: bool,
    should_cancel_processing: bool,
    interrupted: bool,
    pending_text: Option<String>,
    greeting_buffer: Vec<String>,
    recent_agent_replies: VecDeque<String>,
    barge_in_grace_until: Option<Instant>,
    last_ack_played_at: Option<Instant>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: TurnPhase::Idle,
            processing: false,
            agent_speaking: false,
            has_started_playback: false,
            should_cancel_processing: false,
            interrupted: false,
            pending_text: None,
            greeting_buffer: Vec::new(),
            recent_agent_replies: VecDeque::with_capacity(MAX_TRACKED_AGENT_REPLIES),
            barge_in_grace_until: None,
            last_ack_played_at: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn agent_speaking(&self) -> bool {
        self.agent_speaking
    }

    pub fn has_started_playback(&self) -> bool {
        self.has_started_playback
    }

    pub fn is_greeting(&self) -> bool {
        self.phase == TurnPhase::Greeting
    }

    pub fn in_barge_in_grace(&self) -> bool {
        self.barge_in_grace_until.map(|t| Instant::now() < t).unwrap_or(false)
    }

    pub fn enter_greeting(&mut self) {
        self.phase = TurnPhase::Greeting;
    }

    pub fn greeting_ended(&mut self) {
        self.phase = TurnPhase::Idle;
    }

    /// `Idle -> Processing` on a validated final transcript.
    pub fn begin_processing(&mut self) {
        self.phase = TurnPhase::Processing;
        self.processing = true;
        self.has_started_playback = false;
        self.should_cancel_processing = false;
        self.interrupted = false;
    }

    /// `Processing -> Speaking` on the first TTS chunk dispatched to C1.
    pub fn begin_speaking(&mut self) {
        self.phase = TurnPhase::Speaking;
        self.has_started_playback = true;
        self.agent_speaking = true;
    }

    /// `Speaking -> Idle` on playback-ended (normal completion).
    pub fn playback_ended(&mut self) {
        self.phase = TurnPhase::Idle;
        self.processing = false;
        self.agent_speaking = false;
    }

    /// `Speaking -> Idle` on barge-in, plus the 800 ms grace window (spec
    /// §4.4c) that suppresses treating the echo tail as a new turn.
    pub fn barge_in(&mut self) {
        self.phase = TurnPhase::Idle;
        self.processing = false;
        self.agent_speaking = false;
        self.interrupted = true;
        self.barge_in_grace_until = Some(Instant::now() + Duration::from_millis(BARGE_IN_GRACE_MS));
    }

    /// `Processing -> Idle` on cancel-before-audio.
    pub fn cancel_before_audio(&mut self) {
        self.phase = TurnPhase::Idle;
        self.processing = false;
        self.should_cancel_processing = false;
    }

    pub fn request_cancel(&mut self) {
        self.should_cancel_processing = true;
    }

    pub fn take_cancel_requested(&mut self) -> bool {
        std::mem::take(&mut self.should_cancel_processing)
    }

    pub fn set_pending_text(&mut self, text: String) {
        self.pending_text = Some(text);
    }

    pub fn take_pending_text(&mut self) -> Option<String> {
        self.pending_text.take()
    }

    pub fn push_greeting_text(&mut self, text: String) {
        self.greeting_buffer.push(text);
    }

    pub fn take_greeting_buffer(&mut self) -> Vec<String> {
        std::mem::take(&mut self.greeting_buffer)
    }

    pub fn record_agent_reply(&mut self, text: String) {
        if self.recent_agent_replies.len() >= MAX_TRACKED_AGENT_REPLIES {
            self.recent_agent_replies.pop_front();
        }
        self.recent_agent_replies.push_back(text);
    }

    pub fn recent_agent_replies(&self) -> impl Iterator<Item = &str> {
        self.recent_agent_replies.iter().map(String::as_str)
    }

    /// One acknowledgment per continuation, with a cooldown to avoid
    /// chattering (spec §4.4b).
    pub fn try_consume_ack_slot(&mut self) -> bool {
        let now = Instant::now();
        let allowed = self
            .last_ack_played_at
            .map(|t| now.duration_since(t) >= Duration::from_millis(ACK_COOLDOWN_MS))
            .unwrap_or(true);
        if allowed {
            self.last_ack_played_at = Some(now);
        }
        allowed
    }

    pub fn end_session(&mut self) {
        self.phase = TurnPhase::Ended;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle_with_both_flags_false() {
        let state = SessionState::new();
        assert_eq!(state.phase(), TurnPhase::Idle);
        assert!(!state.is_processing());
        assert!(!state.agent_speaking());
    }

    #[test]
    fn begin_processing_then_speaking_sets_has_started_playback() {
        let mut state = SessionState::new();
        state.begin_processing();
        assert!(state.is_processing());
        assert!(!state.has_started_playback());
        state.begin_speaking();
        assert!(state.has_started_playback());
        assert_eq!(state.phase(), TurnPhase::Speaking);
    }

    #[test]
    fn barge_in_opens_a_grace_window() {
        let mut state = SessionState::new();
        state.begin_processing();
        state.begin_speaking();
        state.barge_in();
        assert_eq!(state.phase(), TurnPhase::Idle);
        assert!(state.in_barge_in_grace());
    }

    #[test]
    fn pending_text_is_consumed_exactly_once() {
        let mut state = SessionState::new();
        state.set_pending_text("oi".to_string());
        assert_eq!(state.take_pending_text(), Some("oi".to_string()));
        assert_eq!(state.take_pending_text(), None);
    }

    #[test]
    fn ack_slot_respects_cooldown() {
        let mut state = SessionState::new();
        assert!(state.try_consume_ack_slot());
        assert!(!state.try_consume_ack_slot());
    }

    #[test]
    fn recent_agent_replies_caps_at_three() {
        let mut state = SessionState::new();
        for i in 0..5 {
            state.record_agent_reply(format!("reply {i}"));
        }
        assert_eq!(state.recent_agent_replies().count(), 3);
    }
}
