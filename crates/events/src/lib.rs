//! Typed event contracts published by the voice orchestration core.
//!
//! Mirrors the events enumerated in the orchestration spec: producers call
//! `EventBus::emit` with a topic string and a `serde_json::Value` payload,
//! and also construct one of the typed DTOs below so callers that want
//! strong typing can build the payload with `serde_json::to_value` instead
//! of hand-assembling JSON.

mod bus;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};

use serde::{Deserialize, Serialize};

/// Event emitted once a session's audio pipeline and STT stream are live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub session_id: uuid::Uuid,
}

/// Event emitted for every updated STT hypothesis, including greeting-window
/// partials that never become a `user:spoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialTranscriptEvent {
    pub session_id: uuid::Uuid,
    pub text: String,
}

/// Event emitted once a user turn has been committed to the conversation
/// history (after continuation merging, echo/noise filtering, and
/// corruption recovery have all run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSpokeEvent {
    pub session_id: uuid::Uuid,
    pub text: String,
}

/// Event emitted once an agent reply has been appended to history, i.e.
/// after at least one TTS chunk reached C1 without the turn being
/// cancelled first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpokeEvent {
    pub session_id: uuid::Uuid,
    pub text: String,
}

/// Per-turn latency breakdown, computed by C4 on turn close (spec §4.4g).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub stt_ms: u64,
    pub llm_ms: u64,
    pub tts_ms: u64,
    pub time_to_first_audio_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub turn_id: uuid::Uuid,
    pub latency: LatencyBreakdown,
}

/// Event emitted the instant C1 confirms a barge-in and tears down playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackInterruptedEvent {
    pub session_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub turn_count: usize,
    pub average_total_ms: f64,
    pub average_time_to_first_audio_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndedEvent {
    pub session_id: uuid::Uuid,
    pub summary: SessionSummary,
}

/// Event emitted for a component-level transient error (spec §7). Fatal
/// errors propagate as `Err` from session construction instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub context: String,
    pub message: String,
}

/// Event emitted when a turn's `total` or `time_to_first_audio` exceeds
/// 2000 ms (spec §4.4g).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckEvent {
    pub turn_id: uuid::Uuid,
    pub latency: LatencyBreakdown,
}

/// Event topic names, matching §6 of the orchestration spec verbatim.
pub mod event_names {
    pub const SESSION_STARTED: &str = "session:started";
    pub const PARTIAL_TRANSCRIPT: &str = "partial:transcript";
    pub const USER_SPOKE: &str = "user:spoke";
    pub const AGENT_SPOKE: &str = "agent:spoke";
    pub const METRICS: &str = "metrics";
    pub const PLAYBACK_INTERRUPTED: &str = "playback:interrupted";
    pub const SESSION_ENDED: &str = "session:ended";
    pub const ERROR: &str = "error";
    pub const BOTTLENECK: &str = "metrics:bottleneck";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_spoke_round_trips_through_json() {
        let event = UserSpokeEvent {
            session_id: uuid::Uuid::nil(),
            text: "Oi, aqui é o João.".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        let back: UserSpokeEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.text, event.text);
    }

    #[test]
    fn latency_breakdown_serializes_all_fields() {
        let latency = LatencyBreakdown {
            stt_ms: 250,
            llm_ms: 400,
            tts_ms: 300,
            time_to_first_audio_ms: 700,
            total_ms: 950,
        };
        let value = serde_json::to_value(latency).unwrap();
        assert_eq!(value["total_ms"], json!(950));
    }
}
