//! `TranscriptSink` (spec §3): the core never depends on a concrete storage
//! backend for per-session artifacts; a collaborator listening to events and
//! implementing this trait does the writing.

use voicecore_events::SessionSummary;
use voicecore_turn::ConversationTurn;

pub trait TranscriptSink: Send + Sync {
    fn record(&self, turn: &ConversationTurn);
    fn flush(&self, summary: &SessionSummary);
}

pub struct NullTranscriptSink;

impl TranscriptSink for NullTranscriptSink {
    fn record(&self, _turn: &ConversationTurn) {}
    fn flush(&self, _summary: &SessionSummary) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use voicecore_llm::Role;

    #[test]
    fn null_sink_accepts_calls_without_panicking() {
        let sink = NullTranscriptSink;
        sink.record(&ConversationTurn { role: Role::User, text: "oi".to_string(), at: Utc::now() });
        sink.flush(&SessionSummary { turn_count: 1, average_total_ms: 0.0, average_time_to_first_audio_ms: 0.0 });
    }
}
