//! Session/turn data model (spec §3).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::metrics::LatencyAggregate;
use voicecore_events::LatencyBreakdown;
use voicecore_llm::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Full conversation and metrics state for one call, owned by C4.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub history: Vec<ConversationTurn>,
    pub prospect_name: Option<String>,
    latency_aggregate: LatencyAggregate,
    last_turn_latency: Option<LatencyBreakdown>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Active,
            history: Vec::new(),
            prospect_name: None,
            latency_aggregate: LatencyAggregate::default(),
            last_turn_latency: None,
        }
    }

    pub fn push_turn(&mut self, role: Role, text: String) {
        self.history.push(ConversationTurn { role, text, at: Utc::now() });
    }

    /// Discards the most recent agent turn, used on cancel-before-audio
    /// (spec §4.4b) where the reply must never appear in history.
    pub fn discard_last_agent_turn(&mut self) {
        if matches!(self.history.last(), Some(t) if matches!(t.role, Role::Agent)) {
            self.history.pop();
        }
    }

    pub fn recent_agent_replies(&self, limit: usize) -> impl Iterator<Item = &str> {
        self.history
            .iter()
            .rev()
            .filter(|t| matches!(t.role, Role::Agent))
            .take(limit)
            .map(|t| t.text.as_str())
    }

    pub fn record_latency(&mut self, breakdown: LatencyBreakdown) {
        self.latency_aggregate.record(&breakdown);
        self.last_turn_latency = Some(breakdown);
    }

    pub fn last_turn_latency(&self) -> Option<&LatencyBreakdown> {
        self.last_turn_latency.as_ref()
    }

    pub fn average_total_latency_ms(&self) -> f64 {
        self.latency_aggregate.average_total_ms()
    }

    pub fn average_time_to_first_audio_ms(&self) -> f64 {
        self.latency_aggregate.average_time_to_first_audio_ms()
    }

    pub fn turn_count(&self) -> usize {
        self.latency_aggregate.turn_count()
    }

    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_last_agent_turn_removes_only_a_trailing_assistant_turn() {
        let mut session = Session::new(Uuid::nil());
        session.push_turn(Role::User, "oi".to_string());
        session.push_turn(Role::Agent, "Olá!".to_string());
        session.discard_last_agent_turn();
        assert_eq!(session.history.len(), 1);
        assert!(matches!(session.history[0].role, Role::User));
    }

    #[test]
    fn discard_last_agent_turn_is_a_noop_when_last_turn_is_user() {
        let mut session = Session::new(Uuid::nil());
        session.push_turn(Role::User, "oi".to_string());
        session.discard_last_agent_turn();
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn ending_a_session_sets_status_and_timestamp() {
        let mut session = Session::new(Uuid::nil());
        session.end();
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(session.ended_at.is_some());
    }
}
