//! C4, the Turn Orchestrator (spec §4.4): owns turn-level state and drives
//! the STT final transcript through the LLM and TTS adapters to C1.

mod chunker;
mod data;
mod filters;
mod metrics;
mod orchestrator;
mod playback_sink;
mod session_state;
mod stt_reset;

pub use chunker::{ChunkerConfig, TextChunker};
pub use data::{ConversationTurn, Session, SessionStatus};
pub use filters::{is_noise, looks_corrupted};
pub use metrics::{LatencyAggregate, TurnTimer};
pub use orchestrator::{TurnError, TurnOrchestrator, TurnOutcome};
pub use playback_sink::PlaybackSink;
pub use session_state::{SessionState, TurnPhase};
pub use stt_reset::SttTimingReset;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    pub use crate::playback_sink::test_support::*;
    pub use crate::stt_reset::test_support::*;
}

pub type Result<T> = std::result::Result<T, TurnError>;
