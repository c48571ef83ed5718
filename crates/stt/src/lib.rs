//! C3, the STT Stream Adapter (spec §4.3): streaming transcription with
//! precise latency semantics.

mod client;

pub use client::{ConnectionState, MockSttClient, SttClient, SttEvent, TimingMetrics};

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("stt transport error: {0}")]
    Transport(String),
    #[error("stt reconnect attempts exhausted")]
    ReconnectExhausted,
}

pub type Result<T> = std::result::Result<T, SttError>;
