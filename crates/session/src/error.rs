use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audio(#[from] voicecore_audio::AudioError),
    #[error(transparent)]
    Echo(#[from] voicecore_echo::EchoError),
    #[error(transparent)]
    Stt(#[from] voicecore_stt::SttError),
    #[error(transparent)]
    Turn(#[from] voicecore_turn::TurnError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
