//! C1, the Audio I/O Gateway: full-duplex audio capture/playback with
//! energy-based VAD and barge-in detection (orchestration spec §4.1).

mod capture;
mod chunk;
mod device;
mod gateway;
mod playback;
mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use capture::CpalAudioInput;
pub use chunk::{rms_energy, AudioChunk};
pub use device::{
    get_default_input_device, get_default_output_device, list_input_devices, list_output_devices,
    AudioDevice,
};
pub use gateway::{AudioGateway, AudioGatewayConfig, VadMode};
pub use playback::CpalAudioOutput;
pub use traits::{AudioInput, AudioOutput, EchoDecision, EchoGate};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("device enumeration error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
}

pub type Result<T> = std::result::Result<T, AudioError>;
