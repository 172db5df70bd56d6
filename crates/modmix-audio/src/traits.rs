//! Audio output trait and error types.

use modmix_engine::Frame;

/// Error type for audio operations.
#[derive(Debug)]
pub enum AudioError {
    /// No audio device available
    NoDevice,
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoDevice => write!(f, "no audio device available"),
            AudioError::DeviceInit(msg) => write!(f, "device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "playback error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// The device sample rate the engine should mix at.
    fn sample_rate(&self) -> u32;

    /// Queue one frame, blocking until the output has room for it.
    fn write_frame(&mut self, frame: Frame);

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
