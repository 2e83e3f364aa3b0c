//! Input capture for the live session
//!
//! Two independent paths feed the open connection: the microphone path
//! frames device samples into fixed-size PCM blocks, and the vision path
//! samples a still frame from a shared screen stream once per second.
//! Both forward their payloads to the session's outbound queue with
//! fire-and-forget semantics.

mod microphone;
mod screen;
mod vision;

pub use microphone::{MicrophoneCapture, MIC_BLOCK_SAMPLES, MIC_SAMPLE_RATE};
pub use screen::ScreenSource;
pub use vision::{
    FrameSource, VisionCapture, VISION_FRAME_INTERVAL, VISION_FRAME_WIDTH, VISION_JPEG_QUALITY,
};

/// Errors from capture start/stop
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// No usable input device (missing hardware or permission denied)
    NoInputDevice,
    /// Device exists but offers no workable stream configuration
    NoSupportedConfig,
    /// Opening the device stream failed
    StreamCreationFailed(String),
    /// The capture is already running; streams are never double-acquired
    AlreadyRunning,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInputDevice => write!(f, "No audio input device found"),
            CaptureError::NoSupportedConfig => {
                write!(f, "No supported audio input configuration")
            }
            CaptureError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio input stream: {}", e)
            }
            CaptureError::AlreadyRunning => write!(f, "Capture is already running"),
        }
    }
}

impl std::error::Error for CaptureError {}
