//! Gapless playback of model audio
//!
//! The model streams short PCM segments that must play back-to-back with no
//! audible gap or overlap. [`PlaybackScheduler`] owns the scheduling math
//! over an [`OutputSink`] seam; [`DeviceOutput`] is the cpal-backed sink used
//! in production. Tests drive the scheduler with a fake sink and a manual
//! clock.

mod device;
mod scheduler;

pub use device::DeviceOutput;
pub use scheduler::{OutputSink, PlaybackScheduler, SegmentId};

/// Errors from the playback device
#[derive(Debug, Clone)]
pub enum PlaybackError {
    NoOutputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::NoOutputDevice => write!(f, "No audio output device found"),
            PlaybackError::NoSupportedConfig => {
                write!(f, "No supported audio output configuration")
            }
            PlaybackError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio output stream: {}", e)
            }
        }
    }
}

impl std::error::Error for PlaybackError {}
