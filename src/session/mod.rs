//! Live bidirectional session with the model endpoint
//!
//! This module owns the duplex audio/video connection: the wire protocol,
//! the typed notification stream, and the controller state machine that
//! routes inbound events to transcript accumulation and playback while
//! forwarding captured microphone and screen frames upstream.
//!
//! # Lifecycle
//!
//! A controller runs exactly one session: Idle → Connecting → Open →
//! Closed. Closed is terminal; switching persona or voice means closing and
//! constructing a fresh controller.

mod controller;
mod events;
mod protocol;

pub use controller::{LiveSessionController, SessionState};
pub use events::{EventSink, FanoutSink, SessionEvent};
pub use protocol::{
    ClientMessage, MediaChunk, ServerMessage, SetupConfig, AUDIO_INPUT_MIME, IMAGE_MIME,
    LIVE_API_URL, LIVE_MODEL, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE,
};

use crate::capture::CaptureError;

/// Errors surfaced synchronously by controller operations
///
/// Connection-level failures after `start` are asynchronous and arrive as
/// [`SessionEvent::Error`] followed by [`SessionEvent::Closed`].
#[derive(Debug, Clone)]
pub enum LiveError {
    /// No API key configured for the live endpoint
    MissingApiKey,
    /// `start` was called on a controller that is already running
    AlreadyStarted,
    /// The controller is closed; construct a new one for a new session
    Closed,
    /// A capture device could not be acquired
    Capture(CaptureError),
}

impl std::fmt::Display for LiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveError::MissingApiKey => {
                write!(f, "API key not configured. Set HYPLEY_API_KEY.")
            }
            LiveError::AlreadyStarted => write!(f, "Session already started"),
            LiveError::Closed => write!(f, "Session is closed"),
            LiveError::Capture(e) => write!(f, "Capture failed: {}", e),
        }
    }
}

impl std::error::Error for LiveError {}

impl From<CaptureError> for LiveError {
    fn from(e: CaptureError) -> Self {
        LiveError::Capture(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_error_display() {
        assert!(LiveError::MissingApiKey.to_string().contains("HYPLEY_API_KEY"));
        assert!(LiveError::Closed.to_string().contains("closed"));

        let err = LiveError::from(CaptureError::AlreadyRunning);
        assert!(err.to_string().contains("already running"));
    }
}
