//! Live bidirectional audio session core for the Hypley assistant
//!
//! Manages one real-time duplex audio/video stream to the model endpoint:
//! microphone and screen frames go up, synthesized audio and transcripts
//! come down. The [`session::LiveSessionController`] owns the connection
//! lifecycle; [`playback`] schedules the returned audio gaplessly;
//! [`transcript`] turns streamed fragments into whole, turn-bounded
//! messages.
//!
//! The UI, the text-completion calls and the document store are external
//! collaborators reached through the [`session::EventSink`],
//! [`store::ConversationStore`] and [`capture::FrameSource`] seams.
//!
//! # Typical wiring
//!
//! ```ignore
//! let persona = PersonaConfig::for_voice(Voice::Kore, None);
//! let sink = DeviceOutput::new()?;
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let mut session = LiveSessionController::new(persona, sink, Arc::new(events_tx));
//! session.start(&settings::api_key().ok_or(LiveError::MissingApiKey)?)?;
//! session.start_microphone(None)?;
//! // drain events_rx, persist transcripts, drive the UI...
//! session.close().await;
//! ```

pub mod capture;
pub mod codec;
pub mod persona;
pub mod playback;
pub mod session;
pub mod settings;
pub mod store;
pub mod transcript;

pub use capture::{FrameSource, MicrophoneCapture, ScreenSource, VisionCapture};
pub use codec::AudioFrame;
pub use persona::{PersonaConfig, Voice};
pub use playback::{DeviceOutput, OutputSink, PlaybackScheduler};
pub use session::{
    EventSink, LiveError, LiveSessionController, SessionEvent, SessionState,
};
pub use transcript::TranscriptAccumulator;
