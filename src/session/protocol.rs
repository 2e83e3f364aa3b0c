//! Live connection protocol types
//!
//! JSON message types for the duplex audio/video connection to the model
//! endpoint.
//!
//! # Protocol Overview
//!
//! 1. Connect the WebSocket and send `setup` with the persona configuration
//! 2. Wait for `setupComplete`
//! 3. Stream microphone PCM and screen JPEG frames via `realtimeInput`
//! 4. Receive `serverContent` carrying transcription fragments, inline model
//!    audio, turn boundaries and interruption signals
//!
//! Inbound messages are deliberately tolerant: every field is optional and
//! unrecognized shapes deserialize to an empty message, so one odd payload
//! never takes the session down.

use serde::{Deserialize, Serialize};

use crate::codec::encode_base64;
use crate::persona::PersonaConfig;

/// Live endpoint for the duplex connection; the API key is appended as a
/// query parameter at connect time.
pub const LIVE_API_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Model served over the live endpoint
pub const LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// Mime type for microphone frames; the capture path produces 16 kHz PCM
pub const AUDIO_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Mime type for screen frames
pub const IMAGE_MIME: &str = "image/jpeg";

/// The model's audio output format: 24 kHz mono PCM
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
pub const OUTPUT_CHANNELS: u16 = 1;

// ============================================================================
// Client Messages (sent TO the endpoint)
// ============================================================================

/// Messages sent from client to the live endpoint
///
/// The wire frames are single-key objects (`{"setup": ...}`,
/// `{"realtimeInput": ...}`), hence the untagged representation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Session configuration, sent once immediately after connecting
    Setup { setup: SetupConfig },

    /// A microphone or screen frame
    RealtimeInput {
        #[serde(rename = "realtimeInput")]
        realtime_input: RealtimeInput,
    },
}

impl ClientMessage {
    /// Build the setup message for a persona
    pub fn setup(persona: &PersonaConfig) -> Self {
        Self::Setup {
            setup: SetupConfig::new(persona),
        }
    }

    /// Wrap raw 16 kHz PCM bytes as a microphone frame
    pub fn audio_chunk(pcm: &[u8]) -> Self {
        Self::RealtimeInput {
            realtime_input: RealtimeInput {
                media: MediaChunk {
                    mime_type: AUDIO_INPUT_MIME.to_string(),
                    data: encode_base64(pcm),
                },
            },
        }
    }

    /// Wrap encoded JPEG bytes as a screen frame
    pub fn image_chunk(jpeg: &[u8]) -> Self {
        Self::RealtimeInput {
            realtime_input: RealtimeInput {
                media: MediaChunk {
                    mime_type: IMAGE_MIME.to_string(),
                    data: encode_base64(jpeg),
                },
            },
        }
    }
}

/// Session configuration sent in the setup frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    /// Enables transcription of the user's audio (empty config object)
    pub input_audio_transcription: TranscriptionConfig,
    /// Enables transcription of the model's audio (empty config object)
    pub output_audio_transcription: TranscriptionConfig,
}

impl SetupConfig {
    pub fn new(persona: &PersonaConfig) -> Self {
        Self {
            model: LIVE_MODEL.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![persona.response_modality.as_str().to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: persona.voice.wire_name().to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![Part {
                    text: Some(persona.system_instruction.clone()),
                    inline_data: None,
                }],
            },
            input_audio_transcription: TranscriptionConfig {},
            output_audio_transcription: TranscriptionConfig {},
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty marker object enabling a transcription direction
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionConfig {}

/// Outbound content: a list of parts
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media: MediaChunk,
}

/// A single media payload on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded payload bytes
    pub data: String,
}

// ============================================================================
// Server Messages (received FROM the endpoint)
// ============================================================================

/// A message received from the live endpoint
///
/// At most one of the top-level fields is populated per frame. A frame that
/// matches none of them deserializes with every field `None` and is dropped
/// by the router.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
    pub error: Option<ErrorInfo>,
}

impl ServerMessage {
    /// True once the endpoint has acknowledged the setup frame
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Transcript fragment of the user's speech, if present
    pub fn input_fragment(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .input_transcription
            .as_ref()?
            .text
            .as_deref()
    }

    /// Transcript fragment of the model's speech, if present
    pub fn output_fragment(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .output_transcription
            .as_ref()?
            .text
            .as_deref()
    }

    /// True when this frame carries the end-of-turn signal
    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.turn_complete)
            .unwrap_or(false)
    }

    /// True when the server interrupted in-flight model audio (barge-in)
    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    /// Base64 model audio from the first inline-data part, if present
    pub fn audio_data(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|chunk| chunk.data.as_str())
    }

    /// Error description, if this frame carries one
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| {
            if !e.message.is_empty() {
                e.message.clone()
            } else if let Some(status) = &e.status {
                format!("Connection error ({})", status)
            } else {
                format!("Connection error (code {})", e.code.unwrap_or(0))
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub input_transcription: Option<TranscriptionFragment>,
    pub output_transcription: Option<TranscriptionFragment>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
    pub model_turn: Option<ModelTurn>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionFragment {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content part: either text or an inline media payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaChunk>,
}

/// Error payload from the endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorInfo {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: String,
}
