//! Audio codec utilities for the live session
//!
//! Converts between the base64 wire encoding, raw PCM byte buffers, and
//! normalized floating-point sample frames.
//!
//! # Formats
//!
//! - Wire audio is base64 text carrying signed 16-bit little-endian PCM,
//!   interleaved by channel.
//! - Decoded frames normalize each sample to [-1.0, 1.0] by dividing by
//!   32768, one sample sequence per channel.
//! - The microphone path is the inverse: f32 samples scaled by 32768 and
//!   clamped to the i16 range before little-endian packing.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Errors from codec operations
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Input text is not valid base64
    InvalidBase64(String),
    /// Byte length is not a whole multiple of `2 * channels`
    TruncatedFrame { byte_len: usize, channels: u16 },
    /// A frame must carry at least one channel
    NoChannels,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::InvalidBase64(e) => write!(f, "Invalid base64 payload: {}", e),
            CodecError::TruncatedFrame { byte_len, channels } => write!(
                f,
                "PCM byte length {} is not a multiple of {} ({} channels x 2 bytes)",
                byte_len,
                2 * *channels as usize,
                channels
            ),
            CodecError::NoChannels => write!(f, "Audio frame must have at least one channel"),
        }
    }
}

impl std::error::Error for CodecError {}

/// A decoded, playable audio frame
///
/// Holds one normalized sample sequence per channel. All channels have the
/// same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Per-channel normalized samples in [-1.0, 1.0]
    pub channels: Vec<Vec<f32>>,
}

impl AudioFrame {
    /// Number of channels in this frame
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Playback duration of this frame in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sample_rate as f64
    }
}

/// Encode raw bytes as base64 text for the wire
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 wire text back to raw bytes
///
/// Exact inverse of [`encode_base64`] for every byte value. Malformed text
/// is a programmer/protocol error, surfaced as [`CodecError::InvalidBase64`].
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// Decode a raw PCM byte stream into a playable frame
///
/// Interprets `bytes` as signed 16-bit little-endian samples interleaved by
/// channel and de-interleaves into one normalized sequence per channel of
/// length `bytes.len() / (2 * channels)`.
///
/// A byte length that is not a whole multiple of `2 * channels` is rejected
/// rather than silently truncated.
pub fn decode_audio_frame(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<AudioFrame, CodecError> {
    if channels == 0 {
        return Err(CodecError::NoChannels);
    }

    let frame_bytes = 2 * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(CodecError::TruncatedFrame {
            byte_len: bytes.len(),
            channels,
        });
    }

    let samples_per_channel = bytes.len() / frame_bytes;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(samples_per_channel); channels as usize];

    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        out[i % channels as usize].push(sample as f32 / 32768.0);
    }

    Ok(AudioFrame {
        sample_rate,
        channels: out,
    })
}

/// Convert captured f32 samples to 16-bit little-endian PCM bytes
///
/// Samples are scaled by 32768 and clamped to the i16 range so out-of-range
/// input cannot wrap around.
pub fn samples_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip_all_byte_values() {
        let bytes: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        let text = encode_base64(&bytes);
        assert_eq!(decode_base64(&text).unwrap(), bytes);
    }

    #[test]
    fn test_base64_empty() {
        assert_eq!(encode_base64(&[]), "");
        assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        let err = decode_base64("not base64!!!").unwrap_err();
        assert!(matches!(err, CodecError::InvalidBase64(_)));
    }

    #[test]
    fn test_decode_mono_frame_shape_and_values() {
        // 0x4000 = 16384 -> 0.5, 0xC000 = -16384 -> -0.5
        let bytes = [0x00, 0x40, 0x00, 0xC0];
        let frame = decode_audio_frame(&bytes, 24000, 1).unwrap();

        assert_eq!(frame.channel_count(), 1);
        assert_eq!(frame.samples_per_channel(), 2);
        assert!((frame.channels[0][0] - 0.5).abs() < 1e-6);
        assert!((frame.channels[0][1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stereo_deinterleave() {
        // L = 0.25, R = -0.25, repeated twice
        let left = (0.25f32 * 32768.0) as i16;
        let right = (-0.25f32 * 32768.0) as i16;
        let mut bytes = Vec::new();
        for _ in 0..2 {
            bytes.extend_from_slice(&left.to_le_bytes());
            bytes.extend_from_slice(&right.to_le_bytes());
        }

        let frame = decode_audio_frame(&bytes, 48000, 2).unwrap();
        assert_eq!(frame.channel_count(), 2);
        assert_eq!(frame.samples_per_channel(), 2);
        for i in 0..2 {
            assert!((frame.channels[0][i] - 0.25).abs() < 1e-6);
            assert!((frame.channels[1][i] + 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        // 3 bytes can never hold whole 16-bit mono samples
        let err = decode_audio_frame(&[0, 1, 2], 24000, 1).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedFrame {
                byte_len: 3,
                channels: 1
            }
        ));

        // 6 bytes = 3 samples, not divisible across 2 channels
        let err = decode_audio_frame(&[0; 6], 24000, 2).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedFrame { .. }));
    }

    #[test]
    fn test_decode_rejects_zero_channels() {
        let err = decode_audio_frame(&[0, 0], 24000, 0).unwrap_err();
        assert!(matches!(err, CodecError::NoChannels));
    }

    #[test]
    fn test_frame_duration() {
        let bytes = vec![0u8; 24000 * 2]; // one second of mono 16-bit
        let frame = decode_audio_frame(&bytes, 24000, 1).unwrap();
        assert!((frame.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_samples_to_pcm_bytes_little_endian() {
        let bytes = samples_to_pcm_bytes(&[0.0, 0.5]);
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn test_samples_to_pcm_bytes_clamps_out_of_range() {
        let bytes = samples_to_pcm_bytes(&[2.0, -2.0]);
        let hi = i16::from_le_bytes([bytes[0], bytes[1]]);
        let lo = i16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(hi, i16::MAX);
        assert_eq!(lo, i16::MIN);
    }

    #[test]
    fn test_pcm_round_trip_through_wire_encoding() {
        let samples = vec![0.0f32, 0.25, -0.25, 0.5];
        let bytes = samples_to_pcm_bytes(&samples);
        let decoded = decode_audio_frame(&decode_base64(&encode_base64(&bytes)).unwrap(), 16000, 1)
            .unwrap();

        for (a, b) in samples.iter().zip(decoded.channels[0].iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
