//! Microphone capture pipeline
//!
//! Bridges the CPAL audio callback (sync) to the live connection (async).
//! The device stream lives on a dedicated thread so the capture handle
//! stays `Send` and teardown is deterministic: stopping joins the thread,
//! which drops the stream before `stop` returns.
//!
//! # Architecture
//!
//! ```text
//! Audio Thread (sync)                       Tokio Runtime (async)
//! ┌──────────────────────────┐              ┌─────────────────────┐
//! │ CPAL Callback            │              │ Session send loop   │
//! │   ├─ downmix to mono     │──try_send──▶ │   └─ WebSocket      │
//! │   ├─ decimate to 16 kHz  │              └─────────────────────┘
//! │   └─ frame 4096 blocks   │
//! └──────────────────────────┘
//! ```
//!
//! Blocks already handed to the channel when capture stops are not
//! recalled; sends are fire-and-forget.

use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::CaptureError;
use crate::codec::samples_to_pcm_bytes;
use crate::session::ClientMessage;

/// Sample rate the connection expects for microphone audio
pub const MIC_SAMPLE_RATE: u32 = 16_000;

/// Fixed block size forwarded to the connection, in samples
pub const MIC_BLOCK_SAMPLES: usize = 4096;

/// Handle to an active microphone capture
///
/// Dropping the handle stops the capture.
pub struct MicrophoneCapture {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MicrophoneCapture {
    /// Acquire the input device and start streaming blocks to `outbound`
    ///
    /// Device and permission failures surface synchronously: the stream is
    /// opened before this returns. `device_name` selects a specific input
    /// device; `None` uses the default.
    pub fn start(
        device_name: Option<&str>,
        outbound: mpsc::Sender<ClientMessage>,
    ) -> Result<Self, CaptureError> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (result_tx, result_rx) = std_mpsc::channel::<Result<(), CaptureError>>();
        let device_name = device_name.map(|s| s.to_string());

        let thread = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match build_capture_stream(device_name.as_deref(), outbound) {
                    Ok(stream) => {
                        let _ = result_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = result_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop; the stream drops (and the device releases)
                // when this thread exits.
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("Microphone capture stopped");
            })
            .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;

        match result_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::StreamCreationFailed(
                "Capture thread exited unexpectedly".to_string(),
            )),
        }
    }

    /// Stop capturing and release the device
    ///
    /// Blocks until the device stream has been dropped. No further blocks
    /// are forwarded after this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.stop_tx.send(());
            let _ = thread.join();
        }
    }

    /// Handle with no device behind it, for exclusivity tests
    #[cfg(test)]
    pub(crate) fn dummy() -> Self {
        let (stop_tx, _stop_rx) = std_mpsc::channel();
        Self {
            stop_tx,
            thread: None,
        }
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_capture_stream(
    device_name: Option<&str>,
    outbound: mpsc::Sender<ClientMessage>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or(CaptureError::NoInputDevice)?
    } else {
        host.default_input_device()
            .ok_or(CaptureError::NoInputDevice)?
    };

    log::info!("Using audio input device: {:?}", device.name());

    // Prefer mono 16 kHz; otherwise take the default config and decimate.
    let (config, decimate) = match try_config(&device, MIC_SAMPLE_RATE) {
        Some(cfg) => (cfg, 1u32),
        None => {
            let default = device
                .default_input_config()
                .map_err(|_| CaptureError::NoSupportedConfig)?;
            let rate = default.sample_rate().0;
            let decimate = (rate / MIC_SAMPLE_RATE.max(1)).max(1);
            log::info!(
                "{} Hz unavailable, using {} Hz with {}:1 decimation",
                MIC_SAMPLE_RATE,
                rate,
                decimate
            );
            (
                StreamConfig {
                    channels: default.channels(),
                    sample_rate: default.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                },
                decimate,
            )
        }
    };

    let channels = config.channels as usize;
    let mut framer = BlockFramer::new(MIC_BLOCK_SAMPLES);
    let err_fn = |err| log::error!("Audio input stream error: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_mono(data, channels);
                let samples: Vec<f32> = if decimate > 1 {
                    mono.iter().step_by(decimate as usize).copied().collect()
                } else {
                    mono
                };

                for block in framer.push(&samples) {
                    let message = ClientMessage::audio_chunk(&samples_to_pcm_bytes(&block));
                    if outbound.try_send(message).is_err() {
                        log::warn!("Session outbound queue full, dropping mic block");
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

    log::info!(
        "Microphone capture started: {} Hz, {} channels, decimate {}",
        config.sample_rate.0,
        config.channels,
        decimate
    );

    Ok(stream)
}

/// Probe for an exact mono config at the target rate
fn try_config(device: &cpal::Device, rate: u32) -> Option<StreamConfig> {
    let supported = device.supported_input_configs().ok()?;
    for range in supported {
        if range.channels() == 1
            && range.min_sample_rate().0 <= rate
            && range.max_sample_rate().0 >= rate
            && range.sample_format() == cpal::SampleFormat::F32
        {
            return Some(StreamConfig {
                channels: 1,
                sample_rate: SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            });
        }
    }
    None
}

fn downmix_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Accumulates samples and yields complete fixed-size blocks
struct BlockFramer {
    buffer: Vec<f32>,
    block_size: usize,
}

impl BlockFramer {
    fn new(block_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(block_size * 2),
            block_size,
        }
    }

    /// Append samples and drain every complete block
    ///
    /// A trailing partial block stays buffered for the next callback.
    fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend_from_slice(samples);

        let mut blocks = Vec::new();
        while self.buffer.len() >= self.block_size {
            blocks.push(self.buffer.drain(..self.block_size).collect());
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framer_holds_partial_block() {
        let mut framer = BlockFramer::new(4);
        assert!(framer.push(&[0.0, 0.1, 0.2]).is_empty());

        // One more sample completes the block
        let blocks = framer.push(&[0.3]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], vec![0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_framer_yields_multiple_blocks() {
        let mut framer = BlockFramer::new(2);
        let blocks = framer.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(blocks, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        // The leftover sample joins the next push
        let blocks = framer.push(&[6.0]);
        assert_eq!(blocks, vec![vec![5.0, 6.0]]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_downmix_averages_stereo() {
        assert_eq!(downmix_mono(&[1.0, 0.0, 0.0, 1.0], 2), vec![0.5, 0.5]);
    }
}
