//! cpal-backed playback sink
//!
//! Renders scheduled segments through the default output device. The device
//! callback owns the playout timeline: the clock is the number of frames the
//! device has rendered since the stream started, so scheduling and completion
//! are exact regardless of wall-clock jitter.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::{OutputSink, PlaybackError, SegmentId};
use crate::codec::AudioFrame;

struct Segment {
    id: SegmentId,
    /// First device frame this segment renders on
    start_frame: u64,
    /// Mono samples at the device rate
    samples: Vec<f32>,
    cursor: usize,
}

#[derive(Default)]
struct PlayoutState {
    segments: Vec<Segment>,
    frames_rendered: u64,
    next_id: u64,
    finished: Vec<SegmentId>,
}

/// Audio output stream that plays scheduled segments
///
/// The stream keeps running between segments and renders silence when
/// nothing is scheduled, so segment starts are sample-accurate.
pub struct DeviceOutput {
    _stream: Stream,
    state: Arc<Mutex<PlayoutState>>,
    device_rate: u32,
}

impl DeviceOutput {
    /// Open the default output device and start the playout stream
    pub fn new() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoOutputDevice)?;

        log::info!("Using audio output device: {:?}", device.name());

        let supported_config = device
            .default_output_config()
            .map_err(|_| PlaybackError::NoSupportedConfig)?;

        log::info!(
            "Output config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();
        let device_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let state = Arc::new(Mutex::new(PlayoutState::default()));
        let callback_state = state.clone();
        let err_fn = |err| log::error!("Audio output stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream_typed::<f32>(&device, &config, channels, callback_state, err_fn)?
            }
            SampleFormat::I16 => {
                build_stream_typed::<i16>(&device, &config, channels, callback_state, err_fn)?
            }
            SampleFormat::U16 => {
                build_stream_typed::<u16>(&device, &config, channels, callback_state, err_fn)?
            }
            _ => return Err(PlaybackError::NoSupportedConfig),
        };

        stream.play().map_err(|e| {
            PlaybackError::StreamCreationFailed(format!("Failed to start stream: {}", e))
        })?;

        Ok(Self {
            _stream: stream,
            state,
            device_rate,
        })
    }

    /// Sample rate of the playout timeline in Hz
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl OutputSink for DeviceOutput {
    fn clock_now(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state.frames_rendered as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> SegmentId {
        let mono = mixdown_mono(&frame);
        let samples = resample_nearest(&mono, frame.sample_rate, self.device_rate);
        let start_frame = (start_at * self.device_rate as f64).round() as u64;

        let mut state = self.state.lock().unwrap();
        let id = SegmentId(state.next_id);
        state.next_id += 1;
        state.segments.push(Segment {
            id,
            start_frame,
            samples,
            cursor: 0,
        });
        id
    }

    fn halt(&mut self, id: SegmentId) {
        let mut state = self.state.lock().unwrap();
        state.segments.retain(|s| s.id != id);
    }

    fn drain_finished(&mut self) -> Vec<SegmentId> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.finished)
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    state: Arc<Mutex<PlayoutState>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, PlaybackError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut state = state.lock().unwrap();
                let frames = data.len() / channels.max(1);

                for frame_idx in 0..frames {
                    let now = state.frames_rendered + frame_idx as u64;
                    let mut mixed = 0.0f32;
                    for segment in state.segments.iter_mut() {
                        if segment.start_frame <= now && segment.cursor < segment.samples.len() {
                            mixed += segment.samples[segment.cursor];
                            segment.cursor += 1;
                        }
                    }
                    let sample = T::from_sample(mixed.clamp(-1.0, 1.0));
                    for ch in 0..channels {
                        data[frame_idx * channels + ch] = sample;
                    }
                }

                state.frames_rendered += frames as u64;

                // Retire segments that played out completely
                let finished: Vec<SegmentId> = state
                    .segments
                    .iter()
                    .filter(|s| s.cursor >= s.samples.len())
                    .map(|s| s.id)
                    .collect();
                if !finished.is_empty() {
                    state.segments.retain(|s| s.cursor < s.samples.len());
                    state.finished.extend(finished);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaybackError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Collapse a frame to mono by averaging its channels
fn mixdown_mono(frame: &AudioFrame) -> Vec<f32> {
    if frame.channels.len() == 1 {
        return frame.channels[0].clone();
    }

    let len = frame.samples_per_channel();
    let channel_count = frame.channels.len().max(1) as f32;
    (0..len)
        .map(|i| {
            frame
                .channels
                .iter()
                .map(|ch| ch.get(i).copied().unwrap_or(0.0))
                .sum::<f32>()
                / channel_count
        })
        .collect()
}

/// Nearest-neighbor resample between arbitrary rates
///
/// The live feed is 24 kHz while output devices commonly run at 44.1/48 kHz.
fn resample_nearest(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * from_rate as u64 / to_rate as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}
