//! Screen frame sampling for the live connection
//!
//! While a screen stream is shared, one still frame per second is scaled to
//! a fixed width, JPEG-compressed and forwarded to the session as an image
//! payload. Ticks with no active stream are skipped, never queued. The first
//! tick is gated on connection readiness so no frame is produced before the
//! session can accept it.

use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ImageEncoder, RgbaImage};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::session::ClientMessage;

/// Interval between sampled frames
pub const VISION_FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// Frames are scaled to this width; height preserves the aspect ratio
pub const VISION_FRAME_WIDTH: u32 = 640;

/// JPEG quality for forwarded frames
pub const VISION_JPEG_QUALITY: u8 = 60;

/// Provider of the most recent frame from a shared screen stream
///
/// `latest_frame` returns `None` while no stream is active; the sampler
/// skips those ticks. Implementations may block briefly (the sampler calls
/// from a blocking context).
pub trait FrameSource: Send + Sync + 'static {
    fn latest_frame(&self) -> Option<RgbaImage>;
}

/// Owned handle to the running frame sampler
///
/// Stopping cancels the timer task exactly once; stopping again (or
/// dropping after stop) is a no-op.
pub struct VisionCapture {
    cancel: Option<CancellationToken>,
}

impl VisionCapture {
    /// Start the sampling timer
    ///
    /// The task waits for `ready` to turn true before the first tick, then
    /// samples `source` once per [`VISION_FRAME_INTERVAL`] and forwards each
    /// encoded frame to `outbound`.
    pub fn start(
        source: Arc<dyn FrameSource>,
        outbound: mpsc::Sender<ClientMessage>,
        mut ready: watch::Receiver<bool>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            // Connection readiness gates the first tick.
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                result = ready.wait_for(|ready| *ready) => {
                    if result.is_err() {
                        // Session wound down before ever becoming ready.
                        return;
                    }
                }
            }

            let mut interval = tokio::time::interval(VISION_FRAME_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut frames_sent: u64 = 0;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let source = Arc::clone(&source);
                        let encoded = tokio::task::spawn_blocking(move || {
                            source.latest_frame().and_then(|frame| encode_frame(&frame))
                        })
                        .await
                        .unwrap_or(None);

                        let Some(jpeg) = encoded else { continue };

                        match outbound.try_send(ClientMessage::image_chunk(&jpeg)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                log::warn!("Session outbound queue full, dropping vision frame");
                                continue;
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                log::info!("Session gone, stopping vision sampler");
                                break;
                            }
                        }

                        frames_sent += 1;
                        if frames_sent % 60 == 0 {
                            log::debug!("Vision: {} frames forwarded", frames_sent);
                        }
                    }
                }
            }
            log::info!("Vision sampler stopped after {} frames", frames_sent);
        });

        Self {
            cancel: Some(cancel),
        }
    }

    /// Cancel the timer task. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    /// True until the sampler has been stopped
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for VisionCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scale a frame to the wire width and compress it to JPEG
fn encode_frame(frame: &RgbaImage) -> Option<Vec<u8>> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let target_height = ((height as u64 * VISION_FRAME_WIDTH as u64) / width as u64).max(1) as u32;
    let scaled = imageops::resize(
        frame,
        VISION_FRAME_WIDTH,
        target_height,
        imageops::FilterType::Triangle,
    );

    let rgb_data: Vec<u8> = scaled
        .as_raw()
        .chunks_exact(4)
        .flat_map(|px| &px[..3])
        .copied()
        .collect();

    let mut jpeg_bytes = Vec::new();
    match JpegEncoder::new_with_quality(&mut jpeg_bytes, VISION_JPEG_QUALITY).write_image(
        &rgb_data,
        VISION_FRAME_WIDTH,
        target_height,
        image::ExtendedColorType::Rgb8,
    ) {
        Ok(()) => Some(jpeg_bytes),
        Err(e) => {
            log::warn!("JPEG encode error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([120, 30, 200, 255]))
    }

    #[test]
    fn test_encode_scales_to_wire_width() {
        let jpeg = encode_frame(&solid_frame(1280, 720)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();

        assert_eq!(decoded.width(), VISION_FRAME_WIDTH);
        assert_eq!(decoded.height(), 360);
    }

    #[test]
    fn test_encode_preserves_aspect_for_portrait_frames() {
        let jpeg = encode_frame(&solid_frame(400, 800)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();

        assert_eq!(decoded.width(), VISION_FRAME_WIDTH);
        assert_eq!(decoded.height(), 1280);
    }

    #[test]
    fn test_encode_rejects_empty_frame() {
        let empty = RgbaImage::new(0, 0);
        assert!(encode_frame(&empty).is_none());
    }

    #[tokio::test]
    async fn test_ticks_without_frames_are_skipped() {
        struct NoFrames;
        impl FrameSource for NoFrames {
            fn latest_frame(&self) -> Option<RgbaImage> {
                None
            }
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = watch::channel(true);

        let mut capture = VisionCapture::start(Arc::new(NoFrames), outbound_tx, ready_rx);

        // Long enough for the immediate first tick to fire
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(outbound_rx.try_recv().is_err());

        capture.stop();
        drop(ready_tx);
    }

    #[tokio::test]
    async fn test_stop_twice_is_a_no_op() {
        struct NoFrames;
        impl FrameSource for NoFrames {
            fn latest_frame(&self) -> Option<RgbaImage> {
                None
            }
        }

        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (_ready_tx, ready_rx) = watch::channel(false);

        let mut capture = VisionCapture::start(Arc::new(NoFrames), outbound_tx, ready_rx);
        assert!(capture.is_running());

        capture.stop();
        assert!(!capture.is_running());
        capture.stop();
    }
}
