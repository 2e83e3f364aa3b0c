//! Screen frame source backed by xcap
//!
//! Captures the primary monitor on demand. Monitor enumeration happens per
//! frame so plugging or unplugging displays mid-session needs no special
//! handling.

use image::RgbaImage;
use xcap::Monitor;

use super::vision::FrameSource;

/// Captures still frames of the primary monitor
#[derive(Debug, Default)]
pub struct ScreenSource;

impl ScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl FrameSource for ScreenSource {
    fn latest_frame(&self) -> Option<RgbaImage> {
        let monitors = match Monitor::all() {
            Ok(monitors) => monitors,
            Err(e) => {
                log::warn!("Monitor enumeration failed: {:?}", e);
                return None;
            }
        };

        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())?;

        match monitor.capture_image() {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Screen capture failed: {:?}", e);
                None
            }
        }
    }
}
