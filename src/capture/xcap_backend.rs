//! Screenshots via the `xcap` crate.
//!
//! Works on X11, Windows and macOS. On Wayland, `xcap` goes through the
//! desktop portal, which may prompt the user.

use image::{DynamicImage, RgbaImage};
use xcap::Monitor;

use super::ScreenCapturer;
use crate::{
    async_utils::spawn_blocking_propagating_panics,
    errors::ScanError,
    geometry::CaptureRegion,
    prelude::*,
};

/// Capture the screen using `xcap`.
#[non_exhaustive]
pub struct XcapCapturer {}

impl XcapCapturer {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ScreenCapturer for XcapCapturer {
    #[instrument(level = "debug", skip_all, fields(region = %region))]
    async fn capture_region(
        &self,
        region: CaptureRegion,
    ) -> Result<DynamicImage, ScanError> {
        // `xcap` blocks, and on Wayland it may spin up its own runtime, so
        // keep it off our executor.
        spawn_blocking_propagating_panics(move || capture_region_sync(region)).await
    }
}

/// Find the monitor containing the region, photograph it, and crop.
fn capture_region_sync(region: CaptureRegion) -> Result<DynamicImage, ScanError> {
    let top_left = region.top_left();
    let monitor = Monitor::from_point(top_left.x(), top_left.y()).map_err(|err| {
        ScanError::BackendUnusable(format!(
            "no monitor contains {}: {}",
            top_left, err
        ))
    })?;
    let unavailable = |err: xcap::XCapError| ScanError::CaptureUnavailable(err.to_string());
    let monitor_x = monitor.x().map_err(unavailable)?;
    let monitor_y = monitor.y().map_err(unavailable)?;
    let monitor_width = monitor.width().map_err(unavailable)?;
    let monitor_height = monitor.height().map_err(unavailable)?;

    // The region must fit on a single monitor.
    let left = u32::try_from(top_left.x() - monitor_x).unwrap_or(0);
    let top = u32::try_from(top_left.y() - monitor_y).unwrap_or(0);
    if left + region.width() > monitor_width || top + region.height() > monitor_height {
        return Err(ScanError::BackendUnusable(format!(
            "capture region {} extends past the edge of its {}x{} monitor",
            region, monitor_width, monitor_height
        )));
    }

    let screenshot: RgbaImage = monitor.capture_image().map_err(unavailable)?;
    if screenshot.width() == 0 || screenshot.height() == 0 {
        return Err(ScanError::CaptureUnavailable(
            "captured an empty screenshot (is screen recording permitted?)".to_owned(),
        ));
    }

    // On HiDPI displays the screenshot is in physical pixels, while our
    // coordinates are logical. Scale the crop so we keep full resolution.
    let scale = f64::from(screenshot.width()) / f64::from(monitor_width);
    let scaled = |v: u32| (f64::from(v) * scale).round() as u32;
    let crop_left = scaled(left).min(screenshot.width() - 1);
    let crop_top = scaled(top).min(screenshot.height() - 1);
    let crop_width = scaled(region.width()).min(screenshot.width() - crop_left);
    let crop_height = scaled(region.height()).min(screenshot.height() - crop_top);
    trace!(scale, crop_left, crop_top, crop_width, crop_height, "Cropping screenshot");

    let image = DynamicImage::ImageRgba8(screenshot);
    Ok(image.crop_imm(crop_left, crop_top, crop_width, crop_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ScreenPoint;

    #[tokio::test]
    #[ignore = "Requires a graphical display and screen recording permission"]
    async fn captures_requested_region() {
        let region = CaptureRegion::new(ScreenPoint(0, 0), ScreenPoint(64, 48)).unwrap();
        let image = XcapCapturer::new().capture_region(region).await.unwrap();
        assert!(image.width() >= 64);
        assert!(image.height() >= 48);
    }
}
