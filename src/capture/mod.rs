//! Talking to the screen: taking screenshots and clicking.
//!
//! The capture loop only sees the [`ScreenCapturer`] and [`PageTurner`]
//! traits, so tests can substitute scripted fakes for the real desktop.

use image::DynamicImage;

use crate::{
    errors::ScanError,
    geometry::{CaptureRegion, ScreenPoint},
    prelude::*,
};

pub mod xcap_backend;
pub mod xdotool;

/// Something that can photograph a region of the screen.
#[async_trait]
pub trait ScreenCapturer: Send + Sync + 'static {
    /// Capture `region` as an image.
    ///
    /// Fails with [`ScanError::CaptureUnavailable`] if this particular
    /// screenshot could not be taken, or [`ScanError::BackendUnusable`] if no
    /// screenshot will ever work.
    async fn capture_region(&self, region: CaptureRegion)
    -> Result<DynamicImage, ScanError>;
}

/// Something that can click on the screen, typically to turn a page.
#[async_trait]
pub trait PageTurner: Send + Sync + 'static {
    /// Click once at `point`. Fails with [`ScanError::InputUnavailable`].
    async fn click(&self, point: ScreenPoint) -> Result<(), ScanError>;
}
