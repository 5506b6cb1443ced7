//! The `test-capture` subcommand.

use clap::Args;
use image::ImageFormat;

use super::RegionOpts;
use crate::{
    capture::{ScreenCapturer as _, xcap_backend::XcapCapturer},
    prelude::*,
    settings::Settings,
    ui::Ui,
};

/// Test capture command line arguments.
#[derive(Debug, Args)]
pub struct TestCaptureOpts {
    #[clap(flatten)]
    pub region: RegionOpts,

    /// Where to save the test screenshot.
    #[clap(short = 'o', long = "out", default_value = "test_capture.png")]
    pub output_path: PathBuf,
}

/// The `test-capture` subcommand: photograph the region once, so the operator
/// can check their coordinates.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_test_capture(ui: Ui, opts: &TestCaptureOpts) -> Result<()> {
    let settings = opts.region.resolve_settings(Settings::default()).await?;
    let top_left = settings
        .top_left
        .context("no top-left corner was specified")?;
    let bottom_right = settings
        .bottom_right
        .context("no bottom-right corner was specified")?;
    let region = crate::geometry::CaptureRegion::new(top_left, bottom_right)?;
    info!(%region, platform = std::env::consts::OS, "Test capture");

    let image = XcapCapturer::new().capture_region(region).await?;
    image
        .save_with_format(&opts.output_path, ImageFormat::Png)
        .with_context(|| {
            format!("Failed to save test capture to {:?}", opts.output_path.display())
        })?;
    ui.display_message(
        "📷",
        &format!(
            "Saved {}x{} capture of {} to {}",
            image.width(),
            image.height(),
            region,
            opts.output_path.display()
        ),
    );
    Ok(())
}
