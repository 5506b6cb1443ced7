//! The `capture` subcommand.

use std::{future::Future, io, sync::Arc};

use clap::Args;

use super::RegionOpts;
use crate::{
    async_utils::io::write_json_output,
    capture::{xcap_backend::XcapCapturer, xdotool::XdotoolPageTurner},
    capture_loop::CaptureLoop,
    geometry::ScreenPoint,
    handoff::{HandoffReport, HandoffStatus, PipelineHandoff},
    ocr::OcrOpts,
    output::pages_dir_for,
    pdf::Img2PdfAssembler,
    prelude::*,
    progress::{ChannelProgressSink, spawn_progress_display},
    session::{
        CancelFlag, CaptureOutcome, CapturePolicy, CaptureRun, CaptureSession,
        DEFAULT_CAPTURE_TIMEOUT, DEFAULT_CLICK_TIMEOUT,
    },
    settings::{Settings, seconds},
    ui::Ui,
};

/// Capture command line arguments.
#[derive(Debug, Args)]
pub struct CaptureOpts {
    #[clap(flatten)]
    pub region: RegionOpts,

    /// Position of the reader app's "next page" button.
    #[clap(long = "click", value_name = "X,Y", allow_hyphen_values = true)]
    pub click_point: Option<ScreenPoint>,

    /// Maximum number of pages to capture.
    #[clap(long)]
    pub pages: Option<usize>,

    /// Seconds to wait before starting, so you can switch to the reader app.
    /// [default: 3]
    #[clap(long, value_name = "SECS")]
    pub warmup: Option<f64>,

    /// Seconds to wait after each click for the next page to render.
    /// [default: 1.5]
    #[clap(long, value_name = "SECS")]
    pub settle: Option<f64>,

    /// Stop after this many captures in a row look identical to the last
    /// page. [default: 4]
    #[clap(long, value_name = "N")]
    pub duplicate_threshold: Option<usize>,

    /// Seconds to allow for one screenshot before skipping it.
    #[clap(long, value_name = "SECS", default_value_t = DEFAULT_CAPTURE_TIMEOUT.as_secs_f64())]
    pub capture_timeout: f64,

    /// Seconds to allow for one click before giving up.
    #[clap(long, value_name = "SECS", default_value_t = DEFAULT_CLICK_TIMEOUT.as_secs_f64())]
    pub click_timeout: f64,

    /// Directory for the PDF. Defaults to your desktop.
    #[clap(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Base name for the PDF. Defaults to "captured_book".
    #[clap(long)]
    pub name: Option<String>,

    /// Don't add a timestamp to the PDF name.
    #[clap(long)]
    pub no_timestamp: bool,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    /// Write a JSON report here instead of to standard output.
    #[clap(long = "report", value_name = "PATH")]
    pub report_path: Option<PathBuf>,
}

impl CaptureOpts {
    /// Combine our options with the settings file, and build a session.
    async fn session_and_settings(&self) -> Result<(CaptureSession, Settings)> {
        let overrides = Settings {
            next_button: self.click_point,
            pages: self.pages,
            base_location: self.out_dir.clone(),
            base_filename: self.name.clone(),
            settle_secs: self.settle,
            warmup_secs: self.warmup,
            duplicate_threshold: self.duplicate_threshold,
            ..Settings::default()
        };
        let settings = self.region.resolve_settings(overrides).await?;
        let policy = settings.capture_policy(CapturePolicy {
            capture_timeout: seconds("--capture-timeout", self.capture_timeout)?,
            click_timeout: seconds("--click-timeout", self.click_timeout)?,
            ..CapturePolicy::default()
        })?;
        let session = CaptureSession::new(settings.capture_config(), policy);
        Ok((session, settings))
    }
}

/// The `capture` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_capture(ui: Ui, opts: &CaptureOpts) -> Result<()> {
    let (session, settings) = opts.session_and_settings().await?;

    // Catch configuration problems before we touch the screen.
    let config = session.validate()?;
    let session = Arc::new(session);
    ui.display_message(
        "📖",
        &format!(
            "Capturing up to {} pages. Switch to your reader app now! Press Ctrl-C to stop.",
            config.pages
        ),
    );

    // Listening for Ctrl-C replaces the default handler for the rest of the
    // process, so we keep listening until we exit.
    let cancel = session.cancel_flag();
    tokio::spawn(async move {
        if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
            error!("Interrupted again, exiting");
            std::process::exit(130);
        }
    });

    let (sink, rx) = ChannelProgressSink::new();
    let display = spawn_progress_display(&ui, rx);
    let capture_loop = CaptureLoop::new(
        Arc::new(XcapCapturer::new()),
        Arc::new(XdotoolPageTurner::new()),
        Arc::new(sink),
    );
    let run = capture_loop
        .spawn(session.clone())
        .await
        .context("capture task failed")??;
    // Nothing left to stop gracefully, so Ctrl-C now exits.
    session.cancel_flag().cancel();
    display.join().await?;

    let pdf_path = settings
        .output_naming(opts.no_timestamp)
        .pdf_path(chrono::Local::now());
    let handoff = PipelineHandoff::new(
        Arc::new(Img2PdfAssembler::new()),
        opts.ocr.extractor(),
        opts.ocr.page_breaks,
    );
    let mut report = handoff.hand_off(&run, &pdf_path).await;
    if report.pdf_path.is_none() && !run.frames.is_empty() {
        preserve_pages(&run, &pdf_path, &mut report).await;
    }
    // Removes the temporary page images.
    drop(run);

    ui.display_message("📘", &report.outcome_message);
    if let Some(path) = &report.pdf_path {
        ui.display_message("📄", &format!("PDF: {}", path.display()));
    }
    write_json_output(opts.report_path.as_deref(), &report).await?;

    if let CaptureOutcome::Failed { detail } = &report.outcome {
        return Err(anyhow!("capture failed: {}", detail));
    }
    if report.status == HandoffStatus::Partial && report.pdf_path.is_none() {
        return Err(anyhow!("could not build a PDF from the captured pages"));
    }
    Ok(())
}

/// Copy page images somewhere safe after a failed PDF build.
async fn preserve_pages(run: &CaptureRun, pdf_path: &Path, report: &mut HandoffReport) {
    let dest = pages_dir_for(pdf_path);
    match run.preserve_frames(&dest).await {
        Ok(copied) => {
            warn!(pages = copied.len(), "Saved page images to {}", dest.display());
            report.preserved_pages = Some(dest);
        }
        Err(err) => {
            error!("Could not save page images: {:#}", err);
            report.errors.push(format!("could not save page images: {err:#}"));
        }
    }
}

/// Handle Ctrl-C presses.
///
/// The first press cancels the capture session, which stops after the
/// current page. Returns `true` when the operator presses Ctrl-C after the
/// session was already cancelled, meaning we should exit now. Returns `false`
/// if we can't listen for signals.
async fn watch_interrupts<F, Fut>(cancel: CancelFlag, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    loop {
        if let Err(err) = next_interrupt().await {
            warn!("Cannot listen for Ctrl-C: {}", err);
            return false;
        }
        if cancel.is_cancelled() {
            return true;
        }
        warn!("Interrupted, stopping after the current page (press Ctrl-C again to exit)");
        cancel.cancel();
    }
}
