use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod capture;
mod capture_loop;
mod cmd;
mod cpu_limit;
mod dedup;
mod errors;
mod geometry;
mod handoff;
mod ocr;
mod output;
mod pdf;
mod prelude;
mod progress;
mod rate_limit;
mod session;
mod settings;
mod ui;

/// Photograph the pages of an on-screen book, and turn them into a PDF.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
External Tools:
  - xdotool: Clicks the "next page" button.
  - img2pdf: Assembles captured pages into a PDF.
  - pdftocairo, tesseract: Local OCR.

Environment Variables:
  - GOOGLE_VISION_API_KEY: Needed for `--ocr vision`.
  - TESSERACT_LANG (optional): Language for `--ocr tesseract`, like "eng+fra".
  - RUST_LOG (optional): Log filter, like "book_capture=debug".

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Capture pages, build a PDF, and OCR it.
    Capture(Box<cmd::capture::CaptureOpts>),
    /// Capture the page region once and save it, to check coordinates.
    TestCapture(cmd::test_capture::TestCaptureOpts),
    /// OCR an existing PDF.
    Ocr(cmd::ocr::OcrCmdOpts),
    /// Print schemas for settings and report formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            // The capture report is only written after the progress bar is
            // finished.
            Cmd::Capture(_) | Cmd::TestCapture(_) | Cmd::Ocr(_) => false,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Capture(opts) => {
            cmd::capture::cmd_capture(ui, opts).await?;
        }
        Cmd::TestCapture(opts) => {
            cmd::test_capture::cmd_test_capture(ui, opts).await?;
        }
        Cmd::Ocr(opts) => {
            cmd::ocr::cmd_ocr(ui, opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
