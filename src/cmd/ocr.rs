//! The `ocr` subcommand.

use clap::Args;

use crate::{
    handoff::{OcrStatus, write_text},
    ocr::{OcrOpts, join_pages},
    prelude::*,
    ui::Ui,
};

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrCmdOpts {
    /// The PDF to OCR.
    pub input_path: PathBuf,

    #[clap(flatten)]
    pub ocr: OcrOpts,
}

/// The `ocr` subcommand: extract text from an existing PDF, writing it
/// beside the PDF.
#[instrument(level = "debug", skip_all, fields(pdf = %opts.input_path.display()))]
pub async fn cmd_ocr(ui: Ui, opts: &OcrCmdOpts) -> Result<()> {
    let extractor = opts
        .ocr
        .extractor()
        .ok_or_else(|| anyhow!("--ocr none leaves nothing to do"))?;
    if !tokio::fs::try_exists(&opts.input_path)
        .await
        .unwrap_or(false)
    {
        return Err(anyhow!("no such PDF: {:?}", opts.input_path.display()));
    }

    let spinner = ui.new_spinner("🔍", "Extracting text", "Extracted text");
    let pages = extractor.extract_text(&opts.input_path).await?;
    spinner.finish_using_style();

    let text = join_pages(&pages, opts.ocr.page_breaks);
    match write_text(&opts.input_path, &text).await {
        OcrStatus::Succeeded { text_path } => {
            ui.display_message(
                "📝",
                &format!("Wrote {} pages of text to {}", pages.len(), text_path.display()),
            );
            Ok(())
        }
        OcrStatus::Skipped { reason }
        | OcrStatus::Unavailable { reason }
        | OcrStatus::Failed { reason } => Err(anyhow!(reason)),
    }
}
