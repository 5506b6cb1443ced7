//! Assembling page images into a PDF.

use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure,
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// Something that can turn an ordered list of page images into a PDF.
#[async_trait]
pub trait PdfAssembler: Send + Sync + 'static {
    /// Build a PDF with one page per image, in the order given.
    async fn assemble_pdf(&self, pages: &[PathBuf]) -> Result<Vec<u8>>;
}

/// Assemble PDFs using the `img2pdf` CLI tool.
///
/// `img2pdf` embeds PNGs losslessly, without re-encoding. With `--nodate`
/// its output depends only on its input.
#[non_exhaustive]
pub struct Img2PdfAssembler {}

impl Img2PdfAssembler {
    pub fn new() -> Self {
        Self {}
    }

    fn command(pages: &[PathBuf]) -> Command {
        let mut cmd = Command::new("img2pdf");
        cmd.arg("--nodate").arg("--").args(pages);
        cmd
    }
}

#[async_trait]
impl PdfAssembler for Img2PdfAssembler {
    #[instrument(level = "debug", skip_all, fields(pages = pages.len()))]
    async fn assemble_pdf(&self, pages: &[PathBuf]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(anyhow!("cannot assemble a PDF with no pages"));
        }
        let output = with_cpu_semaphore(|| async {
            Self::command(pages)
                .output()
                .await
                .context("failed to run img2pdf (is it installed?)")
        })
        .await?;
        check_for_command_failure("img2pdf", &output, None)?;
        if !output.stdout.starts_with(b"%PDF") {
            return Err(anyhow!("img2pdf did not produce a PDF"));
        }
        debug!(bytes = output.stdout.len(), "Assembled PDF");
        Ok(output.stdout)
    }
}
