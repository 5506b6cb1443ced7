//! OCR using the `tesseract` CLI tool.

use futures::{StreamExt as _, TryStreamExt as _, stream};
use tokio::process::Command;

use super::{TextExtractor, rasterize_pdf, run_ocr_tool};
use crate::{errors::ScanError, prelude::*};

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractExtractor {
    dpi: u32,
    /// Optional language code, as passed to `tesseract -l`.
    lang: Option<String>,
}

impl TesseractExtractor {
    pub fn new(dpi: u32, lang: Option<String>) -> Self {
        Self { dpi, lang }
    }

    #[instrument(level = "debug", skip_all, fields(page = %page.display()))]
    async fn ocr_page(&self, page: &Path) -> Result<String, ScanError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(page).arg("stdout");
        if let Some(lang) = &self.lang {
            cmd.arg("-l").arg(lang);
        }
        // tesseract chats on stderr, so only the exit code matters.
        let output = run_ocr_tool("tesseract", cmd, false).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    #[instrument(level = "debug", skip_all, fields(pdf = %pdf.display()))]
    async fn extract_text(&self, pdf: &Path) -> Result<Vec<String>, ScanError> {
        let rasterized = rasterize_pdf(pdf, self.dpi).await?;
        // `buffered` keeps pages in order. The CPU semaphore keeps us from
        // running too many copies of tesseract at once.
        stream::iter(rasterized.pages.clone())
            .map(|page| async move { self.ocr_page(&page).await })
            .buffered(num_cpus::get())
            .try_collect()
            .await
    }
}
