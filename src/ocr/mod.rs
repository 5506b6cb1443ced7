//! Extracting text from PDFs.
//!
//! Both of our engines work on page images, so we rasterize the PDF with
//! Poppler's `pdftocairo` first, and then OCR each page.

use std::{io, process::Output, sync::Arc};

use clap::{Args, ValueEnum};
use tempfile::TempDir;
use tokio::process::Command;

use crate::{
    async_utils::{DEFAULT_ERROR_REGEX, check_for_command_failure},
    cpu_limit::with_cpu_semaphore,
    errors::ScanError,
    prelude::*,
    rate_limit::RateLimit,
};

pub mod tesseract;
pub mod vision;

use self::{tesseract::TesseractExtractor, vision::VisionExtractor};

/// Default resolution for rasterizing PDF pages before OCR.
pub const DEFAULT_RASTERIZE_DPI: u32 = 300;

/// Something that can extract the text of a PDF.
#[async_trait]
pub trait TextExtractor: Send + Sync + 'static {
    /// Return the text of each page, in page order.
    ///
    /// Fails with [`ScanError::OcrUnavailable`] if the engine can't run at all
    /// (missing tools or credentials), and [`ScanError::OcrProcessing`] if it
    /// ran and failed.
    async fn extract_text(&self, pdf: &Path) -> Result<Vec<String>, ScanError>;
}

/// Which OCR engine to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OcrEngineName {
    /// Don't OCR.
    None,
    /// The local `tesseract` CLI tool.
    #[default]
    Tesseract,
    /// Google Cloud Vision. Needs `GOOGLE_VISION_API_KEY`.
    Vision,
}

/// OCR options shared by several subcommands.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// OCR engine to run on the finished PDF.
    #[clap(long = "ocr", value_enum, default_value_t = OcrEngineName::Tesseract)]
    pub engine: OcrEngineName,

    /// The DPI to use when rasterizing PDF pages for OCR.
    #[clap(long, default_value_t = DEFAULT_RASTERIZE_DPI)]
    pub rasterize_dpi: u32,

    /// Rate limit for cloud OCR requests, as "N/s" or "N/m".
    #[clap(long, default_value = "10/s")]
    pub rate_limit: RateLimit,

    /// Separate pages in the text output with form feeds.
    #[clap(long)]
    pub page_breaks: bool,
}

impl OcrOpts {
    /// Create the requested OCR engine, if any.
    pub fn extractor(&self) -> Option<Arc<dyn TextExtractor>> {
        match self.engine {
            OcrEngineName::None => None,
            OcrEngineName::Tesseract => Some(Arc::new(TesseractExtractor::new(
                self.rasterize_dpi,
                std::env::var("TESSERACT_LANG").ok(),
            ))),
            OcrEngineName::Vision => Some(Arc::new(VisionExtractor::new(
                std::env::var("GOOGLE_VISION_API_KEY").ok(),
                self.rasterize_dpi,
                &self.rate_limit,
            ))),
        }
    }
}

/// Join page texts into a single document.
pub fn join_pages(pages: &[String], page_breaks: bool) -> String {
    let separator = if page_breaks { "\n\u{000C}" } else { "\n\n" };
    let mut text = pages
        .iter()
        .map(|page| page.trim_end())
        .collect::<Vec<_>>()
        .join(separator);
    text.push('\n');
    text
}

/// PNG images of each page of a PDF, in page order.
///
/// The images are deleted when this is dropped.
pub struct RasterizedPdf {
    _tmpdir: TempDir,
    pub pages: Vec<PathBuf>,
}

/// Rasterize a PDF to one PNG per page using `pdftocairo`.
#[instrument(level = "debug", skip_all, fields(pdf = %pdf.display()))]
pub async fn rasterize_pdf(pdf: &Path, dpi: u32) -> Result<RasterizedPdf, ScanError> {
    let processing = |err: anyhow::Error| ScanError::OcrProcessing(format!("{err:#}"));
    let tmpdir = TempDir::with_prefix("ocr-pages")
        .context("Failed to create temporary directory")
        .map_err(processing)?;

    // pdftocairo appends zero-padded page numbers to this.
    let out_prefix = tmpdir.path().join("page");
    let mut cmd = Command::new("pdftocairo");
    cmd.arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg(pdf)
        .arg(&out_prefix);
    run_ocr_tool("pdftocairo", cmd, true).await?;

    let mut pages = tmpdir
        .path()
        .read_dir()
        .context("Failed to read rasterized pages")
        .map_err(processing)?
        .map(|entry| Ok(entry?.path()))
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to read rasterized pages")
        .map_err(processing)?;
    pages.retain(|path| path.extension().is_some_and(|ext| ext == "png"));
    pages.sort();
    if pages.is_empty() {
        return Err(ScanError::OcrProcessing(format!(
            "pdftocairo produced no pages for {:?}",
            pdf.display()
        )));
    }
    debug!(pages = pages.len(), "Rasterized PDF");
    Ok(RasterizedPdf {
        _tmpdir: tmpdir,
        pages,
    })
}

/// Run a CPU-hungry OCR tool, classifying failures.
///
/// A missing binary means OCR is unavailable. Anything else is a processing
/// failure.
pub(crate) async fn run_ocr_tool(
    name: &str,
    mut cmd: Command,
    check_stderr: bool,
) -> Result<Output, ScanError> {
    let output = with_cpu_semaphore(move || async move { Ok(cmd.output().await) })
        .await
        .map_err(|err| ScanError::OcrProcessing(format!("{err:#}")))?
        .map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ScanError::OcrUnavailable(format!(
                    "{name} is not installed or not on the PATH"
                ))
            } else {
                ScanError::OcrProcessing(format!("cannot run {name}: {err}"))
            }
        })?;
    let error_regex = check_stderr.then_some(&*DEFAULT_ERROR_REGEX);
    check_for_command_failure(name, &output, error_regex)
        .map_err(|err| ScanError::OcrProcessing(format!("{err:#}")))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_pages_in_order() {
        let pages = vec!["one\n".to_owned(), "two".to_owned()];
        assert_eq!(join_pages(&pages, false), "one\n\ntwo\n");
        assert_eq!(join_pages(&pages, true), "one\n\u{000C}two\n");
    }

    #[test]
    fn no_engine_means_no_extractor() {
        let opts = OcrOpts {
            engine: OcrEngineName::None,
            rasterize_dpi: DEFAULT_RASTERIZE_DPI,
            rate_limit: "10/s".parse().unwrap(),
            page_breaks: false,
        };
        assert!(opts.extractor().is_none());
    }

    #[tokio::test]
    async fn missing_tools_are_unavailable() {
        let cmd = Command::new("book-capture-no-such-ocr-tool");
        let err = run_ocr_tool("book-capture-no-such-ocr-tool", cmd, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::OcrUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    #[ignore = "Requires pdftocairo and img2pdf"]
    async fn rasterizes_every_page() {
        use crate::{
            dedup::tests::page,
            pdf::{Img2PdfAssembler, PdfAssembler as _},
        };

        let dir = TempDir::with_prefix("raster-test").unwrap();
        let mut images = vec![];
        for i in 0..3 {
            let path = dir.path().join(format!("book-page-{i}.png"));
            page(60, 80, Some((10, i * 20, 15))).save(&path).unwrap();
            images.push(path);
        }
        let pdf = Img2PdfAssembler::new().assemble_pdf(&images).await.unwrap();
        let pdf_path = dir.path().join("book.pdf");
        std::fs::write(&pdf_path, pdf).unwrap();
        let rasterized = rasterize_pdf(&pdf_path, 72).await.unwrap();
        assert_eq!(rasterized.pages.len(), 3);
    }
}
