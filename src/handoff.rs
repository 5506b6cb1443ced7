//! Handing captured pages on to PDF assembly and OCR.
//!
//! Nothing here is fatal. Whatever happens, the caller gets a
//! [`HandoffReport`] saying what we managed to produce, and the captured
//! frames stay available for a manual retry.

use std::sync::Arc;

use schemars::JsonSchema;

use crate::{
    errors::ScanError,
    ocr::{TextExtractor, join_pages},
    output::text_path_for,
    pdf::PdfAssembler,
    prelude::*,
    session::{CaptureOutcome, CaptureRun},
};

/// Overall result of a capture and hand-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    /// Every page we were asked for (or up to the end of the book) is in the
    /// PDF, and OCR succeeded or wasn't requested.
    Success,
    /// We produced something, but not everything.
    Partial,
    /// No pages were captured, so there is nothing to hand off.
    NoPagesCaptured,
}

/// What happened to OCR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OcrStatus {
    /// Page-ordered text was written to `text_path`.
    Succeeded { text_path: PathBuf },
    /// OCR was not attempted.
    Skipped { reason: String },
    /// OCR could not run, usually because of missing tools or credentials.
    Unavailable { reason: String },
    /// OCR ran and failed.
    Failed { reason: String },
}

impl OcrStatus {
    fn skipped(reason: &str) -> Self {
        OcrStatus::Skipped {
            reason: reason.to_owned(),
        }
    }

    /// Did we try to OCR and not get text?
    pub fn is_problem(&self) -> bool {
        matches!(self, OcrStatus::Unavailable { .. } | OcrStatus::Failed { .. })
    }
}

/// Final report for a capture session.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct HandoffReport {
    /// How capturing ended.
    pub outcome: CaptureOutcome,
    /// Human-readable version of `outcome`.
    pub outcome_message: String,
    pub status: HandoffStatus,
    /// The PDF we wrote, if we wrote one.
    pub pdf_path: Option<PathBuf>,
    /// Pages in the PDF, or pages captured if we have no PDF.
    pub page_count: usize,
    pub ocr: OcrStatus,
    /// If PDF assembly failed, where we saved the page images instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserved_pages: Option<PathBuf>,
    /// Every error from PDF assembly or OCR.
    pub errors: Vec<String>,
}

/// Hands accepted frames to our PDF and OCR collaborators.
pub struct PipelineHandoff {
    assembler: Arc<dyn PdfAssembler>,
    extractor: Option<Arc<dyn TextExtractor>>,
    page_breaks: bool,
}

impl PipelineHandoff {
    pub fn new(
        assembler: Arc<dyn PdfAssembler>,
        extractor: Option<Arc<dyn TextExtractor>>,
        page_breaks: bool,
    ) -> Self {
        Self {
            assembler,
            extractor,
            page_breaks,
        }
    }

    /// Build a PDF at `pdf_path` from the accepted frames, and OCR it.
    ///
    /// The frames are only borrowed. They remain in `run` so the caller can
    /// save them if the PDF couldn't be built.
    #[instrument(level = "debug", skip_all, fields(pdf = %pdf_path.display()))]
    pub async fn hand_off(&self, run: &CaptureRun, pdf_path: &Path) -> HandoffReport {
        let mut report = HandoffReport {
            outcome: run.outcome.clone(),
            outcome_message: run.outcome.to_string(),
            status: HandoffStatus::NoPagesCaptured,
            pdf_path: None,
            page_count: run.frames.len(),
            ocr: OcrStatus::skipped("no PDF was produced"),
            preserved_pages: None,
            errors: vec![],
        };
        if run.frames.is_empty() {
            info!("{}", ScanError::NoPagesCaptured);
            report.ocr = OcrStatus::skipped("no pages captured");
            return report;
        }

        if let Err(err) = self.write_pdf(run, pdf_path).await {
            error!("Could not build PDF: {:#}", err);
            report.errors.push(format!("PDF assembly failed: {err:#}"));
            report.status = HandoffStatus::Partial;
            return report;
        }
        info!(pages = run.frames.len(), "Wrote PDF to {}", pdf_path.display());
        report.pdf_path = Some(pdf_path.to_owned());

        report.ocr = match &self.extractor {
            None => OcrStatus::skipped("OCR was not requested"),
            Some(extractor) => self.ocr(extractor.as_ref(), pdf_path).await,
        };
        match &report.ocr {
            OcrStatus::Unavailable { reason } | OcrStatus::Failed { reason } => {
                report.errors.push(reason.clone());
            }
            OcrStatus::Succeeded { .. } | OcrStatus::Skipped { .. } => {}
        }

        let finished = matches!(
            run.outcome,
            CaptureOutcome::Completed { .. } | CaptureOutcome::StoppedByDuplicates { .. }
        );
        report.status = if finished && !report.ocr.is_problem() {
            HandoffStatus::Success
        } else {
            HandoffStatus::Partial
        };
        report
    }

    async fn write_pdf(&self, run: &CaptureRun, pdf_path: &Path) -> Result<()> {
        let pdf = self.assembler.assemble_pdf(&run.page_paths()).await?;
        if let Some(parent) = pdf_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent.display()))?;
        }
        tokio::fs::write(pdf_path, pdf)
            .await
            .with_context(|| format!("Failed to write PDF to {:?}", pdf_path.display()))
    }

    async fn ocr(&self, extractor: &dyn TextExtractor, pdf_path: &Path) -> OcrStatus {
        let pages = match extractor.extract_text(pdf_path).await {
            Ok(pages) => pages,
            Err(ScanError::OcrUnavailable(reason)) => {
                warn!("OCR unavailable: {}", reason);
                return OcrStatus::Unavailable { reason };
            }
            Err(err) => {
                error!("OCR failed: {}", err);
                return OcrStatus::Failed {
                    reason: err.to_string(),
                };
            }
        };
        write_text(pdf_path, &join_pages(&pages, self.page_breaks)).await
    }
}

/// Write OCR text beside its PDF.
pub async fn write_text(pdf_path: &Path, text: &str) -> OcrStatus {
    let text_path = text_path_for(pdf_path);
    match tokio::fs::write(&text_path, text).await {
        Ok(()) => {
            info!("Wrote OCR text to {}", text_path.display());
            OcrStatus::Succeeded { text_path }
        }
        Err(err) => OcrStatus::Failed {
            reason: format!("cannot write {:?}: {}", text_path.display(), err),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        dedup::{fingerprint, tests::page},
        session::{Frame, FrameStore},
    };

    /// Records what it was asked to assemble.
    #[derive(Default)]
    struct FakeAssembler {
        calls: AtomicUsize,
        fail: bool,
        pages_seen: std::sync::Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PdfAssembler for FakeAssembler {
        async fn assemble_pdf(&self, pages: &[PathBuf]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.pages_seen.lock().unwrap() = pages.to_vec();
            if self.fail {
                Err(anyhow!("img2pdf exploded"))
            } else {
                Ok(b"%PDF-1.4 fake".to_vec())
            }
        }
    }

    /// Returns a fixed result.
    struct FakeExtractor {
        calls: AtomicUsize,
        result: fn() -> Result<Vec<String>, ScanError>,
    }

    impl FakeExtractor {
        fn new(result: fn() -> Result<Vec<String>, ScanError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
            }
        }
    }

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        async fn extract_text(&self, _pdf: &Path) -> Result<Vec<String>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    async fn run_with(pages: usize, outcome: CaptureOutcome) -> CaptureRun {
        let store = FrameStore::new(pages.max(1)).unwrap();
        let mut frames = vec![];
        for index in 0..pages {
            let image = page(40, 60, Some((2, 2 + 5 * index as u32, 4)));
            let print = fingerprint(&image).unwrap();
            let path = store.write_page(index, image).await.unwrap();
            frames.push(Frame {
                index,
                path,
                fingerprint: print,
                width: 40,
                height: 60,
            });
        }
        CaptureRun {
            outcome,
            frames,
            store,
        }
    }

    fn completed(pages: usize) -> CaptureOutcome {
        CaptureOutcome::Completed { accepted: pages }
    }

    #[tokio::test]
    async fn empty_run_calls_nobody() {
        let assembler = Arc::new(FakeAssembler::default());
        let extractor = Arc::new(FakeExtractor::new(|| Ok(vec![])));
        let handoff =
            PipelineHandoff::new(assembler.clone(), Some(extractor.clone()), false);
        let run = run_with(0, CaptureOutcome::Cancelled { accepted: 0 }).await;
        let out = TempDir::with_prefix("handoff").unwrap();

        let report = handoff.hand_off(&run, &out.path().join("book.pdf")).await;
        assert_eq!(report.status, HandoffStatus::NoPagesCaptured);
        assert_eq!(report.pdf_path, None);
        assert_eq!(assembler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pages_are_assembled_in_order_and_ocred() {
        let assembler = Arc::new(FakeAssembler::default());
        let extractor = Arc::new(FakeExtractor::new(|| {
            Ok(vec!["page one".to_owned(), "page two".to_owned()])
        }));
        let handoff = PipelineHandoff::new(assembler.clone(), Some(extractor), false);
        let run = run_with(2, completed(2)).await;
        let out = TempDir::with_prefix("handoff").unwrap();
        let pdf_path = out.path().join("book.pdf");

        let report = handoff.hand_off(&run, &pdf_path).await;
        assert_eq!(report.status, HandoffStatus::Success);
        assert_eq!(report.page_count, 2);
        assert_eq!(report.pdf_path.as_deref(), Some(pdf_path.as_path()));
        assert!(report.errors.is_empty());
        assert_eq!(*assembler.pages_seen.lock().unwrap(), run.page_paths());
        assert_eq!(std::fs::read(&pdf_path).unwrap(), b"%PDF-1.4 fake");

        let text_path = out.path().join("book.pdf.txt");
        assert_eq!(
            report.ocr,
            OcrStatus::Succeeded {
                text_path: text_path.clone()
            }
        );
        assert_eq!(
            std::fs::read_to_string(text_path).unwrap(),
            "page one\n\npage two\n"
        );
    }

    #[tokio::test]
    async fn pdf_failure_keeps_frames() {
        let assembler = Arc::new(FakeAssembler {
            fail: true,
            ..FakeAssembler::default()
        });
        let extractor = Arc::new(FakeExtractor::new(|| Ok(vec![])));
        let handoff = PipelineHandoff::new(assembler, Some(extractor.clone()), false);
        let run = run_with(2, completed(2)).await;
        let out = TempDir::with_prefix("handoff").unwrap();

        let report = handoff.hand_off(&run, &out.path().join("book.pdf")).await;
        assert_eq!(report.status, HandoffStatus::Partial);
        assert_eq!(report.pdf_path, None);
        assert!(report.errors[0].contains("img2pdf exploded"));
        assert!(matches!(report.ocr, OcrStatus::Skipped { .. }));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(run.frames.iter().all(|frame| frame.path.exists()));
    }

    #[tokio::test]
    async fn ocr_problems_are_distinguishable() {
        let cases: [(fn() -> Result<Vec<String>, ScanError>, fn(&OcrStatus) -> bool); 2] = [
            (
                || Err(ScanError::OcrUnavailable("no key".to_owned())),
                |status| matches!(status, OcrStatus::Unavailable { .. }),
            ),
            (
                || Err(ScanError::OcrProcessing("HTTP 500".to_owned())),
                |status| matches!(status, OcrStatus::Failed { .. }),
            ),
        ];
        for (result, expected) in cases {
            let handoff = PipelineHandoff::new(
                Arc::new(FakeAssembler::default()),
                Some(Arc::new(FakeExtractor::new(result))),
                false,
            );
            let run = run_with(1, completed(1)).await;
            let out = TempDir::with_prefix("handoff").unwrap();
            let report = handoff.hand_off(&run, &out.path().join("book.pdf")).await;
            assert!(expected(&report.ocr), "{:?}", report.ocr);
            assert!(report.pdf_path.is_some());
            assert_eq!(report.status, HandoffStatus::Partial);
            assert_eq!(report.errors.len(), 1);
        }
    }

    #[tokio::test]
    async fn skipped_ocr_is_not_a_problem() {
        let handoff = PipelineHandoff::new(Arc::new(FakeAssembler::default()), None, false);
        let run = run_with(1, CaptureOutcome::StoppedByDuplicates {
            accepted: 1,
            streak: 4,
        })
        .await;
        let out = TempDir::with_prefix("handoff").unwrap();
        let report = handoff.hand_off(&run, &out.path().join("book.pdf")).await;
        assert_eq!(report.status, HandoffStatus::Success);
        assert!(matches!(report.ocr, OcrStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn cancelled_runs_are_partial() {
        let handoff = PipelineHandoff::new(Arc::new(FakeAssembler::default()), None, false);
        let run = run_with(1, CaptureOutcome::Cancelled { accepted: 1 }).await;
        let out = TempDir::with_prefix("handoff").unwrap();
        let report = handoff.hand_off(&run, &out.path().join("book.pdf")).await;
        assert_eq!(report.status, HandoffStatus::Partial);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["outcome"], "cancelled");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["ocr"]["status"], "skipped");
    }
}
