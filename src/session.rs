//! Capture sessions: what to capture, how patiently, and what we kept.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use image::{DynamicImage, ImageFormat};
use schemars::JsonSchema;
use tempfile::TempDir;
use uuid::Uuid;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    dedup::Fingerprint,
    errors::ScanError,
    geometry::{CaptureRegion, ScreenPoint},
    prelude::*,
};

/// How long to wait before the first click, so the operator can bring the
/// reader app to the front.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(3);

/// How long to wait after each click before taking the next screenshot.
///
/// Reader apps render the next page asynchronously. Too short, and we
/// photograph a half-drawn page.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// How many consecutive repeats of the last accepted page end the session.
pub const DEFAULT_DUPLICATE_THRESHOLD: usize = 4;

/// How long a single screenshot may take before we give up on that frame.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a single click may take before we give up on the session.
pub const DEFAULT_CLICK_TIMEOUT: Duration = Duration::from_secs(5);

/// What the operator asked us to capture.
///
/// The fields are optional because they may come from a settings file, the
/// command line, or neither. [`CaptureConfig::validate`] checks that we have
/// everything.
#[derive(Clone, Debug, Default)]
pub struct CaptureConfig {
    /// Top-left corner of the page on screen.
    pub top_left: Option<ScreenPoint>,
    /// Bottom-right corner of the page on screen.
    pub bottom_right: Option<ScreenPoint>,
    /// Where to click to turn the page.
    pub click_point: Option<ScreenPoint>,
    /// How many pages to capture, at most.
    pub pages: usize,
}

/// A [`CaptureConfig`] which has been checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidConfig {
    pub region: CaptureRegion,
    pub click_point: ScreenPoint,
    pub pages: usize,
}

impl CaptureConfig {
    /// Check that we have a non-empty region, a click point and at least one
    /// page.
    pub fn validate(&self) -> Result<ValidConfig, ScanError> {
        let missing = |what: &str| {
            ScanError::Configuration(format!("no {what} was specified"))
        };
        let top_left = self.top_left.ok_or_else(|| missing("top-left corner"))?;
        let bottom_right = self
            .bottom_right
            .ok_or_else(|| missing("bottom-right corner"))?;
        let click_point = self
            .click_point
            .ok_or_else(|| missing("next-page button position"))?;
        if self.pages == 0 {
            return Err(ScanError::Configuration(
                "the page count must be at least 1".to_owned(),
            ));
        }
        Ok(ValidConfig {
            region: CaptureRegion::new(top_left, bottom_right)?,
            click_point,
            pages: self.pages,
        })
    }
}

/// Timing and termination policy for the capture loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturePolicy {
    pub warmup: Duration,
    pub settle_delay: Duration,
    pub duplicate_threshold: usize,
    pub capture_timeout: Duration,
    pub click_timeout: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            settle_delay: DEFAULT_SETTLE_DELAY,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            click_timeout: DEFAULT_CLICK_TIMEOUT,
        }
    }
}

impl CapturePolicy {
    fn validate(&self) -> Result<(), ScanError> {
        if self.duplicate_threshold == 0 {
            return Err(ScanError::Configuration(
                "the duplicate threshold must be at least 1".to_owned(),
            ));
        }
        if self.capture_timeout.is_zero() || self.click_timeout.is_zero() {
            return Err(ScanError::Configuration(
                "capture and click timeouts must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// No waiting, for tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            warmup: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A shared flag the operator sets to stop a running session.
///
/// The loop only looks at this between pages.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One capture session.
///
/// A session may only run once at a time. See [`CaptureSession::begin_run`].
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    config: CaptureConfig,
    policy: CapturePolicy,
    cancel: CancelFlag,
    running: AtomicBool,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig, policy: CapturePolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            policy,
            cancel: CancelFlag::default(),
            running: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// A handle the operator can use to cancel this session.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Validate everything we need before touching the screen.
    pub fn validate(&self) -> Result<ValidConfig, ScanError> {
        self.policy.validate()?;
        self.config.validate()
    }

    /// Mark this session as running until the returned guard is dropped.
    pub(crate) fn begin_run(&self) -> Result<RunGuard<'_>, ScanError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ScanError::SessionBusy)?;
        Ok(RunGuard {
            running: &self.running,
        })
    }
}

/// Clears the session's "running" flag on every exit path.
pub(crate) struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// An accepted page.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Position in the accepted sequence, starting at 0.
    pub index: usize,
    /// Where the page image was written.
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub width: u32,
    pub height: u32,
}

/// Temporary storage for accepted page images.
///
/// Everything is deleted when this is dropped.
#[derive(Debug)]
pub struct FrameStore {
    dir: TempDir,
    /// Digits in page numbers, so that file names sort correctly.
    index_width: usize,
}

impl FrameStore {
    /// Create storage for a session of up to `pages` pages.
    pub fn new(pages: usize) -> Result<Self> {
        let dir = TempDir::with_prefix("book-capture")
            .context("Failed to create temporary directory for pages")?;
        Ok(Self {
            dir,
            index_width: pages.to_string().len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The file name used for the page with `index`.
    pub fn file_name(&self, index: usize) -> String {
        format!("book-page-{index:0width$}.png", width = self.index_width)
    }

    /// Write a page image as an RGB PNG, returning its path.
    pub async fn write_page(&self, index: usize, image: DynamicImage) -> Result<PathBuf> {
        let path = self.dir.path().join(self.file_name(index));
        let save_path = path.clone();
        spawn_blocking_propagating_panics(move || {
            // Screenshots usually come with an alpha channel, which img2pdf
            // refuses.
            DynamicImage::ImageRgb8(image.to_rgb8())
                .save_with_format(&save_path, ImageFormat::Png)
        })
        .await
        .with_context(|| format!("Failed to write page image {:?}", path.display()))?;
        Ok(path)
    }
}

/// How a capture session ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// We captured every requested page.
    Completed { accepted: usize },
    /// The page stopped changing, which usually means the end of the book.
    StoppedByDuplicates { accepted: usize, streak: usize },
    /// The operator cancelled.
    Cancelled { accepted: usize },
    /// Something went badly wrong. Any pages accepted so far are preserved.
    Failed { detail: String },
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOutcome::Completed { accepted } => {
                write!(f, "Finished normally: captured {accepted} pages")
            }
            CaptureOutcome::StoppedByDuplicates { accepted, streak } => write!(
                f,
                "Stopped early after {streak} repeated pages (end of book?): \
                 captured {accepted} pages"
            ),
            CaptureOutcome::Cancelled { accepted } => {
                write!(f, "Cancelled by operator: captured {accepted} pages")
            }
            CaptureOutcome::Failed { detail } => write!(f, "Capture failed: {detail}"),
        }
    }
}

/// The result of running a session: how it ended, and what we kept.
///
/// Page images live in `store` until this is dropped.
#[derive(Debug)]
pub struct CaptureRun {
    pub outcome: CaptureOutcome,
    pub frames: Vec<Frame>,
    pub store: FrameStore,
}

impl CaptureRun {
    /// Paths of our accepted pages, in order.
    pub fn page_paths(&self) -> Vec<PathBuf> {
        self.frames.iter().map(|frame| frame.path.clone()).collect()
    }

    /// Copy our page images somewhere they'll outlive the session.
    pub async fn preserve_frames(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create {:?}", dest.display()))?;
        let mut copied = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let file_name = frame
                .path
                .file_name()
                .context("page image has no file name")?;
            let target = dest.join(file_name);
            tokio::fs::copy(&frame.path, &target).await.with_context(|| {
                format!("Failed to copy page image to {:?}", target.display())
            })?;
            copied.push(target);
        }
        Ok(copied)
    }
}
