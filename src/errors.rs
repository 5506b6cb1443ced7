//! Errors reported by the capture pipeline.
//!
//! Most of the application uses [`anyhow::Error`], but the capture loop needs
//! to tell apart failures it can shrug off (a single bad screenshot) from
//! failures that end the session (we can no longer turn pages). So our
//! collaborators report a [`ScanError`], and the loop decides what to do.

use thiserror::Error;

/// An error from the capture pipeline or one of its collaborators.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The capture region, click point or page count is missing or invalid.
    /// No session is started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A screenshot could not be taken. Recoverable on a per-frame basis.
    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// We could not send input to the screen. Fatal, because we can no
    /// longer turn pages.
    #[error("input unavailable: {0}")]
    InputUnavailable(String),

    /// A captured frame was empty or malformed.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Somebody tried to run a session that is already running.
    #[error("a capture session is already running")]
    SessionBusy,

    /// A collaborator can't be used at all, for example because the capture
    /// region is not on any monitor.
    #[error("capture backend is unusable: {0}")]
    BackendUnusable(String),

    /// OCR can't run at all, typically because of missing tools or
    /// credentials.
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    /// OCR ran but failed.
    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    /// Nothing was captured, so there is nothing to hand off.
    #[error("no pages captured")]
    NoPagesCaptured,
}

impl ScanError {
    /// Can the capture loop skip this frame and keep going?
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            ScanError::CaptureUnavailable(_) | ScanError::InvalidImage(_)
        )
    }
}
