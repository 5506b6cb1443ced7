//! The capture loop: screenshot, compare, click, wait, repeat.

use std::sync::Arc;

use image::DynamicImage;
use tokio::{task::JoinHandle, time::timeout};

use crate::{
    capture::{PageTurner, ScreenCapturer},
    dedup::{Fingerprint, fingerprint, same_page},
    errors::ScanError,
    geometry::{CaptureRegion, ScreenPoint},
    prelude::*,
    progress::ProgressSink,
    session::{CaptureOutcome, CaptureRun, CaptureSession, Frame, FrameStore},
};

/// Drives a [`CaptureSession`] using a screen capturer and a page turner.
#[derive(Clone)]
pub struct CaptureLoop {
    capturer: Arc<dyn ScreenCapturer>,
    turner: Arc<dyn PageTurner>,
    progress: Arc<dyn ProgressSink>,
}

/// What happened to a single screenshot.
enum FrameResult {
    Accepted,
    Duplicate,
    Skipped,
    Stop(CaptureOutcome),
}

/// Mutable state for one run of the loop.
struct RunState {
    frames: Vec<Frame>,
    last: Option<Fingerprint>,
    streak: usize,
}

impl CaptureLoop {
    pub fn new(
        capturer: Arc<dyn ScreenCapturer>,
        turner: Arc<dyn PageTurner>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            capturer,
            turner,
            progress,
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(
        self,
        session: Arc<CaptureSession>,
    ) -> JoinHandle<Result<CaptureRun, ScanError>> {
        tokio::spawn(async move { self.run(&session).await })
    }

    /// Capture up to the requested number of pages.
    ///
    /// Returns `Err` only if the session is misconfigured, already running,
    /// or has nowhere to store pages. In those cases nothing on screen has
    /// been touched. Every other way of stopping is reported as a
    /// [`CaptureOutcome`], along with any pages we accepted before stopping.
    #[instrument(level = "debug", skip_all, fields(session = %session.id()))]
    pub async fn run(&self, session: &CaptureSession) -> Result<CaptureRun, ScanError> {
        let config = session.validate()?;
        let _guard = session.begin_run()?;
        let policy = session.policy();
        let cancel = session.cancel_flag();
        let store = FrameStore::new(config.pages)
            .map_err(|err| ScanError::BackendUnusable(format!("{err:#}")))?;
        debug!(dir = %store.path().display(), "Storing pages");

        self.progress.log(&format!(
            "Capturing up to {} pages from {}, clicking at {}",
            config.pages, config.region, config.click_point
        ));
        self.progress.status("Waiting for you to switch to the book");
        tokio::time::sleep(policy.warmup).await;

        // Click once so the reader app has focus.
        let mut state = RunState {
            frames: vec![],
            last: None,
            streak: 0,
        };
        if let Err(err) = self.click(session, config.click_point).await {
            return Ok(self.finish(state, store, failed(err)));
        }
        tokio::time::sleep(policy.settle_delay).await;

        for i in 0..config.pages {
            if cancel.is_cancelled() {
                let outcome = CaptureOutcome::Cancelled {
                    accepted: state.frames.len(),
                };
                return Ok(self.finish(state, store, outcome));
            }

            self.progress
                .status(&format!("Capturing page {} of {}", i + 1, config.pages));
            self.progress
                .progress(100.0 * i as f32 / config.pages as f32);

            match self
                .capture_frame(session, config.region, &store, &mut state)
                .await
            {
                FrameResult::Accepted | FrameResult::Duplicate | FrameResult::Skipped => {}
                FrameResult::Stop(outcome) => {
                    return Ok(self.finish(state, store, outcome));
                }
            }

            if i + 1 < config.pages {
                if let Err(err) = self.click(session, config.click_point).await {
                    return Ok(self.finish(state, store, failed(err)));
                }
                tokio::time::sleep(policy.settle_delay).await;
            }
        }

        self.progress.progress(100.0);
        let outcome = CaptureOutcome::Completed {
            accepted: state.frames.len(),
        };
        Ok(self.finish(state, store, outcome))
    }

    /// Take one screenshot and decide what to do with it.
    #[instrument(level = "debug", skip_all, fields(accepted = state.frames.len()))]
    async fn capture_frame(
        &self,
        session: &CaptureSession,
        region: CaptureRegion,
        store: &FrameStore,
        state: &mut RunState,
    ) -> FrameResult {
        let policy = session.policy();
        let image = match timeout(
            policy.capture_timeout,
            self.capturer.capture_region(region),
        )
        .await
        {
            Ok(Ok(image)) => image,
            Ok(Err(err)) if err.is_per_frame() => {
                return self.skip_frame(&err.to_string());
            }
            Ok(Err(err)) => return FrameResult::Stop(failed(err)),
            Err(_) => {
                return self.skip_frame(&format!(
                    "screenshot took longer than {:?}",
                    policy.capture_timeout
                ));
            }
        };

        let print = match fingerprint(&image) {
            Ok(print) => print,
            Err(err) => return self.skip_frame(&err.to_string()),
        };

        if state.last.as_ref().is_some_and(|last| same_page(last, &print)) {
            state.streak += 1;
            debug!(streak = state.streak, fingerprint = ?print, "Duplicate page");
            if state.streak >= policy.duplicate_threshold {
                self.progress.log(&format!(
                    "Page hasn't changed for {} captures, stopping",
                    state.streak
                ));
                return FrameResult::Stop(CaptureOutcome::StoppedByDuplicates {
                    accepted: state.frames.len(),
                    streak: state.streak,
                });
            }
            self.progress.log(&format!(
                "Page looks the same as the last one ({} of {}), clicking again",
                state.streak, policy.duplicate_threshold
            ));
            return FrameResult::Duplicate;
        }

        state.streak = 0;
        match self.accept(store, state.frames.len(), print, image).await {
            Ok(frame) => {
                self.progress.log(&format!("Captured page {}", frame.index + 1));
                state.last = Some(print);
                state.frames.push(frame);
                FrameResult::Accepted
            }
            Err(err) => FrameResult::Stop(CaptureOutcome::Failed {
                detail: format!("{err:#}"),
            }),
        }
    }

    /// Save an accepted page.
    async fn accept(
        &self,
        store: &FrameStore,
        index: usize,
        fingerprint: Fingerprint,
        image: DynamicImage,
    ) -> Result<Frame> {
        let (width, height) = (image.width(), image.height());
        let path = store.write_page(index, image).await?;
        Ok(Frame {
            index,
            path,
            fingerprint,
            width,
            height,
        })
    }

    fn skip_frame(&self, reason: &str) -> FrameResult {
        warn!("Skipping frame: {}", reason);
        self.progress
            .log(&format!("Could not capture this page, will retry: {reason}"));
        FrameResult::Skipped
    }

    /// Click to turn the page. Any failure here ends the session.
    async fn click(
        &self,
        session: &CaptureSession,
        point: ScreenPoint,
    ) -> Result<(), ScanError> {
        let click_timeout = session.policy().click_timeout;
        match timeout(click_timeout, self.turner.click(point)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::InputUnavailable(format!(
                "click at {point} took longer than {click_timeout:?}"
            ))),
        }
    }

    fn finish(
        &self,
        state: RunState,
        store: FrameStore,
        outcome: CaptureOutcome,
    ) -> CaptureRun {
        self.progress.log(&outcome.to_string());
        self.progress.status("Done");
        info!(%outcome, pages = state.frames.len(), "Capture session ended");
        CaptureRun {
            outcome,
            frames: state.frames,
            store,
        }
    }
}

fn failed(err: ScanError) -> CaptureOutcome {
    error!("Capture session failed: {}", err);
    CaptureOutcome::Failed {
        detail: err.to_string(),
    }
}
