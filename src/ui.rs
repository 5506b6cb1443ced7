//! Terminal UI: the capture progress bar, the OCR spinner, and operator
//! messages, all sharing stderr with our logs.
//!
//! The stderr writer is adapted from `substudy` by Eric Kidd, which is
//! licensed under Apache-2.0 OR MIT. Used with permission.

use std::{borrow::Cow, io, sync::Arc, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};

/// How often bars redraw when nothing else is happening. The capture loop
/// spends most of its time sleeping, so without this the elapsed time
/// would freeze.
const TICK: Duration = Duration::from_millis(250);

/// Application UI state.
#[derive(Clone)]
pub struct Ui {
    multi_progress: Arc<MultiProgress>,
}

impl Ui {
    /// Create a UI that draws on stderr.
    pub fn init() -> Ui {
        Ui {
            multi_progress: Arc::new(MultiProgress::new()),
        }
    }

    /// Create a UI that draws nothing, for unit tests.
    #[cfg(test)]
    pub fn init_for_tests() -> Ui {
        Ui {
            multi_progress: Arc::new(MultiProgress::with_draw_target(
                ProgressDrawTarget::hidden(),
            )),
        }
    }

    /// Hide our progress bars, for when the JSON report goes to stdout.
    pub fn hide_progress_bars(&self) {
        self.multi_progress
            .set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A writer for `tracing` that doesn't tear through our progress bars.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    /// The capture progress bar, running from 0 to 100 percent.
    ///
    /// The message shows what the capture loop is doing right now.
    pub fn new_capture_bar(&self) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template("  {prefix:3}{msg:30} {elapsed_precise} {wide_bar:.cyan/blue} {percent:>3}%")
            .expect("bad capture bar template");
        self.add(ProgressBar::new(100).with_style(style), "📖", "Capturing pages")
            .with_finish(ProgressFinish::WithMessage(Cow::Borrowed(
                "Capture finished",
            )))
    }

    /// A spinner for work with no useful progress measure, like OCR.
    pub fn new_spinner(&self, emoji: &str, msg: &str, done_msg: &str) -> ProgressBar {
        let style = ProgressStyle::default_spinner()
            .template("{spinner} {prefix:3}{msg}")
            .expect("bad spinner template");
        self.add(ProgressBar::new_spinner().with_style(style), emoji, msg)
            .with_finish(ProgressFinish::WithMessage(Cow::Owned(
                done_msg.to_owned(),
            )))
    }

    fn add(&self, pb: ProgressBar, emoji: &str, msg: &str) -> ProgressBar {
        let pb = self.multi_progress.add(pb);
        pb.set_prefix(emoji.to_owned());
        pb.set_message(msg.to_owned());
        pb.enable_steady_tick(TICK);
        pb
    }

    /// Print a line for the operator without mangling our progress bars.
    pub fn display_message(&self, emoji: &str, msg: &str) {
        self.multi_progress
            .suspend(|| eprintln!("{emoji} {msg}"));
    }

    /// Run `f` against stderr with our progress bars out of the way.
    fn with_stderr<R>(&self, f: impl FnOnce(&mut io::Stderr) -> R) -> R {
        self.multi_progress.suspend(|| f(&mut io::stderr()))
    }
}

/// A writer for `stderr` which hides our progress bars while it writes.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

// `tracing` usually writes a whole line with `write_all` or `write_fmt`, so
// we suspend once per call rather than once per fragment.
impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.with_stderr(|stderr| stderr.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.with_stderr(|stderr| stderr.flush())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui.with_stderr(|stderr| stderr.write_all(buf))
    }

    fn write_fmt(&mut self, fmt: std::fmt::Arguments<'_>) -> io::Result<()> {
        self.ui.with_stderr(|stderr| stderr.write_fmt(fmt))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
