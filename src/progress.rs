//! Reporting progress from the capture loop to whoever is watching.
//!
//! The loop runs on its own task and never touches the terminal directly.
//! Instead, it sends [`ProgressEvent`]s down a channel, and the UI side
//! displays them when it gets around to it. Events arrive in the order they
//! were sent.

use indicatif::ProgressBar;
use tokio::sync::mpsc;

use crate::{
    async_utils::JoinWorker,
    prelude::*,
    ui::Ui,
};

/// Something that wants to hear about capture progress.
///
/// All methods are fire-and-forget.
pub trait ProgressSink: Send + Sync + 'static {
    /// A message for the operator's log.
    fn log(&self, message: &str);

    /// A short description of what we're doing right now.
    fn status(&self, status: &str);

    /// How far along we are, from 0 to 100.
    fn progress(&self, percent: f32);
}

/// A single progress update.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Log(String),
    Status(String),
    Progress(f32),
}

/// A [`ProgressSink`] which forwards events over a channel.
#[derive(Clone, Debug)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Create a new sink, and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // If nobody is listening, that's fine.
        if self.tx.send(event).is_err() {
            trace!("Progress receiver has gone away");
        }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn log(&self, message: &str) {
        self.send(ProgressEvent::Log(message.to_owned()));
    }

    fn status(&self, status: &str) {
        self.send(ProgressEvent::Status(status.to_owned()));
    }

    fn progress(&self, percent: f32) {
        self.send(ProgressEvent::Progress(percent));
    }
}

/// Display progress events until the sending side is dropped.
///
/// Log messages go to `tracing`, status goes in the progress bar message, and
/// progress moves the bar.
pub fn spawn_progress_display(
    ui: &Ui,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
) -> JoinWorker {
    let pb = ui.new_capture_bar();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            display_event(&pb, event);
        }
        pb.finish_using_style();
        Ok(())
    });
    JoinWorker::from_handle(handle)
}

fn display_event(pb: &ProgressBar, event: ProgressEvent) {
    match event {
        ProgressEvent::Log(message) => info!("{}", message),
        ProgressEvent::Status(status) => pb.set_message(status),
        ProgressEvent::Progress(percent) => {
            pb.set_position(percent.clamp(0.0, 100.0).round() as u64)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Remembers every event, for tests.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingSink {
        pub(crate) fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ProgressSink for RecordingSink {
        fn log(&self, message: &str) {
            self.push(ProgressEvent::Log(message.to_owned()));
        }

        fn status(&self, status: &str) {
            self.push(ProgressEvent::Status(status.to_owned()));
        }

        fn progress(&self, percent: f32) {
            self.push(ProgressEvent::Progress(percent));
        }
    }

    #[tokio::test]
    async fn channel_preserves_order() {
        let (sink, mut rx) = ChannelProgressSink::new();
        sink.log("one");
        sink.status("two");
        sink.progress(50.0);
        drop(sink);

        let mut received = vec![];
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                ProgressEvent::Log("one".to_owned()),
                ProgressEvent::Status("two".to_owned()),
                ProgressEvent::Progress(50.0),
            ]
        );
    }

    #[tokio::test]
    async fn sending_without_receiver_is_harmless() {
        let (sink, rx) = ChannelProgressSink::new();
        drop(rx);
        sink.log("nobody hears this");
    }

    #[tokio::test]
    async fn display_finishes_when_sender_drops() {
        let ui = Ui::init_for_tests();
        let (sink, rx) = ChannelProgressSink::new();
        let worker = spawn_progress_display(&ui, rx);
        sink.status("Capturing page 1 of 2");
        sink.progress(50.0);
        sink.log("Accepted page 1");
        drop(sink);
        worker.join().await.unwrap();
    }
}
