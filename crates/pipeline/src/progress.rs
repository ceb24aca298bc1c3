//! Progress reporting.
//!
//! The session reports stage boundaries through an explicit sink passed in
//! at construction. Sinks must be fire-and-forget: the pipeline never waits
//! on a consumer, and a dropped receiver is not an error.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

/// One progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: String,
    /// 0..100 across the whole session.
    pub percent: f64,
    pub message: String,
}

/// Receives stage-boundary updates from a running session.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: &str, percent: f64, message: &str);
}

/// Sharing a sink between the session and an observer is routine in tests.
impl<T: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<T> {
    fn report(&self, stage: &str, percent: f64, message: &str) {
        (**self).report(stage, percent, message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _stage: &str, _percent: f64, _message: &str) {}
}

/// Forwards events over a channel; send errors are ignored so a vanished
/// consumer can't stall the session.
pub struct ChannelProgress {
    tx: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, stage: &str, percent: f64, message: &str) {
        let _ = self.tx.send(ProgressEvent {
            stage: stage.to_string(),
            percent,
            message: message.to_string(),
        });
    }
}

/// Simple event collector for testing.
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("progress log poisoned").clone()
    }

    pub fn stages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.stage).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

impl ProgressSink for ProgressLog {
    fn report(&self, stage: &str, percent: f64, message: &str) {
        self.events
            .lock()
            .expect("progress log poisoned")
            .push(ProgressEvent {
                stage: stage.to_string(),
                percent,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_progress_forwards() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelProgress::new(tx);
        sink.report("evaluation", 45.0, "batch 1/3");

        let event = rx.recv().unwrap();
        assert_eq!(event.stage, "evaluation");
        assert_eq!(event.percent, 45.0);
    }

    #[test]
    fn test_channel_progress_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelProgress::new(tx);
        // Must not panic.
        sink.report("evaluation", 50.0, "still fine");
    }

    #[test]
    fn test_progress_log_collects_in_order() {
        let log = ProgressLog::new();
        log.report("dependencies", 30.0, "building graph");
        log.report("complete", 100.0, "done");
        assert_eq!(log.stages(), vec!["dependencies", "complete"]);
    }
}
