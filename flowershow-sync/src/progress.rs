//! Progress reporting for batch and direct publishes.
//!
//! Implemented by the host UI. Publishes and deletes are counted separately
//! so a caller can render combined progress.

use std::sync::Mutex;

use flowershow_core::PublishResult;

use crate::error::PublishError;

/// Receives one callback per file operation.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first file operation.
    fn on_start(&self, _publishes: usize, _deletes: usize) {}
    /// `done` of `total` publishes finished; `path` is the latest.
    fn on_publish(&self, _done: usize, _total: usize, _path: &str) {}
    /// `done` of `total` deletes finished; `path` is the latest.
    fn on_delete(&self, _done: usize, _total: usize, _path: &str) {}
    fn on_complete(&self, _result: &PublishResult) {}
    fn on_error(&self, _error: &PublishError) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// One recorded progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Start { publishes: usize, deletes: usize },
    Published { done: usize, total: usize, path: String },
    Deleted { done: usize, total: usize, path: String },
    Complete { pr_number: u64 },
    Error { message: String },
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl ProgressSink for RecordingProgress {
    fn on_start(&self, publishes: usize, deletes: usize) {
        self.push(ProgressEvent::Start { publishes, deletes });
    }

    fn on_publish(&self, done: usize, total: usize, path: &str) {
        self.push(ProgressEvent::Published {
            done,
            total,
            path: path.to_string(),
        });
    }

    fn on_delete(&self, done: usize, total: usize, path: &str) {
        self.push(ProgressEvent::Deleted {
            done,
            total,
            path: path.to_string(),
        });
    }

    fn on_complete(&self, result: &PublishResult) {
        self.push(ProgressEvent::Complete {
            pr_number: result.pr_number,
        });
    }

    fn on_error(&self, error: &PublishError) {
        self.push(ProgressEvent::Error {
            message: error.to_string(),
        });
    }
}
