use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};

/// Cooperative cancellation flag shared between the worker and the foreground.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Set the flag; true if it was already set.
    pub fn request_cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub label: String,
    pub cancelled: bool,
}

/// Task counter, current label and cancellation, readable from any thread.
#[derive(Debug, Default)]
pub struct ProgressState {
    completed: AtomicUsize,
    total: AtomicUsize,
    label: Mutex<String>,
    cancel: CancelToken,
}

impl ProgressState {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn set_label(&self, label: &str) {
        if let Ok(mut l) = self.label.lock() {
            label.clone_into(&mut *l);
        }
    }

    /// Marks one task done and returns the new count. Never decreases.
    pub fn complete_task(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed(),
            total: self.total(),
            label: self.label.lock().map(|l| l.clone()).unwrap_or_default(),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}

/// Maps the completed fraction of tasks into `[start, end]` percent.
#[derive(Debug, Clone, Copy)]
pub struct ProgressBand {
    pub start: f32,
    pub end: f32,
}

impl ProgressBand {
    pub fn percent(&self, completed: usize, total: usize) -> f32 {
        if total == 0 {
            return self.end;
        }
        let frac = (completed.min(total) as f32) / (total as f32);
        self.start + (self.end - self.start) * frac
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: f32,
    pub label: String,
    pub completed: usize,
    pub total: usize,
}

/// Receives a notification before each summarization task starts.
pub trait ProgressSink: Send {
    fn notify(&self, event: &ProgressEvent);
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn notify(&self, event: &ProgressEvent) {
        // The receiver going away only means nobody is watching.
        let _ = self.send(event.clone());
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send,
{
    fn notify(&self, event: &ProgressEvent) {
        self(event)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _event: &ProgressEvent) {}
}
