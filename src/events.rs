//! Data passed to the rendering, logging and progress collaborators.

use crate::coordinator::Phase;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rectangle {
    /// Left edge in [0, 1)
    pub x: f64,
    pub height: f64,
    pub width: f64,
    pub worker_id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum VisualArtifact {
    Point { x: f64, y: f64, inside: bool },
    Rectangle(Rectangle),
}

/// Approximate estimate reported by the reporting worker at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntermediateSnapshot {
    pub progress_percent: u8,
    pub estimated_pi: f64,
    pub items_processed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerStatus {
    Idle,
    Receiving,
    Computing,
    Paused,
    SendingResult,
    Finished,
    Cancelled,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerStatus::Idle => "Idle",
            WorkerStatus::Receiving => "Receiving work",
            WorkerStatus::Computing => "Computing",
            WorkerStatus::Paused => "Paused",
            WorkerStatus::SendingResult => "Sending result",
            WorkerStatus::Finished => "Finished",
            WorkerStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

pub trait Renderer: Send + Sync {
    fn draw_point(&self, x: f64, y: f64, inside: bool);
    fn draw_rectangle(&self, rect: &Rectangle);
    fn clear(&self);
}

pub trait LogSink: Send + Sync {
    fn append_log(&self, message: &str, severity: Severity);
}

pub trait ProgressSink: Send + Sync {
    fn update_progress(&self, percent: u8);

    fn intermediate(&self, _snapshot: &IntermediateSnapshot) {}

    fn worker_status(&self, _worker_id: usize, _status: WorkerStatus) {}

    fn phase_changed(&self, _phase: Phase) {}
}

/// Discards everything.
pub struct Discard;

impl Renderer for Discard {
    fn draw_point(&self, _x: f64, _y: f64, _inside: bool) {}
    fn draw_rectangle(&self, _rect: &Rectangle) {}
    fn clear(&self) {}
}

impl LogSink for Discard {
    fn append_log(&self, _message: &str, _severity: Severity) {}
}

impl ProgressSink for Discard {
    fn update_progress(&self, _percent: u8) {}
}

/// External collaborators a controller forwards to.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn Renderer>,
    pub log: Arc<dyn LogSink>,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            renderer: Arc::new(Discard),
            log: Arc::new(Discard),
            progress: Arc::new(Discard),
        }
    }
}
