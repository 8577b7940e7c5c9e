//! Simulated scatter / compute / reduce estimation of π across cooperating
//! worker tasks, with paced phases for visualization.

pub mod canvas;
pub mod config;
pub mod control;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod listing;
pub mod partition;
pub mod reduce;
pub mod worker;

pub use config::{ConfigOptions, Configuration, ExperimentKind};
pub use controller::{PublishedState, SimulationController};
pub use coordinator::{Phase, RunMetrics, RunResult};
pub use error::{Error, Result};
pub use events::{
    Collaborators, IntermediateSnapshot, LogSink, ProgressSink, Rectangle, Renderer, Severity,
    VisualArtifact, WorkerStatus,
};
pub use partition::{partition, WorkChunk};
pub use reduce::reduce;
