//! Error types for the simulation.

use thiserror::Error;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected configuration value. The previous configuration stays in place.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("A simulation run is already active")]
    AlreadyRunning,

    #[error("No simulation run is active")]
    NotRunning,

    #[error("Unknown worker: {0}")]
    UnknownWorker(usize),

    #[error("Simulation run was cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted by the runtime
    #[error("Worker task failed: {0}")]
    WorkerFailed(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }
}
