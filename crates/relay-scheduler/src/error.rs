use thiserror::Error;

/// Error types for the scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler configuration error: {message}")]
    Config { message: String },

    #[error("Scheduler shut down while work was in flight: {message}")]
    Shutdown { message: String },

    #[error(transparent)]
    Core(#[from] relay_core::Error),
}

impl SchedulerError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new shutdown error
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SchedulerError>;
