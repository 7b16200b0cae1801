use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Failed to launch {component} runner: {reason}")]
    Launch { component: String, reason: String },

    #[error("Telemetry capture failed: {0}")]
    Telemetry(String),

    #[error("Report generation failed: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl CoordinatorError {
    /// Returns `true` for errors that must abort the run before any
    /// runner process has been launched.
    pub fn is_fatal_pre_launch(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Config(_) | CoordinatorError::Connectivity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
