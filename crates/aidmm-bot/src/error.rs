//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] aidmm_core::CoreError),

    #[error("Execution error: {0}")]
    Execution(#[from] aidmm_executor::ExecutionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] aidmm_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
