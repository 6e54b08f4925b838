// Error handling framework

use thiserror::Error;

/// Queue-related errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connection(String),

    #[error("Failed to create stream: {0}")]
    StreamCreation(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Failed to create consumer: {0}")]
    ConsumerCreation(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Failed to consume message: {0}")]
    ConsumeFailed(String),

    #[error("Failed to acknowledge message: {0}")]
    AckFailed(String),

    #[error("Message serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Message deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Queue operation timeout: {0}")]
    Timeout(String),
}

/// Job execution errors raised by the worker
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("'{program}' exited with status {}", exit_label(.code))]
    NonZeroExit { program: String, code: Option<i32> },

    #[error("Execution timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error while running job: {0}")]
    Io(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl ExecutionError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::InvalidPayload(_) => "invalid_payload",
            ExecutionError::UnknownTask(_) => "unknown_task",
            ExecutionError::SpawnFailed { .. } => "spawn_failed",
            ExecutionError::NonZeroExit { .. } => "non_zero_exit",
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::Io(_) => "io",
        }
    }
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Io(err.to_string())
    }
}
