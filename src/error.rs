//! Error types for Support Assist.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Answerer error: {0}")]
    Answerer(#[from] AnswererError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("No agent identifier configured for role {role}. {hint}")]
    MissingAgentId { role: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the Answerer capability (thread/message/run API).
#[derive(Debug, thiserror::Error)]
pub enum AnswererError {
    #[error("Request failed: {reason}")]
    Request { reason: String },

    #[error("Thread creation failed after {attempts} attempts: {reason}")]
    ThreadCreation { attempts: u32, reason: String },

    #[error("Run {run_id} on thread {thread_id} ended in status {status}")]
    RunFailed {
        thread_id: String,
        run_id: String,
        status: String,
    },

    #[error("Run {run_id} did not reach a terminal status within {attempts} polls ({waited:?})")]
    PollExhausted {
        run_id: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("Invalid response from answerer: {reason}")]
    InvalidResponse { reason: String },
}

/// Errors from the workflow engine and steps.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A structured-output pass returned JSON the step could not parse.
    /// Fatal to the run: surfaced, never retried.
    #[error("Step {step} received malformed structured output: {reason}")]
    MalformedStructuredOutput { step: String, reason: String },

    #[error("Step {step} has no function named {function}")]
    UnknownFunction { step: String, function: String },

    #[error("Graph routes to unregistered step {step}")]
    UnregisteredStep { step: String },

    #[error("Function {step}.{function} invoked with unexpected input: {reason}")]
    UnexpectedInput {
        step: String,
        function: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Answerer error: {0}")]
    Answerer(#[from] AnswererError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the conversation and process state stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
