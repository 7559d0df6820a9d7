use thiserror::Error;

use crate::state_machine::JobState;
use crate::transport::TransportError;

/// Top-level error returned by [`JobOrchestrator`](crate::JobOrchestrator) operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// The background task driving the operation panicked or was aborted.
    #[error("Background task ended unexpectedly: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

/// Caller-side mistakes, rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Analysis subject must not be empty")]
    EmptySubject,

    #[error("A job is already active")]
    JobAlreadyActive,

    #[error("No active job")]
    NoActiveJob,

    #[error("Job is not complete (state: {0})")]
    NotComplete(JobState),

    #[error("Download is not ready yet")]
    DownloadNotReady,

    #[error("Completion already recorded for job {0}")]
    AlreadyRecorded(String),
}

/// The job never started.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("rejected by service: {0}")]
    Rejected(String),

    #[error("submission parameters unavailable: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of the settings lookup that precedes a submission.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("Settings service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Settings request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Failure of the one-time completion record submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit sink rejected record (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("audit sink unreachable: {0}")]
    Unreachable(String),

    #[error("audit worker stopped")]
    WorkerGone,
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::Unreachable(err.to_string())
    }
}
