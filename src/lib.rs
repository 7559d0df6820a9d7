//! Client-side lifecycle orchestration for multi-agent DCF valuation jobs.
//!
//! A [`JobOrchestrator`] submits one job at a time to the remote analysis
//! service, polls it on an owned [`PollingScheduler`], arbitrates user
//! cancels against in-flight polls, and fires the one-time completion
//! side effect (audit record, artifact download) on explicit request.

pub mod backend;
pub mod cancellation;
pub mod collaborators;
pub mod completion;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod state_machine;
pub mod transport;

pub use cancellation::{CancelDecision, CancelResolution, CancellationController};
pub use collaborators::{
    AuditSink, ConfigProvider, IdentityProvider, StaticIdentity, StaticParameters,
    SubmissionParameters,
};
pub use completion::{AuditStats, AuditTicket, CompletionSideEffects, SynopsisBudget};
pub use config::OrchestratorConfig;
pub use error::{
    AuditError, ConfigError, OrchestratorError, SubmissionError, ValidationError,
};
pub use orchestrator::{CancelOutcome, JobOrchestrator, JobView};
pub use scheduler::PollingScheduler;
pub use state_machine::{
    CompletionRecord, JobHandle, JobSnapshot, JobState, JobStateMachine, JobStatus,
    StageResult, Transition, ValidationClass,
};
pub use transport::{Credentials, HttpJobTransport, JobTransport, StagePrompts, TransportError};
