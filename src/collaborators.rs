//! Interfaces of the collaborators the orchestrator consumes but does not own.

use std::future::Future;

use crate::error::{AuditError, ConfigError};
use crate::state_machine::CompletionRecord;
use crate::transport::{Credentials, StagePrompts};

/// Identity recorded when the caller has none.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Everything `start` needs besides the subject, fetched once per submission.
#[derive(Debug, Clone)]
pub struct SubmissionParameters {
    pub credentials: Credentials,
    pub prompts: StagePrompts,
}

/// Supplies submission parameters. Caching and retries are the provider's
/// business; the orchestrator calls it exactly once before each `start`.
pub trait ConfigProvider: Send + Sync + 'static {
    fn submission_parameters(
        &self,
    ) -> impl Future<Output = Result<SubmissionParameters, ConfigError>> + Send;
}

/// Opaque identity of the caller initiating the job.
pub trait IdentityProvider {
    fn identity(&self) -> Option<String>;
}

/// Receives completion records. Failures are reported, never retried.
pub trait AuditSink: Send + Sync + 'static {
    fn record(
        &self,
        record: &CompletionRecord,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;
}

/// Fixed parameters, e.g. an API key taken from the environment.
#[derive(Debug, Clone)]
pub struct StaticParameters(pub SubmissionParameters);

impl ConfigProvider for StaticParameters {
    async fn submission_parameters(&self) -> Result<SubmissionParameters, ConfigError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Option<String>);

impl IdentityProvider for StaticIdentity {
    fn identity(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Resolve the identity to record, falling back to [`UNKNOWN_IDENTITY`].
pub fn resolve_identity(provider: &impl IdentityProvider) -> String {
    provider
        .identity()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
