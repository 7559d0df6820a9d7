//! Access to the remote multi-agent analysis service.
//!
//! [`JobTransport`] is the seam between the orchestrator and the service:
//! four logical calls plus the artifact fetch. [`HttpJobTransport`] speaks
//! the reference HTTP API; tests substitute scripted implementations.

pub mod error;
pub mod http;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use reqwest::Url;

use crate::error::SubmissionError;
use crate::state_machine::{JobHandle, JobSnapshot};

pub use error::TransportError;
pub use http::HttpJobTransport;

/// Per-stage prompts, keyed by 1-based stage index.
pub type StagePrompts = BTreeMap<u8, String>;

/// Secret the service needs to run its agents. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Contract of the remote analysis service.
///
/// Expected remote failures come back as typed errors; a [`SubmissionError`]
/// means no job exists and nothing may be polled.
pub trait JobTransport: Send + Sync + 'static {
    fn submit(
        &self,
        subject: &str,
        credentials: &Credentials,
        prompts: &StagePrompts,
    ) -> impl Future<Output = Result<JobHandle, SubmissionError>> + Send;

    fn poll(
        &self,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<JobSnapshot, TransportError>> + Send;

    /// Request cancellation; returns the service's post-cancel snapshot.
    fn cancel(
        &self,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<JobSnapshot, TransportError>> + Send;

    /// Location the finished artifact can be fetched from.
    fn download_reference(&self, handle: &JobHandle) -> Url;

    fn download(
        &self,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_redacted_in_debug() {
        let creds = Credentials::new("sk-secret");
        assert_eq!(format!("{creds:?}"), "Credentials(***)");
        assert_eq!(creds.expose(), "sk-secret");
    }
}
