//! HTTP implementations of the settings and audit collaborators, backed by
//! the application backend (`/api/settings/current`, `/api/dcf-logs`).

use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{AuditSink, ConfigProvider, SubmissionParameters};
use crate::config::OrchestratorConfig;
use crate::error::{AuditError, ConfigError};
use crate::state_machine::CompletionRecord;
use crate::transport::http::{error_message, parse_base_url};
use crate::transport::{Credentials, StagePrompts, TransportError};

/// Placeholder the backend stores when no key has been configured.
const NO_KEY: &str = "NO_KEY";

/// Shared HTTP plumbing for backend calls.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, TransportError> {
        Ok(Self {
            client: Client::new(),
            base_url: parse_base_url(base_url)?,
            token,
        })
    }

    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: parse_base_url(&config.backend_url)?,
            token: config.api_token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Settings row as served by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiSettings {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    prompt_agent1: Option<String>,
    #[serde(default)]
    prompt_agent2: Option<String>,
    #[serde(default)]
    prompt_agent3: Option<String>,
    #[serde(default)]
    prompt_agent4: Option<String>,
}

impl AiSettings {
    fn into_parameters(self) -> Result<SubmissionParameters, ConfigError> {
        let key = self
            .key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != NO_KEY)
            .ok_or(ConfigError::MissingApiKey)?;

        let prompts: StagePrompts = [
            self.prompt_agent1,
            self.prompt_agent2,
            self.prompt_agent3,
            self.prompt_agent4,
        ]
        .into_iter()
        .zip(1u8..)
        .filter_map(|(prompt, stage)| prompt.map(|p| (stage, p)))
        .collect();

        Ok(SubmissionParameters {
            credentials: Credentials::new(key),
            prompts,
        })
    }
}

/// Reads the current analysis settings from the backend.
#[derive(Debug, Clone)]
pub struct HttpSettingsProvider {
    backend: BackendClient,
}

impl HttpSettingsProvider {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

impl ConfigProvider for HttpSettingsProvider {
    async fn submission_parameters(&self) -> Result<SubmissionParameters, ConfigError> {
        let req = self
            .backend
            .client
            .get(self.backend.endpoint(&["api", "settings", "current"]));
        let response = self.backend.authorize(req).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let settings = response.json::<AiSettings>().await?;
        settings.into_parameters()
    }
}

/// Audit log entry in the backend's wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DcfLogRequest<'a> {
    username: &'a str,
    company_name: &'a str,
    description: &'a str,
    validation_status: String,
}

impl<'a> From<&'a CompletionRecord> for DcfLogRequest<'a> {
    fn from(record: &'a CompletionRecord) -> Self {
        Self {
            username: &record.identity,
            company_name: &record.subject,
            description: &record.synopsis,
            validation_status: record.classification.to_string(),
        }
    }
}

/// Posts completion records to the backend's audit log.
#[derive(Debug, Clone)]
pub struct HttpAuditSink {
    backend: BackendClient,
}

impl HttpAuditSink {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

impl AuditSink for HttpAuditSink {
    async fn record(&self, record: &CompletionRecord) -> Result<(), AuditError> {
        let req = self
            .backend
            .client
            .post(self.backend.endpoint(&["api", "dcf-logs"]))
            .json(&DcfLogRequest::from(record));
        let response = self.backend.authorize(req).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        debug!(job = %record.handle, "Audit record stored");
        Ok(())
    }
}
