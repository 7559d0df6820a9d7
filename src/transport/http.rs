use std::time::Duration;

use reqwest::{Client, Response, Url};
use tracing::debug;

use super::error::TransportError;
use super::types::{ErrorBody, StartRequest, StartResponse, StatusResponse};
use super::{Credentials, JobTransport, StagePrompts};
use crate::config::OrchestratorConfig;
use crate::error::SubmissionError;
use crate::state_machine::{JobHandle, JobSnapshot};

/// reqwest-backed client for the `/api/dcf/*` endpoints.
#[derive(Debug, Clone)]
pub struct HttpJobTransport {
    client: Client,
    base_url: Url,
}

impl HttpJobTransport {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.service_url,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // parse_base_url rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_snapshot(response: Response) -> Result<JobSnapshot, TransportError> {
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        let status: StatusResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(status.into())
    }
}

/// Accepts only absolute http(s) URLs that can carry a path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::InvalidUrl(format!(
            "{raw}: expected an http(s) base URL"
        )));
    }
    Ok(url)
}

/// Turn a non-2xx response into an [`TransportError::ApiError`], preferring
/// the FastAPI `detail` field over the raw body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(TransportError::ApiError {
        status: status.as_u16(),
        message: error_message(response).await,
    })
}

pub(crate) async fn error_message(response: Response) -> String {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => err.detail,
        Err(_) => body,
    }
}

impl JobTransport for HttpJobTransport {
    async fn submit(
        &self,
        subject: &str,
        credentials: &Credentials,
        prompts: &StagePrompts,
    ) -> Result<JobHandle, SubmissionError> {
        let req = StartRequest {
            company_name: subject.to_string(),
            api_key: credentials.expose().to_string(),
            prompts: prompts
                .iter()
                .map(|(stage, prompt)| (format!("agent{stage}"), prompt.clone()))
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint(&["api", "dcf", "start"]))
            .json(&req)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if status.is_client_error() {
            return Err(SubmissionError::Rejected(error_message(response).await));
        }
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(TransportError::from)?;
        let start: StartResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        match (start.job_id, start.error) {
            (_, Some(error)) => Err(SubmissionError::Rejected(error)),
            (Some(job_id), None) => {
                debug!(job = %job_id, "Service accepted submission");
                Ok(JobHandle::new(job_id))
            }
            (None, None) => Err(TransportError::Decode(
                "start response carried neither job_id nor error".into(),
            )
            .into()),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobSnapshot, TransportError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "dcf", "status", handle.as_str()]))
            .send()
            .await?;
        Self::read_snapshot(response).await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<JobSnapshot, TransportError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "dcf", "cancel", handle.as_str()]))
            .send()
            .await?;
        Self::read_snapshot(response).await
    }

    fn download_reference(&self, handle: &JobHandle) -> Url {
        self.endpoint(&["api", "dcf", "download", handle.as_str()])
    }

    async fn download(&self, handle: &JobHandle) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(self.download_reference(handle))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
