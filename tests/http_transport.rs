//! HTTP collaborators against a mock service and backend.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dcf_orchestrator::backend::{BackendClient, HttpAuditSink, HttpSettingsProvider};
use dcf_orchestrator::{
    AuditError, AuditSink, CompletionRecord, ConfigError, ConfigProvider, Credentials,
    HttpJobTransport, JobHandle, JobOrchestrator, JobState, JobStatus, JobTransport,
    OrchestratorConfig, StagePrompts, StaticIdentity, StaticParameters, SubmissionError,
    SubmissionParameters, TransportError, ValidationClass,
};

fn transport(server: &MockServer) -> HttpJobTransport {
    HttpJobTransport::new(
        &server.uri(),
        Duration::from_secs(2),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn prompts() -> StagePrompts {
    StagePrompts::from([(1, "verify".to_string()), (3, "calculate".to_string())])
}

fn status_body(status: &str) -> serde_json::Value {
    json!({
        "status": status,
        "current_agent": 2,
        "current_agent_name": "DCF Input Data Collection",
        "agent_results": [
            {"agent": 1, "name": "Company Existence Validation", "result": "Exists"}
        ],
        "error": null,
        "download_ready": false,
        "zip_filename": null
    })
}

// --- Analysis service ---

#[tokio::test]
async fn start_posts_subject_key_and_prompts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf/start"))
        .and(body_json(json!({
            "company_name": "Acme Corp",
            "api_key": "sk-test",
            "prompts": {"agent1": "verify", "agent3": "calculate"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "J1"})))
        .expect(1)
        .mount(&server)
        .await;

    let handle = transport(&server)
        .submit("Acme Corp", &Credentials::new("sk-test"), &prompts())
        .await
        .unwrap();
    assert_eq!(handle, JobHandle::new("J1"));
}

#[tokio::test]
async fn start_error_field_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "Unknown company"})),
        )
        .mount(&server)
        .await;

    let err = transport(&server)
        .submit("Nope", &Credentials::new("sk-test"), &StagePrompts::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Rejected(ref msg) if msg == "Unknown company"));
}

#[tokio::test]
async fn start_client_error_uses_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf/start"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": "company_name required"})),
        )
        .mount(&server)
        .await;

    let err = transport(&server)
        .submit("x", &Credentials::new("sk-test"), &StagePrompts::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Rejected(ref msg) if msg == "company_name required"));
}

#[tokio::test]
async fn start_server_error_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf/start"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .submit("Acme Corp", &Credentials::new("sk-test"), &StagePrompts::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Transport(TransportError::ApiError { status: 500, .. })
    ));
}

#[tokio::test]
async fn status_maps_to_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcf/status/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("running")))
        .mount(&server)
        .await;

    let snapshot = transport(&server).poll(&JobHandle::new("J1")).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.current_stage, 2);
    assert_eq!(
        snapshot.stage_label.as_deref(),
        Some("DCF Input Data Collection")
    );
    assert_eq!(snapshot.result_of(1), Some("Exists"));
    assert!(!snapshot.download_ready);
}

#[tokio::test]
async fn unknown_job_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcf/status/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Job not found"})))
        .mount(&server)
        .await;

    let err = transport(&server)
        .poll(&JobHandle::new("missing"))
        .await
        .unwrap_err();
    match err {
        TransportError::ApiError { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Job not found");
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_status_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcf/status/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = transport(&server).poll(&JobHandle::new("J1")).await.unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
}

#[tokio::test]
async fn cancel_returns_post_cancel_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf/cancel/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("cancelled")))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = transport(&server).cancel(&JobHandle::new("J1")).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn download_fetches_artifact_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcf/download/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04zip".to_vec()))
        .mount(&server)
        .await;

    let transport = transport(&server);
    let handle = JobHandle::new("J1");
    assert_eq!(
        transport.download_reference(&handle).as_str(),
        format!("{}/api/dcf/download/J1", server.uri())
    );
    assert_eq!(
        transport.download(&handle).await.unwrap(),
        b"PK\x03\x04zip".to_vec()
    );
}

// --- Application backend ---

#[tokio::test]
async fn settings_are_read_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings/current"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "key": "sk-live",
            "promptAgent1": "verify",
            "promptAgent2": "collect"
        })))
        .mount(&server)
        .await;

    let backend = BackendClient::new(&server.uri(), Some("tok".into())).unwrap();
    let params = HttpSettingsProvider::new(backend)
        .submission_parameters()
        .await
        .unwrap();
    assert_eq!(params.credentials.expose(), "sk-live");
    assert_eq!(params.prompts.get(&2).map(String::as_str), Some("collect"));
    assert_eq!(params.prompts.len(), 2);
}

#[tokio::test]
async fn settings_without_key_are_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "NO_KEY"})))
        .mount(&server)
        .await;

    let backend = BackendClient::new(&server.uri(), None).unwrap();
    let err = HttpSettingsProvider::new(backend)
        .submission_parameters()
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingApiKey));
}

fn record() -> CompletionRecord {
    CompletionRecord {
        handle: JobHandle::new("J1"),
        identity: "analyst".into(),
        subject: "Acme Corp".into(),
        synopsis: "Company Status: Exists".into(),
        classification: ValidationClass::AdjustedAndValidated,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn audit_record_is_posted_in_backend_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf-logs"))
        .and(body_json(json!({
            "username": "analyst",
            "companyName": "Acme Corp",
            "description": "Company Status: Exists",
            "validationStatus": "Adjusted & Validated"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let backend = BackendClient::new(&server.uri(), None).unwrap();
    HttpAuditSink::new(backend).record(&record()).await.unwrap();
}

#[tokio::test]
async fn audit_rejection_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcf-logs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .mount(&server)
        .await;

    let backend = BackendClient::new(&server.uri(), None).unwrap();
    let err = HttpAuditSink::new(backend).record(&record()).await.unwrap_err();
    assert!(matches!(err, AuditError::Rejected { status: 500, .. }));
}

// --- End to end ---

#[tokio::test]
async fn orchestrator_runs_job_to_completion_over_http() {
    let service = MockServer::start().await;
    let backend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/dcf/start"))
        .and(body_partial_json(json!({"company_name": "Acme Corp"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "J1"})))
        .expect(1)
        .mount(&service)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dcf/status/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "current_agent": 4,
            "agent_results": [
                {"agent": 1, "name": "Company Existence Validation", "result": "**Status:** Exists"},
                {"agent": 4, "name": "Validation & Realism Audit", "result": "Validated"}
            ],
            "download_ready": true,
            "zip_filename": "Acme_Corp_DCF.zip"
        })))
        .mount(&service)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/dcf-logs"))
        .and(body_partial_json(json!({
            "username": "analyst",
            "description": "Status: Exists",
            "validationStatus": "Validated"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let config = OrchestratorConfig {
        service_url: service.uri(),
        backend_url: backend.uri(),
        poll_interval_ms: 20,
        ..Default::default()
    };
    let settings = StaticParameters(SubmissionParameters {
        credentials: Credentials::new("sk-test"),
        prompts: StagePrompts::new(),
    });
    let audit = HttpAuditSink::new(BackendClient::from_config(&config).unwrap());
    let orch = JobOrchestrator::new(
        HttpJobTransport::from_config(&config).unwrap(),
        settings,
        audit,
        &config,
    );

    orch.submit("Acme Corp").await.unwrap();
    let mut updates = orch.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|view| view.state.is_terminal()),
    )
    .await
    .expect("job did not finish")
    .unwrap();
    drop(updates);

    assert_eq!(orch.state(), JobState::Complete);
    assert_eq!(
        orch.snapshot().artifact_name.as_deref(),
        Some("Acme_Corp_DCF.zip")
    );

    let ticket = orch
        .record_completion(&StaticIdentity(Some("analyst".into())))
        .await
        .unwrap();
    ticket.outcome().await.unwrap();
    orch.shutdown().await;
}
