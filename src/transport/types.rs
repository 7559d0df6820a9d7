//! Tipos de dados para requisições e respostas do serviço de análise DCF.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato dos endpoints `/api/dcf/*` do serviço.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state_machine::{JobSnapshot, JobStatus, StageResult};

/// Corpo da requisição para `POST /api/dcf/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Nome da empresa a ser analisada.
    pub company_name: String,
    /// Chave da API usada pelos agentes do serviço.
    pub api_key: String,
    /// Prompts por agente, com chaves `agent1` .. `agentN`.
    pub prompts: BTreeMap<String, String>,
}

/// Resposta de `POST /api/dcf/start`: ou um `job_id`, ou um `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Resultado de um agente, como reportado pelo serviço.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Índice do agente (1-based).
    pub agent: u8,
    pub name: String,
    pub result: String,
}

/// Resposta de `GET /api/dcf/status/{id}` e de `POST /api/dcf/cancel/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    /// Agente em execução; 0 quando nenhum agente está rodando.
    #[serde(default)]
    pub current_agent: u8,
    #[serde(default)]
    pub current_agent_name: Option<String>,
    #[serde(default)]
    pub agent_results: Vec<AgentResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub download_ready: bool,
    #[serde(default)]
    pub zip_filename: Option<String>,
}

/// Corpo de erro no formato do FastAPI (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl From<StatusResponse> for JobSnapshot {
    fn from(resp: StatusResponse) -> Self {
        // Resultados duplicados mantêm a primeira ocorrência, como no merge da máquina de estados.
        let mut stage_results = BTreeMap::new();
        for r in resp.agent_results {
            stage_results.entry(r.agent).or_insert(StageResult {
                stage: r.agent,
                name: r.name,
                result: r.result,
            });
        }

        JobSnapshot {
            status: resp.status,
            current_stage: resp.current_agent,
            stage_label: resp.current_agent_name,
            stage_results,
            error: resp.error,
            download_ready: resp.download_ready,
            artifact_name: resp.zip_filename,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_deserialize_from_service_format() {
        let json = r#"{
            "status": "running",
            "current_agent": 2,
            "current_agent_name": "DCF Input Data Collection",
            "agent_results": [
                {"agent": 1, "name": "Company Existence Validation", "result": "Company Status: Exists"}
            ],
            "error": null,
            "download_ready": false,
            "zip_filename": null,
            "cancelled": false
        }"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        let snapshot = JobSnapshot::from(resp);
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.current_stage, 2);
        assert_eq!(
            snapshot.stage_label.as_deref(),
            Some("DCF Input Data Collection")
        );
        assert_eq!(snapshot.result_of(1), Some("Company Status: Exists"));
        assert!(!snapshot.download_ready);
    }

    #[test]
    fn status_response_minimal_body() {
        let resp: StatusResponse = serde_json::from_str(r#"{"status": "complete"}"#).unwrap();
        assert_eq!(resp.current_agent, 0);
        assert!(resp.agent_results.is_empty());
    }

    #[test]
    fn unknown_status_fails_to_parse() {
        let result = serde_json::from_str::<StatusResponse>(r#"{"status": "paused"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn start_response_with_error() {
        let resp: StartResponse =
            serde_json::from_str(r#"{"error": "Unknown company"}"#).unwrap();
        assert!(resp.job_id.is_none());
        assert_eq!(resp.error.as_deref(), Some("Unknown company"));
    }

    #[test]
    fn start_request_serializes_prompts_by_agent() {
        let mut prompts = BTreeMap::new();
        prompts.insert("agent1".to_string(), "Verify the company".to_string());
        let req = StartRequest {
            company_name: "Acme Corp".into(),
            api_key: "sk-test".into(),
            prompts,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["company_name"], "Acme Corp");
        assert_eq!(json["prompts"]["agent1"], "Verify the company");
    }
}
