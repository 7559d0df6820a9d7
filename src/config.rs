//! Configuração do orquestrador carregada a partir de `dcf-orchestrator.toml`.
//!
//! A struct [`OrchestratorConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `DCF_SERVICE_URL`, `DCF_BACKEND_URL` e
//! `DCF_API_TOKEN` têm precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::state_machine::DEFAULT_STAGE_COUNT;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "dcf-orchestrator.toml";

/// Configuração de nível superior carregada de `dcf-orchestrator.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// URL base do serviço de análise multi-agente.
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// URL base do backend (configurações e registros de auditoria).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Token bearer opcional enviado ao backend.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Intervalo entre polls de status, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Número de estágios (agentes) do pipeline.
    #[serde(default = "default_stage_count")]
    pub stage_count: u8,

    /// Máximo de linhas não vazias do estágio 1 usadas na sinopse.
    #[serde(default = "default_synopsis_lines")]
    pub synopsis_lines: usize,

    /// Máximo de palavras da sinopse antes do truncamento.
    #[serde(default = "default_synopsis_words")]
    pub synopsis_words: usize,

    /// Timeout de conexão HTTP, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout total de cada requisição HTTP, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Valor padrão para o serviço de análise: o servidor local na porta 5000.
fn default_service_url() -> String {
    "http://localhost:5000/".to_string()
}

// Valor padrão para o backend: o servidor local na porta 8080.
fn default_backend_url() -> String {
    "http://localhost:8080/".to_string()
}

// Valor padrão para o intervalo de poll: 3000ms.
fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_stage_count() -> u8 {
    DEFAULT_STAGE_COUNT
}

fn default_synopsis_lines() -> usize {
    5
}

fn default_synopsis_words() -> usize {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            backend_url: default_backend_url(),
            api_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            stage_count: default_stage_count(),
            synopsis_lines: default_synopsis_lines(),
            synopsis_words: default_synopsis_words(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OrchestratorConfig {
    /// Carrega a configuração de `dcf-orchestrator.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito e aplica as variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<OrchestratorConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(url) = non_empty("DCF_SERVICE_URL") {
            self.service_url = url;
        }
        if let Some(url) = non_empty("DCF_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(token) = non_empty("DCF_API_TOKEN") {
            self.api_token = Some(token);
        }
    }

    /// Rejeita valores que deixariam o scheduler ou a sinopse inutilizáveis.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.stage_count == 0 {
            bail!("stage_count must be at least 1");
        }
        if self.synopsis_lines == 0 || self.synopsis_words == 0 {
            bail!("synopsis_lines and synopsis_words must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.stage_count, 4);
        assert_eq!(config.synopsis_lines, 5);
        assert_eq!(config.synopsis_words, 60);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            service_url = "http://analysis.internal:5000/"
            poll_interval_ms = 500
        "#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service_url, "http://analysis.internal:5000/");
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.backend_url, "http://localhost:8080/");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stage_count = 3\nsynopsis_words = 20").unwrap();
        let config = OrchestratorConfig::load_from(file.path()).unwrap();
        assert_eq!(config.stage_count, 3);
        assert_eq!(config.synopsis_words, 20);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.poll_interval_ms, 3000);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = OrchestratorConfig::default();
        config.apply_env(|name| match name {
            "DCF_SERVICE_URL" => Some("http://override:5000/".to_string()),
            "DCF_API_TOKEN" => Some("token-1".to_string()),
            "DCF_BACKEND_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.service_url, "http://override:5000/");
        assert_eq!(config.api_token.as_deref(), Some("token-1"));
        assert_eq!(config.backend_url, "http://localhost:8080/");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = OrchestratorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
