//! Interface de linha de comando do orquestrador baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, status)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Orquestrador de análises DCF multi-agente.
#[derive(Debug, Parser)]
#[command(name = "dcf-orchestrator", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: ./dcf-orchestrator.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete uma análise e acompanha seus estágios até o fim. Ctrl-C cancela.
    Run {
        /// Nome da empresa a ser analisada.
        company: String,

        /// Salva o artefato (ZIP) neste caminho quando a análise terminar.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Identidade registrada no log de auditoria.
        #[arg(long)]
        user: Option<String>,

        /// Usa esta chave de API em vez de buscar as configurações no backend.
        #[arg(long)]
        api_key: Option<String>,

        /// Não registra a conclusão no log de auditoria.
        #[arg(long, default_value_t = false)]
        no_audit: bool,
    },

    /// Consulta uma vez o status de um job existente.
    Status {
        /// Identificador do job retornado pelo serviço.
        job_id: String,
    },
}
