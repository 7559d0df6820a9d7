mod cli;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use dcf_orchestrator::backend::{BackendClient, HttpAuditSink, HttpSettingsProvider};
use dcf_orchestrator::{
    ConfigProvider, Credentials, HttpJobTransport, JobHandle, JobOrchestrator, JobState,
    JobTransport, OrchestratorConfig, StagePrompts, StaticIdentity, StaticParameters,
    SubmissionParameters,
};
use ui::JobProgress;

struct RunOptions {
    company: String,
    output: Option<PathBuf>,
    user: Option<String>,
    no_audit: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dcf_orchestrator=debug" } else { "dcf_orchestrator=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => OrchestratorConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OrchestratorConfig::load()?,
    };
    let transport = HttpJobTransport::from_config(&config)?;

    match cli.command {
        Command::Run {
            company,
            output,
            user,
            api_key,
            no_audit,
        } => {
            let backend = BackendClient::from_config(&config)?;
            let audit = HttpAuditSink::new(backend.clone());
            let options = RunOptions {
                company,
                output,
                user,
                no_audit,
            };
            match api_key {
                Some(key) => {
                    let settings = StaticParameters(SubmissionParameters {
                        credentials: Credentials::new(key),
                        prompts: StagePrompts::new(),
                    });
                    let orchestrator = JobOrchestrator::new(transport, settings, audit, &config);
                    run(orchestrator, options).await
                }
                None => {
                    let settings = HttpSettingsProvider::new(backend);
                    let orchestrator = JobOrchestrator::new(transport, settings, audit, &config);
                    run(orchestrator, options).await
                }
            }
        }
        Command::Status { job_id } => {
            let snapshot = transport.poll(&JobHandle::new(job_id)).await?;
            ui::print_snapshot(&snapshot);
            Ok(())
        }
    }
}

async fn run<C: ConfigProvider>(
    orchestrator: JobOrchestrator<HttpJobTransport, C>,
    options: RunOptions,
) -> Result<()> {
    let mut progress = JobProgress::start(&options.company);
    let mut updates = orchestrator.subscribe();

    let submit = orchestrator.submit(&options.company);
    tokio::pin!(submit);
    let submitted = tokio::select! {
        result = &mut submit => result,
        _ = tokio::signal::ctrl_c() => {
            progress.note("Cancel requested; waiting for the service to accept the job");
            orchestrator.cancel().await?;
            submit.await
        }
    };
    if let Err(err) = submitted {
        progress.abandon();
        return Err(err.into());
    }

    loop {
        let view = updates.borrow_and_update().clone();
        progress.update(&view);
        if view.state.is_terminal() {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                progress.note("Cancel requested");
                orchestrator.cancel().await?;
            }
        }
    }

    let view = orchestrator.view();
    progress.complete(&view);
    if view.state != JobState::Complete {
        return Ok(());
    }

    match &options.output {
        Some(path) => {
            let bytes = orchestrator.download().await?;
            std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
            println!("  Report saved to {}", path.display());
        }
        None => match orchestrator.download_reference().await {
            Ok(url) => println!("  Report available at {url}"),
            Err(err) => warn!(error = %err, "No report to download"),
        },
    }

    if !options.no_audit {
        let ticket = orchestrator
            .record_completion(&StaticIdentity(options.user.clone()))
            .await?;
        if let Err(err) = ticket.outcome().await {
            warn!(error = %err, "Audit log not updated");
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
