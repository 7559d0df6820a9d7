//! Interface de terminal: spinner de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner e `console` para estilização.
//! O [`JobProgress`] acompanha visualmente os estágios de um job publicados
//! pelo orquestrador.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use dcf_orchestrator::state_machine::stage_name;
use dcf_orchestrator::{CancelResolution, JobSnapshot, JobState, JobView};

/// Indicador visual de progresso para a execução de um job no terminal.
pub struct JobProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    // Quantidade de resultados de estágio já impressos.
    reported: usize,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com o nome da empresa analisada.
    pub fn start(subject: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Submitting analysis for {subject}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            reported: 0,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza o spinner e imprime cada estágio concluído uma única vez.
    pub fn update(&mut self, view: &JobView) {
        for result in view.snapshot.stage_results.values().skip(self.reported) {
            self.pb.println(format!(
                "  {} Agent {}: {}",
                self.green.apply_to("✓"),
                result.stage,
                result.name
            ));
        }
        self.reported = view.snapshot.stage_results.len();

        let message = match &view.state {
            state if view.cancel_requested && !state.is_terminal() => "Cancelling...".to_string(),
            JobState::Running { stage } => {
                let label = view
                    .snapshot
                    .stage_label
                    .clone()
                    .or_else(|| stage_name(*stage).map(str::to_string))
                    .unwrap_or_default();
                format!("Stage {stage}/{}: {label}", view.stage_count)
            }
            state => state.to_string(),
        };
        self.pb.set_message(message);
    }

    /// Exibe uma mensagem amarela sem interromper o spinner.
    pub fn note(&self, message: &str) {
        self.pb.println(format!("  {} {message}", self.yellow.apply_to("!")));
    }

    /// Remove o spinner sem imprimir resultado (ex.: submissão rejeitada).
    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }

    /// Finaliza o spinner e exibe o estado terminal do job.
    pub fn complete(&self, view: &JobView) {
        self.pb.finish_and_clear();
        match &view.state {
            JobState::Complete => {
                println!("  {} Analysis complete", self.green.apply_to("✓"));
            }
            JobState::Error { message } => {
                println!("  {} Analysis failed: {message}", self.red.apply_to("✗"));
            }
            JobState::Cancelled => match &view.cancel_resolution {
                Some(CancelResolution::LocalOnly { reason }) => println!(
                    "  {} Stopped locally; the service did not confirm the cancel ({reason})",
                    self.yellow.apply_to("↻")
                ),
                _ => println!("  {} Analysis cancelled", self.yellow.apply_to("↻")),
            },
            state => println!("  {} Stopped in state {state}", self.yellow.apply_to("?")),
        }
    }
}

/// Imprime um snapshot em JSON com estilo colorido.
pub fn print_snapshot(snapshot: &JobSnapshot) {
    let style = if snapshot.status.is_terminal() {
        Style::new().green().bold()
    } else {
        Style::new().yellow()
    };
    println!("{}", style.apply_to("─── Job Status ───"));
    println!(
        "{}",
        serde_json::to_string_pretty(snapshot).unwrap_or_default()
    );
}
