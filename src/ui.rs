//! Interface de terminal do deckgate: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente os eventos
//! de um job no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use deckgate::admission::{Decision, PolicyName, RateLimitPolicy};
use deckgate::state_machine::{JobSnapshot, JobState};

/// Indicador visual de progresso para um job acompanhado no terminal.
///
/// Exibe uma barra de 0 a 100% durante o processamento e mensagens
/// coloridas para sucesso (verde) e falha (vermelho).
pub struct JobProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilo verde para mensagens de sucesso.
    green: Style,
    // Estilo vermelho para mensagens de falha.
    red: Style,
    // Estilo amarelo para estados intermediários.
    yellow: Style,
}

impl JobProgress {
    /// Inicia a barra para o job e retorna a instância de progresso.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_message(format!("job {job_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a barra para refletir um evento do job.
    pub fn update(&self, event: &JobSnapshot) {
        self.pb.set_position(u64::from(event.progress));
        let message = event.message.as_deref().unwrap_or_default();
        self.pb
            .set_message(format!("{} {message}", self.yellow.apply_to(event.state)));
    }

    /// Finaliza a barra e exibe o resultado final do job.
    ///
    /// Sucesso é mostrado em verde com checkmark; falha em vermelho com X.
    pub fn complete(&self, event: &JobSnapshot) {
        self.pb.finish_and_clear();
        match event.state {
            JobState::Completed => {
                let url = event.result_url.as_deref().unwrap_or("-");
                println!("  {} Job completed: {url}", self.green.apply_to("✓"));
                if let Some(message) = &event.message {
                    println!("    {message}");
                }
            }
            JobState::Failed => match &event.error {
                Some(error) => println!(
                    "  {} Job failed [{}]: {}",
                    self.red.apply_to("✗"),
                    error.kind,
                    error.message
                ),
                None => println!("  {} Job failed", self.red.apply_to("✗")),
            },
            _ => println!("  {} Stream ended at {}", self.yellow.apply_to("…"), event.state),
        }
    }

    /// Imprime o snapshot final formatado em JSON.
    pub fn print_snapshot(&self, event: &JobSnapshot) {
        println!();
        println!("{}", self.yellow.apply_to("─── Job Snapshot ───"));
        println!("{}", serde_json::to_string_pretty(event).unwrap_or_default());
    }
}

/// Imprime a tabela de políticas efetivas.
pub fn print_policies(policies: &[(PolicyName, RateLimitPolicy)], disabled: bool) {
    let bold = Style::new().bold();
    println!(
        "{}",
        bold.apply_to(format!("{:<10} {:>8} {:>10} {:>9}", "policy", "ceiling", "window", "max keys"))
    );
    for (name, policy) in policies {
        println!(
            "{:<10} {:>8} {:>9}s {:>9}",
            name.as_str(),
            policy.ceiling,
            policy.window.as_secs(),
            policy.max_keys
        );
    }
    if disabled {
        println!("{}", Style::new().red().bold().apply_to("rate limiting is DISABLED"));
    }
}

/// Imprime uma decisão de admissão numa linha.
pub fn print_decision(attempt: u32, decision: &Decision) {
    if decision.allowed {
        println!(
            "  {} #{attempt} allowed ({} of {} left)",
            Style::new().green().apply_to("✓"),
            decision.remaining,
            decision.limit
        );
    } else {
        let body = decision.too_many_requests();
        println!(
            "  {} #{attempt} denied: 429, retry after {}s (reset {})",
            Style::new().red().apply_to("✗"),
            body.retry_after,
            decision.reset_at.to_rfc3339()
        );
    }
}
