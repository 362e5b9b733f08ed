mod cli;
mod ui;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Command};
use deckgate::admission::{AdmissionController, PolicyName};
use deckgate::config::DeckgateConfig;
use deckgate::engine::simulated::SimulatedFailure;
use deckgate::engine::{HttpTranslationEngine, SimulatedEngine, TranslationEngine};
use deckgate::state_machine::JobSnapshot;
use deckgate::Deckgate;
use ui::JobProgress;

// Chave usada para as chamadas feitas pela própria CLI.
const LOCAL_CLIENT: &str = "local";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    deckgate::logging::init(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => {
            let mut config = DeckgateConfig::load_file(path)?;
            config.apply_env(|name| std::env::var(name).ok());
            config
        }
        None => DeckgateConfig::load()?,
    };

    match cli.command {
        Command::Demo {
            texts,
            slides,
            step_ms,
            fail_after,
        } => {
            let mut engine = SimulatedEngine::new(slides, texts, Duration::from_millis(step_ms));
            if let Some(after) = fail_after {
                engine = engine.failing(after, SimulatedFailure::Unavailable);
            }
            let gate = Deckgate::new(&config, engine);
            run_job(&gate, "demo-deck", None).await?;
        }
        Command::Translate {
            file_id,
            language,
            engine_url,
        } => {
            let Some(base_url) = engine_url.or_else(|| config.engine.base_url.clone()) else {
                bail!("no engine URL: pass --engine-url or set DECKGATE_ENGINE_URL");
            };
            let engine = HttpTranslationEngine::with_timeouts(
                &base_url,
                config.engine.connect_timeout(),
                config.engine.timeout(),
            )
            .context("failed to build engine client")?;
            info!(endpoint = engine.endpoint(), "using remote translation engine");
            let gate = Deckgate::new(&config, engine);
            run_job(&gate, &file_id, language.as_deref()).await?;
        }
        Command::Limits => {
            let policies: Vec<_> = PolicyName::ALL
                .iter()
                .map(|name| (*name, config.rate_limit.policy(*name)))
                .collect();
            ui::print_policies(&policies, config.rate_limit.disabled);
        }
        Command::Admit { policy, key, count } => {
            let admission = AdmissionController::new(config.rate_limit.policies())
                .disabled(config.rate_limit.disabled);
            let policy = PolicyName::from(policy);
            for attempt in 1..=count {
                let decision = admission.admit(policy, &key, None);
                ui::print_decision(attempt, &decision);
            }
        }
    }

    Ok(())
}

/// Submete um job, acompanha seus eventos e imprime o snapshot final.
async fn run_job<E: TranslationEngine>(
    gate: &Deckgate<E>,
    file_id: &str,
    language: Option<&str>,
) -> Result<JobSnapshot> {
    let job_id = gate.submit_translation(LOCAL_CLIENT, LOCAL_CLIENT, file_id, language)?;
    let mut subscription = gate.orchestrator().watch(&job_id)?;
    let progress = JobProgress::start(&job_id);

    let mut last = None;
    while let Some(event) = subscription.recv().await {
        progress.update(&event);
        let terminal = event.is_terminal();
        last = Some(event);
        if terminal {
            break;
        }
    }

    let last = match last {
        Some(event) => event,
        None => {
            warn!(job_id, "progress stream closed without events");
            gate.orchestrator().status(&job_id)?
        }
    };
    progress.complete(&last);
    progress.print_snapshot(&last);
    Ok(last)
}
